//! `ActivityService` — persists selected bus events and enforces retention
//! by age and by count (§4.8).

use crate::event_bus::EventBus;
use crate::events::kind;
use crate::interfaces::ActivityStorage;
use crate::types::{ActivityRecord, ActivitySource, ActivityType, Event};
use crate::value::ValueMapExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_MAX_RECORDS: usize = 10_000;
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);
const TRIM_RATIO: f64 = 0.9;

pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_records: usize,
    pub check_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            max_records: DEFAULT_MAX_RECORDS,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// How many records a count-based trim should remove, given the current
/// total. A pure predicate so it is testable against the literal §8 values
/// without a real storage backend.
pub fn count_trim_amount(current_count: usize, max_records: usize) -> usize {
    if max_records == 0 || current_count <= max_records {
        return 0;
    }
    let target = (max_records as f64 * TRIM_RATIO) as usize;
    current_count - target
}

fn activity_type_for(event_kind: &str) -> Option<ActivityType> {
    match event_kind {
        k if k == kind::TOOL_CALL_COMPLETED => Some(ActivityType::ToolCall),
        k if k == kind::POLICY_DECISION => Some(ActivityType::PolicyDecision),
        k if k == kind::QUARANTINE_CHANGE => Some(ActivityType::QuarantineChange),
        k if k == kind::SYSTEM_START => Some(ActivityType::SystemStart),
        k if k == kind::SYSTEM_STOP => Some(ActivityType::SystemStop),
        k if k == kind::INTERNAL_TOOL_CALL_COMPLETED => Some(ActivityType::InternalToolCall),
        k if k == kind::CONFIG_CHANGE => Some(ActivityType::ConfigChange),
        k if k == kind::HOOK_EVALUATION_COMPLETED => Some(ActivityType::HookEvaluation),
        k if k == kind::SENSITIVE_DATA_DETECTED => Some(ActivityType::SensitiveDataDetected),
        _ => None,
    }
}

/// Builds an `ActivityRecord` from a bus event, using defensive extraction
/// (missing/mistyped payload fields yield zero values, §9).
pub fn record_from_event(event: &Event, next_id: u64) -> Option<ActivityRecord> {
    let kind = activity_type_for(&event.kind)?;
    let payload = &event.payload;
    Some(ActivityRecord {
        id: next_id,
        kind,
        source: match payload.get_string("source").as_str() {
            "cli" => ActivitySource::Cli,
            "api" => ActivitySource::Api,
            _ => ActivitySource::Mcp,
        },
        server_name: payload.get_opt_string("server"),
        tool_name: payload.get_opt_string("tool"),
        session_id: payload.get_opt_string("session_id"),
        request_id: payload.get_opt_string("request_id"),
        status: {
            let s = payload.get_string("status");
            if s.is_empty() { "ok".to_string() } else { s }
        },
        error_message: payload.get_opt_string("error"),
        duration_ms: {
            let d = payload.get_i64("duration_ms");
            if d == 0 { None } else { Some(d as u64) }
        },
        response: payload.get_opt_string("response"),
        response_truncated: Some(payload.get_bool("response_truncated")),
        timestamp: event.timestamp,
        metadata: payload.clone(),
    })
}

pub struct ActivityService<S: ActivityStorage> {
    storage: Arc<S>,
    next_id: AtomicU64,
    policy: RetentionPolicy,
}

impl<S: ActivityStorage + 'static> ActivityService<S> {
    pub fn new(storage: Arc<S>, policy: RetentionPolicy) -> Self {
        Self {
            storage,
            next_id: AtomicU64::new(1),
            policy,
        }
    }

    /// Consumes the bus via a plain receiver loop — a simple consumer, not
    /// a registered `EventObserver` (§4.8 supplement).
    pub fn spawn_consumer(self: &Arc<Self>, bus: &EventBus, cancel: CancellationToken) {
        let mut rx = bus.subscribe();
        let service = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => {
                        match received {
                            Ok(event) => service.handle_event(&event).await,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                log::warn!("ActivityService: lagged, dropped {n} events");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
    }

    async fn handle_event(&self, event: &Event) {
        if event.kind == kind::TOOL_CALL_STARTED {
            return;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(record) = record_from_event(event, id) {
            if let Err(err) = self.storage.insert(record).await {
                log::error!("ActivityService: failed to persist record: {err}");
            }
        }
    }

    pub fn spawn_retention_loop(self: &Arc<Self>, cancel: CancellationToken) {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.policy.check_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => service.run_retention().await,
                }
            }
        });
    }

    pub async fn run_retention(&self) {
        if let Err(err) = self
            .storage
            .prune_older_than(self.policy.max_age.as_secs())
            .await
        {
            log::error!("ActivityService: age-based retention failed: {err}");
        }
        match self.storage.count().await {
            Ok(count) => {
                let trim = count_trim_amount(count, self.policy.max_records);
                if trim > 0 {
                    if let Err(err) = self.storage.prune_oldest(trim).await {
                        log::error!("ActivityService: count-based retention failed: {err}");
                    }
                }
            }
            Err(err) => log::error!("ActivityService: failed to read record count: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::fakes::InMemoryActivityStorage;
    use crate::value::{Value, ValueMap};

    #[test]
    fn count_trim_amount_is_zero_when_under_cap() {
        assert_eq!(count_trim_amount(100, 10_000), 0);
    }

    #[test]
    fn count_trim_amount_is_zero_for_max_zero() {
        assert_eq!(count_trim_amount(100, 0), 0);
    }

    #[test]
    fn count_trim_amount_reduces_to_ninety_percent_of_cap() {
        let trimmed = count_trim_amount(10_500, 10_000);
        assert_eq!(trimmed, 10_500 - 9_000);
    }

    #[test]
    fn tool_call_started_has_no_activity_type() {
        assert!(activity_type_for(kind::TOOL_CALL_STARTED).is_none());
    }

    #[test]
    fn record_from_event_extracts_fields_defensively() {
        let mut payload = ValueMap::new();
        payload.insert("server".to_string(), Value::String("s1".to_string()));
        let event = Event::new(kind::TOOL_CALL_COMPLETED, payload);
        let record = record_from_event(&event, 1).unwrap();
        assert_eq!(record.server_name.as_deref(), Some("s1"));
        assert_eq!(record.status, "ok");
        assert_eq!(record.duration_ms, None);
    }

    #[tokio::test]
    async fn consumer_persists_completed_but_not_started_events() {
        crate::test_support::init_logging();
        let storage = Arc::new(InMemoryActivityStorage::default());
        let service = Arc::new(ActivityService::new(storage.clone(), RetentionPolicy::default()));
        let bus = EventBus::new();
        service.spawn_consumer(&bus, CancellationToken::new());

        bus.publish(kind::TOOL_CALL_STARTED, ValueMap::new());
        bus.publish(kind::TOOL_CALL_COMPLETED, ValueMap::new());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn retention_runs_age_and_count_policies() {
        let storage = Arc::new(InMemoryActivityStorage::default());
        for _ in 0..5 {
            storage
                .insert(ActivityRecord {
                    id: storage.count().await.unwrap() as u64 + 1,
                    kind: ActivityType::ToolCall,
                    source: ActivitySource::Mcp,
                    server_name: None,
                    tool_name: None,
                    session_id: None,
                    request_id: None,
                    status: "ok".to_string(),
                    error_message: None,
                    duration_ms: None,
                    response: None,
                    response_truncated: None,
                    timestamp: std::time::SystemTime::now(),
                    metadata: ValueMap::new(),
                })
                .await
                .unwrap();
        }
        let policy = RetentionPolicy {
            max_age: Duration::from_secs(3600),
            max_records: 3,
            check_interval: Duration::from_secs(3600),
        };
        let service = ActivityService::new(storage.clone(), policy);
        service.run_retention().await;
        assert!(storage.count().await.unwrap() <= 3);
    }
}
