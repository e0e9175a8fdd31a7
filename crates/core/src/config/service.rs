//! Versioned, lock-free config snapshots with subscriber fan-out (§4.3).
//!
//! Mirrors `RoutingSnapshotHandle` from the teacher's remote routing table:
//! an `Arc<ArcSwap<T>>` for O(1) lock-free reads, with mutation serialized
//! through `&self` methods rather than exposed mutability.

use crate::config::diff::detect_changes;
use crate::error::CoreError;
use crate::types::{ChangeSet, ConfigDocument, ConfigSnapshot};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::sync::broadcast;

const NOTICE_BUFFER: usize = 64;

/// Classification of what triggered a config update, carried on the
/// subscriber notice so handlers can distinguish a reload from a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    Applied,
    ReloadedFromDisk,
}

#[derive(Debug, Clone)]
pub struct ConfigChangeNotice {
    pub old: Arc<ConfigSnapshot>,
    pub new: Arc<ConfigSnapshot>,
    pub update_type: UpdateType,
}

pub struct ConfigService {
    snapshot: Arc<ArcSwap<ConfigSnapshot>>,
    version: AtomicU64,
    notices: broadcast::Sender<ConfigChangeNotice>,
}

impl ConfigService {
    pub fn new(initial: ConfigDocument, path: impl Into<Arc<str>>) -> Self {
        let snapshot = ConfigSnapshot {
            config: Arc::new(initial),
            path: path.into(),
            version: 0,
            timestamp: SystemTime::now(),
        };
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);
        Self {
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            version: AtomicU64::new(0),
            notices,
        }
    }

    /// Lock-free O(1) read of the current snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeNotice> {
        self.notices.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.notices.receiver_count()
    }

    /// Validates, computes the diff against the current snapshot, and (if
    /// valid) swaps in a new snapshot with a strictly incremented version
    /// (I3), then publishes to subscribers. Returns the `ChangeSet`.
    pub fn update(
        &self,
        new_config: ConfigDocument,
        update_type: UpdateType,
    ) -> Result<ChangeSet, CoreError> {
        validate(&new_config)?;

        let old_snapshot = self.snapshot.load_full();
        let changes = detect_changes(Some(&old_snapshot.config), Some(&new_config));
        if !changes.success {
            return Err(CoreError::InvalidConfig(
                changes
                    .restart_reason
                    .unwrap_or_else(|| "validation failed".to_string()),
            ));
        }
        if changes.changed_fields.is_empty() {
            return Ok(changes);
        }

        let new_version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let new_snapshot = Arc::new(ConfigSnapshot {
            config: Arc::new(new_config),
            path: old_snapshot.path.clone(),
            version: new_version,
            timestamp: SystemTime::now(),
        });
        self.snapshot.store(new_snapshot.clone());

        // Publish outside of any lock the swap held (there was none —
        // ArcSwap::store is itself lock-free) so handlers may safely
        // re-enter runtime methods (§4.7 ordering rule).
        let _ = self.notices.send(ConfigChangeNotice {
            old: old_snapshot,
            new: new_snapshot,
            update_type,
        });

        Ok(changes)
    }
}

fn validate(config: &ConfigDocument) -> Result<(), CoreError> {
    if config.listen.is_empty() {
        return Err(CoreError::InvalidConfig("listen must not be empty".to_string()));
    }
    if config.data_dir.is_empty() {
        return Err(CoreError::InvalidConfig("data_dir must not be empty".to_string()));
    }
    let mut seen = std::collections::HashSet::new();
    for server in &config.mcp_servers {
        if server.name.is_empty() {
            return Err(CoreError::InvalidConfig("server name must not be empty".to_string()));
        }
        if !seen.insert(server.name.clone()) {
            return Err(CoreError::InvalidConfig(format!(
                "duplicate server name '{}'",
                server.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(listen: &str, tools_limit: Option<u32>) -> ConfigDocument {
        ConfigDocument {
            listen: listen.to_string(),
            data_dir: "/data".to_string(),
            api_key: None,
            tls: None,
            mcp_servers: Vec::new(),
            tools_limit,
            tool_response_limit: None,
            call_tool_timeout_secs: None,
            logging: None,
            docker_isolation: false,
            registries: Vec::new(),
            read_only_mode: false,
            disable_management: false,
            allow_server_add: true,
            allow_server_remove: true,
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn current_returns_initial_snapshot_at_version_zero() {
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), "config.toml");
        assert_eq!(service.current().version, 0);
    }

    #[test]
    fn update_bumps_version_monotonically() {
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), "config.toml");
        service
            .update(sample("127.0.0.1:8080", Some(20)), UpdateType::Applied)
            .unwrap();
        assert_eq!(service.current().version, 1);
        service
            .update(sample("127.0.0.1:8080", Some(25)), UpdateType::Applied)
            .unwrap();
        assert_eq!(service.current().version, 2);
    }

    #[test]
    fn no_op_update_does_not_bump_version() {
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), "config.toml");
        let changes = service
            .update(sample("127.0.0.1:8080", Some(15)), UpdateType::Applied)
            .unwrap();
        assert!(changes.changed_fields.is_empty());
        assert_eq!(service.current().version, 0);
    }

    #[test]
    fn invalid_config_is_rejected_and_leaves_snapshot_untouched() {
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), "config.toml");
        let result = service.update(sample("", Some(20)), UpdateType::Applied);
        assert!(result.is_err());
        assert_eq!(service.current().version, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_old_and_new_snapshots() {
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), "config.toml");
        let mut rx = service.subscribe();
        service
            .update(sample("127.0.0.1:8080", Some(20)), UpdateType::Applied)
            .unwrap();
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.old.version, 0);
        assert_eq!(notice.new.version, 1);
        assert_eq!(notice.new.config.tools_limit, Some(20));
    }

    #[test]
    fn reader_obtaining_version_v_never_observes_a_later_version_going_backward() {
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), "config.toml");
        let v0 = service.current();
        service
            .update(sample("127.0.0.1:8080", Some(20)), UpdateType::Applied)
            .unwrap();
        let v1 = service.current();
        assert!(v1.version > v0.version);
        // v0 the Arc itself is untouched — I3.
        assert_eq!(v0.config.tools_limit, Some(15));
    }
}
