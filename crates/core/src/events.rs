//! Typed event kinds published on the `EventBus` (§4.1).

use crate::error::CoreError;
use crate::types::Event;
use crate::value::ValueMap;
use async_trait::async_trait;

/// The closed set of dotted event type strings the bus will carry.
pub mod kind {
    pub const SERVERS_CHANGED: &str = "servers.changed";
    pub const CONFIG_RELOADED: &str = "config.reloaded";
    pub const CONFIG_SAVED: &str = "config.saved";
    pub const SECRETS_CHANGED: &str = "secrets.changed";
    pub const OAUTH_TOKEN_REFRESHED: &str = "oauth.token_refreshed";
    pub const OAUTH_REFRESH_FAILED: &str = "oauth.refresh_failed";
    pub const TOOL_CALL_STARTED: &str = "activity.tool_call.started";
    pub const TOOL_CALL_COMPLETED: &str = "activity.tool_call.completed";
    pub const POLICY_DECISION: &str = "activity.policy_decision";
    pub const QUARANTINE_CHANGE: &str = "activity.quarantine_change";
    pub const SYSTEM_START: &str = "activity.system_start";
    pub const SYSTEM_STOP: &str = "activity.system_stop";
    pub const INTERNAL_TOOL_CALL_COMPLETED: &str = "activity.internal_tool_call.completed";
    pub const CONFIG_CHANGE: &str = "activity.config_change";
    pub const HOOK_EVALUATION_COMPLETED: &str = "activity.hook_evaluation.completed";
    pub const SENSITIVE_DATA_DETECTED: &str = "sensitive_data.detected";
    pub const FLOW_ALERT: &str = "flow.alert";
    pub const TOOLS_INDEXED: &str = "tools.indexed";

    /// Event types that `ActivityService` persists (§4.8) — `tool_call.started`
    /// is deliberately excluded; only completion is persisted.
    pub const PERSISTED: &[&str] = &[
        TOOL_CALL_COMPLETED,
        POLICY_DECISION,
        QUARANTINE_CHANGE,
        SYSTEM_START,
        SYSTEM_STOP,
        INTERNAL_TOOL_CALL_COMPLETED,
        CONFIG_CHANGE,
        HOOK_EVALUATION_COMPLETED,
        SENSITIVE_DATA_DETECTED,
    ];
}

/// Async observer interface for subscribers that want typed callback
/// dispatch rather than polling a channel.
#[async_trait]
pub trait EventObserver: Send + Sync {
    async fn on_event(&self, event: &Event) -> Result<(), CoreError>;
}

pub fn servers_changed(reason: &str, server: &str, enabled: bool) -> Event {
    let mut payload = ValueMap::new();
    payload.insert(
        "reason".to_string(),
        crate::value::Value::String(reason.to_string()),
    );
    payload.insert(
        "server".to_string(),
        crate::value::Value::String(server.to_string()),
    );
    payload.insert("enabled".to_string(), crate::value::Value::Bool(enabled));
    Event::new(kind::SERVERS_CHANGED, payload)
}

pub fn secrets_changed(op: &str, name: &str) -> Event {
    let mut payload = ValueMap::new();
    payload.insert("op".to_string(), crate::value::Value::String(op.to_string()));
    payload.insert("name".to_string(), crate::value::Value::String(name.to_string()));
    Event::new(kind::SECRETS_CHANGED, payload)
}

pub fn tools_indexed(server: &str, count: usize) -> Event {
    let mut payload = ValueMap::new();
    payload.insert(
        "server".to_string(),
        crate::value::Value::String(server.to_string()),
    );
    payload.insert("count".to_string(), crate::value::Value::I64(count as i64));
    Event::new(kind::TOOLS_INDEXED, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueMapExt;

    #[test]
    fn servers_changed_payload_matches_literal_scenario() {
        let event = servers_changed("test", "s1", true);
        assert_eq!(event.kind, kind::SERVERS_CHANGED);
        assert_eq!(event.payload.get_string("reason"), "test");
        assert_eq!(event.payload.get_string("server"), "s1");
        assert!(event.payload.get_bool("enabled"));
    }

    #[test]
    fn persisted_set_excludes_tool_call_started() {
        assert!(!kind::PERSISTED.contains(&kind::TOOL_CALL_STARTED));
        assert!(kind::PERSISTED.contains(&kind::TOOL_CALL_COMPLETED));
    }
}
