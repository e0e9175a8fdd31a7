//! The `ApplyConfig` path (§4.7): validate, diff, persist, gate on restart,
//! swap, publish, schedule an async reload.

use crate::config::persist::persist_atomic;
use crate::config::service::{ConfigService, UpdateType};
use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::events::kind;
use crate::types::{ChangeSet, ConfigDocument};
use crate::value::{Value, ValueMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const RELOAD_STABILIZATION_DELAY: Duration = Duration::from_millis(500);

/// Runs the six-step algorithm. `on_reload` is invoked from a detached task
/// after the stabilization delay when `mcp_servers` changed; production
/// callers pass a closure that triggers a discovery sweep.
pub async fn apply_config<F, Fut>(
    service: &ConfigService,
    bus: &EventBus,
    path: &Path,
    new_config: ConfigDocument,
    on_reload: F,
) -> ChangeSet
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let mcp_servers_before = service.current().config.mcp_servers.clone();

    // Step 1 is folded into ConfigService::update's own validation, but we
    // must diff and persist before swapping, so re-run diff here to decide
    // persistence vs restart gating explicitly.
    let current = service.current();
    let changes = crate::config::diff::detect_changes(Some(&current.config), Some(&new_config));
    if !changes.success {
        return changes;
    }
    if changes.changed_fields.is_empty() {
        return changes;
    }

    // Step 3: persist atomically before any in-memory change is observable.
    if let Err(err) = persist_atomic(path, &new_config) {
        log::error!("ApplyConfig: persistence failed: {err}");
        return ChangeSet::invalid(format!("persistence failed: {err}"));
    }

    // Step 4: restart-requiring changes are persisted but not swapped in.
    if changes.requires_restart {
        log::info!(
            "ApplyConfig: {:?} requires restart, persisted but not applied in-memory",
            changes.changed_fields
        );
        return changes;
    }

    // Step 5: swap, then publish strictly after the snapshot is visible.
    let result = service.update(new_config.clone(), UpdateType::Applied);
    let applied = match result {
        Ok(cs) => cs,
        Err(err) => return ChangeSet::invalid(err.to_string()),
    };

    bus.publish(kind::CONFIG_RELOADED, ValueMap::new());
    let servers_changed = mcp_servers_before != new_config.mcp_servers;
    if servers_changed {
        let mut payload = ValueMap::new();
        payload.insert("reason".to_string(), Value::String("apply_config".to_string()));
        bus.publish(kind::SERVERS_CHANGED, payload);
    }

    // Step 6: schedule an async reload outside any lock.
    if servers_changed {
        tokio::spawn(async move {
            tokio::time::sleep(RELOAD_STABILIZATION_DELAY).await;
            on_reload().await;
        });
    }

    applied
}

pub async fn try_persist_only(path: &Path, doc: &ConfigDocument) -> Result<(), CoreError> {
    persist_atomic(path, doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::service::ConfigService;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

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

    #[tokio::test]
    async fn listen_change_requires_restart_and_persists_but_does_not_swap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), path.to_string_lossy().to_string());
        let bus = EventBus::new();

        let changes = apply_config(
            &service,
            &bus,
            &path,
            sample("127.0.0.1:30080", Some(15)),
            || async {},
        )
        .await;

        assert!(changes.requires_restart);
        assert_eq!(changes.changed_fields, vec!["listen"]);
        assert_eq!(service.current().config.listen, "127.0.0.1:8080");

        let on_disk = crate::config::persist::load(&path).unwrap();
        assert_eq!(on_disk.listen, "127.0.0.1:30080");
    }

    #[tokio::test]
    async fn tools_limit_change_is_applied_immediately_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), path.to_string_lossy().to_string());
        let bus = EventBus::new();

        let changes = apply_config(
            &service,
            &bus,
            &path,
            sample("127.0.0.1:8080", Some(20)),
            || async {},
        )
        .await;

        assert!(!changes.requires_restart);
        assert!(changes.applied_immediately);
        assert_eq!(changes.changed_fields, vec!["tools_limit"]);
        assert_eq!(service.current().config.tools_limit, Some(20));
        assert_eq!(service.current().version, 1);

        let on_disk = crate::config::persist::load(&path).unwrap();
        assert_eq!(on_disk.tools_limit, Some(20));
    }

    #[tokio::test]
    async fn no_op_apply_does_not_touch_disk_or_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), path.to_string_lossy().to_string());
        let bus = EventBus::new();

        let changes = apply_config(
            &service,
            &bus,
            &path,
            sample("127.0.0.1:8080", Some(15)),
            || async {},
        )
        .await;

        assert!(changes.changed_fields.is_empty());
        assert!(!path.exists());
        assert_eq!(service.current().version, 0);
    }

    #[tokio::test]
    async fn server_set_change_schedules_async_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let service = ConfigService::new(sample("127.0.0.1:8080", Some(15)), path.to_string_lossy().to_string());
        let bus = EventBus::new();

        let mut next = sample("127.0.0.1:8080", Some(15));
        next.mcp_servers.push(crate::types::ServerConfig {
            name: "s1".to_string(),
            transport: crate::types::TransportDescriptor::Url {
                url: "https://example.com".to_string(),
            },
            enabled: true,
            quarantined: false,
            oauth: None,
            metadata: ValueMap::new(),
        });

        let reload_ran = Arc::new(AtomicBool::new(false));
        let reload_ran_clone = reload_ran.clone();

        apply_config(&service, &bus, &path, next, move || {
            let flag = reload_ran_clone.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
            }
        })
        .await;

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(reload_ran.load(Ordering::SeqCst));
    }
}
