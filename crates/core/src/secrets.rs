//! Secret-change notification (§8 scenario 6, §9 `NotifySecretsChanged`).
//!
//! The crate does not resolve or store secret values itself (that's
//! `interfaces::SecretResolver`'s job, implemented outside this crate); this
//! module only reacts to a provider reporting that a named secret changed by
//! publishing `secrets.changed` and restarting exactly the servers whose
//! `ServerConfig` references that name.

use crate::event_bus::EventBus;
use crate::events;
use crate::supervisor::pool::SupervisorPool;
use std::sync::Arc;

/// Publishes `secrets.changed` for `(provider, secret_name)` and restarts
/// every live server referencing `secret_name`, leaving the rest untouched.
/// Returns the names of the servers restarted.
pub async fn notify_secrets_changed(
    bus: &Arc<EventBus>,
    pool: &SupervisorPool,
    provider: &str,
    secret_name: &str,
) -> Vec<String> {
    bus.publish_event(events::secrets_changed(provider, secret_name));
    pool.restart_servers_referencing_secret(secret_name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::fakes::StaticTransportClient;
    use crate::supervisor::pool::TransportFactory;
    use crate::supervisor::state_view::StateView;
    use crate::types::{ConfigDocument, ConfigSnapshot, ServerConfig, TransportDescriptor};
    use crate::value::{ValueMap, ValueMapExt};
    use crate::index::ToolIndex;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;

    fn server(name: &str, env: &[(&str, &str)]) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            transport: TransportDescriptor::Command {
                command: "some-tool".to_string(),
                args: Vec::new(),
                env: env
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            enabled: true,
            quarantined: false,
            oauth: None,
            metadata: ValueMap::new(),
        }
    }

    fn snapshot(servers: Vec<ServerConfig>) -> ConfigSnapshot {
        ConfigSnapshot {
            config: Arc::new(ConfigDocument {
                listen: "127.0.0.1:8080".to_string(),
                data_dir: "/data".to_string(),
                api_key: None,
                tls: None,
                mcp_servers: servers,
                tools_limit: None,
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
            }),
            path: Arc::from("config.toml"),
            version: 0,
            timestamp: std::time::SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn only_the_referencing_server_is_restarted() {
        crate::test_support::init_logging();
        let bus = Arc::new(EventBus::new());
        let index = Arc::new(ToolIndex::new_in_ram().unwrap());
        let state_view = Arc::new(StateView::new());
        let (status_tx, _status_rx) = mpsc::unbounded_channel();
        let factory: TransportFactory = Arc::new(|_cfg: &ServerConfig| {
            Box::new(StaticTransportClient {
                tools: Vec::new(),
                fail_connect: false,
            }) as _
        });
        let identity: Arc<dyn crate::interfaces::ServerIdentityStorage> =
            Arc::new(crate::interfaces::fakes::InMemoryServerIdentityStorage::default());
        let pool = SupervisorPool::new(bus.clone(), index, state_view, status_tx, factory, identity);

        let referencing = server("with-secret", &[("TOKEN", "${keyring:my_secret}")]);
        let plain = server("without-secret", &[("TOKEN", "plain-value")]);
        let cfg = snapshot(vec![referencing, plain]);
        pool.reconcile(&cfg).await.unwrap();

        let mut rx = bus.subscribe();
        let restarted = notify_secrets_changed(&bus, &pool, "store", "my_secret").await;

        assert_eq!(restarted, vec!["with-secret".to_string()]);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, events::kind::SECRETS_CHANGED);
        assert_eq!(event.payload.get_string("name"), "my_secret");
        assert_eq!(event.payload.get_string("op"), "store");
    }
}
