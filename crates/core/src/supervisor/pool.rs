//! `SupervisorPool` — reconciles desired config against the live set of
//! `ServerActor`s (§4.5). A thin non-actor registrar, grounded on
//! `SessionRegistry`: "lives on the server layer... acceptable: only
//! accessed for routing, not during execution."

use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::index::ToolIndex;
use crate::interfaces::{ServerIdentityStorage, TransportClient};
use crate::supervisor::server_actor::{
    Connect, Disconnect, DiscoverTools, GetStatus, ServerActor, ServerActorArgs, Shutdown,
    UpdateConfig,
};
use crate::supervisor::state_view::StateView;
use crate::types::{ConfigSnapshot, ServerConfig};
use kameo::actor::{ActorRef, Spawn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type TransportFactory = Arc<dyn Fn(&ServerConfig) -> Box<dyn TransportClient> + Send + Sync>;

pub struct SupervisorPool {
    actors: Mutex<HashMap<String, (ServerConfig, ActorRef<ServerActor>)>>,
    bus: Arc<EventBus>,
    index: Arc<ToolIndex>,
    state_view: Arc<StateView>,
    status_tx: mpsc::UnboundedSender<crate::types::ServerStatus>,
    transport_factory: TransportFactory,
    identity_storage: Arc<dyn ServerIdentityStorage>,
}

impl SupervisorPool {
    pub fn new(
        bus: Arc<EventBus>,
        index: Arc<ToolIndex>,
        state_view: Arc<StateView>,
        status_tx: mpsc::UnboundedSender<crate::types::ServerStatus>,
        transport_factory: TransportFactory,
        identity_storage: Arc<dyn ServerIdentityStorage>,
    ) -> Self {
        Self {
            actors: Mutex::new(HashMap::new()),
            bus,
            index,
            state_view,
            status_tx,
            transport_factory,
            identity_storage,
        }
    }

    pub fn actor(&self, name: &str) -> Option<ActorRef<ServerActor>> {
        self.actors.lock().get(name).map(|(_, r)| r.clone())
    }

    pub fn server_names(&self) -> Vec<String> {
        self.actors.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the four-step reconciliation algorithm against `snapshot`.
    pub async fn reconcile(&self, snapshot: &ConfigSnapshot) -> Result<(), CoreError> {
        let desired: HashMap<String, ServerConfig> = snapshot
            .servers()
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();

        let have: Vec<String> = self.server_names();

        // Step 2: create actors for servers newly present.
        for (name, config) in &desired {
            if have.contains(name) {
                continue;
            }
            let transport = (self.transport_factory)(config);
            let actor_ref = ServerActor::spawn(ServerActorArgs {
                config: config.clone(),
                transport,
                bus: self.bus.clone(),
                status_tx: self.status_tx.clone(),
            });
            self.actors
                .lock()
                .insert(name.clone(), (config.clone(), actor_ref.clone()));
            self.identity_storage.save_upstream_server(config).await?;
            self.identity_storage.register_server_identity(name).await?;
            if config.enabled && !config.quarantined {
                let _ = actor_ref.ask(Connect).await;
            }
        }

        // Step 3: remove actors no longer desired.
        for name in &have {
            if desired.contains_key(name) {
                continue;
            }
            if let Some((_, actor_ref)) = self.actors.lock().remove(name) {
                let _ = actor_ref.ask(Shutdown).await;
            }
            self.identity_storage.delete_upstream_server(name).await?;
            self.index.delete_server_tools(name).await?;
            self.state_view.remove(name);
        }

        // Step 4: update actors whose config changed.
        for (name, config) in &desired {
            let previous = self.actors.lock().get(name).map(|(cfg, _)| cfg.clone());
            let Some(previous) = previous else { continue };
            if previous == *config {
                continue;
            }
            let actor_ref = self.actor(name);
            if let Some(actor_ref) = actor_ref {
                let transport_changed = previous.transport.transport_relevant_diff(&config.transport);
                let enabled_flipped = previous.enabled != config.enabled;
                let _ = actor_ref.ask(UpdateConfig(config.clone())).await;
                if !transport_changed && enabled_flipped {
                    if config.enabled {
                        let _ = actor_ref.ask(Connect).await;
                    } else {
                        let _ = actor_ref.ask(Disconnect).await;
                    }
                }
            }
            if let Some(entry) = self.actors.lock().get_mut(name) {
                entry.0 = config.clone();
            }
        }

        Ok(())
    }

    pub async fn status_of(&self, name: &str) -> Option<crate::types::ServerStatus> {
        let actor_ref = self.actor(name)?;
        actor_ref.ask(GetStatus).await.ok()
    }

    /// Commands every live actor to shut down. Used by the lifecycle
    /// orchestrator's shutdown sequence (§4.6).
    pub async fn shutdown_all(&self) {
        let actors: Vec<ActorRef<ServerActor>> = self
            .actors
            .lock()
            .values()
            .map(|(_, r)| r.clone())
            .collect();
        for actor_ref in actors {
            let _ = actor_ref.ask(Shutdown).await;
        }
    }

    /// Restarts (disconnect then connect) exactly the live, enabled servers
    /// whose `ServerConfig` references `secret_name` (§8 scenario 6). Returns
    /// the names restarted.
    pub async fn restart_servers_referencing_secret(&self, secret_name: &str) -> Vec<String> {
        let affected: Vec<(String, ActorRef<ServerActor>)> = self
            .actors
            .lock()
            .iter()
            .filter(|(_, (config, _))| config.references_secret(secret_name))
            .map(|(name, (_, r))| (name.clone(), r.clone()))
            .collect();
        for (name, actor_ref) in &affected {
            let _ = actor_ref.ask(Disconnect).await;
            let connected = self.actors.lock().get(name).map(|(c, _)| c.clone());
            if let Some(config) = connected {
                if config.enabled && !config.quarantined {
                    let _ = actor_ref.ask(Connect).await;
                }
            }
        }
        affected.into_iter().map(|(name, _)| name).collect()
    }

    /// Sends `Connect` to every enabled, non-connected actor. Used by the
    /// reconnect sweep.
    pub async fn reconnect_disconnected(&self) {
        let actors: Vec<(ServerConfig, ActorRef<ServerActor>)> =
            self.actors.lock().values().cloned().collect();
        for (config, actor_ref) in actors {
            if !config.enabled || config.quarantined {
                continue;
            }
            if let Ok(status) = actor_ref.ask(GetStatus).await {
                if !status.connected {
                    let _ = actor_ref.ask(Connect).await;
                }
            }
        }
    }

    /// Runs `DiscoverTools` on every connected actor and returns the merged
    /// per-server tool sets, for the lifecycle orchestrator's discovery
    /// sweep (§4.6).
    pub async fn discover_all(&self) -> HashMap<String, Vec<crate::types::ToolInfo>> {
        let actors: Vec<(String, ActorRef<ServerActor>)> = self
            .actors
            .lock()
            .iter()
            .map(|(name, (_, r))| (name.clone(), r.clone()))
            .collect();
        let mut results = HashMap::new();
        for (name, actor_ref) in actors {
            match actor_ref.ask(DiscoverTools).await {
                Ok(Ok(tools)) if !tools.is_empty() => {
                    results.insert(name, tools);
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => log::warn!("discovery failed for {name}: {err}"),
                Err(err) => log::warn!("discovery ask failed for {name}: {err}"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::fakes::StaticTransportClient;
    use crate::types::{ConfigDocument, TransportDescriptor};
    use crate::value::ValueMap;
    use std::collections::BTreeMap;

    fn server(name: &str, enabled: bool) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            transport: TransportDescriptor::Url {
                url: "https://example.com".to_string(),
            },
            enabled,
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

    fn make_pool() -> (SupervisorPool, Arc<ToolIndex>, mpsc::UnboundedReceiver<crate::types::ServerStatus>) {
        let (pool, index, _identity, rx) = make_pool_with_identity();
        (pool, index, rx)
    }

    fn make_pool_with_identity() -> (
        SupervisorPool,
        Arc<ToolIndex>,
        Arc<crate::interfaces::fakes::InMemoryServerIdentityStorage>,
        mpsc::UnboundedReceiver<crate::types::ServerStatus>,
    ) {
        let bus = Arc::new(EventBus::new());
        let index = Arc::new(ToolIndex::new_in_ram().unwrap());
        let state_view = Arc::new(StateView::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let factory: TransportFactory = Arc::new(|_cfg| {
            Box::new(StaticTransportClient {
                tools: Vec::new(),
                fail_connect: false,
            })
        });
        let identity: Arc<crate::interfaces::fakes::InMemoryServerIdentityStorage> =
            Arc::new(crate::interfaces::fakes::InMemoryServerIdentityStorage::default());
        let pool = SupervisorPool::new(bus, index.clone(), state_view, tx, factory, identity.clone());
        (pool, index, identity, rx)
    }

    #[tokio::test]
    async fn reconcile_creates_actor_for_new_enabled_server() {
        let (pool, _index, _rx) = make_pool();
        pool.reconcile(&snapshot(vec![server("s1", true)])).await.unwrap();
        assert_eq!(pool.len(), 1);
        let status = pool.status_of("s1").await.unwrap();
        assert_eq!(status.state, crate::types::ServerState::Connected);
    }

    #[tokio::test]
    async fn reconcile_persists_and_deletes_server_identity() {
        let (pool, _index, identity, _rx) = make_pool_with_identity();
        pool.reconcile(&snapshot(vec![server("s1", true)])).await.unwrap();
        assert_eq!(identity.saved_names(), vec!["s1".to_string()]);
        assert!(identity.is_registered("s1"));

        pool.reconcile(&snapshot(vec![])).await.unwrap();
        assert!(identity.saved_names().is_empty());
        assert!(!identity.is_registered("s1"));
    }

    #[tokio::test]
    async fn reconcile_removes_actor_for_dropped_server() {
        let (pool, index, _rx) = make_pool();
        pool.reconcile(&snapshot(vec![server("s1", true)])).await.unwrap();
        index
            .batch_index("s1", &[crate::types::ToolInfo {
                name: "t".to_string(),
                description: String::new(),
                input_schema: serde_json::json!({}),
                annotations: None,
            }])
            .await
            .unwrap();

        pool.reconcile(&snapshot(vec![])).await.unwrap();
        assert_eq!(pool.len(), 0);
        assert!(index.get_tools_by_server("s1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_for_unchanged_config() {
        let (pool, _index, _rx) = make_pool();
        let snap = snapshot(vec![server("s1", true)]);
        pool.reconcile(&snap).await.unwrap();
        pool.reconcile(&snap).await.unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_disables_actor_when_enabled_flips_false() {
        let (pool, _index, _rx) = make_pool();
        pool.reconcile(&snapshot(vec![server("s1", true)])).await.unwrap();
        pool.reconcile(&snapshot(vec![server("s1", false)])).await.unwrap();
        let status = pool.status_of("s1").await.unwrap();
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn invariant_every_actor_has_a_matching_config_entry() {
        let (pool, _index, _rx) = make_pool();
        pool.reconcile(&snapshot(vec![server("s1", true), server("s2", true)]))
            .await
            .unwrap();
        let mut names = pool.server_names();
        names.sort();
        assert_eq!(names, vec!["s1", "s2"]);
    }
}
