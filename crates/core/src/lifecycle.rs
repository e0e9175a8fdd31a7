//! `LifecycleOrchestrator` — startup sequence, background sweeps, and
//! graceful shutdown (§4.6).

use crate::config::ConfigService;
use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::events::kind;
use crate::index::ToolIndex;
use crate::phase::{Phase, PhaseMachine};
use crate::supervisor::SupervisorPool;
use crate::value::ValueMap;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RECONNECT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const RECONNECT_SWEEP_DEADLINE: Duration = Duration::from_secs(10);
const DISCOVERY_WARMUP: Duration = Duration::from_secs(2);
const DISCOVERY_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(45);

pub struct LifecycleOrchestrator {
    phase: Arc<PhaseMachine>,
    config: Arc<ConfigService>,
    pool: Arc<SupervisorPool>,
    index: Arc<ToolIndex>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    tool_count_cache: Cache<String, usize>,
}

impl LifecycleOrchestrator {
    pub fn new(
        phase: Arc<PhaseMachine>,
        config: Arc<ConfigService>,
        pool: Arc<SupervisorPool>,
        index: Arc<ToolIndex>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            phase,
            config,
            pool,
            index,
            bus,
            cancel: CancellationToken::new(),
            tool_count_cache: Cache::builder()
                .time_to_live(Duration::from_secs(60))
                .build(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.current()
    }

    /// Runs the startup sequence: transitions through Loading, reconciles
    /// the server set, declares Ready without blocking on connectivity,
    /// then spawns the background sweeps and advances to Running.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.phase.try_transition(Phase::Loading);

        let snapshot = self.config.current();
        self.pool.reconcile(&snapshot).await?;
        self.bus.publish(kind::SERVERS_CHANGED, ValueMap::new());

        self.phase.try_transition(Phase::Ready);

        self.spawn_reconnect_sweep();
        self.spawn_discovery_sweep();

        self.phase.try_transition(Phase::Starting);
        self.phase.try_transition(Phase::Running);
        Ok(())
    }

    fn spawn_reconnect_sweep(&self) {
        let pool = self.pool.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RECONNECT_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = tokio::time::timeout(
                            RECONNECT_SWEEP_DEADLINE,
                            pool.reconnect_disconnected(),
                        )
                        .await;
                    }
                }
            }
        });
    }

    fn spawn_discovery_sweep(&self) {
        let pool = self.pool.clone();
        let index = self.index.clone();
        let bus = self.bus.clone();
        let cache = self.tool_count_cache.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(DISCOVERY_WARMUP) => {}
            }
            let mut ticker = tokio::time::interval(DISCOVERY_SWEEP_INTERVAL);
            loop {
                run_discovery_sweep(&pool, &index, &bus, &cache).await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
            }
        });
    }

    /// Runs one discovery sweep immediately, outside the periodic
    /// scheduler. Used by `ApplyConfig`'s step-6 reload and by tests.
    pub async fn run_discovery_sweep_now(&self) {
        run_discovery_sweep(&self.pool, &self.index, &self.bus, &self.tool_count_cache).await;
    }

    /// Cancels background work and commands every actor to shut down,
    /// waiting up to the shutdown deadline for transports to drain.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let result = tokio::time::timeout(SHUTDOWN_DEADLINE, self.pool.shutdown_all()).await;
        if result.is_err() {
            log::warn!("LifecycleOrchestrator: shutdown deadline exceeded, forcing cleanup");
        }
        self.phase.try_transition(Phase::Stopping);
        self.phase.try_transition(Phase::Stopped);
    }
}

async fn run_discovery_sweep(
    pool: &SupervisorPool,
    index: &ToolIndex,
    bus: &EventBus,
    cache: &Cache<String, usize>,
) {
    let discovered = pool.discover_all().await;
    for (server, tools) in discovered {
        match index.sync_server(&server, &tools).await {
            Ok(_) => {
                cache.invalidate(&server).await;
                bus.publish_event(crate::events::tools_indexed(&server, tools.len()));
            }
            Err(err) => log::error!("discovery sweep: index sync failed for {server}: {err}"),
        }
    }
}
