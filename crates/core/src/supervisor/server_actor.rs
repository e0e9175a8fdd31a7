//! `ServerActor` — per-server state machine owning one transport client
//! (§4.5). Grounded directly on `WorkspaceIndexManagerActor`'s `Actor` +
//! `Message<T>` pattern.

use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::events::kind;
use crate::interfaces::TransportClient;
use crate::supervisor::backoff::{self, CONNECT_TIMEOUT};
use crate::types::{ServerConfig, ServerState, ServerStatus, ToolInfo};
use crate::value::{Value, ValueMap};
use kameo::Actor;
use kameo::actor::ActorRef;
use kameo::message::{Context, Message};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Connect;
pub struct Disconnect;
pub struct UpdateConfig(pub ServerConfig);
pub struct Shutdown;
pub struct DiscoverTools;
pub struct GetStatus;

pub struct ServerActorArgs {
    pub config: ServerConfig,
    pub transport: Box<dyn TransportClient>,
    pub bus: Arc<EventBus>,
    pub status_tx: mpsc::UnboundedSender<ServerStatus>,
}

pub struct ServerActor {
    config: ServerConfig,
    transport: Box<dyn TransportClient>,
    bus: Arc<EventBus>,
    status_tx: mpsc::UnboundedSender<ServerStatus>,
    state: ServerState,
    retry_count: u32,
    last_error: Option<String>,
    tool_count: usize,
    shut_down: bool,
}

impl Actor for ServerActor {
    type Args = ServerActorArgs;
    type Error = kameo::error::Infallible;

    async fn on_start(args: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        let state = if args.config.enabled {
            ServerState::Disconnected
        } else {
            ServerState::Disabled
        };
        Ok(Self {
            config: args.config,
            transport: args.transport,
            bus: args.bus,
            status_tx: args.status_tx,
            state,
            retry_count: 0,
            last_error: None,
            tool_count: 0,
            shut_down: false,
        })
    }
}

impl ServerActor {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn publish_state_changed(&self, reason: &str) {
        let mut payload = ValueMap::new();
        payload.insert("reason".to_string(), Value::String(reason.to_string()));
        payload.insert(
            "server".to_string(),
            Value::String(self.config.name.clone()),
        );
        payload.insert("enabled".to_string(), Value::Bool(self.config.enabled));
        self.bus.publish(kind::SERVERS_CHANGED, payload);
        let _ = self.status_tx.send(self.status());
    }

    fn status(&self) -> ServerStatus {
        ServerStatus {
            name: self.config.name.clone(),
            enabled: self.config.enabled,
            quarantined: self.config.quarantined,
            state: self.state,
            connected: self.state == ServerState::Connected,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
            tool_count: self.tool_count,
            tools: Vec::new(),
            oauth_status: None,
            token_expires_at: None,
        }
    }

    async fn attempt_connect(&mut self) {
        if self.shut_down {
            return;
        }
        self.state = ServerState::Connecting;
        let outcome = tokio::time::timeout(CONNECT_TIMEOUT, self.transport.connect()).await;
        match outcome {
            Ok(Ok(())) => {
                self.state = ServerState::Connected;
                self.retry_count = 0;
                self.last_error = None;
                self.publish_state_changed("connected");
            }
            Ok(Err(err)) => self.on_connect_failure(err.to_string()),
            Err(_) => self.on_connect_failure("connect timed out".to_string()),
        }
    }

    fn on_connect_failure(&mut self, reason: String) {
        self.retry_count += 1;
        self.last_error = Some(reason);
        if backoff::retries_exhausted(self.retry_count) {
            self.state = ServerState::Error;
            self.publish_state_changed("error");
        } else {
            self.state = ServerState::Retrying;
            self.publish_state_changed("retrying");
        }
    }
}

impl Message<Connect> for ServerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(&mut self, _msg: Connect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if !self.config.enabled || self.config.quarantined {
            return Ok(());
        }
        self.attempt_connect().await;
        Ok(())
    }
}

impl Message<Disconnect> for ServerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(&mut self, _msg: Disconnect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.transport.disconnect().await?;
        self.state = ServerState::Disconnected;
        self.publish_state_changed("disconnected");
        Ok(())
    }
}

impl Message<UpdateConfig> for ServerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: UpdateConfig,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let new_config = msg.0;
        let transport_changed = self
            .config
            .transport
            .transport_relevant_diff(&new_config.transport);
        let enabled_flipped = self.config.enabled != new_config.enabled;
        self.config = new_config;

        if transport_changed && self.state == ServerState::Connected {
            self.transport.disconnect().await?;
            self.state = ServerState::Disconnected;
            self.attempt_connect().await;
        } else if enabled_flipped {
            if self.config.enabled {
                self.attempt_connect().await;
            } else {
                self.transport.disconnect().await?;
                self.state = ServerState::Disabled;
            }
        }
        self.publish_state_changed("config_updated");
        Ok(())
    }
}

impl Message<DiscoverTools> for ServerActor {
    type Reply = Result<Vec<ToolInfo>, CoreError>;

    async fn handle(
        &mut self,
        _msg: DiscoverTools,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.state != ServerState::Connected {
            return Ok(Vec::new());
        }
        let tools = self.transport.list_tools().await?;
        self.tool_count = tools.len();
        Ok(tools)
    }
}

impl Message<GetStatus> for ServerActor {
    type Reply = ServerStatus;

    async fn handle(&mut self, _msg: GetStatus, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.status()
    }
}

impl Message<Shutdown> for ServerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(&mut self, _msg: Shutdown, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let _ = self.transport.disconnect().await;
        self.state = ServerState::Disconnected;
        self.shut_down = true;
        self.publish_state_changed("shutdown");
        Ok(())
    }
}
