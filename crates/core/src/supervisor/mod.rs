//! Per-server actors and the pool that reconciles them against config
//! (§4.5).

pub mod backoff;
pub mod pool;
pub mod server_actor;
pub mod state_view;

pub use pool::{SupervisorPool, TransportFactory};
pub use server_actor::{Connect, Disconnect, DiscoverTools, GetStatus, ServerActor, Shutdown, UpdateConfig};
pub use state_view::{StateView, StateViewInner};
