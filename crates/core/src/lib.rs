//! Runtime core for a multiplexing MCP tool proxy.
//!
//! Implements the lifecycle, per-server supervision, config snapshots, the
//! full-text tool index, and activity tracking that sit between an LLM
//! client and the many backend tool servers it proxies to. Transport wire
//! format, HTTP/API surface, CLI, secrets, and tokenization are consumed as
//! trait objects (`interfaces`) — this crate does not implement them.

pub mod activity;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod hash;
pub mod index;
pub mod interfaces;
pub mod lifecycle;
pub mod phase;
pub mod secrets;
pub mod supervisor;
pub mod types;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use event_bus::EventBus;
pub use lifecycle::LifecycleOrchestrator;
pub use phase::{Phase, PhaseMachine};

/// Test-only helpers shared across this crate's `#[cfg(test)]` modules.
#[cfg(test)]
pub(crate) mod test_support {
    /// Initializes `env_logger` for a test, routing through the test
    /// harness's output capture. Safe to call from many tests; only the
    /// first call in a process takes effect.
    pub(crate) fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
