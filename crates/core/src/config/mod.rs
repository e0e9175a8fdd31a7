//! Versioned, hot-reloadable configuration (§4.3, §4.7).

pub mod apply;
pub mod diff;
pub mod persist;
pub mod service;
pub mod watcher;

pub use apply::apply_config;
pub use diff::detect_changes;
pub use service::{ConfigChangeNotice, ConfigService, UpdateType};
pub use watcher::ConfigFileWatcher;
