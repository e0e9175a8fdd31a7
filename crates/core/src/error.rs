//! Structured error type for the core runtime.
//!
//! One flat enum with a variant per error *kind* from the design (not one
//! type per component) so callers can match on kind regardless of which
//! subsystem raised it.

use thiserror::Error;

/// Error kinds produced by the core runtime.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("transport error on server '{server}': {reason}")]
    Transport { server: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidConfig(e.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(e: toml::de::Error) -> Self {
        CoreError::InvalidConfig(e.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Persistence(e.to_string())
    }
}

impl From<tantivy::TantivyError> for CoreError {
    fn from(e: tantivy::TantivyError) -> Self {
        CoreError::Persistence(e.to_string())
    }
}
