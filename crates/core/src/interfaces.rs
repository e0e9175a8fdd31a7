//! Trait boundaries for concerns this crate deliberately leaves
//! unimplemented (§6): wire transport, secret resolution, activity
//! persistence, upstream-server identity persistence, and tokenization.
//! Each has an in-memory fake for use in other modules' tests.

use crate::error::CoreError;
use crate::types::{ActivityRecord, ServerConfig, ToolInfo};
use async_trait::async_trait;

/// Persists and queries `ActivityRecord`s. Production implementations are
/// out of scope (§1 Non-goals); `ActivityService` drives retention against
/// whatever backs this trait.
#[async_trait]
pub trait ActivityStorage: Send + Sync {
    async fn insert(&self, record: ActivityRecord) -> Result<(), CoreError>;
    async fn count(&self) -> Result<usize, CoreError>;
    /// Delete the oldest `count` records by id ordering. Returns the
    /// number actually deleted.
    async fn prune_oldest(&self, count: usize) -> Result<usize, CoreError>;
    /// Delete every record with `timestamp` older than `cutoff_secs` ago.
    /// Returns the number actually deleted.
    async fn prune_older_than(&self, cutoff_secs: u64) -> Result<usize, CoreError>;
}

/// Persists the upstream-server set and its OAuth state (§6 `Storage`'s
/// `SaveUpstreamServer`/`DeleteUpstreamServer`/`ListUpstreamServers`/
/// `RegisterServerIdentity`/`GetOAuthToken`). No production backend ships
/// in this crate (§1 Non-goals); `SupervisorPool::reconcile` drives this
/// trait so the persisted server set tracks the live actor set (§4.5 steps
/// 2-3, §4.6 step 2).
#[async_trait]
pub trait ServerIdentityStorage: Send + Sync {
    async fn save_upstream_server(&self, config: &ServerConfig) -> Result<(), CoreError>;
    async fn delete_upstream_server(&self, name: &str) -> Result<(), CoreError>;
    async fn list_upstream_servers(&self) -> Result<Vec<ServerConfig>, CoreError>;
    /// Assigns/confirms the stable identity a newly-registered server is
    /// addressed by from then on (distinct from merely saving its config).
    async fn register_server_identity(&self, name: &str) -> Result<(), CoreError>;
    async fn get_oauth_token(&self, key: &str) -> Result<Option<String>, CoreError>;
}

/// Speaks to one upstream server over whatever wire protocol it expects.
/// No transport implementation ships in this crate (§1 Non-goals); actors
/// are generic over this trait.
#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn connect(&self) -> Result<(), CoreError>;
    async fn disconnect(&self) -> Result<(), CoreError>;
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, CoreError>;
    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, CoreError>;
}

/// Expands `${env:NAME}` / `${keyring:NAME}` references in transport
/// strings at connect time. No secret backend ships in this crate.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<String, CoreError>;
}

/// Estimates token counts for response-size limiting. No tokenizer model
/// ships in this crate; callers supply one if `tool_response_limit` is set.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}
