//! Core data model — §3 of the design: the declarative and observed shapes
//! that flow between components.

use crate::value::ValueMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Declarative, config-sourced description of one upstream server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique key across the whole config.
    pub name: String,
    pub transport: TransportDescriptor,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub quarantined: bool,
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    #[serde(default)]
    pub metadata: ValueMap,
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Whether this server's transport references the named secret,
    /// e.g. `${keyring:my_secret}` in a url, command, args, or env value.
    pub fn references_secret(&self, secret_name: &str) -> bool {
        self.transport
            .secret_references()
            .iter()
            .any(|r| r == secret_name)
    }
}

/// How to reach an upstream server. Strings may contain secret references
/// of the form `${env:NAME}` / `${keyring:NAME}`, expanded at connect time
/// by a `SecretResolver`, never at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportDescriptor {
    Url {
        url: String,
    },
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

impl TransportDescriptor {
    /// Whether two descriptors differ in ways that require the actor to
    /// disconnect and reconnect (§4.5 `UpdateConfig`).
    pub fn transport_relevant_diff(&self, other: &TransportDescriptor) -> bool {
        self != other
    }

    /// Names referenced by `${env:NAME}` / `${keyring:NAME}` placeholders
    /// anywhere in this descriptor's strings (§9 secret-reference scan,
    /// used by `NotifySecretsChanged` to find affected servers).
    pub fn secret_references(&self) -> Vec<String> {
        let strings: Vec<&str> = match self {
            TransportDescriptor::Url { url } => vec![url.as_str()],
            TransportDescriptor::Command { command, args, env } => {
                let mut s = vec![command.as_str()];
                s.extend(args.iter().map(String::as_str));
                s.extend(env.values().map(String::as_str));
                s
            }
        };
        strings
            .into_iter()
            .flat_map(secret_reference_names)
            .collect()
    }
}

fn secret_reference_names(s: &str) -> Vec<String> {
    static PATTERN: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"\$\{(?:env|keyring):([^}]+)\}").unwrap()
    });
    PATTERN
        .captures_iter(s)
        .map(|c| c[1].to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Immutable, versioned view of the whole system config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub listen: String,
    pub data_dir: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub mcp_servers: Vec<ServerConfig>,
    #[serde(default)]
    pub tools_limit: Option<u32>,
    #[serde(default)]
    pub tool_response_limit: Option<u32>,
    #[serde(default)]
    pub call_tool_timeout_secs: Option<u64>,
    #[serde(default)]
    pub logging: Option<String>,
    #[serde(default)]
    pub docker_isolation: bool,
    #[serde(default)]
    pub registries: Vec<String>,
    #[serde(default)]
    pub read_only_mode: bool,
    #[serde(default)]
    pub disable_management: bool,
    #[serde(default = "default_true")]
    pub allow_server_add: bool,
    #[serde(default = "default_true")]
    pub allow_server_remove: bool,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub client_cert: bool,
    #[serde(default)]
    pub certs_dir: Option<String>,
}

/// A versioned, immutable config snapshot. Shared by `Arc` clone, never
/// mutated in place.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub config: Arc<ConfigDocument>,
    pub path: Arc<str>,
    pub version: u64,
    pub timestamp: SystemTime,
}

impl ConfigSnapshot {
    pub fn servers(&self) -> &[ServerConfig] {
        &self.config.mcp_servers
    }

    pub fn enabled_server_names(&self) -> Vec<String> {
        self.config
            .mcp_servers
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }
}

/// Result of diffing two configs (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub success: bool,
    pub applied_immediately: bool,
    pub requires_restart: bool,
    pub restart_reason: Option<String>,
    pub changed_fields: Vec<String>,
}

impl ChangeSet {
    pub fn no_changes() -> Self {
        Self {
            success: true,
            applied_immediately: false,
            requires_restart: false,
            restart_reason: Some("no changes detected".to_string()),
            changed_fields: Vec::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            success: false,
            applied_immediately: false,
            requires_restart: false,
            restart_reason: Some(message.into()),
            changed_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Disconnected,
    Connecting,
    Connected,
    Retrying,
    Error,
    Disabled,
}

/// One per named server, held in `StateView` (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub name: String,
    pub enabled: bool,
    pub quarantined: bool,
    pub state: ServerState,
    pub connected: bool,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub tool_count: usize,
    pub tools: Vec<ToolInfo>,
    pub oauth_status: Option<String>,
    pub token_expires_at: Option<SystemTime>,
}

impl ServerStatus {
    pub fn disconnected(name: impl Into<String>, enabled: bool, quarantined: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            quarantined,
            state: if enabled {
                ServerState::Disconnected
            } else {
                ServerState::Disabled
            },
            connected: false,
            last_error: None,
            retry_count: 0,
            tool_count: 0,
            tools: Vec::new(),
            oauth_status: None,
            token_expires_at: None,
        }
    }
}

/// Tool metadata as observed from a single server's discovery response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub annotations: Option<serde_json::Value>,
}

impl ToolInfo {
    /// `hash(t)` from §4.4 — a stable digest of the tool's schema. Equal
    /// hash means no reindex is needed.
    pub fn schema_hash(&self, server_name: &str) -> crate::hash::RapidHash {
        let canon = format!(
            "{}\u{0}{}\u{0}{}\u{0}{}",
            server_name,
            self.name,
            self.description,
            self.input_schema
        );
        crate::hash::RapidHash::new(canon.as_bytes())
    }

    pub fn full_name(&self, server_name: &str) -> String {
        format!("{}:{}", server_name, self.name)
    }
}

/// An indexed document. `hash` is stored but never indexed for search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDocument {
    pub tool_name: String,
    pub full_tool_name: String,
    pub server_name: String,
    pub description: String,
    pub params_json: String,
    pub hash: crate::hash::RapidHash,
    pub tags: String,
    pub searchable_text: String,
}

impl ToolDocument {
    pub fn from_tool_info(server_name: &str, info: &ToolInfo) -> Self {
        let params_json = info.input_schema.to_string();
        let full_tool_name = info.full_name(server_name);
        let searchable_text = format!(
            "{} {} {} {}",
            info.name, full_tool_name, info.description, params_json
        );
        Self {
            tool_name: info.name.clone(),
            full_tool_name,
            server_name: server_name.to_string(),
            description: info.description.clone(),
            params_json,
            hash: info.schema_hash(server_name),
            tags: String::new(),
            searchable_text,
        }
    }

    pub fn doc_id(&self) -> String {
        format!("{}:{}", self.server_name, self.tool_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ToolCall,
    PolicyDecision,
    QuarantineChange,
    SystemStart,
    SystemStop,
    InternalToolCall,
    ConfigChange,
    HookEvaluation,
    SensitiveDataDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Mcp,
    Cli,
    Api,
}

/// A persisted record of one observed event (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub source: ActivitySource,
    pub server_name: Option<String>,
    pub tool_name: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
    pub response: Option<String>,
    pub response_truncated: Option<bool>,
    pub timestamp: SystemTime,
    pub metadata: ValueMap,
}

/// A bus event. `type` is a dotted string from the closed set in §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: SystemTime,
    pub payload: ValueMap,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: ValueMap) -> Self {
        Self {
            kind: kind.into(),
            timestamp: SystemTime::now(),
            payload,
        }
    }
}
