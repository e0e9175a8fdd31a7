//! Pure config diffing (§4.3 `DetectChanges`).

use crate::types::{ChangeSet, ConfigDocument};

const RESTART_FIELDS: &[&str] = &["listen", "data_dir", "api_key", "tls"];

/// Compares two config documents field-by-field and classifies the result.
/// `None` on either side means "no prior config" and always yields failure
/// per the boundary rule in §8 (`DetectConfigChanges(nil, nil)` -> `success=false`).
pub fn detect_changes(old: Option<&ConfigDocument>, new: Option<&ConfigDocument>) -> ChangeSet {
    let (old, new) = match (old, new) {
        (Some(o), Some(n)) => (o, n),
        _ => {
            return ChangeSet {
                success: false,
                applied_immediately: false,
                requires_restart: false,
                restart_reason: Some("missing config on one or both sides".to_string()),
                changed_fields: Vec::new(),
            };
        }
    };

    let mut changed = Vec::new();

    if old.listen != new.listen {
        changed.push("listen".to_string());
    }
    if old.data_dir != new.data_dir {
        changed.push("data_dir".to_string());
    }
    if old.api_key != new.api_key {
        changed.push("api_key".to_string());
    }
    if old.tls != new.tls {
        changed.push("tls".to_string());
    }
    if old.mcp_servers != new.mcp_servers {
        changed.push("mcp_servers".to_string());
    }
    if old.tools_limit != new.tools_limit {
        changed.push("tools_limit".to_string());
    }
    if old.tool_response_limit != new.tool_response_limit {
        changed.push("tool_response_limit".to_string());
    }
    if old.call_tool_timeout_secs != new.call_tool_timeout_secs {
        changed.push("call_tool_timeout_secs".to_string());
    }
    if old.logging != new.logging {
        changed.push("logging".to_string());
    }
    if old.docker_isolation != new.docker_isolation {
        changed.push("docker_isolation".to_string());
    }
    if old.registries != new.registries {
        changed.push("registries".to_string());
    }
    if old.read_only_mode != new.read_only_mode {
        changed.push("read_only_mode".to_string());
    }
    if old.disable_management != new.disable_management {
        changed.push("disable_management".to_string());
    }
    if old.allow_server_add != new.allow_server_add {
        changed.push("allow_server_add".to_string());
    }
    if old.allow_server_remove != new.allow_server_remove {
        changed.push("allow_server_remove".to_string());
    }
    if old.environment != new.environment {
        changed.push("environment".to_string());
    }

    if changed.is_empty() {
        return ChangeSet::no_changes();
    }

    let restart_field = changed.iter().find(|f| RESTART_FIELDS.contains(&f.as_str()));
    match restart_field {
        Some(field) => ChangeSet {
            success: true,
            applied_immediately: false,
            requires_restart: true,
            restart_reason: Some(format!("field '{field}' requires restart")),
            changed_fields: changed,
        },
        None => ChangeSet {
            success: true,
            applied_immediately: true,
            requires_restart: false,
            restart_reason: None,
            changed_fields: changed,
        },
    }
}
