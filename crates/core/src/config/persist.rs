//! Atomic on-disk config writes. The single writer implementation shared by
//! `ApplyConfig` and the file-watch reload path (§4.7).

use crate::error::CoreError;
use crate::types::ConfigDocument;
use std::path::Path;

pub fn load(path: &Path) -> Result<ConfigDocument, CoreError> {
    let raw = std::fs::read_to_string(path)?;
    let doc: ConfigDocument = toml::from_str(&raw)?;
    Ok(doc)
}

/// Serializes `doc` to TOML and writes it to `path` via write-temp-then-rename
/// so readers never observe a half-written file (I4).
pub fn persist_atomic(path: &Path, doc: &ConfigDocument) -> Result<(), CoreError> {
    let serialized =
        toml::to_string_pretty(doc).map_err(|e| CoreError::Persistence(e.to_string()))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(serialized.as_bytes())?;
    tmp.persist(path)
        .map_err(|e| CoreError::Persistence(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample() -> ConfigDocument {
        ConfigDocument {
            listen: "127.0.0.1:8080".to_string(),
            data_dir: "/data".to_string(),
            api_key: None,
            tls: None,
            mcp_servers: Vec::new(),
            tools_limit: Some(15),
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
        }
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let doc = sample();
        persist_atomic(&path, &doc).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.listen, doc.listen);
        assert_eq!(loaded.tools_limit, doc.tools_limit);
    }

    #[test]
    fn persist_never_leaves_a_partial_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        // parent directory does not exist -> persist must fail cleanly,
        // not leave a stray temp file in `dir`.
        assert!(persist_atomic(&path, &sample()).is_err());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty());
    }
}
