pub mod deploy;
pub mod network;
pub mod rollback;

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

/// Read a TOML or JSON document, chosen by file extension.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        _ => toml::from_str(&text).with_context(|| format!("invalid TOML in {}", path.display()))?,
    };
    Ok(parsed)
}
