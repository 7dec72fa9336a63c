//! Remote tool source collaborator traits.
//!
//! Transport is out of scope for the core: anything that can list manifests
//! and invoke a tool by name (MCP over stdio, HTTP, an in-process table) plugs
//! in through these traits.

use crate::error::RemoteError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;

/// Performs the actual remote tool call.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke tool `name` with already-validated arguments.
    async fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value, RemoteError>;
}

/// A remote server that publishes tool manifests and can invoke them.
#[async_trait]
pub trait ToolSource: Invoker {
    /// Identifier of the server, recorded as the manifests' source.
    fn server_name(&self) -> &str;

    /// Raw manifest payloads, one per tool.
    async fn list_tools(&self) -> Result<Vec<Value>, RemoteError>;
}

/// Load raw manifests from a JSON or YAML file.
///
/// The file holds either a list of manifests or an object with a `tools` list
/// (the shape of an MCP `tools/list` response).
pub fn load_manifest_file(path: &Path) -> Result<Vec<Value>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest file {}", path.display()))?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let doc: Value = if is_yaml {
        serde_yaml::from_str(&contents).context("Failed to parse manifest file (YAML)")?
    } else {
        serde_json::from_str(&contents).context("Failed to parse manifest file (JSON)")?
    };

    match doc {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("tools") {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(vec![Value::Object(obj)]),
        },
        _ => anyhow::bail!("Manifest file must hold an object or a list of objects"),
    }
}
