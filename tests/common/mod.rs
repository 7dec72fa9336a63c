#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toolbridge::error::{RemoteError, StorageError};
use toolbridge::manifest::{ManifestFingerprint, ToolManifest};
use toolbridge::source::{Invoker, ToolSource};
use toolbridge::state::{Storage, StoredManifest, StoredRecord};
use toolbridge::types::{ExecutionRecord, Page, RecordFilter};
use toolbridge::{Bridge, BridgeConfig};

/// How the scripted server answers a call to one tool.
#[derive(Clone)]
pub enum Script {
    Reply(Value),
    Fail(String),
    Delay(Duration, Value),
    /// Never answers.
    Hang,
}

/// In-process tool server with canned manifests and responses.
pub struct ScriptedSource {
    name: String,
    manifests: Vec<Value>,
    scripts: HashMap<String, Script>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            manifests: Vec::new(),
            scripts: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn tool(mut self, manifest: Value, script: Script) -> Self {
        let name = manifest["name"].as_str().unwrap_or_default().to_string();
        self.manifests.push(manifest);
        self.scripts.insert(name, script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for ScriptedSource {
    async fn invoke(&self, name: &str, _args: &Map<String, Value>) -> Result<Value, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(name) {
            Some(Script::Reply(value)) => Ok(value.clone()),
            Some(Script::Fail(message)) => Err(RemoteError::tool(message.clone())),
            Some(Script::Delay(wait, value)) => {
                tokio::time::sleep(*wait).await;
                Ok(value.clone())
            }
            Some(Script::Hang) => std::future::pending().await,
            None => Err(RemoteError::transport(format!("no such tool: {name}"))),
        }
    }
}

#[async_trait]
impl ToolSource for ScriptedSource {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<Value>, RemoteError> {
        Ok(self.manifests.clone())
    }
}

/// `search(query: string) -> string`
pub fn search_manifest() -> Value {
    json!({
        "name": "search",
        "description": "Search the web",
        "parameters": [
            {"name": "query", "type": "string", "required": true},
            {"name": "limit", "type": "integer", "required": false}
        ],
        "return_type": "string"
    })
}

pub fn lookup_manifest(return_type: &str) -> Value {
    json!({
        "name": "lookup",
        "parameters": [{"name": "key", "type": "string", "required": true}],
        "return_type": return_type
    })
}

pub fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub fn bridge_with(config: BridgeConfig, store: Arc<dyn Storage>) -> Bridge {
    Bridge::new(config, store)
}

pub async fn all_records(bridge: &Bridge) -> Vec<ExecutionRecord> {
    bridge
        .registry()
        .list_records(RecordFilter::new())
        .collect()
        .await
        .unwrap()
}

/// Storage whose every write fails.
pub struct FailingStore;

#[async_trait]
impl Storage for FailingStore {
    async fn upsert_manifest(
        &self,
        _: &ManifestFingerprint,
        _: &ToolManifest,
    ) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("read-only volume".into()))
    }

    async fn insert_record(&self, _: &ExecutionRecord) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("read-only volume".into()))
    }

    async fn query_records(
        &self,
        _: &RecordFilter,
        _: Page,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        Err(StorageError::Unavailable("read-only volume".into()))
    }

    async fn find_manifests(&self, _: &str) -> Result<Vec<StoredManifest>, StorageError> {
        Err(StorageError::Unavailable("read-only volume".into()))
    }

    async fn list_manifests(&self) -> Result<Vec<StoredManifest>, StorageError> {
        Err(StorageError::Unavailable("read-only volume".into()))
    }
}
