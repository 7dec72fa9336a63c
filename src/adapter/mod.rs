//! Adapter synthesis.
//!
//! A [`Synthesizer`] turns a manifest into a framework-native callable. The
//! framework set is closed, so each shape is a concrete type collected in the
//! [`Adapter`] enum; [`ToolAdapter`] is the framework-agnostic view of all of
//! them.

pub mod autogen;
pub mod crewai;
mod dispatch;
pub mod langchain;
pub mod schema;

pub use autogen::{AutoGenTool, FunctionExecutionResult};
pub use crewai::{CrewAiTool, ToolUsageError};
pub use langchain::{LangChainTool, ToolException};

use crate::error::{InvocationError, SchemaError, SynthesisError};
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::recorder::ExecutionRecorder;
use crate::source::Invoker;
use crate::types::Framework;
use crate::validate::Validator;
use async_trait::async_trait;
use dispatch::Dispatcher;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Definition of a tool as handed to an agent framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Framework-agnostic reply of one adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterReply {
    /// Tool output, or the error message shown to the agent.
    pub content: String,
    pub is_error: bool,
    pub error: Option<InvocationError>,
}

impl AdapterReply {
    pub fn ok(content: String) -> Self {
        Self {
            content,
            is_error: false,
            error: None,
        }
    }

    pub fn failed(content: String, error: InvocationError) -> Self {
        Self {
            content,
            is_error: true,
            error: Some(error),
        }
    }

    pub(crate) fn from_result(result: Result<String, InvocationError>) -> Self {
        match result {
            Ok(content) => Self::ok(content),
            Err(err) => Self::failed(err.to_string(), err),
        }
    }
}

/// Common surface of every synthesized adapter.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Tool name (used in function calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> String;

    fn framework(&self) -> Framework;

    /// JSON Schema for the tool's arguments.
    fn args_schema(&self) -> Value;

    /// Validate, invoke and record one call.
    async fn call(&self, args: Value) -> AdapterReply;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description(),
            parameters: self.args_schema(),
        }
    }
}

/// A synthesized adapter for one (manifest, framework) pair.
#[derive(Clone)]
pub enum Adapter {
    CrewAi(CrewAiTool),
    LangChain(LangChainTool),
    AutoGen(AutoGenTool),
}

impl Adapter {
    fn dispatcher(&self) -> &Arc<Dispatcher> {
        match self {
            Self::CrewAi(tool) => &tool.inner,
            Self::LangChain(tool) => &tool.inner,
            Self::AutoGen(tool) => &tool.inner,
        }
    }

    fn as_dyn(&self) -> &dyn ToolAdapter {
        match self {
            Self::CrewAi(tool) => tool,
            Self::LangChain(tool) => tool,
            Self::AutoGen(tool) => tool,
        }
    }

    pub fn manifest(&self) -> &ToolManifest {
        &self.dispatcher().manifest
    }

    pub fn fingerprint(&self) -> &ManifestFingerprint {
        &self.dispatcher().fingerprint
    }

    /// Whether both handles share the same synthesized state.
    pub fn same_as(&self, other: &Adapter) -> bool {
        Arc::ptr_eq(self.dispatcher(), other.dispatcher())
    }

    pub fn as_crewai(&self) -> Option<&CrewAiTool> {
        match self {
            Self::CrewAi(tool) => Some(tool),
            _ => None,
        }
    }

    pub fn as_langchain(&self) -> Option<&LangChainTool> {
        match self {
            Self::LangChain(tool) => Some(tool),
            _ => None,
        }
    }

    pub fn as_autogen(&self) -> Option<&AutoGenTool> {
        match self {
            Self::AutoGen(tool) => Some(tool),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("framework", &self.framework())
            .field("tool", &self.name())
            .field("fingerprint", &self.fingerprint().short())
            .finish()
    }
}

#[async_trait]
impl ToolAdapter for Adapter {
    fn name(&self) -> &str {
        self.as_dyn().name()
    }

    fn description(&self) -> String {
        self.as_dyn().description()
    }

    fn framework(&self) -> Framework {
        self.as_dyn().framework()
    }

    fn args_schema(&self) -> Value {
        self.as_dyn().args_schema()
    }

    async fn call(&self, args: Value) -> AdapterReply {
        self.as_dyn().call(args).await
    }
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// Invocation policy baked into every adapter a synthesizer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOptions {
    pub strict_mode: bool,
    /// Deadline for one remote call; `None` waits indefinitely.
    pub invoke_timeout: Option<Duration>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            strict_mode: true,
            invoke_timeout: Some(Duration::from_secs(30)),
        }
    }
}

type CacheKey = (ManifestFingerprint, Framework);

/// Builds adapters and caches them per (fingerprint, framework).
///
/// A cached adapter keeps the invoker it was first synthesized with.
pub struct Synthesizer {
    recorder: Arc<ExecutionRecorder>,
    options: SynthesisOptions,
    cache: Mutex<HashMap<CacheKey, Adapter>>,
}

impl Synthesizer {
    pub fn new(recorder: Arc<ExecutionRecorder>, options: SynthesisOptions) -> Self {
        Self {
            recorder,
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn recorder(&self) -> &Arc<ExecutionRecorder> {
        &self.recorder
    }

    /// Synthesize an adapter for a framework named at runtime.
    pub fn synthesize(
        &self,
        manifest: &ToolManifest,
        framework: &str,
        invoker: Arc<dyn Invoker>,
    ) -> Result<Adapter, SynthesisError> {
        let framework: Framework = framework.parse()?;
        Ok(self.synthesize_for(manifest, framework, invoker)?)
    }

    /// Synthesize an adapter for a known framework.
    pub fn synthesize_for(
        &self,
        manifest: &ToolManifest,
        framework: Framework,
        invoker: Arc<dyn Invoker>,
    ) -> Result<Adapter, SchemaError> {
        let fingerprint = manifest.fingerprint();
        let key = (fingerprint.clone(), framework);

        if let Some(cached) = self.lock_cache().get(&key) {
            debug!("Adapter cache hit for {} ({})", manifest.name(), framework);
            return Ok(cached.clone());
        }

        schema::check_representable(manifest, framework)?;

        let inner = Arc::new(Dispatcher {
            manifest: Arc::new(manifest.clone()),
            fingerprint,
            framework,
            invoker,
            validator: Validator::new(self.options.strict_mode),
            recorder: self.recorder.clone(),
            timeout: self.options.invoke_timeout,
            handle: tokio::runtime::Handle::try_current().ok(),
        });
        let adapter = match framework {
            Framework::CrewAi => Adapter::CrewAi(CrewAiTool { inner }),
            Framework::LangChain => Adapter::LangChain(LangChainTool { inner }),
            Framework::AutoGen => Adapter::AutoGen(AutoGenTool { inner }),
        };

        info!(
            "Synthesized {} adapter for {} [{}]",
            framework,
            manifest.name(),
            adapter.fingerprint().short()
        );

        // A concurrent synthesis may have won the race; keep the first.
        Ok(self.lock_cache().entry(key).or_insert(adapter).clone())
    }

    pub fn cached_adapters(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Adapter>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RemoteError, ValidationErrorKind};
    use crate::manifest::Parameter;
    use crate::recorder::RecorderOptions;
    use crate::state::MemoryStore;
    use crate::types::ValueType;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Invoker for Echo {
        async fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(format!("{name}:{}", Value::Object(args.clone()))))
        }
    }

    fn search() -> ToolManifest {
        ToolManifest::builder("search")
            .description("Search the web")
            .param(Parameter::new("query", ValueType::String, true))
            .build()
            .unwrap()
    }

    fn synthesizer() -> (Synthesizer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(ExecutionRecorder::new(store.clone(), RecorderOptions::default()));
        (Synthesizer::new(recorder, SynthesisOptions::default()), store)
    }

    #[test]
    fn synthesis_is_idempotent() {
        let (synth, _) = synthesizer();
        let invoker: Arc<dyn Invoker> = Arc::new(Echo::default());
        let first = synth.synthesize(&search(), "langchain", invoker.clone()).unwrap();
        let second = synth.synthesize(&search(), "LangChain", invoker).unwrap();
        assert!(first.same_as(&second));
        assert_eq!(first.args_schema(), second.args_schema());
        assert_eq!(synth.cached_adapters(), 1);
    }

    #[test]
    fn unknown_framework_fails() {
        let (synth, _) = synthesizer();
        let err = synth
            .synthesize(&search(), "haystack", Arc::new(Echo::default()))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::UnsupportedFramework(_)));
    }

    #[test]
    fn each_framework_gets_its_shape() {
        let (synth, _) = synthesizer();
        let invoker: Arc<dyn Invoker> = Arc::new(Echo::default());
        for framework in Framework::ALL {
            let adapter = synth.synthesize_for(&search(), framework, invoker.clone()).unwrap();
            assert_eq!(adapter.framework(), framework);
            assert_eq!(adapter.definition().parameters["title"], "SearchInput");
        }
        assert_eq!(synth.cached_adapters(), 3);
    }

    #[test]
    fn unrepresentable_manifest_is_a_schema_error() {
        let (synth, _) = synthesizer();
        let manifest = ToolManifest::builder("fetch")
            .param(Parameter::new("class", ValueType::String, true))
            .build()
            .unwrap();
        let err = synth
            .synthesize(&manifest, "crewai", Arc::new(Echo::default()))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Schema(_)));
        assert!(synth
            .synthesize(&manifest, "autogen", Arc::new(Echo::default()))
            .is_ok());
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_invoker() {
        let (synth, store) = synthesizer();
        let echo = Arc::new(Echo::default());
        let adapter = synth
            .synthesize_for(&search(), Framework::LangChain, echo.clone())
            .unwrap();
        let tool = adapter.as_langchain().unwrap();

        let err = tool.arun(Map::new()).await.unwrap_err();
        assert_eq!(err.validation().unwrap().kind, ValidationErrorKind::MissingRequired);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn autogen_reports_errors_in_band() {
        let (synth, _) = synthesizer();
        let adapter = synth
            .synthesize_for(&search(), Framework::AutoGen, Arc::new(Echo::default()))
            .unwrap();
        let tool = adapter.as_autogen().unwrap();
        let token = tokio_util::sync::CancellationToken::new();

        let ok = tool.run(json!({"query": "rust"}), &token).await;
        assert!(!ok.is_error);
        assert_eq!(ok.name, "search");

        let bad = tool.run(json!({"query": 7}), &token).await;
        assert!(bad.is_error);
        assert!(bad.content.contains("TYPE_MISMATCH"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn crewai_run_blocks_on_the_runtime() {
        let (synth, store) = synthesizer();
        let adapter = synth
            .synthesize_for(&search(), Framework::CrewAi, Arc::new(Echo::default()))
            .unwrap();
        let tool = adapter.as_crewai().unwrap().clone();

        let mut kwargs = Map::new();
        kwargs.insert("query".into(), json!("cats"));
        let out = tokio::task::spawn_blocking(move || tool.run(kwargs))
            .await
            .unwrap()
            .unwrap();
        assert!(out.starts_with("search:"));
        assert_eq!(store.record_count().await, 1);

        let reply = adapter.call(json!({"query": "dogs"})).await;
        assert!(!reply.is_error);
        assert_eq!(store.record_count().await, 2);
    }
    #[tokio::test]
    async fn crewai_works_on_a_current_thread_runtime() {
        let (synth, store) = synthesizer();
        let echo = Arc::new(Echo::default());
        let adapter = synth
            .synthesize_for(&search(), Framework::CrewAi, echo.clone())
            .unwrap();
        let tool = adapter.as_crewai().unwrap().clone();

        let reply = adapter.call(json!({"query": "cats"})).await;
        assert!(!reply.is_error, "{}", reply.content);
        assert!(reply.content.starts_with("search:"));

        let rejected = adapter.call(json!({})).await;
        assert!(matches!(rejected.error, Some(InvocationError::Validation(_))));

        let mut kwargs = Map::new();
        kwargs.insert("query".into(), json!("owls"));
        let direct = tool.run(kwargs.clone()).unwrap();
        assert!(direct.starts_with("search:"));

        let pooled = tokio::task::spawn_blocking(move || tool.run(kwargs))
            .await
            .unwrap()
            .unwrap();
        assert!(pooled.starts_with("search:"));

        assert_eq!(echo.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.record_count().await, 4);
    }
}
