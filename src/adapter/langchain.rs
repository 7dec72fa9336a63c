//! LangChain-shaped adapter: a `StructuredTool` with sync `run` and async `arun`.

use super::dispatch::{render, Dispatcher};
use super::schema;
use super::{AdapterReply, ToolAdapter};
use crate::error::{InvocationError, ValidationError};
use crate::manifest::ToolManifest;
use crate::types::Framework;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// LangChain's tool error; the agent executor reports its message to the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause}")]
pub struct ToolException {
    pub tool: String,
    pub cause: InvocationError,
}

impl ToolException {
    pub fn validation(&self) -> Option<&ValidationError> {
        self.cause.as_validation()
    }
}

#[derive(Clone)]
pub struct LangChainTool {
    pub(crate) inner: Arc<Dispatcher>,
}

impl LangChainTool {
    pub fn manifest(&self) -> &ToolManifest {
        &self.inner.manifest
    }

    fn exception(&self, cause: InvocationError) -> ToolException {
        ToolException {
            tool: self.inner.manifest.name().to_string(),
            cause,
        }
    }

    /// Synchronous entry point (`func`).
    pub fn run(&self, kwargs: Map<String, Value>) -> Result<String, ToolException> {
        self.inner
            .dispatch_blocking(&Value::Object(kwargs))
            .map(|value| render(&value))
            .map_err(|cause| self.exception(cause))
    }

    /// Asynchronous entry point (`coroutine`).
    pub async fn arun(&self, kwargs: Map<String, Value>) -> Result<String, ToolException> {
        self.inner
            .dispatch(&Value::Object(kwargs), None)
            .await
            .map(|value| render(&value))
            .map_err(|cause| self.exception(cause))
    }
}

#[async_trait]
impl ToolAdapter for LangChainTool {
    fn name(&self) -> &str {
        self.inner.manifest.name()
    }

    fn description(&self) -> String {
        schema::tool_description(&self.inner.manifest)
    }

    fn framework(&self) -> Framework {
        Framework::LangChain
    }

    fn args_schema(&self) -> Value {
        schema::args_schema(&self.inner.manifest, self.inner.validator.is_strict())
    }

    async fn call(&self, args: Value) -> AdapterReply {
        AdapterReply::from_result(self.inner.dispatch(&args, None).await.map(|v| render(&v)))
    }
}
