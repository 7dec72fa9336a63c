//! CrewAI-shaped adapter: a synchronous `run(**kwargs) -> str`.

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

/// Error raised to a CrewAI agent when a tool call fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tool '{tool}' failed: {cause}")]
pub struct ToolUsageError {
    pub tool: String,
    pub cause: InvocationError,
}

impl ToolUsageError {
    pub fn validation(&self) -> Option<&ValidationError> {
        self.cause.as_validation()
    }
}

/// A remote tool presented as a CrewAI `BaseTool`.
#[derive(Clone)]
pub struct CrewAiTool {
    pub(crate) inner: Arc<Dispatcher>,
}

impl CrewAiTool {
    pub fn manifest(&self) -> &ToolManifest {
        &self.inner.manifest
    }

    /// Invoke the tool synchronously.
    ///
    /// Blocks the calling thread until the remote call is recorded. From
    /// async code prefer [`ToolAdapter::call`], which awaits the same
    /// pipeline without blocking.
    /// On the thread driving a current-thread runtime, that runtime's other
    /// tasks stall until the call returns.
    pub fn run(&self, kwargs: Map<String, Value>) -> Result<String, ToolUsageError> {
        self.inner
            .dispatch_blocking(&Value::Object(kwargs))
            .map(|value| render(&value))
            .map_err(|cause| ToolUsageError {
                tool: self.inner.manifest.name().to_string(),
                cause,
            })
    }
}

#[async_trait]
impl ToolAdapter for CrewAiTool {
    fn name(&self) -> &str {
        self.inner.manifest.name()
    }

    fn description(&self) -> String {
        schema::tool_description(&self.inner.manifest)
    }

    fn framework(&self) -> Framework {
        Framework::CrewAi
    }

    fn args_schema(&self) -> Value {
        schema::args_schema(&self.inner.manifest, self.inner.validator.is_strict())
    }

    async fn call(&self, args: Value) -> AdapterReply {
        match self.inner.dispatch(&args, None).await {
            Ok(value) => AdapterReply::ok(render(&value)),
            Err(cause) => {
                let err = ToolUsageError {
                    tool: self.inner.manifest.name().to_string(),
                    cause,
                };
                AdapterReply::failed(err.to_string(), err.cause)
            }
        }
    }
}
