//! AutoGen-shaped adapter: async `run(args, cancellation_token)`.
//!
//! Failures are reported in-band through `is_error` rather than raised, which
//! is how AutoGen's tool executor feeds them back to the model.

use super::dispatch::{render, Dispatcher};
use super::schema;
use super::{AdapterReply, ToolAdapter};
use crate::manifest::ToolManifest;
use crate::types::Framework;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// AutoGen's `FunctionExecutionResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionExecutionResult {
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

#[derive(Clone)]
pub struct AutoGenTool {
    pub(crate) inner: Arc<Dispatcher>,
}

impl AutoGenTool {
    pub fn manifest(&self) -> &ToolManifest {
        &self.inner.manifest
    }

    /// Invoke the tool. Cancelling `token` ends the call with a recorded
    /// `cancelled` outcome.
    pub async fn run(&self, args: Value, token: &CancellationToken) -> FunctionExecutionResult {
        let (content, is_error) = match self.inner.dispatch(&args, Some(token)).await {
            Ok(value) => (render(&value), false),
            Err(err) => (err.to_string(), true),
        };
        FunctionExecutionResult {
            name: self.inner.manifest.name().to_string(),
            content,
            is_error,
        }
    }
}

#[async_trait]
impl ToolAdapter for AutoGenTool {
    fn name(&self) -> &str {
        self.inner.manifest.name()
    }

    fn description(&self) -> String {
        schema::tool_description(&self.inner.manifest)
    }

    fn framework(&self) -> Framework {
        Framework::AutoGen
    }

    fn args_schema(&self) -> Value {
        schema::args_schema(&self.inner.manifest, self.inner.validator.is_strict())
    }

    async fn call(&self, args: Value) -> AdapterReply {
        AdapterReply::from_result(self.inner.dispatch(&args, None).await.map(|v| render(&v)))
    }
}
