//! Invocation pipeline shared by every framework variant.
//!
//! validate → invoke (deadline, cancellation) → record → return. The remote
//! tool is never contacted with arguments that failed validation, and every
//! attempt that reaches the invoker yields exactly one record, including
//! attempts whose future is dropped before completion.

use crate::error::{InvocationError, RemoteError};
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::recorder::{Attempt, ExecutionRecorder, Outcome};
use crate::source::Invoker;
use crate::types::Framework;
use crate::validate::Validator;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-adapter invocation state. Immutable once synthesized.
pub(crate) struct Dispatcher {
    pub(crate) manifest: Arc<ToolManifest>,
    pub(crate) fingerprint: ManifestFingerprint,
    pub(crate) framework: Framework,
    pub(crate) invoker: Arc<dyn Invoker>,
    pub(crate) validator: Validator,
    pub(crate) recorder: Arc<ExecutionRecorder>,
    pub(crate) timeout: Option<Duration>,
    /// Runtime the adapter was synthesized on, for synchronous callers.
    pub(crate) handle: Option<Handle>,
}

impl Dispatcher {
    fn attempt(&self, arguments: Value, coercions: Vec<String>) -> Attempt {
        Attempt {
            framework: self.framework,
            manifest: self.manifest.clone(),
            fingerprint: self.fingerprint.clone(),
            arguments,
            coercions,
        }
    }

    /// Run one invocation through the full pipeline.
    pub(crate) async fn dispatch(
        &self,
        arguments: &Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, InvocationError> {
        let validated = match self.validator.validate_value(&self.manifest, arguments) {
            Ok(validated) => validated,
            Err(err) => {
                debug!("Rejected call to {}: {}", self.manifest.name(), err);
                self.recorder
                    .record_rejected(self.attempt(arguments.clone(), Vec::new()), &err)
                    .await;
                return Err(err.into());
            }
        };

        let attempt = self.attempt(
            Value::Object(validated.values().clone()),
            validated.coercions().to_vec(),
        );
        let started = Instant::now();
        let mut guard = RecordGuard::arm(self.recorder.clone(), attempt, started);

        let call = self.invoker.invoke(self.manifest.name(), validated.values());
        let timed = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(RemoteError::Timeout {
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    }),
                },
                None => call.await,
            }
        };
        let result = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(RemoteError::Cancelled),
                result = timed => result,
            },
            None => timed.await,
        };

        let duration = started.elapsed();
        let Some(attempt) = guard.disarm() else {
            return result.map_err(InvocationError::from);
        };
        let outcome = match &result {
            Ok(value) => Outcome::Returned(value.clone()),
            Err(err) => Outcome::Failed(err.clone()),
        };
        self.recorder.record(attempt, outcome, duration).await;

        result.map_err(InvocationError::from)
    }

    /// Drive `dispatch` to completion from synchronous code.
    pub(crate) fn dispatch_blocking(&self, arguments: &Value) -> Result<Value, InvocationError> {
        block_on(self.handle.as_ref(), self.dispatch(arguments, None))
            .unwrap_or_else(|message| Err(RemoteError::transport(message).into()))
    }
}

/// Records a `cancelled` outcome if the invocation future is dropped in flight.
struct RecordGuard {
    pending: Option<(Arc<ExecutionRecorder>, Attempt)>,
    started: Instant,
}

impl RecordGuard {
    fn arm(recorder: Arc<ExecutionRecorder>, attempt: Attempt, started: Instant) -> Self {
        Self {
            pending: Some((recorder, attempt)),
            started,
        }
    }

    fn disarm(&mut self) -> Option<Attempt> {
        self.pending.take().map(|(_, attempt)| attempt)
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        let Some((recorder, attempt)) = self.pending.take() else {
            return;
        };
        let duration = self.started.elapsed();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    recorder
                        .record(attempt, Outcome::Failed(RemoteError::Cancelled), duration)
                        .await;
                });
            }
            Err(_) => debug!(
                "Invocation of {} dropped outside a runtime; not recorded",
                attempt.manifest.name()
            ),
        }
    }
}

/// Block the current thread on `fut`.
///
/// Inside a multi-threaded runtime the worker is handed off with
/// `block_in_place`. Under a current-thread runtime the caller may be the
/// thread driving it, so `fut` runs to completion on a scoped helper thread
/// with its own runtime. Outside any runtime the synthesis-time handle is
/// used, and failing that a private current-thread runtime.
pub(crate) fn block_on<F>(fallback: Option<&Handle>, fut: F) -> Result<F::Output, String>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
            }
            _ => std::thread::scope(|scope| {
                scope
                    .spawn(|| private_runtime(fut))
                    .join()
                    .unwrap_or_else(|_| Err("tool call panicked".to_string()))
            }),
        },
        Err(_) => match fallback {
            Some(handle) => Ok(handle.block_on(fut)),
            None => private_runtime(fut),
        },
    }
}

fn private_runtime<F: Future>(fut: F) -> Result<F::Output, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(|rt| rt.block_on(fut))
        .map_err(|e| format!("failed to start runtime: {e}"))
}

/// Render a tool payload as the text the frameworks hand back to the agent.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
