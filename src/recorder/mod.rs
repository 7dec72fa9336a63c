//! Execution recorder.
//!
//! Turns one invocation attempt into exactly one [`ExecutionRecord`], decides
//! whether it is anomalous, persists it and publishes it to live subscribers.
//! Storage failures are logged and counted but never reach the caller.

use crate::error::{RemoteError, ValidationError};
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::state::Storage;
use crate::types::{json_kind, ExecutionRecord, Framework, RecordStatus, ValueType};
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use ulid::{Generator, Ulid};

/// Capacity of the live record feed. Lagging subscribers skip ahead.
const FEED_CAPACITY: usize = 1024;

/// Recorder policy, taken from the bridge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderOptions {
    /// Successful calls slower than this are flagged.
    pub latency_threshold_ms: u64,
    /// Whether arguments rejected by the validator produce a record.
    pub record_rejections: bool,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            latency_threshold_ms: 5_000,
            record_rejections: true,
        }
    }
}

/// Everything known about an attempt except how it ended.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub framework: Framework,
    pub manifest: Arc<ToolManifest>,
    pub fingerprint: ManifestFingerprint,
    pub arguments: Value,
    pub coercions: Vec<String>,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The remote tool returned a payload.
    Returned(Value),
    /// The invoker failed, timed out, or was cancelled.
    Failed(RemoteError),
    /// Arguments never reached the remote tool.
    Rejected(ValidationError),
}

/// Result of anomaly classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: RecordStatus,
    pub result: Value,
    pub anomaly_reason: Option<String>,
}

/// Classify an outcome. Checks run in order and the first hit wins:
/// remote failure, return kind mismatch, then latency.
pub fn classify(
    return_type: ValueType,
    outcome: &Outcome,
    duration: Duration,
    latency_threshold_ms: u64,
) -> Classification {
    match outcome {
        Outcome::Rejected(err) => Classification {
            status: RecordStatus::Rejected,
            result: Value::String(err.to_string()),
            anomaly_reason: Some(format!("validation failed: {err}")),
        },
        Outcome::Failed(err) => {
            let status = match err {
                RemoteError::Timeout { .. } => RecordStatus::Timeout,
                RemoteError::Cancelled => RecordStatus::Cancelled,
                RemoteError::Tool { .. } | RemoteError::Transport { .. } => RecordStatus::Error,
            };
            Classification {
                status,
                result: Value::String(err.to_string()),
                anomaly_reason: Some(err.to_string()),
            }
        }
        Outcome::Returned(value) => {
            let anomaly_reason = if !return_type.matches(value) {
                Some(format!(
                    "return type mismatch: expected {}, got {}",
                    return_type,
                    json_kind(value)
                ))
            } else if duration.as_millis() > u128::from(latency_threshold_ms) {
                Some(format!(
                    "latency {}ms exceeded threshold {}ms",
                    duration.as_millis(),
                    latency_threshold_ms
                ))
            } else {
                None
            };
            Classification {
                status: RecordStatus::Success,
                result: value.clone(),
                anomaly_reason,
            }
        }
    }
}

/// Records invocation attempts.
pub struct ExecutionRecorder {
    store: Arc<dyn Storage>,
    options: RecorderOptions,
    ids: Mutex<Generator>,
    /// Held from timestamping to insert, so storage order is timestamp order.
    append: tokio::sync::Mutex<()>,
    storage_failures: AtomicU64,
    feed: broadcast::Sender<ExecutionRecord>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn Storage>, options: RecorderOptions) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            store,
            options,
            ids: Mutex::new(Generator::new()),
            append: tokio::sync::Mutex::new(()),
            storage_failures: AtomicU64::new(0),
            feed,
        }
    }

    pub fn options(&self) -> RecorderOptions {
        self.options
    }

    /// Number of records that could not be persisted.
    pub fn storage_failures(&self) -> u64 {
        self.storage_failures.load(Ordering::Relaxed)
    }

    /// Live feed of every record produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionRecord> {
        self.feed.subscribe()
    }

    /// Build, persist and publish the record for a finished attempt.
    pub async fn record(
        &self,
        attempt: Attempt,
        outcome: Outcome,
        duration: Duration,
    ) -> ExecutionRecord {
        let class = classify(
            attempt.manifest.return_type(),
            &outcome,
            duration,
            self.options.latency_threshold_ms,
        );

        let append = self.append.lock().await;
        let record = ExecutionRecord {
            id: self.next_id(),
            timestamp: Utc::now(),
            framework: attempt.framework,
            tool_name: attempt.manifest.name().to_string(),
            fingerprint: attempt.fingerprint,
            input_arguments: attempt.arguments,
            status: class.status,
            execution_result: class.result,
            is_anomaly: class.anomaly_reason.is_some(),
            anomaly_reason: class.anomaly_reason,
            coercions: attempt.coercions,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        };

        if let Some(ref reason) = record.anomaly_reason {
            warn!(
                "Anomaly in {} via {}: {}",
                record.tool_name, record.framework, reason
            );
        } else {
            debug!(
                "Recorded {} via {} ({}ms)",
                record.tool_name, record.framework, record.duration_ms
            );
        }

        self.persist(&record).await;
        drop(append);
        // No subscribers is not an error.
        let _ = self.feed.send(record.clone());
        record
    }

    /// Record a validation rejection, if the policy asks for it.
    pub async fn record_rejected(
        &self,
        attempt: Attempt,
        error: &ValidationError,
    ) -> Option<ExecutionRecord> {
        if !self.options.record_rejections {
            debug!("Rejection of {} not recorded", attempt.manifest.name());
            return None;
        }
        Some(
            self.record(attempt, Outcome::Rejected(error.clone()), Duration::ZERO)
                .await,
        )
    }

    async fn persist(&self, record: &ExecutionRecord) {
        if let Err(e) = self.store.insert_record(record).await {
            self.storage_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to persist execution record {}: {}", record.id, e);
        }
    }

    fn next_id(&self) -> String {
        let generated = self
            .ids
            .lock()
            .ok()
            .and_then(|mut generator| generator.generate().ok());
        generated.unwrap_or_else(Ulid::new).to_string()
    }
}
