//! Configuration schema for toolbridge.toml.

use crate::adapter::SynthesisOptions;
use crate::recorder::RecorderOptions;
use crate::types::Framework;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name recorded as the source of manifests registered from files.
    pub server_name: String,

    /// Path to the SQLite registry database.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Reject undeclared arguments instead of dropping them.
    pub strict_mode: bool,

    /// Successful calls slower than this are flagged as anomalies.
    pub latency_threshold_ms: u64,

    /// Deadline for one remote call; 0 disables it.
    pub invoke_timeout_ms: u64,

    /// Record validation rejections as anomalous executions.
    pub record_rejections: bool,

    /// Records fetched per storage round trip when listing.
    pub page_size: usize,

    /// Frameworks adapters are synthesized for on discovery.
    pub frameworks: Vec<Framework>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_name: "local".into(),
            db_path: "~/.toolbridge/registry.db".into(),
            log_level: "info".into(),
            strict_mode: true,
            latency_threshold_ms: 5_000,
            invoke_timeout_ms: 30_000,
            record_rejections: true,
            page_size: 100,
            frameworks: vec![Framework::CrewAi],
        }
    }
}

impl BridgeConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    pub fn invoke_timeout(&self) -> Option<Duration> {
        (self.invoke_timeout_ms > 0).then(|| Duration::from_millis(self.invoke_timeout_ms))
    }

    pub fn recorder_options(&self) -> RecorderOptions {
        RecorderOptions {
            latency_threshold_ms: self.latency_threshold_ms,
            record_rejections: self.record_rejections,
        }
    }

    pub fn synthesis_options(&self) -> SynthesisOptions {
        SynthesisOptions {
            strict_mode: self.strict_mode,
            invoke_timeout: self.invoke_timeout(),
        }
    }
}
