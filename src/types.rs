//! Shared types used across the bridge.

use crate::error::UnsupportedFrameworkError;
use crate::manifest::ManifestFingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Target frameworks
// ---------------------------------------------------------------------------

/// Agent-orchestration frameworks an adapter can be synthesized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// CrewAI `BaseTool`: synchronous `_run(**kwargs) -> str`.
    CrewAi,
    /// LangChain `StructuredTool`: sync `func` plus async `coroutine`.
    LangChain,
    /// AutoGen `BaseTool`: async `run(args, cancellation_token)`.
    AutoGen,
}

impl Framework {
    /// Every supported framework, in a stable order.
    pub const ALL: [Framework; 3] = [Framework::CrewAi, Framework::LangChain, Framework::AutoGen];

    /// Wire identifier (`crewai`, `langchain`, `autogen`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrewAi => "crewai",
            Self::LangChain => "langchain",
            Self::AutoGen => "autogen",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = UnsupportedFrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crewai" => Ok(Self::CrewAi),
            "langchain" => Ok(Self::LangChain),
            "autogen" => Ok(Self::AutoGen),
            _ => Err(UnsupportedFrameworkError {
                framework: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Type vocabulary
// ---------------------------------------------------------------------------

/// Closed vocabulary of parameter and return types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Enum,
}

impl ValueType {
    /// Normalize a raw type token. Returns `None` for tokens outside the vocabulary.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Some(Self::String),
            "number" | "integer" | "int" | "float" | "double" => Some(Self::Number),
            "boolean" | "bool" => Some(Self::Boolean),
            "object" | "dict" | "map" => Some(Self::Object),
            "array" | "list" => Some(Self::Array),
            "enum" => Some(Self::Enum),
            _ => None,
        }
    }

    /// Canonical token for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Enum => "enum",
        }
    }

    /// Whether a JSON value is of this type. Enum membership is checked by the validator.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            Self::String | Self::Enum => matches!(value, Value::String(_)),
            Self::Number => matches!(value, Value::Number(_)),
            Self::Boolean => matches!(value, Value::Bool(_)),
            Self::Object => matches!(value, Value::Object(_)),
            Self::Array => matches!(value, Value::Array(_)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the JSON kind of a value, for diagnostics.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// Terminal status of one invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// The remote tool returned a result.
    Success,
    /// The remote tool (or the transport) reported an error.
    Error,
    /// The invocation exceeded its deadline.
    Timeout,
    /// The caller cancelled the invocation.
    Cancelled,
    /// Arguments failed validation; the remote tool was never contacted.
    Rejected,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown record status: {other}")),
        }
    }
}

/// One completed invocation attempt, as stored and as served to telemetry consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// ULID; lexicographic order follows creation order.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "agent_framework")]
    pub framework: Framework,
    pub tool_name: String,
    pub fingerprint: ManifestFingerprint,
    pub input_arguments: serde_json::Value,
    pub status: RecordStatus,
    /// Success payload, or the error detail for failed attempts.
    pub execution_result: serde_json::Value,
    pub is_anomaly: bool,
    /// Always populated when `is_anomaly` is set.
    pub anomaly_reason: Option<String>,
    /// Parameters whose values were coerced by the validator.
    #[serde(default)]
    pub coercions: Vec<String>,
    pub duration_ms: u64,
}

/// Filter applied to record queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub framework: Option<Framework>,
    pub tool_name: Option<String>,
    pub anomalies_only: bool,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn framework(mut self, framework: Framework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn anomalies_only(mut self) -> Self {
        self.anomalies_only = true;
        self
    }

    /// Whether a record passes this filter.
    pub fn accepts(&self, record: &ExecutionRecord) -> bool {
        if let Some(fw) = self.framework {
            if record.framework != fw {
                return false;
            }
        }
        if let Some(ref name) = self.tool_name {
            if &record.tool_name != name {
                return false;
            }
        }
        !self.anomalies_only || record.is_anomaly
    }
}

/// Keyset window over the storage insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Only rows stored after this sequence number; `0` starts from the top.
    pub after: u64,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { after: 0, limit }
    }
}

// ---------------------------------------------------------------------------
// Registry views
// ---------------------------------------------------------------------------

/// Aggregate behaviour of one tool across its recorded invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub tool_name: String,
    pub total: u64,
    pub anomalies: u64,
    /// Share of non-anomalous invocations; 1.0 when nothing was recorded.
    pub success_rate: f64,
    pub last_anomaly: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn framework_parses_case_insensitively() {
        assert_eq!("CrewAI".parse::<Framework>().unwrap(), Framework::CrewAi);
        assert_eq!(" langchain ".parse::<Framework>().unwrap(), Framework::LangChain);
        assert_eq!("autogen".parse::<Framework>().unwrap(), Framework::AutoGen);
    }

    #[test]
    fn unknown_framework_is_rejected() {
        let err = "semantic-kernel".parse::<Framework>().unwrap_err();
        assert_eq!(err.framework, "semantic-kernel");
    }

    #[test]
    fn type_tokens_normalize() {
        assert_eq!(ValueType::from_token("integer"), Some(ValueType::Number));
        assert_eq!(ValueType::from_token("STR"), Some(ValueType::String));
        assert_eq!(ValueType::from_token("dict"), Some(ValueType::Object));
        assert_eq!(ValueType::from_token("tuple"), None);
    }

    #[test]
    fn value_type_matching_is_strict() {
        assert!(ValueType::Number.matches(&json!(4.5)));
        assert!(!ValueType::Number.matches(&json!("4.5")));
        assert!(!ValueType::Boolean.matches(&json!("true")));
        assert!(ValueType::Enum.matches(&json!("red")));
    }

    #[test]
    fn record_serializes_telemetry_field_names() {
        let record = ExecutionRecord {
            id: "01J00000000000000000000000".into(),
            timestamp: Utc::now(),
            framework: Framework::LangChain,
            tool_name: "search".into(),
            fingerprint: ManifestFingerprint::from_hex("ab".repeat(32)),
            input_arguments: json!({"query": "cats"}),
            status: RecordStatus::Success,
            execution_result: json!("ok"),
            is_anomaly: false,
            anomaly_reason: None,
            coercions: Vec::new(),
            duration_ms: 3,
        };
        let value = serde_json::to_value(&record).unwrap();
        for field in [
            "timestamp",
            "agent_framework",
            "tool_name",
            "input_arguments",
            "execution_result",
            "is_anomaly",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["agent_framework"], "langchain");
    }
}
