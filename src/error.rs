//! Error taxonomy for the bridge core.
//!
//! Each error is resolved at the boundary nearest its cause: schema errors at
//! registration and synthesis, validation errors at the adapter, remote and
//! storage errors after they have been recorded.

use std::fmt;
use thiserror::Error;

/// A manifest is malformed or cannot be represented in a target shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema error in manifest '{tool}': {reason}")]
pub struct SchemaError {
    /// Tool name, or `<unknown>` when the name itself is missing.
    pub tool: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

/// The requested framework identifier is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported target framework: {framework}")]
pub struct UnsupportedFrameworkError {
    pub framework: String,
}

/// Category of an argument validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingRequired,
    TypeMismatch,
    UnexpectedField,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequired => write!(f, "MISSING_REQUIRED"),
            Self::TypeMismatch => write!(f, "TYPE_MISMATCH"),
            Self::UnexpectedField => write!(f, "UNEXPECTED_FIELD"),
        }
    }
}

/// Invocation arguments do not satisfy the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} on '{field}': {detail}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: String,
    pub detail: String,
}

impl ValidationError {
    pub(crate) fn missing(field: &str) -> Self {
        Self {
            kind: ValidationErrorKind::MissingRequired,
            field: field.to_string(),
            detail: "required argument is absent".to_string(),
        }
    }

    pub(crate) fn mismatch(field: &str, detail: String) -> Self {
        Self {
            kind: ValidationErrorKind::TypeMismatch,
            field: field.to_string(),
            detail,
        }
    }

    pub(crate) fn unexpected(field: &str) -> Self {
        Self {
            kind: ValidationErrorKind::UnexpectedField,
            field: field.to_string(),
            detail: "argument is not declared by the manifest".to_string(),
        }
    }
}

/// Failure reported by the remote tool source, or by the call to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The tool ran and reported an error.
    #[error("tool error: {message}")]
    Tool { message: String },
    /// The tool could not be reached or the response was unusable.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// No terminal response arrived before the deadline.
    #[error("invocation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    /// The caller cancelled the invocation.
    #[error("invocation cancelled")]
    Cancelled,
}

impl RemoteError {
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Failure of the storage collaborator. Never fatal to an invocation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Synthesis failed for one (manifest, framework) pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    UnsupportedFramework(#[from] UnsupportedFrameworkError),
}

/// Discovery could not start for a source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    UnsupportedFramework(#[from] UnsupportedFrameworkError),
    #[error("failed to list tools from '{source_name}': {error}")]
    Listing {
        source_name: String,
        error: RemoteError,
    },
}

/// Registry facade query failure.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool not found in registry: {name}")]
    NotFound { name: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure surfaced to the caller of an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("invalid arguments: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl InvocationError {
    /// The validation failure, if the call never left the adapter.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Remote(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_names_the_kind() {
        let err = ValidationError::missing("query");
        assert_eq!(
            err.to_string(),
            "MISSING_REQUIRED on 'query': required argument is absent"
        );
    }

    #[test]
    fn remote_timeout_display() {
        let err = RemoteError::Timeout { after_ms: 250 };
        assert_eq!(err.to_string(), "invocation timed out after 250ms");
    }

    #[test]
    fn synthesis_error_wraps_transparently() {
        let err: SynthesisError = UnsupportedFrameworkError {
            framework: "haystack".into(),
        }
        .into();
        assert_eq!(err.to_string(), "unsupported target framework: haystack");
    }
}
