//! Error taxonomy for the analysis pipeline.
//!
//! Per-unit failures (`ReasoningError`, `ParseError`, `UnitError`) never leave
//! the retry layer; they are folded into degraded results. `TriageError` is the
//! only error a caller of the pipeline sees.

use std::time::Duration;

/// Failures reported by a reasoning service call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReasoningError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Typed failures of the output parser. None of these carry partial data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("parse error: response is empty")]
    Empty,

    #[error("parse error: {0}")]
    Syntax(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("schema error: element {element_index} is missing required field `{field_name}`")]
    Schema {
        element_index: usize,
        field_name: String,
    },
}

/// Failure of a single attempt at analysing one unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("call deadline of {}ms exceeded", .0.as_millis())]
    DeadlineExceeded(Duration),
}

/// Artifact store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job-level errors.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("invalid job manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for job-level operations.
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_element_and_field() {
        let err = ParseError::Schema {
            element_index: 2,
            field_name: "key_findings".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("element 2"));
        assert!(msg.contains("key_findings"));
    }

    #[test]
    fn test_unit_error_is_transparent_over_sources() {
        let err: UnitError = ReasoningError::RateLimited("quota exhausted".into()).into();
        assert_eq!(err.to_string(), "rate limited: quota exhausted");

        let err: UnitError = ParseError::Empty.into();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_deadline_message_uses_millis() {
        let err = UnitError::DeadlineExceeded(Duration::from_secs(2));
        assert_eq!(err.to_string(), "call deadline of 2000ms exceeded");
    }

    #[test]
    fn test_precondition_error_display() {
        let err = TriageError::PreconditionFailed("no failed steps or tests".into());
        assert!(err.to_string().contains("precondition failed"));
    }
}
