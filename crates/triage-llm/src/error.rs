//! Error types for the LLM client

use thiserror::Error;

/// Errors raised while setting up a reasoning client.
///
/// Failures of individual calls are reported as
/// [`triage_core::ReasoningError`] instead.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("invalid LLM configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;
