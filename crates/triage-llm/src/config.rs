//! LLM endpoint configuration.

use std::fmt;

use serde::{Deserialize, Serialize};
use triage_core::ModelId;

use crate::error::{LlmError, Result};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Which model to call and how to reach it.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai`, `ollama`, or any OpenAI-compatible provider with a base URL.
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Transport-level timeout for one HTTP request (milliseconds).
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            api_key: String::new(),
            base_url: None,
            temperature: 0.0,
            max_output_tokens: 4_096,
            request_timeout_ms: 300_000,
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl LlmConfig {
    /// Read `LLM_PROVIDER`, `LLM_MODEL`, `LLM_API_KEY` and `LLM_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            provider: var("LLM_PROVIDER").unwrap_or_default().to_lowercase(),
            model: var("LLM_MODEL").unwrap_or_default(),
            api_key: var("LLM_API_KEY").unwrap_or_default(),
            base_url: var("LLM_BASE_URL"),
            ..Self::default()
        }
    }

    /// Local providers run without credentials.
    pub fn is_local(&self) -> bool {
        self.provider == "ollama"
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.provider.is_empty() {
            errors.push("LLM_PROVIDER is required".to_string());
        }
        if self.model.is_empty() {
            errors.push("LLM_MODEL is required".to_string());
        }
        if self.api_key.is_empty() && !self.is_local() {
            errors.push("LLM_API_KEY is required".to_string());
        }
        if self.request_timeout_ms == 0 {
            errors.push("request_timeout_ms must be positive".to_string());
        }

        errors
    }

    /// Endpoint base: explicit URL, else the provider's default.
    pub fn resolved_base_url(&self) -> Result<String> {
        if let Some(url) = &self.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match self.provider.as_str() {
            "openai" => Ok(OPENAI_BASE_URL.to_string()),
            "ollama" => Ok(OLLAMA_BASE_URL.to_string()),
            other => Err(LlmError::InvalidConfig(format!(
                "provider `{other}` needs LLM_BASE_URL"
            ))),
        }
    }

    pub fn model_id(&self) -> ModelId {
        ModelId::new(self.provider.clone(), self.model.clone())
    }
}
