//! Chat-completions client implementing [`ReasoningService`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use triage_core::retry::classify_message;
use triage_core::{FailureClass, ReasoningError, ReasoningRequest, ReasoningService};

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::prompts::{system_prompt, user_prompt};

/// Error bodies are cut to this many characters before they reach logs.
const MAX_ERROR_BODY_CHARS: usize = 2_000;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Map a non-success HTTP status to a reasoning error.
///
/// 429 is throttling. 400 and 413 are rejections of the request itself,
/// reported as a context-window overflow when the body says so. Anything
/// else is a plain HTTP failure.
pub fn map_status(status: u16, body: &str) -> ReasoningError {
    let body = truncate_body(body.trim());
    match status {
        429 => ReasoningError::RateLimited(body),
        400 | 413 if classify_message(&body) == Some(FailureClass::FatalNonRetryable) => {
            ReasoningError::ContextWindowExceeded(body)
        }
        400 | 413 => ReasoningError::Rejected { status, body },
        _ => ReasoningError::Http { status, body },
    }
}

/// OpenAI-compatible `/chat/completions` client.
///
/// Makes exactly one HTTP request per call; retries belong to the pipeline.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: LlmConfig,
    url: String,
}

impl ChatCompletionsClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(LlmError::InvalidConfig(errors.join("; ")));
        }

        let base = config.resolved_base_url()?;
        let url = if base.ends_with("/chat/completions") {
            base
        } else {
            format!("{base}/chat/completions")
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !config.api_key.is_empty() {
            let bearer = format!("Bearer {}", config.api_key);
            let mut value = HeaderValue::from_str(&bearer)
                .map_err(|e| LlmError::InvalidHeader(format!("api key: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { http, config, url })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReasoningService for ChatCompletionsClient {
    async fn complete(&self, request: &ReasoningRequest) -> std::result::Result<String, ReasoningError> {
        let kind = request.kind();
        let user = user_prompt(request)
            .map_err(|e| ReasoningError::InvalidResponse(format!("could not render prompt: {e}")))?;

        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_output_tokens,
            "messages": [
                {"role": "system", "content": system_prompt(kind)},
                {"role": "user", "content": user},
            ],
        });

        debug!(kind = %kind, model = %self.config.model, prompt_chars = user.len(), "sending completion request");
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(map_status(status.as_u16(), &text));
        }

        let completion: ChatCompletion = serde_json::from_str(&text)
            .map_err(|e| ReasoningError::InvalidResponse(format!("malformed completion: {e}")))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ReasoningError::InvalidResponse("completion has no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(kind = %kind, "completion stopped at max_output_tokens");
        }

        choice
            .message
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ReasoningError::InvalidResponse("completion has no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status() {
        assert!(matches!(map_status(429, "slow down"), ReasoningError::RateLimited(_)));
        assert!(matches!(
            map_status(400, "This model's maximum context window is 128000 tokens"),
            ReasoningError::ContextWindowExceeded(_)
        ));
        assert_eq!(
            map_status(400, "unknown parameter"),
            ReasoningError::Rejected {
                status: 400,
                body: "unknown parameter".into()
            }
        );
        assert_eq!(
            map_status(503, " overloaded \n"),
            ReasoningError::Http {
                status: 503,
                body: "overloaded".into()
            }
        );
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(MAX_ERROR_BODY_CHARS + 10);
        let cut = truncate_body(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY_CHARS + 3);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(matches!(
            ChatCompletionsClient::new(LlmConfig::default()),
            Err(LlmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_url_joins_base() {
        let client = ChatCompletionsClient::new(LlmConfig {
            provider: "ollama".into(),
            model: "llama3.1".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.url(), "http://localhost:11434/v1/chat/completions");
    }
}
