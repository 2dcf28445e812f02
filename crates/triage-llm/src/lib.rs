//! LLM-backed reasoning service for triage.
//!
//! [`ChatCompletionsClient`] speaks the OpenAI-compatible chat-completions
//! protocol (OpenAI, Ollama, vLLM and similar) and plugs into the
//! `triage-core` pipeline as its [`triage_core::ReasoningService`].

pub mod client;
pub mod config;
pub mod error;
pub mod prompts;

pub use client::{map_status, ChatCompletionsClient};
pub use config::{LlmConfig, OLLAMA_BASE_URL, OPENAI_BASE_URL};
pub use error::{LlmError, Result};
