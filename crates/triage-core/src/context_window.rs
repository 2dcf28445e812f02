//! Resolve the reasoning service's input size limit for a model.
//!
//! Lookup never fails: unknown models fall back to [`DEFAULT_CONTEXT_WINDOW`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Limit assumed for models missing from the catalog.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;

/// Known maximum input tokens per model key.
const BUILTIN_CATALOG: &[(&str, u64)] = &[
    ("gpt-3.5-turbo", 16_385),
    ("gpt-4", 8_192),
    ("gpt-4-turbo", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
    ("o1", 200_000),
    ("o3-mini", 200_000),
    ("claude-3-5-haiku-20241022", 200_000),
    ("claude-3-5-sonnet-20241022", 200_000),
    ("claude-3-7-sonnet-20250219", 200_000),
    ("claude-sonnet-4-20250514", 200_000),
    ("claude-opus-4-20250514", 200_000),
    ("gemini-1.5-flash", 1_048_576),
    ("gemini-1.5-pro", 2_097_152),
    ("gemini-2.0-flash", 1_048_576),
    ("gemini-2.5-flash", 1_048_576),
    ("gemini-2.5-pro", 1_048_576),
    ("mistral-large-latest", 128_000),
    ("ollama/llama3.1", 131_072),
    ("ollama/qwen2.5-coder", 32_768),
];

/// Provider plus model name, e.g. `openai` / `gpt-4o`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelId {
    pub provider: String,
    pub model: String,
}

impl ModelId {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.provider.is_empty() {
            f.write_str(&self.model)
        } else {
            write!(f, "{}/{}", self.provider, self.model)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextWindowResolver {
    catalog: BTreeMap<String, u64>,
    default_tokens: u64,
}

impl Default for ContextWindowResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ContextWindowResolver {
    pub fn builtin() -> Self {
        Self {
            catalog: BUILTIN_CATALOG
                .iter()
                .map(|(key, tokens)| (key.to_string(), *tokens))
                .collect(),
            default_tokens: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Add or replace a catalog entry.
    pub fn with_entry(mut self, key: impl Into<String>, tokens: u64) -> Self {
        self.catalog.insert(key.into(), tokens);
        self
    }

    pub fn with_default(mut self, tokens: u64) -> Self {
        self.default_tokens = tokens;
        self
    }

    /// Usable input tokens for `model`.
    ///
    /// Tries `provider/model`, then `model`, then the longest catalog key
    /// that contains or is contained in the model name.
    pub fn resolve(&self, model: &ModelId) -> u64 {
        let qualified = format!("{}/{}", model.provider, model.model);
        for key in [qualified.as_str(), model.model.as_str()] {
            if let Some(tokens) = self.catalog.get(key) {
                debug!(model = %key, tokens, "context window from catalog");
                return *tokens;
            }
        }

        if !model.model.is_empty() {
            let fuzzy = self
                .catalog
                .iter()
                .filter(|(key, _)| model.model.contains(key.as_str()) || key.contains(&model.model))
                .max_by_key(|(key, _)| key.len());
            if let Some((key, tokens)) = fuzzy {
                debug!(model = %model, matched = %key, tokens, "context window by partial match");
                return *tokens;
            }
        }

        warn!(
            model = %model,
            default = self.default_tokens,
            "model not in catalog, using default context window"
        );
        self.default_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_wins() {
        let resolver = ContextWindowResolver::builtin()
            .with_entry("azure/gpt-4o", 64_000)
            .with_entry("gpt-4o", 128_000);
        assert_eq!(resolver.resolve(&ModelId::new("azure", "gpt-4o")), 64_000);
        assert_eq!(resolver.resolve(&ModelId::new("openai", "gpt-4o")), 128_000);
    }

    #[test]
    fn test_bare_model_name() {
        let resolver = ContextWindowResolver::builtin();
        assert_eq!(
            resolver.resolve(&ModelId::new("vertex_ai", "gemini-1.5-pro")),
            2_097_152
        );
    }

    #[test]
    fn test_partial_match_prefers_longest_key() {
        let resolver = ContextWindowResolver::builtin();
        // "gpt-4o-2024-08-06" contains both "gpt-4" and "gpt-4o".
        assert_eq!(
            resolver.resolve(&ModelId::new("openai", "gpt-4o-2024-08-06")),
            128_000
        );
    }

    #[test]
    fn test_unknown_model_uses_default() {
        let resolver = ContextWindowResolver::builtin();
        assert_eq!(
            resolver.resolve(&ModelId::new("acme", "brand-new-model")),
            DEFAULT_CONTEXT_WINDOW
        );
        assert_eq!(resolver.resolve(&ModelId::default()), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn test_custom_default() {
        let resolver = ContextWindowResolver::builtin().with_default(32_000);
        assert_eq!(resolver.resolve(&ModelId::new("x", "zzz")), 32_000);
    }
}
