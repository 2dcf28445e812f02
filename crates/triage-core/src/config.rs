//! Pipeline configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::batcher::BatcherConfig;
use crate::budget::BudgetConfig;
use crate::domain::{Result, TriageError};
use crate::retry::RetryConfig;

/// Knobs for one analysis run. Every field has a working default, and a
/// JSON file may set any subset of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub retry: RetryConfig,
    pub budget: BudgetConfig,
    pub batcher: BatcherConfig,
    /// Units analysed at the same time.
    pub max_concurrency: usize,
    /// Fixed context window; skips catalog lookup when set.
    pub context_window: Option<u64>,
    /// Extra catalog entries, keyed by `provider/model` or `model`.
    pub context_window_overrides: BTreeMap<String, u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
            batcher: BatcherConfig::default(),
            max_concurrency: 4,
            context_window: None,
            context_window_overrides: BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(TriageError::InvalidConfig(errors.join("; ")))
        }
    }

    /// Human-readable problems with this configuration; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.call_timeout_ms == 0 {
            errors.push("retry.call_timeout_ms must be positive".to_string());
        }
        if self.max_concurrency == 0 {
            errors.push("max_concurrency must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.budget.reserved_fraction) {
            errors.push("budget.reserved_fraction must be in [0, 1)".to_string());
        }
        if self.batcher.safety_multiplier < 1.0 {
            errors.push("batcher.safety_multiplier must be at least 1.0".to_string());
        }
        if self.context_window == Some(0) {
            errors.push("context_window must be positive".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.budget.reserved_fraction, 0.15);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"max_concurrency": 8, "retry": {"max_attempts": 5}}"#).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.batcher, BatcherConfig::default());
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let mut config = AnalysisConfig::default();
        config.max_concurrency = 0;
        config.budget.reserved_fraction = 1.5;
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("max_concurrency"));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.json");
        std::fs::write(&path, r#"{"context_window": 32000}"#).unwrap();
        let config = AnalysisConfig::from_json_file(&path).unwrap();
        assert_eq!(config.context_window, Some(32_000));

        std::fs::write(&path, r#"{"max_concurrency": 0}"#).unwrap();
        assert!(matches!(
            AnalysisConfig::from_json_file(&path),
            Err(TriageError::InvalidConfig(_))
        ));
    }
}
