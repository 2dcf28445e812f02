//! Units of analysis work and their results.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::category::FailureCategory;
use super::evidence::ArtifactItem;

/// Prefix used wherever a degraded result stands in for findings.
pub const ANALYSIS_FAILED_PREFIX: &str = "Analysis failed";

/// Kinds of reasoning requests. Fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Step,
    Test,
    ArtifactBatch,
    Synthesis,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitKind::Step => "step",
            UnitKind::Test => "test",
            UnitKind::ArtifactBatch => "artifact_batch",
            UnitKind::Synthesis => "synthesis",
        };
        f.write_str(s)
    }
}

/// Group of artifact items packed to fit one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub items: Vec<ArtifactItem>,
    /// Estimated token cost including scaffolding overhead.
    pub estimated_tokens: u64,
    /// Set when a single item exceeded the ceiling on its own.
    pub oversize: bool,
}

impl Batch {
    pub fn paths(&self) -> Vec<String> {
        self.items.iter().map(|item| item.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepUnit {
    pub step_name: String,
    pub log_content: String,
    pub step_context: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestUnit {
    pub test_identifier: String,
    pub source_file: String,
    pub failure_type: String,
    pub failure_message: String,
    pub failure_details: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchUnit {
    pub index: usize,
    pub batch: Batch,
}

/// One discrete piece of work for the reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisUnit {
    Step(StepUnit),
    Test(TestUnit),
    ArtifactBatch(BatchUnit),
}

impl AnalysisUnit {
    pub fn kind(&self) -> UnitKind {
        match self {
            AnalysisUnit::Step(_) => UnitKind::Step,
            AnalysisUnit::Test(_) => UnitKind::Test,
            AnalysisUnit::ArtifactBatch(_) => UnitKind::ArtifactBatch,
        }
    }

    /// Human-readable identity used in logs.
    pub fn key(&self) -> String {
        match self {
            AnalysisUnit::Step(unit) => format!("step:{}", unit.step_name),
            AnalysisUnit::Test(unit) => format!("test:{}", unit.test_identifier),
            AnalysisUnit::ArtifactBatch(unit) => {
                format!("artifact_batch:{} ({} items)", unit.index, unit.batch.len())
            }
        }
    }
}

/// Either the typed output of a unit, or why it could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success(T),
    Degraded { reason: String },
}

impl<T> Outcome<T> {
    pub fn degraded(reason: impl Into<String>) -> Self {
        Outcome::Degraded {
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Degraded { .. } => None,
        }
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Degraded { reason } => Some(reason),
        }
    }
}

/// A log excerpt supporting a step's root cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub source: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAnalysis {
    pub failure_category: FailureCategory,
    pub root_cause: String,
    pub evidence: Vec<EvidenceItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAnalysis {
    pub root_cause_summary: String,
}

/// Findings for one artifact path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFinding {
    pub artifact_path: String,
    pub key_findings: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub outcome: Outcome<StepAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_identifier: String,
    pub source_file: String,
    pub outcome: Outcome<TestAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub paths: Vec<String>,
    pub outcome: Outcome<Vec<ArtifactFinding>>,
}

impl BatchResult {
    /// One finding per batch path. Degraded batches yield a failure note
    /// for every path so the batch still shows up downstream.
    pub fn findings(&self) -> Vec<ArtifactFinding> {
        match &self.outcome {
            Outcome::Success(findings) => findings.clone(),
            Outcome::Degraded { reason } => self
                .paths
                .iter()
                .map(|path| ArtifactFinding {
                    artifact_path: path.clone(),
                    key_findings: format!("{ANALYSIS_FAILED_PREFIX}: {reason}"),
                })
                .collect(),
        }
    }
}

/// Exactly one of these exists per [`AnalysisUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitResult {
    Step(StepResult),
    Test(TestResult),
    ArtifactBatch(BatchResult),
}

impl UnitResult {
    pub fn kind(&self) -> UnitKind {
        match self {
            UnitResult::Step(_) => UnitKind::Step,
            UnitResult::Test(_) => UnitKind::Test,
            UnitResult::ArtifactBatch(_) => UnitKind::ArtifactBatch,
        }
    }

    pub fn is_degraded(&self) -> bool {
        match self {
            UnitResult::Step(r) => r.outcome.is_degraded(),
            UnitResult::Test(r) => r.outcome.is_degraded(),
            UnitResult::ArtifactBatch(r) => r.outcome.is_degraded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_batch_reports_every_path() {
        let result = BatchResult {
            paths: vec!["a.log".into(), "b.log".into()],
            outcome: Outcome::degraded("HTTP 500: boom"),
        };
        let findings = result.findings();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].artifact_path, "b.log");
        assert_eq!(findings[1].key_findings, "Analysis failed: HTTP 500: boom");
    }

    #[test]
    fn test_unit_result_serializes_with_kind_tag() {
        let result = UnitResult::Test(TestResult {
            test_identifier: "suite.case".into(),
            source_file: "junit.xml".into(),
            outcome: Outcome::degraded("timeout"),
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["kind"], "test");
        assert_eq!(value["outcome"]["status"], "degraded");
        assert_eq!(value["outcome"]["value"]["reason"], "timeout");
    }

    #[test]
    fn test_unit_key_is_descriptive() {
        let unit = AnalysisUnit::Step(StepUnit {
            step_name: "e2e/install".into(),
            log_content: String::new(),
            step_context: String::new(),
        });
        assert_eq!(unit.key(), "step:e2e/install");
        assert_eq!(unit.kind(), UnitKind::Step);
    }
}
