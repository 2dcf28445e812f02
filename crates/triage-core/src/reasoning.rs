//! Reasoning service seam.
//!
//! The pipeline treats the service as the only source of domain judgment.
//! It sends one fixed-shape request per unit kind and gets back raw text,
//! which the output parser turns into typed records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactFinding, ArtifactItem, EvidenceItem, ReasoningError, UnitKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRequest {
    pub step_name: String,
    pub log_content: String,
    pub step_context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRequest {
    pub test_identifier: String,
    pub failure_type: String,
    pub failure_message: String,
    pub failure_details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBatchRequest {
    pub artifacts: Vec<ArtifactItem>,
}

/// Step outcome as presented to synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDigest {
    pub step_name: String,
    pub failure_category: String,
    pub root_cause: String,
    pub evidence: Vec<EvidenceItem>,
}

/// Test outcome as presented to synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDigest {
    pub test_identifier: String,
    pub source_file: String,
    pub root_cause_summary: String,
}

/// Artifact findings, labelled so they are not mistaken for failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplementalContext {
    pub note: String,
    pub findings: Vec<ArtifactFinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub job_name: String,
    pub build_id: String,
    pub pr_number: Option<String>,
    pub steps: Vec<StepDigest>,
    pub tests: Vec<TestDigest>,
    pub supplemental: SupplementalContext,
}

/// One request to the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningRequest {
    Step(StepRequest),
    Test(TestRequest),
    ArtifactBatch(ArtifactBatchRequest),
    Synthesis(SynthesisRequest),
}

impl ReasoningRequest {
    pub fn kind(&self) -> UnitKind {
        match self {
            ReasoningRequest::Step(_) => UnitKind::Step,
            ReasoningRequest::Test(_) => UnitKind::Test,
            ReasoningRequest::ArtifactBatch(_) => UnitKind::ArtifactBatch,
            ReasoningRequest::Synthesis(_) => UnitKind::Synthesis,
        }
    }
}

/// External reasoning service (an LLM behind some API).
///
/// Implementations return the raw response text. They must not retry on
/// their own; retry and degradation belong to the pipeline.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}
