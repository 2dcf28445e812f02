//! Per-kind unit executors.
//!
//! Each `analyze_*` function makes exactly one reasoning call and either
//! returns typed output or a [`UnitError`]. [`UnitExecutor`] wraps them in the
//! retry policy so every unit yields exactly one [`UnitResult`].

use std::sync::Arc;

use tracing::info;

use crate::domain::{
    AnalysisUnit, ArtifactFinding, BatchResult, BatchUnit, FailureCategory, StepAnalysis,
    StepResult, StepUnit, TestAnalysis, TestResult, TestUnit, UnitError, UnitResult,
    NO_LOG_CONTENT,
};
use crate::parser::{parse_record, parse_records, StepResponse, TestResponse};
use crate::reasoning::{
    ArtifactBatchRequest, ReasoningRequest, ReasoningService, StepRequest, TestRequest,
};
use crate::retry::RetryPolicy;

/// Finding recorded for a batch path the service said nothing about.
pub const NO_FINDINGS_RETURNED: &str = "No findings returned";

pub async fn analyze_step(
    service: &dyn ReasoningService,
    unit: &StepUnit,
) -> Result<StepAnalysis, UnitError> {
    let log_content = if unit.log_content.trim().is_empty() {
        NO_LOG_CONTENT.to_string()
    } else {
        unit.log_content.clone()
    };

    let request = ReasoningRequest::Step(StepRequest {
        step_name: unit.step_name.clone(),
        log_content,
        step_context: unit.step_context.clone(),
    });
    let raw = service.complete(&request).await?;
    let response: StepResponse = parse_record(&raw)?;

    Ok(StepAnalysis {
        failure_category: FailureCategory::from_label(&response.failure_category),
        root_cause: response.root_cause,
        evidence: response.evidence,
    })
}

pub async fn analyze_test(
    service: &dyn ReasoningService,
    unit: &TestUnit,
) -> Result<TestAnalysis, UnitError> {
    let request = ReasoningRequest::Test(TestRequest {
        test_identifier: unit.test_identifier.clone(),
        failure_type: unit.failure_type.clone(),
        failure_message: unit.failure_message.clone(),
        failure_details: unit.failure_details.clone(),
    });
    let raw = service.complete(&request).await?;
    let response: TestResponse = parse_record(&raw)?;

    Ok(TestAnalysis {
        root_cause_summary: response.root_cause_summary,
    })
}

/// Analyse a batch. The result holds one finding per batch path, in batch
/// order; paths the service invented are dropped.
pub async fn analyze_artifact_batch(
    service: &dyn ReasoningService,
    unit: &BatchUnit,
) -> Result<Vec<ArtifactFinding>, UnitError> {
    let request = ReasoningRequest::ArtifactBatch(ArtifactBatchRequest {
        artifacts: unit.batch.items.clone(),
    });
    let raw = service.complete(&request).await?;
    let records: Vec<ArtifactFinding> = parse_records(&raw)?;

    Ok(align_findings(&unit.batch.paths(), records))
}

fn align_findings(paths: &[String], mut records: Vec<ArtifactFinding>) -> Vec<ArtifactFinding> {
    paths
        .iter()
        .map(|path| {
            match records
                .iter()
                .position(|r| r.artifact_path.trim() == path.as_str())
            {
                Some(idx) => {
                    let record = records.swap_remove(idx);
                    ArtifactFinding {
                        artifact_path: path.clone(),
                        key_findings: record.key_findings,
                    }
                }
                None => ArtifactFinding {
                    artifact_path: path.clone(),
                    key_findings: NO_FINDINGS_RETURNED.to_string(),
                },
            }
        })
        .collect()
}

/// Runs units under the retry policy against one shared service handle.
#[derive(Clone)]
pub struct UnitExecutor {
    service: Arc<dyn ReasoningService>,
    policy: RetryPolicy,
}

impl UnitExecutor {
    pub fn new(service: Arc<dyn ReasoningService>, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    /// Execute one unit. Never fails; failures become degraded results.
    pub async fn execute(&self, unit: &AnalysisUnit) -> UnitResult {
        let key = unit.key();
        info!(unit = %key, "analysing unit");
        let service = self.service.as_ref();

        match unit {
            AnalysisUnit::Step(step) => UnitResult::Step(StepResult {
                step_name: step.step_name.clone(),
                outcome: self
                    .policy
                    .run(&key, move |_| analyze_step(service, step))
                    .await,
            }),
            AnalysisUnit::Test(test) => UnitResult::Test(TestResult {
                test_identifier: test.test_identifier.clone(),
                source_file: test.source_file.clone(),
                outcome: self
                    .policy
                    .run(&key, move |_| analyze_test(service, test))
                    .await,
            }),
            AnalysisUnit::ArtifactBatch(batch) => UnitResult::ArtifactBatch(BatchResult {
                paths: batch.batch.paths(),
                outcome: self
                    .policy
                    .run(&key, move |_| analyze_artifact_batch(service, batch))
                    .await,
            }),
        }
    }
}
