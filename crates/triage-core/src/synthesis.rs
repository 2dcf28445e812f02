//! Final cross-unit synthesis.
//!
//! Runs once, after every unit result exists. Degraded units are passed on
//! as context with their failure text; nothing collected so far is dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{
    ArtifactFinding, FailureCategory, JobIdentity, Outcome, UnitError, UnitResult,
    ANALYSIS_FAILED_PREFIX,
};
use crate::parser::{parse_record, SynthesisResponse};
use crate::reasoning::{
    ReasoningRequest, ReasoningService, StepDigest, SupplementalContext, SynthesisRequest,
    TestDigest,
};
use crate::retry::RetryPolicy;

/// Label attached to artifact findings in the synthesis request.
pub const SUPPLEMENTAL_CONTEXT_NOTE: &str =
    "Supplemental context, not failure sources: diagnostic artifacts describe the environment only.";

/// Upper bound on contributing artifact paths kept from synthesis.
pub const MAX_CONTRIBUTING_PATHS: usize = 10;

/// Cross-unit diagnosis produced by synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub summary: String,
    pub detailed_analysis: String,
    pub category: FailureCategory,
    /// Ranked artifact paths, restricted to paths that were analysed.
    pub contributing_paths: Vec<String>,
}

impl Diagnosis {
    /// Diagnosis used when synthesis itself degraded.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            summary: format!("RCA generation failed: {reason}"),
            detailed_analysis: "Unable to generate detailed analysis.".to_string(),
            category: FailureCategory::Unknown,
            contributing_paths: Vec::new(),
        }
    }
}

/// All artifact findings across batch results, in batch order.
pub fn collect_findings(results: &[UnitResult]) -> Vec<ArtifactFinding> {
    results
        .iter()
        .filter_map(|result| match result {
            UnitResult::ArtifactBatch(batch) => Some(batch.findings()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Build the synthesis request from every unit result.
pub fn build_request(job: &JobIdentity, results: &[UnitResult]) -> SynthesisRequest {
    let mut steps = Vec::new();
    let mut tests = Vec::new();

    for result in results {
        match result {
            UnitResult::Step(step) => steps.push(match &step.outcome {
                Outcome::Success(analysis) => StepDigest {
                    step_name: step.step_name.clone(),
                    failure_category: analysis.failure_category.to_string(),
                    root_cause: analysis.root_cause.clone(),
                    evidence: analysis.evidence.clone(),
                },
                Outcome::Degraded { reason } => StepDigest {
                    step_name: step.step_name.clone(),
                    failure_category: FailureCategory::Unknown.to_string(),
                    root_cause: format!("{ANALYSIS_FAILED_PREFIX}: {reason}"),
                    evidence: Vec::new(),
                },
            }),
            UnitResult::Test(test) => tests.push(TestDigest {
                test_identifier: test.test_identifier.clone(),
                source_file: test.source_file.clone(),
                root_cause_summary: match &test.outcome {
                    Outcome::Success(analysis) => analysis.root_cause_summary.clone(),
                    Outcome::Degraded { reason } => format!("{ANALYSIS_FAILED_PREFIX}: {reason}"),
                },
            }),
            UnitResult::ArtifactBatch(_) => {}
        }
    }

    SynthesisRequest {
        job_name: job.job_name.clone(),
        build_id: job.build_id.clone(),
        pr_number: job.pr_number.clone(),
        steps,
        tests,
        supplemental: SupplementalContext {
            note: SUPPLEMENTAL_CONTEXT_NOTE.to_string(),
            findings: collect_findings(results),
        },
    }
}

/// Keep selected paths that were actually analysed, first occurrence wins,
/// at most [`MAX_CONTRIBUTING_PATHS`].
pub fn select_contributing_paths(selected: &[String], known: &[ArtifactFinding]) -> Vec<String> {
    let known: HashSet<&str> = known.iter().map(|f| f.artifact_path.as_str()).collect();
    let mut seen = HashSet::new();

    selected
        .iter()
        .map(|path| path.trim())
        .filter(|path| known.contains(path) && seen.insert(*path))
        .take(MAX_CONTRIBUTING_PATHS)
        .map(str::to_string)
        .collect()
}

async fn attempt_synthesis(
    service: &dyn ReasoningService,
    request: &ReasoningRequest,
) -> Result<SynthesisResponse, UnitError> {
    let raw = service.complete(request).await?;
    Ok(parse_record(&raw)?)
}

/// Run synthesis under the retry policy.
pub async fn synthesize(
    service: &dyn ReasoningService,
    policy: &RetryPolicy,
    job: &JobIdentity,
    results: &[UnitResult],
) -> Outcome<Diagnosis> {
    let request = build_request(job, results);
    let known = request.supplemental.findings.clone();
    info!(
        steps = request.steps.len(),
        tests = request.tests.len(),
        artifacts = known.len(),
        "synthesizing diagnosis"
    );

    let request = &ReasoningRequest::Synthesis(request);
    let outcome = policy
        .run("synthesis", move |_| attempt_synthesis(service, request))
        .await;

    match outcome {
        Outcome::Success(response) => {
            let contributing_paths =
                select_contributing_paths(&response.contributing_artifact_paths, &known);
            let dropped = response
                .contributing_artifact_paths
                .len()
                .saturating_sub(contributing_paths.len());
            if dropped > 0 {
                warn!(dropped, "ignored contributing paths that were not analysed or repeated");
            }
            Outcome::Success(Diagnosis {
                summary: response.summary,
                detailed_analysis: response.detailed_analysis,
                category: FailureCategory::from_label(&response.category),
                contributing_paths,
            })
        }
        Outcome::Degraded { reason } => Outcome::Degraded { reason },
    }
}
