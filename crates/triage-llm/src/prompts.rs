//! Prompt rendering for each request kind.
//!
//! Every system prompt pins down the exact JSON the parser expects.

use serde_json::{Map, Value};
use triage_core::{ReasoningRequest, UnitKind};

const STEP_SYSTEM: &str = "\
You analyze a failed CI pipeline step and identify its root cause.

The log may have been shortened: the head and tail are kept and omitted \
lines are marked. Focus on errors, exceptions and the final output lines. \
Be concise and specific.

Respond with a single JSON object and nothing else:
{
  \"failure_category\": \"infrastructure\" | \"test\" | \"build\" | \"configuration\" | \"timeout\" | \"unknown\",
  \"root_cause\": \"concise technical root cause, 1-2 sentences\",
  \"evidence\": [{\"source\": \"where the excerpt comes from\", \"content\": \"verbatim log excerpt\"}]
}
Give 3-5 evidence items. Be selective.";

const TEST_SYSTEM: &str = "\
You analyze a failed test from xUnit results.

Identify the immediate failure, not its symptoms. Distinguish creation \
failures from validation failures and timeouts. Be concise and technical.

Respond with a single JSON object and nothing else:
{\"root_cause_summary\": \"one sentence stating the immediate technical cause\"}";

const ARTIFACT_SYSTEM: &str = "\
You extract key findings from diagnostic artifacts of a failed CI job.

Artifacts describe cluster and system state. They are NOT failure sources: \
extract relevant environmental details and anomalies. Treat each artifact \
independently.

Respond with a JSON array and nothing else, one element per artifact:
[{\"artifact_path\": \"exact path as given\", \"key_findings\": \"2-3 sentences\"}]";

const SYNTHESIS_SYSTEM: &str = "\
You write a concise root cause analysis for a failed CI job.

Identify the PRIMARY blocking failure: what failed first and prevented other \
operations. Distinguish primary failures from secondary quality checks. \
Cross-reference the step and test analyses to understand causation. Use only \
facts from the analyses. Artifact findings are supplemental environment \
context, not failures.

Respond with a single JSON object and nothing else:
{
  \"summary\": \"one sentence stating what failed\",
  \"detailed_analysis\": \"markdown bullets: - **Immediate Cause:** ... - **Contributing Factors:** ... - **Impact:** ...\",
  \"category\": \"infrastructure\" | \"test\" | \"build\" | \"configuration\" | \"timeout\" | \"unknown\",
  \"contributing_artifact_paths\": [\"artifact paths that help explain the failure, most relevant first, at most 10\"]
}";

pub fn system_prompt(kind: UnitKind) -> &'static str {
    match kind {
        UnitKind::Step => STEP_SYSTEM,
        UnitKind::Test => TEST_SYSTEM,
        UnitKind::ArtifactBatch => ARTIFACT_SYSTEM,
        UnitKind::Synthesis => SYNTHESIS_SYSTEM,
    }
}

pub fn user_prompt(request: &ReasoningRequest) -> serde_json::Result<String> {
    let prompt = match request {
        ReasoningRequest::Step(step) => format!(
            "Step name: {}\nStep context: {}\n\nLog content:\n{}",
            step.step_name, step.step_context, step.log_content
        ),
        ReasoningRequest::Test(test) => format!(
            "Test: {}\nFailure type: {}\nFailure message: {}\n\nFailure details:\n{}",
            test.test_identifier, test.failure_type, test.failure_message, test.failure_details
        ),
        ReasoningRequest::ArtifactBatch(batch) => {
            let artifacts: Map<String, Value> = batch
                .artifacts
                .iter()
                .map(|item| (item.path.clone(), Value::String(item.content.clone())))
                .collect();
            format!("Artifacts (path -> content):\n{}", serde_json::to_string_pretty(&artifacts)?)
        }
        ReasoningRequest::Synthesis(synthesis) => format!(
            "Job: {}\nBuild: {}\nPR: {}\n\nFailed steps:\n{}\n\nFailed tests:\n{}\n\nAdditional context:\n{}",
            synthesis.job_name,
            synthesis.build_id,
            synthesis.pr_number.as_deref().unwrap_or("N/A"),
            serde_json::to_string_pretty(&synthesis.steps)?,
            serde_json::to_string_pretty(&synthesis.tests)?,
            serde_json::to_string_pretty(&synthesis.supplemental)?,
        ),
    };
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::reasoning::{
        ArtifactBatchRequest, StepRequest, SupplementalContext, SynthesisRequest,
    };
    use triage_core::ArtifactItem;

    #[test]
    fn test_system_prompts_name_required_fields() {
        assert!(system_prompt(UnitKind::Step).contains("\"failure_category\""));
        assert!(system_prompt(UnitKind::Test).contains("\"root_cause_summary\""));
        assert!(system_prompt(UnitKind::ArtifactBatch).contains("\"artifact_path\""));
        assert!(system_prompt(UnitKind::Synthesis).contains("\"contributing_artifact_paths\""));
    }

    #[test]
    fn test_step_prompt_carries_context() {
        let prompt = user_prompt(&ReasoningRequest::Step(StepRequest {
            step_name: "e2e/install".into(),
            log_content: "level=error".into(),
            step_context: "Step e2e/install - part of pipeline execution".into(),
        }))
        .unwrap();
        assert!(prompt.starts_with("Step name: e2e/install\n"));
        assert!(prompt.ends_with("Log content:\nlevel=error"));
    }

    #[test]
    fn test_artifact_prompt_maps_paths_to_content() {
        let prompt = user_prompt(&ReasoningRequest::ArtifactBatch(ArtifactBatchRequest {
            artifacts: vec![ArtifactItem::new("pods.json", "{\"items\": []}")],
        }))
        .unwrap();
        assert!(prompt.contains("\"pods.json\": \"{\\\"items\\\": []}\""));
    }

    #[test]
    fn test_synthesis_prompt_without_pr() {
        let prompt = user_prompt(&ReasoningRequest::Synthesis(SynthesisRequest {
            job_name: "periodic-e2e".into(),
            build_id: "7".into(),
            pr_number: None,
            steps: vec![],
            tests: vec![],
            supplemental: SupplementalContext {
                note: "context only".into(),
                findings: vec![],
            },
        }))
        .unwrap();
        assert!(prompt.contains("PR: N/A"));
        assert!(prompt.contains("\"note\": \"context only\""));
    }
}
