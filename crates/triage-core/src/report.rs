//! Final report assembly and rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    ArtifactFinding, FailureCategory, JobIdentity, Outcome, StepResult, TestResult, UnitResult,
    ANALYSIS_FAILED_PREFIX,
};
use crate::redact::Redactor;
use crate::synthesis::Diagnosis;

/// Canned findings that carry no information. Matched case-insensitively
/// as substrings.
pub const NOISE_PATTERNS: &[&str] = &[
    "no significant findings",
    "analysis failed",
    "no findings returned",
];

pub fn is_noise(finding: &str) -> bool {
    let lower = finding.to_lowercase();
    NOISE_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Immutable root-cause analysis report.
#[derive(Debug, Clone, Serialize)]
pub struct RcaReport {
    run_id: Uuid,
    generated_at: DateTime<Utc>,
    job: JobIdentity,
    summary: String,
    detailed_analysis: String,
    category: FailureCategory,
    synthesis_degraded: bool,
    step_results: Vec<StepResult>,
    test_results: Vec<TestResult>,
    artifact_results: Vec<ArtifactFinding>,
    contributing_paths: Vec<String>,
}

impl RcaReport {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn job(&self) -> &JobIdentity {
        &self.job
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn detailed_analysis(&self) -> &str {
        &self.detailed_analysis
    }

    pub fn category(&self) -> FailureCategory {
        self.category
    }

    pub fn synthesis_degraded(&self) -> bool {
        self.synthesis_degraded
    }

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    pub fn test_results(&self) -> &[TestResult] {
        &self.test_results
    }

    pub fn artifact_results(&self) -> &[ArtifactFinding] {
        &self.artifact_results
    }

    /// Paths selected by synthesis, before noise filtering.
    pub fn contributing_paths(&self) -> &[String] {
        &self.contributing_paths
    }

    /// Findings to display as contributing factors: selected by synthesis
    /// and not noise.
    pub fn contributing_factors(&self) -> Vec<&ArtifactFinding> {
        self.contributing_paths
            .iter()
            .filter_map(|path| {
                self.artifact_results
                    .iter()
                    .find(|finding| &finding.artifact_path == path)
            })
            .filter(|finding| !is_noise(&finding.key_findings))
            .collect()
    }

    /// Render the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        out.push_str("# Pipeline Failure Analysis\n\n");
        let _ = writeln!(out, "**Job:** `{}`", self.job.job_name);
        let _ = write!(out, "**Build:** `{}`", self.job.build_id);
        if let Some(pr) = self.job.pr_number.as_deref().filter(|pr| !pr.is_empty()) {
            let _ = write!(out, " | **PR:** #{pr}");
        }
        let _ = write!(out, " | **Category:** {}", self.category.title());
        out.push_str("\n\n---\n\n");

        let _ = write!(out, "## Root Cause\n\n{}\n\n", self.summary);
        let _ = write!(out, "## Technical Details\n\n{}\n\n", self.detailed_analysis);

        let factors = self.contributing_factors();
        if self.step_results.is_empty() && factors.is_empty() {
            return out;
        }

        out.push_str("## Evidence\n\n");
        for step in &self.step_results {
            match &step.outcome {
                Outcome::Success(analysis) => {
                    let _ = write!(
                        out,
                        "**{}** — *{}*\n\n{}\n\n",
                        step.step_name, analysis.failure_category, analysis.root_cause
                    );
                    for item in &analysis.evidence {
                        push_details(&mut out, &item.source, &fenced(&item.content));
                    }
                }
                Outcome::Degraded { reason } => {
                    let _ = write!(
                        out,
                        "**{}** — *{}*\n\n{ANALYSIS_FAILED_PREFIX}: `{reason}`\n\n",
                        step.step_name,
                        FailureCategory::Unknown
                    );
                }
            }
        }

        if !factors.is_empty() {
            out.push_str("### Contributing Factors\n\n");
            for finding in factors {
                push_details(&mut out, &finding.artifact_path, &finding.key_findings);
            }
        }

        out
    }

    /// Markdown with secrets scrubbed; the form that leaves the process.
    pub fn render_markdown(&self, redactor: &dyn Redactor) -> String {
        redactor.redact(&self.to_markdown())
    }

    /// Pretty JSON with secrets scrubbed.
    pub fn render_json(&self, redactor: &dyn Redactor) -> serde_json::Result<String> {
        Ok(redactor.redact(&serde_json::to_string_pretty(self)?))
    }
}

fn push_details(out: &mut String, label: &str, body: &str) {
    let _ = write!(
        out,
        "<details>\n<summary><code>{label}</code></summary>\n\n{body}\n</details>\n\n"
    );
}

/// Wrap `content` in a code fence longer than any backtick run inside it.
fn fenced(content: &str) -> String {
    let longest_run = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);
    format!("{fence}\n{}\n{fence}", content.trim_end_matches('\n'))
}

/// Builds the single [`RcaReport`] for a job. Consumed by [`assemble`](Self::assemble).
#[derive(Debug)]
pub struct ReportAssembler {
    job: JobIdentity,
}

impl ReportAssembler {
    pub fn new(job: JobIdentity) -> Self {
        Self { job }
    }

    pub fn assemble(self, results: Vec<UnitResult>, diagnosis: Outcome<Diagnosis>) -> RcaReport {
        let mut step_results = Vec::new();
        let mut test_results = Vec::new();
        let mut artifact_results = Vec::new();

        for result in results {
            match result {
                UnitResult::Step(step) => step_results.push(step),
                UnitResult::Test(test) => test_results.push(test),
                UnitResult::ArtifactBatch(batch) => artifact_results.extend(batch.findings()),
            }
        }

        let (diagnosis, synthesis_degraded) = match diagnosis {
            Outcome::Success(diagnosis) => (diagnosis, false),
            Outcome::Degraded { reason } => (Diagnosis::unavailable(&reason), true),
        };

        RcaReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            job: self.job,
            summary: diagnosis.summary,
            detailed_analysis: diagnosis.detailed_analysis,
            category: diagnosis.category,
            synthesis_degraded,
            step_results,
            test_results,
            artifact_results,
            contributing_paths: diagnosis.contributing_paths,
        }
    }
}
