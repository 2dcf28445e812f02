//! Failure evidence gathered for one job run, before any analysis.

use serde::{Deserialize, Serialize};

/// Placeholder sent in place of an empty or missing step log.
pub const NO_LOG_CONTENT: &str = "(No log content available)";

/// Identity of the job run under analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobIdentity {
    pub job_name: String,
    pub build_id: String,
    #[serde(default)]
    pub pr_number: Option<String>,
    #[serde(default)]
    pub org_repo: Option<String>,
}

/// A pipeline step that did not pass, with its (possibly empty) log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub name: String,
    #[serde(default)]
    pub log: String,
}

impl FailedStep {
    pub fn new(name: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: log.into(),
        }
    }

    /// Last path segment of the step name, used for graph lookups.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// A failed test case, already extracted from a test report.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailedTest {
    pub test_name: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub failure_type: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub failure_content: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_content: Option<String>,
    #[serde(default)]
    pub system_out: Option<String>,
    #[serde(default)]
    pub system_err: Option<String>,
    #[serde(default)]
    pub source_file: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl FailedTest {
    /// `Class.name` when a class is known, else just the test name.
    pub fn test_identifier(&self) -> String {
        match present(&self.class_name) {
            Some(class) => format!("{class}.{}", self.test_name),
            None => self.test_name.clone(),
        }
    }

    pub fn effective_failure_type(&self) -> &str {
        present(&self.failure_type)
            .or_else(|| present(&self.error_type))
            .unwrap_or("Unknown")
    }

    pub fn effective_message(&self) -> &str {
        present(&self.failure_message)
            .or_else(|| present(&self.error_message))
            .unwrap_or("No message")
    }

    /// All captured output for the test, one labelled section per source.
    pub fn combined_details(&self) -> String {
        let sections = [
            ("Failure Content", &self.failure_content),
            ("Error Content", &self.error_content),
            ("System Out", &self.system_out),
            ("System Err", &self.system_err),
        ];

        let parts: Vec<String> = sections
            .iter()
            .filter_map(|&(label, value)| present(value).map(|text| format!("--- {label} ---\n{text}")))
            .collect();

        if parts.is_empty() {
            "No additional details available".to_string()
        } else {
            parts.join("\n\n")
        }
    }
}

/// One node of the pipeline's step dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepNode {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Step dependency graph as published by the CI system.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepGraph {
    #[serde(default)]
    pub nodes: Vec<StepNode>,
}

impl StepGraph {
    /// Describe where `step` sits in the graph.
    pub fn describe(graph: Option<&StepGraph>, step: &FailedStep) -> String {
        let Some(graph) = graph else {
            return format!("Step {} - no graph information available", step.name);
        };

        let short = step.short_name();
        match graph.nodes.iter().find(|node| node.name.contains(short)) {
            Some(node) => format!(
                "Step {} - dependencies: [{}]",
                step.name,
                node.dependencies.join(", ")
            ),
            None => format!("Step {} - part of pipeline execution", step.name),
        }
    }
}

/// A supplemental diagnostic file (cluster dump, pod log, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactItem {
    pub path: String,
    pub content: String,
}

impl ArtifactItem {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything known about a failed job run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobEvidence {
    pub identity: JobIdentity,
    #[serde(default)]
    pub failed_steps: Vec<FailedStep>,
    #[serde(default)]
    pub failed_tests: Vec<FailedTest>,
    #[serde(default)]
    pub step_graph: Option<StepGraph>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactItem>,
}

impl JobEvidence {
    pub fn has_failures(&self) -> bool {
        !self.failed_steps.is_empty() || !self.failed_tests.is_empty()
    }
}
