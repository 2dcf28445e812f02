//! Assemble [`JobEvidence`] from an artifact store.
//!
//! The store root holds a `job.json` manifest describing the run. Missing
//! logs, graphs and artifacts are not errors: they just yield no evidence.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    ArtifactItem, FailedStep, FailedTest, JobEvidence, JobIdentity, Result, StepGraph, StoreError,
    TriageError,
};
use crate::store::ArtifactStore;

pub const MANIFEST_PATH: &str = "job.json";
pub const DEFAULT_STEP_GRAPH_PATH: &str = "artifacts/ci-operator-step-graph.json";
pub const DEFAULT_ARTIFACTS_PREFIX: &str = "artifacts/";

fn default_step_graph_path() -> String {
    DEFAULT_STEP_GRAPH_PATH.to_string()
}

fn default_artifacts_prefix() -> String {
    DEFAULT_ARTIFACTS_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub log_path: Option<String>,
}

/// Description of one job run, stored as `job.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub job_name: String,
    pub build_id: String,
    #[serde(default)]
    pub pr_number: Option<String>,
    #[serde(default)]
    pub org_repo: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub tests: Vec<FailedTest>,
    #[serde(default = "default_step_graph_path")]
    pub step_graph_path: String,
    #[serde(default = "default_artifacts_prefix")]
    pub artifacts_prefix: String,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let glob = Glob::new(pattern)
            .map_err(|e| TriageError::InvalidPattern(format!("{pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| TriageError::InvalidPattern(e.to_string()))
}

/// Step exclusions and artifact inclusions, as glob patterns.
#[derive(Debug, Clone)]
pub struct EvidenceFilters {
    ignored_steps: GlobSet,
    included_artifacts: GlobSet,
}

impl Default for EvidenceFilters {
    fn default() -> Self {
        Self {
            ignored_steps: GlobSet::empty(),
            included_artifacts: GlobSet::empty(),
        }
    }
}

impl EvidenceFilters {
    pub fn new(ignored_steps: &[String], included_artifacts: &[String]) -> Result<Self> {
        Ok(Self {
            ignored_steps: build_globset(ignored_steps)?,
            included_artifacts: build_globset(included_artifacts)?,
        })
    }

    pub fn is_step_ignored(&self, name: &str) -> bool {
        self.ignored_steps.is_match(name)
    }

    /// Artifacts are opt-in: with no patterns nothing is included.
    pub fn is_artifact_included(&self, path: &str) -> bool {
        self.included_artifacts.is_match(path)
    }
}

/// Split a comma-separated pattern list (as found in env vars).
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct EvidenceLoader<'a> {
    store: &'a dyn ArtifactStore,
    filters: &'a EvidenceFilters,
}

impl<'a> EvidenceLoader<'a> {
    pub fn new(store: &'a dyn ArtifactStore, filters: &'a EvidenceFilters) -> Self {
        Self { store, filters }
    }

    pub async fn load_manifest(&self) -> Result<JobManifest> {
        let raw = self.store.get(MANIFEST_PATH).await?;
        serde_json::from_str(&raw).map_err(|e| TriageError::InvalidManifest(e.to_string()))
    }

    /// Read `path`, treating absence (or an unreadable file) as no content.
    async fn read_optional(&self, path: &str) -> Option<String> {
        match self.store.get(path).await {
            Ok(content) => Some(content),
            Err(StoreError::NotFound(_)) => {
                debug!(path, "artifact not found");
                None
            }
            Err(e) => {
                warn!(path, error = %e, "failed to read artifact");
                None
            }
        }
    }

    pub async fn load(&self) -> Result<JobEvidence> {
        let manifest = self.load_manifest().await?;
        self.load_from_manifest(manifest).await
    }

    pub async fn load_from_manifest(&self, manifest: JobManifest) -> Result<JobEvidence> {
        // Step logs are evidence of their step, never artifacts.
        let log_paths: Vec<&str> = manifest
            .steps
            .iter()
            .filter_map(|s| s.log_path.as_deref())
            .collect();

        let mut failed_steps = Vec::new();
        for step in manifest.steps.iter().filter(|s| !s.passed) {
            if self.filters.is_step_ignored(&step.name) {
                info!(step = %step.name, "ignoring failed step");
                continue;
            }
            let log = match &step.log_path {
                Some(path) => self.read_optional(path).await.unwrap_or_default(),
                None => String::new(),
            };
            failed_steps.push(FailedStep::new(step.name.clone(), log));
        }

        let step_graph = match self.read_optional(&manifest.step_graph_path).await {
            Some(raw) => match serde_json::from_str::<StepGraph>(&raw) {
                Ok(graph) => Some(graph),
                Err(e) => {
                    warn!(path = %manifest.step_graph_path, error = %e, "unreadable step graph");
                    None
                }
            },
            None => None,
        };

        let mut artifacts = Vec::new();
        let listed = match self.store.list(&manifest.artifacts_prefix).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(prefix = %manifest.artifacts_prefix, error = %e, "failed to list artifacts");
                Vec::new()
            }
        };
        for path in listed {
            if !self.filters.is_artifact_included(&path)
                || log_paths.contains(&path.as_str())
                || path == manifest.step_graph_path
            {
                continue;
            }
            if let Some(content) = self.read_optional(&path).await {
                artifacts.push(ArtifactItem::new(path, content));
            }
        }

        info!(
            steps = failed_steps.len(),
            tests = manifest.tests.len(),
            artifacts = artifacts.len(),
            "loaded job evidence"
        );

        Ok(JobEvidence {
            identity: JobIdentity {
                job_name: manifest.job_name,
                build_id: manifest.build_id,
                pr_number: manifest.pr_number,
                org_repo: manifest.org_repo,
            },
            failed_steps,
            failed_tests: manifest.tests,
            step_graph,
            artifacts,
        })
    }
}
