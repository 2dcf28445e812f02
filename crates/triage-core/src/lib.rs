//! Triage core: resilient multi-stage analysis of failed CI jobs.
//!
//! Evidence from a job (failed steps, failed tests, diagnostic artifacts) is
//! split into independent analysis units, budgeted against the model's
//! context window, sent to a reasoning service under a retry and degradation
//! policy, and joined by a final synthesis pass into one [`RcaReport`].

pub mod batcher;
pub mod budget;
pub mod config;
pub mod context_window;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod loader;
pub mod orchestrator;
pub mod parser;
pub mod reasoning;
pub mod redact;
pub mod reduce;
pub mod report;
pub mod retry;
pub mod store;
pub mod synthesis;
pub mod telemetry;

pub use batcher::{ArtifactBatcher, BatcherConfig};
pub use budget::{
    allocate, estimate_tokens, per_artifact_budget, BudgetConfig, ContextBudget, FailureCounts,
    TokenBudgets,
};
pub use config::AnalysisConfig;
pub use context_window::{ContextWindowResolver, ModelId, DEFAULT_CONTEXT_WINDOW};
pub use domain::{
    AnalysisUnit, ArtifactFinding, ArtifactItem, Batch, FailedStep, FailedTest, FailureCategory,
    JobEvidence, JobIdentity, Outcome, ParseError, ReasoningError, Result, StepGraph, StoreError,
    TriageError, UnitError, UnitKind, UnitResult,
};
pub use executor::UnitExecutor;
pub use loader::{split_patterns, EvidenceFilters, EvidenceLoader, JobManifest};
pub use orchestrator::{AnalysisPlan, Orchestrator, Planner};
pub use parser::{parse_record, parse_records, ResponseSchema};
pub use reasoning::{ReasoningRequest, ReasoningService};
pub use redact::{PatternRedactor, Redactor};
pub use reduce::{HeadTailReducer, LogReducer};
pub use report::{RcaReport, ReportAssembler};
pub use retry::{FailureClass, RetryConfig, RetryPolicy, Sleeper, TokioSleeper};
pub use store::{ArtifactStore, FsArtifactStore};
pub use synthesis::Diagnosis;
pub use telemetry::init_tracing;
