//! Domain types shared by every pipeline stage.

pub mod category;
pub mod error;
pub mod evidence;
pub mod unit;

pub use category::FailureCategory;
pub use error::{ParseError, ReasoningError, Result, StoreError, TriageError, UnitError};
pub use evidence::{
    ArtifactItem, FailedStep, FailedTest, JobEvidence, JobIdentity, StepGraph, StepNode,
    NO_LOG_CONTENT,
};
pub use unit::{
    AnalysisUnit, ArtifactFinding, Batch, BatchResult, BatchUnit, EvidenceItem, Outcome,
    StepAnalysis, StepResult, StepUnit, TestAnalysis, TestResult, TestUnit, UnitKind, UnitResult,
    ANALYSIS_FAILED_PREFIX,
};
