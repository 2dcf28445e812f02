//! End-to-end analysis of one job: plan units, run them, synthesize, report.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::batcher::ArtifactBatcher;
use crate::budget::{allocate, per_artifact_budget, ContextBudget, FailureCounts, TokenBudgets};
use crate::config::AnalysisConfig;
use crate::context_window::{ContextWindowResolver, ModelId};
use crate::domain::{
    AnalysisUnit, ArtifactItem, BatchUnit, JobEvidence, Result, StepGraph, StepUnit, TestUnit,
    TriageError, UnitResult,
};
use crate::executor::UnitExecutor;
use crate::reasoning::ReasoningService;
use crate::reduce::{HeadTailReducer, LogReducer};
use crate::report::{RcaReport, ReportAssembler};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::synthesis::synthesize;

/// Everything decided before the first reasoning call.
#[derive(Debug, Clone)]
pub struct AnalysisPlan {
    pub budget: ContextBudget,
    pub budgets: TokenBudgets,
    /// Steps first, then tests, then artifact batches.
    pub units: Vec<AnalysisUnit>,
}

/// Turns job evidence into budgeted units. Pure apart from logging.
#[derive(Clone)]
pub struct Planner {
    model: ModelId,
    config: AnalysisConfig,
    resolver: ContextWindowResolver,
    reducer: Arc<dyn LogReducer>,
}

impl Planner {
    pub fn new(model: ModelId, config: AnalysisConfig) -> Self {
        let resolver = config
            .context_window_overrides
            .iter()
            .fold(ContextWindowResolver::builtin(), |resolver, (key, tokens)| {
                resolver.with_entry(key.clone(), *tokens)
            });

        Self {
            model,
            config,
            resolver,
            reducer: Arc::new(HeadTailReducer::default()),
        }
    }

    pub fn with_reducer(mut self, reducer: Arc<dyn LogReducer>) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_resolver(mut self, resolver: ContextWindowResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// Context window in tokens: the configured value, else a catalog lookup.
    pub fn context_window(&self) -> u64 {
        match self.config.context_window {
            Some(tokens) => tokens,
            None => self.resolver.resolve(&self.model),
        }
    }

    /// Budget the job and build every unit. Makes no reasoning calls.
    pub fn plan(&self, evidence: &JobEvidence) -> Result<AnalysisPlan> {
        if !evidence.has_failures() {
            return Err(TriageError::PreconditionFailed(format!(
                "job {} has no failed steps or tests",
                evidence.identity.job_name
            )));
        }

        let budget = ContextBudget::new(self.context_window(), self.config.budget.reserved_fraction);
        let counts = FailureCounts {
            steps: evidence.failed_steps.len(),
            tests: evidence.failed_tests.len(),
            artifacts_present: !evidence.artifacts.is_empty(),
        };
        let budgets = allocate(counts, &budget);
        info!(
            model = %self.model,
            total_tokens = budget.total_tokens,
            usable_tokens = budget.usable_tokens,
            step = budgets.step,
            test = budgets.test,
            artifact_batch = budgets.artifact_batch,
            "allocated token budgets"
        );

        let mut units = Vec::new();

        for step in &evidence.failed_steps {
            units.push(AnalysisUnit::Step(StepUnit {
                step_name: step.name.clone(),
                log_content: self.reducer.reduce(&step.log, budgets.step, &step.name),
                step_context: StepGraph::describe(evidence.step_graph.as_ref(), step),
            }));
        }

        for test in &evidence.failed_tests {
            let test_identifier = test.test_identifier();
            units.push(AnalysisUnit::Test(TestUnit {
                failure_details: self.reducer.reduce(
                    &test.combined_details(),
                    budgets.test,
                    &test_identifier,
                ),
                failure_type: test.effective_failure_type().to_string(),
                failure_message: test.effective_message().to_string(),
                source_file: test.source_file.clone(),
                test_identifier,
            }));
        }

        if !evidence.artifacts.is_empty() {
            let per_artifact = per_artifact_budget(budgets.artifact_batch, evidence.artifacts.len());
            let reduced: Vec<ArtifactItem> = evidence
                .artifacts
                .iter()
                .map(|item| {
                    ArtifactItem::new(
                        item.path.clone(),
                        self.reducer.reduce(&item.content, per_artifact, &item.path),
                    )
                })
                .collect();

            let batches = ArtifactBatcher::new(self.config.batcher.clone())
                .pack(reduced, budgets.artifact_batch);
            let oversize = batches.iter().filter(|b| b.oversize).count();
            info!(
                artifacts = evidence.artifacts.len(),
                batches = batches.len(),
                oversize,
                per_artifact_tokens = per_artifact,
                "batched artifacts"
            );

            units.extend(
                batches
                    .into_iter()
                    .enumerate()
                    .map(|(index, batch)| AnalysisUnit::ArtifactBatch(BatchUnit { index, batch })),
            );
        }

        Ok(AnalysisPlan {
            budget,
            budgets,
            units,
        })
    }
}

/// Runs a job end to end against one shared reasoning service.
pub struct Orchestrator {
    service: Arc<dyn ReasoningService>,
    planner: Planner,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn ReasoningService>, model: ModelId, config: AnalysisConfig) -> Self {
        Self {
            service,
            planner: Planner::new(model, config),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_reducer(mut self, reducer: Arc<dyn LogReducer>) -> Self {
        self.planner = self.planner.with_reducer(reducer);
        self
    }

    pub fn with_resolver(mut self, resolver: ContextWindowResolver) -> Self {
        self.planner = self.planner.with_resolver(resolver);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn plan(&self, evidence: &JobEvidence) -> Result<AnalysisPlan> {
        self.planner.plan(evidence)
    }

    /// Analyse the job and assemble its report.
    ///
    /// Only a job with nothing to analyse is an error. Unit and synthesis
    /// failures degrade into the report instead.
    pub async fn analyze(&self, evidence: &JobEvidence) -> Result<RcaReport> {
        let plan = self.planner.plan(evidence)?;
        let config = self.planner.config();
        let policy = RetryPolicy::new(config.retry.clone()).with_sleeper(self.sleeper.clone());
        let executor = UnitExecutor::new(self.service.clone(), policy.clone());

        info!(
            job = %evidence.identity.job_name,
            units = plan.units.len(),
            concurrency = config.max_concurrency,
            "analysing job"
        );

        let results: Vec<UnitResult> = stream::iter(plan.units.iter())
            .map(|unit| executor.execute(unit))
            .buffered(config.max_concurrency.max(1))
            .collect()
            .await;

        let degraded = results.iter().filter(|r| r.is_degraded()).count();
        if degraded > 0 {
            warn!(degraded, total = results.len(), "some units degraded");
        }

        let diagnosis =
            synthesize(self.service.as_ref(), &policy, &evidence.identity, &results).await;
        match diagnosis.degraded_reason() {
            Some(reason) => warn!(reason, "synthesis degraded"),
            None => info!("synthesis complete"),
        }

        Ok(ReportAssembler::new(evidence.identity.clone()).assemble(results, diagnosis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailedStep, FailedTest, JobIdentity, StepNode, UnitKind};
    use crate::fakes::ScriptedReasoningService;

    fn orchestrator(config: AnalysisConfig) -> Orchestrator {
        Orchestrator::new(
            Arc::new(ScriptedReasoningService::new()),
            ModelId::new("openai", "unknown-model"),
            config,
        )
    }

    fn evidence() -> JobEvidence {
        JobEvidence {
            identity: JobIdentity {
                job_name: "e2e".into(),
                build_id: "1".into(),
                ..Default::default()
            },
            failed_steps: vec![FailedStep::new("e2e/install", "error: timeout")],
            failed_tests: vec![FailedTest {
                test_name: "case".into(),
                class_name: Some("suite".into()),
                source_file: "junit.xml".into(),
                ..Default::default()
            }],
            step_graph: Some(StepGraph {
                nodes: vec![StepNode {
                    name: "install".into(),
                    dependencies: vec!["setup".into()],
                }],
            }),
            artifacts: vec![
                ArtifactItem::new("artifacts/pods.json", "{}"),
                ArtifactItem::new("artifacts/events.json", "[]"),
            ],
        }
    }

    #[test]
    fn test_plan_requires_failures() {
        let err = orchestrator(AnalysisConfig::default())
            .plan(&JobEvidence::default())
            .unwrap_err();
        assert!(matches!(err, TriageError::PreconditionFailed(_)));
    }

    #[test]
    fn test_plan_orders_units_by_kind() {
        let plan = orchestrator(AnalysisConfig::default()).plan(&evidence()).unwrap();
        let kinds: Vec<UnitKind> = plan.units.iter().map(AnalysisUnit::kind).collect();
        assert_eq!(
            kinds,
            vec![UnitKind::Step, UnitKind::Test, UnitKind::ArtifactBatch]
        );

        let AnalysisUnit::Step(step) = &plan.units[0] else {
            panic!("expected step unit");
        };
        assert_eq!(step.step_context, "Step e2e/install - dependencies: [setup]");

        let AnalysisUnit::Test(test) = &plan.units[1] else {
            panic!("expected test unit");
        };
        assert_eq!(test.test_identifier, "suite.case");
        assert_eq!(test.failure_type, "Unknown");
        assert_eq!(test.failure_details, "No additional details available");
    }

    #[test]
    fn test_context_window_override_wins() {
        let config = AnalysisConfig {
            context_window: Some(32_000),
            ..Default::default()
        };
        let plan = orchestrator(config).plan(&evidence()).unwrap();
        assert_eq!(plan.budget.total_tokens, 32_000);
        assert_eq!(plan.budget.usable_tokens, 27_200);
    }

    #[test]
    fn test_config_overrides_feed_resolver() {
        let mut config = AnalysisConfig::default();
        config
            .context_window_overrides
            .insert("unknown-model".into(), 64_000);
        let plan = orchestrator(config).plan(&evidence()).unwrap();
        assert_eq!(plan.budget.total_tokens, 64_000);
    }

    #[test]
    fn test_long_step_log_is_reduced_to_budget() {
        let mut evidence = evidence();
        evidence.failed_steps[0].log = "noise line\n".repeat(100_000);
        let plan = orchestrator(AnalysisConfig::default()).plan(&evidence).unwrap();
        let AnalysisUnit::Step(step) = &plan.units[0] else {
            panic!("expected step unit");
        };
        assert!(crate::budget::estimate_tokens(&step.log_content) <= plan.budgets.step);
    }
}
