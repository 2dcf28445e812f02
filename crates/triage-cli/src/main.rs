//! Triage CLI
//!
//! Root-cause analysis for a failed CI job, read from its evidence directory.
//!
//! ## Commands
//!
//! - `analyze`: run every analysis unit through the model and write the report
//! - `plan`: show budgets and units without calling the model

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use triage_core::{
    split_patterns, estimate_tokens, AnalysisConfig, AnalysisUnit, EvidenceFilters, EvidenceLoader,
    FsArtifactStore, JobEvidence, Orchestrator, PatternRedactor, Planner, TriageError,
};
use triage_llm::{ChatCompletionsClient, LlmConfig};

#[derive(Parser)]
#[command(name = "triage")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Root-cause analysis for failed CI jobs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a failed job and write its root-cause report
    Analyze {
        #[command(flatten)]
        evidence: EvidenceArgs,

        #[command(flatten)]
        llm: LlmArgs,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,

        /// Give up on the whole job after this many seconds
        #[arg(long, env = "TRIAGE_DEADLINE_SECS")]
        deadline_secs: Option<u64>,
    },

    /// Show token budgets and analysis units without calling the model
    Plan {
        #[command(flatten)]
        evidence: EvidenceArgs,

        #[command(flatten)]
        llm: LlmArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Args, Debug, Clone)]
struct EvidenceArgs {
    /// Directory holding job.json and the job's artifacts
    #[arg(short = 'd', long, env = "TRIAGE_EVIDENCE_DIR", default_value = ".")]
    evidence_dir: PathBuf,

    /// Analysis configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Job name (overrides the manifest)
    #[arg(long, env = "JOB_NAME")]
    job_name: Option<String>,

    /// Build ID (overrides the manifest)
    #[arg(long, env = "BUILD_ID")]
    build_id: Option<String>,

    /// Pull request number (overrides the manifest)
    #[arg(long, env = "PULL_NUMBER")]
    pr_number: Option<String>,

    /// Repository as org/repo (overrides the manifest)
    #[arg(long, env = "ORG_REPO")]
    org_repo: Option<String>,

    /// Comma-separated globs of step names to skip
    #[arg(long, env = "IGNORED_STEPS", default_value = "")]
    ignored_steps: String,

    /// Comma-separated globs of artifact paths to analyse
    #[arg(long, env = "INCLUDED_ARTIFACTS", default_value = "")]
    included_artifacts: String,

    /// Units analysed at the same time
    #[arg(long, env = "TRIAGE_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Context window in tokens, skipping the model catalog
    #[arg(long, env = "TRIAGE_CONTEXT_WINDOW")]
    context_window: Option<u64>,
}

#[derive(Args, Debug, Clone)]
struct LlmArgs {
    /// Model provider (openai, ollama, or any OpenAI-compatible endpoint)
    #[arg(long, env = "LLM_PROVIDER", default_value = "")]
    provider: String,

    /// Model name
    #[arg(long, env = "LLM_MODEL", default_value = "")]
    model: String,

    /// API key
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Endpoint base URL
    #[arg(long, env = "LLM_BASE_URL")]
    base_url: Option<String>,
}

impl LlmArgs {
    fn to_config(&self) -> LlmConfig {
        LlmConfig::from_lookup(|name| match name {
            "LLM_PROVIDER" => Some(self.provider.clone()),
            "LLM_MODEL" => Some(self.model.clone()),
            "LLM_API_KEY" => Some(self.api_key.clone()),
            "LLM_BASE_URL" => self.base_url.clone(),
            _ => None,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    triage_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Analyze {
            evidence,
            llm,
            output,
            format,
            deadline_secs,
        } => cmd_analyze(&evidence, &llm, output.as_deref(), format, deadline_secs).await,
        Commands::Plan { evidence, llm } => cmd_plan(&evidence, &llm).await,
    }
}

fn load_config(args: &EvidenceArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    if let Some(limit) = args.max_concurrency {
        config.max_concurrency = limit;
    }
    if let Some(tokens) = args.context_window {
        config.context_window = Some(tokens);
    }

    let errors = config.validate();
    if !errors.is_empty() {
        bail!("Invalid analysis config: {}", errors.join("; "));
    }
    Ok(config)
}

fn apply_identity_overrides(evidence: &mut JobEvidence, args: &EvidenceArgs) -> Result<()> {
    let set = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if let Some(name) = set(&args.job_name) {
        evidence.identity.job_name = name;
    }
    if let Some(build) = set(&args.build_id) {
        evidence.identity.build_id = build;
    }
    if let Some(pr) = set(&args.pr_number) {
        evidence.identity.pr_number = Some(pr);
    }
    if let Some(repo) = set(&args.org_repo) {
        evidence.identity.org_repo = Some(repo);
    }

    if evidence.identity.job_name.is_empty() {
        bail!("JOB_NAME is required (set it in job.json or pass --job-name)");
    }
    if evidence.identity.build_id.is_empty() {
        bail!("BUILD_ID is required (set it in job.json or pass --build-id)");
    }
    Ok(())
}

async fn load_evidence(args: &EvidenceArgs) -> Result<JobEvidence> {
    let filters = EvidenceFilters::new(
        &split_patterns(&args.ignored_steps),
        &split_patterns(&args.included_artifacts),
    )
    .context("Invalid step or artifact pattern")?;

    let store = FsArtifactStore::new(args.evidence_dir.clone());
    let mut evidence = EvidenceLoader::new(&store, &filters)
        .load()
        .await
        .with_context(|| {
            format!("Failed to load evidence from {}", args.evidence_dir.display())
        })?;

    apply_identity_overrides(&mut evidence, args)?;
    Ok(evidence)
}

async fn cmd_analyze(
    evidence_args: &EvidenceArgs,
    llm_args: &LlmArgs,
    output: Option<&Path>,
    format: OutputFormat,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let llm_config = llm_args.to_config();
    let errors = llm_config.validate();
    if !errors.is_empty() {
        bail!("Invalid LLM configuration:\n  - {}", errors.join("\n  - "));
    }

    let config = load_config(evidence_args)?;
    let evidence = load_evidence(evidence_args).await?;

    let model = llm_config.model_id();
    let client =
        ChatCompletionsClient::new(llm_config).context("Failed to create LLM client")?;
    let orchestrator = Orchestrator::new(Arc::new(client), model, config);

    let analysis = orchestrator.analyze(&evidence);
    let result = match deadline_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), analysis)
            .await
            .with_context(|| format!("Analysis did not finish within {secs}s"))?,
        None => analysis.await,
    };

    let report = match result {
        Ok(report) => report,
        Err(TriageError::PreconditionFailed(reason)) => {
            println!("Nothing to analyse: {reason}");
            return Ok(());
        }
        Err(e) => return Err(e).context("Analysis failed"),
    };

    let redactor = PatternRedactor::new();
    let rendered = match format {
        OutputFormat::Markdown => report.render_markdown(&redactor),
        OutputFormat::Json => report
            .render_json(&redactor)
            .context("Failed to serialize report")?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✓ Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    info!(
        run_id = %report.run_id(),
        category = %report.category(),
        synthesis_degraded = report.synthesis_degraded(),
        "analysis complete"
    );
    Ok(())
}

/// Content tokens a unit will send, before prompt overhead.
fn unit_tokens(unit: &AnalysisUnit) -> u64 {
    match unit {
        AnalysisUnit::Step(step) => estimate_tokens(&step.log_content),
        AnalysisUnit::Test(test) => estimate_tokens(&test.failure_details),
        AnalysisUnit::ArtifactBatch(batch) => batch.batch.estimated_tokens,
    }
}

async fn cmd_plan(evidence_args: &EvidenceArgs, llm_args: &LlmArgs) -> Result<()> {
    let config = load_config(evidence_args)?;
    let evidence = load_evidence(evidence_args).await?;

    let planner = Planner::new(llm_args.to_config().model_id(), config);
    let plan = match planner.plan(&evidence) {
        Ok(plan) => plan,
        Err(TriageError::PreconditionFailed(reason)) => {
            println!("Nothing to analyse: {reason}");
            return Ok(());
        }
        Err(e) => return Err(e).context("Planning failed"),
    };

    println!("Job:            {} (build {})", evidence.identity.job_name, evidence.identity.build_id);
    println!("Model:          {}", planner.model());
    println!(
        "Context window: {} tokens ({} usable)",
        plan.budget.total_tokens, plan.budget.usable_tokens
    );
    println!(
        "Budgets:        step {}, test {}, artifact batch {}",
        plan.budgets.step, plan.budgets.test, plan.budgets.artifact_batch
    );
    println!();
    println!("Units ({}):", plan.units.len());
    for unit in &plan.units {
        let marker = match unit {
            AnalysisUnit::ArtifactBatch(batch) if batch.batch.oversize => " (oversize)",
            _ => "",
        };
        println!("  {:<48} ~{} tokens{}", unit.key(), unit_tokens(unit), marker);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use triage_core::JobIdentity;

    fn evidence_args(dir: &Path) -> EvidenceArgs {
        EvidenceArgs {
            evidence_dir: dir.to_path_buf(),
            config: None,
            job_name: None,
            build_id: None,
            pr_number: None,
            org_repo: None,
            ignored_steps: String::new(),
            included_artifacts: String::new(),
            max_concurrency: None,
            context_window: None,
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze_flags() {
        let cli = Cli::try_parse_from([
            "triage",
            "analyze",
            "--evidence-dir",
            "/tmp/job",
            "--provider",
            "ollama",
            "--model",
            "llama3.1",
            "--format",
            "json",
            "--deadline-secs",
            "600",
            "--max-concurrency",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Analyze {
                evidence,
                llm,
                format,
                deadline_secs,
                output,
            } => {
                assert_eq!(evidence.evidence_dir, PathBuf::from("/tmp/job"));
                assert_eq!(evidence.max_concurrency, Some(2));
                assert_eq!(llm.provider, "ollama");
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(deadline_secs, Some(600));
                assert!(output.is_none());
            }
            Commands::Plan { .. } => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["triage", "plan", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_llm_args_are_normalized() {
        let args = LlmArgs {
            provider: " OpenAI ".into(),
            model: "gpt-4o".into(),
            api_key: String::new(),
            base_url: Some(String::new()),
        };
        let config = args.to_config();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.base_url, None);
        assert_eq!(config.validate(), vec!["LLM_API_KEY is required"]);
    }

    #[test]
    fn test_identity_overrides_replace_manifest_values() {
        let mut evidence = JobEvidence {
            identity: JobIdentity {
                job_name: "from-manifest".into(),
                build_id: "1".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut args = evidence_args(Path::new("."));
        args.job_name = Some("pull-e2e".into());
        args.pr_number = Some("42".into());
        args.org_repo = Some("  ".into());

        apply_identity_overrides(&mut evidence, &args).unwrap();
        assert_eq!(evidence.identity.job_name, "pull-e2e");
        assert_eq!(evidence.identity.build_id, "1");
        assert_eq!(evidence.identity.pr_number.as_deref(), Some("42"));
        assert_eq!(evidence.identity.org_repo, None);
    }

    #[test]
    fn test_identity_requires_build_id() {
        let mut evidence = JobEvidence::default();
        let mut args = evidence_args(Path::new("."));
        args.job_name = Some("pull-e2e".into());
        let err = apply_identity_overrides(&mut evidence, &args).unwrap_err();
        assert!(err.to_string().contains("BUILD_ID"));
    }

    #[test]
    fn test_load_config_applies_flag_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.json");
        std::fs::write(&path, r#"{"max_concurrency": 8, "retry": {"max_attempts": 2}}"#).unwrap();

        let mut args = evidence_args(dir.path());
        args.config = Some(path);
        args.context_window = Some(64_000);

        let config = load_config(&args).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.context_window, Some(64_000));

        args.max_concurrency = Some(0);
        assert!(load_config(&args).is_err());
    }

    #[tokio::test]
    async fn test_plan_reports_nothing_to_analyse_for_green_job() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("job.json"),
            r#"{"job_name": "pull-e2e", "build_id": "9", "steps": [{"name": "e2e/setup", "passed": true}]}"#,
        )
        .unwrap();

        let llm = LlmArgs {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: String::new(),
            base_url: None,
        };
        cmd_plan(&evidence_args(dir.path()), &llm).await.unwrap();
    }
}
