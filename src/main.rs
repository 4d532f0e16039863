//! riskgate — pre-commit code-risk oracle.
//!
//! Thin CLI over the `risk-pipeline` crate: loads env configuration,
//! opens the graph gateway, wires the (optional) LLM service, runs one
//! assessment over the working tree, and renders the result.
//!
//! Exit codes: 0 LOW/MEDIUM, 1 HIGH, 2 CRITICAL, 3 degraded/timeout,
//! 4 error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ai_llm_service::config::default_config;
use ai_llm_service::service_profiles::LlmServiceProfiles;
use graph_gateway::{GatewayConfig, GraphGateway, MetricCache};
use risk_pipeline::model::{AiMode, AssessOptions, RiskAssessment, Tier};
use risk_pipeline::{PipelineDeps, PlannerClient};

#[derive(Debug, Parser)]
#[command(name = "riskgate", about = "Assess the risk of uncommitted changes")]
struct Cli {
    /// Repository root (defaults to the current directory).
    repo: Option<PathBuf>,

    /// Comparison base reference.
    #[arg(long, default_value = "HEAD")]
    base: String,

    /// Assess staged changes only.
    #[arg(long)]
    staged: bool,

    /// Raise the global time limit for a thorough run.
    #[arg(long)]
    deep: bool,

    /// LLM involvement.
    #[arg(long, value_enum, default_value_t = AiArg::Auto)]
    ai: AiArg,

    /// Machine-readable JSON output.
    #[arg(long)]
    json: bool,

    /// Include per-category scores and warnings in the output.
    #[arg(long)]
    explain: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AiArg {
    Off,
    Auto,
    Force,
}

impl From<AiArg> for AiMode {
    fn from(a: AiArg) -> Self {
        match a {
            AiArg::Off => AiMode::Off,
            AiArg::Auto => AiMode::Auto,
            AiArg::Force => AiMode::Force,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional for a CLI; real env always wins.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // warn globally, info for our own crates; RUST_LOG overrides the base.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive("riskgate=info".parse().expect("valid directive"))
        .add_directive("risk_pipeline=info".parse().expect("valid directive"))
        .add_directive("ai_llm_service=info".parse().expect("valid directive"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let gateway = match GraphGateway::open(GatewayConfig::load_from_env_or_default()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(4);
        }
    };

    let llm = build_llm(cli.ai);
    let config = risk_pipeline::config::PolicyConfig::load_from_env_or_default();
    let metric_cache = MetricCache::new();

    let options = AssessOptions {
        base_ref: cli.base.clone(),
        staged_only: cli.staged,
        deep: cli.deep,
        ai_mode: cli.ai.into(),
        explain: cli.explain,
        ..Default::default()
    };

    let repo = cli.repo.clone().unwrap_or_else(|| PathBuf::from("."));
    let deps = PipelineDeps {
        gateway: &gateway,
        llm: llm.as_ref(),
        metric_cache: &metric_cache,
        config: &config,
    };

    match risk_pipeline::assess(&repo, &options, &deps).await {
        Ok(assessment) => {
            if cli.json {
                match serde_json::to_string_pretty(&assessment) {
                    Ok(s) => println!("{s}"),
                    Err(e) => {
                        eprintln!("error: failed to render assessment: {e}");
                        return ExitCode::from(4);
                    }
                }
            } else {
                print_human(&assessment, cli.explain);
            }
            ExitCode::from(assessment.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(4)
        }
    }
}

/// Build the LLM client from env profiles; absence degrades to `None`
/// (the pipeline then skips the investigation phase).
fn build_llm(ai: AiArg) -> Option<PlannerClient> {
    if matches!(ai, AiArg::Off) {
        return None;
    }
    let planner = match default_config::config_planner() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("no planner profile configured: {e}");
            return None;
        }
    };
    let synthesis = default_config::config_synthesis().ok();
    let embedding = default_config::config_embedding().ok();
    let concurrency = std::env::var("LLM_CONCURRENCY")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    match LlmServiceProfiles::new(planner, synthesis, embedding, concurrency, None) {
        Ok(profiles) => Some(PlannerClient::Service(Arc::new(profiles))),
        Err(e) => {
            tracing::warn!("LLM service unavailable: {e}");
            None
        }
    }
}

fn print_human(a: &RiskAssessment, explain: bool) {
    let tier = match a.tier {
        Tier::Low => a.tier.as_str().green().bold(),
        Tier::Medium => a.tier.as_str().yellow().bold(),
        Tier::High => a.tier.as_str().red().bold(),
        Tier::Critical => a.tier.as_str().bright_red().bold(),
    };
    println!(
        "{tier}  score {:.0}/100  confidence {:.0}%  ({} ms)",
        a.score,
        a.confidence * 100.0,
        a.elapsed_ms
    );
    println!("{}", a.summary);

    if !a.citations.is_empty() {
        println!("\nEvidence:");
        for e in &a.citations {
            println!(
                "  [{}] {:.2}  {}",
                e.kind_str(),
                e.weight(),
                e.human_description()
            );
        }
    }

    if let Some(reason) = a.terminated_reason {
        println!("\n{} {}", "degraded:".yellow(), reason.as_str());
    }

    if explain {
        println!("\nCategories:");
        for (name, value) in &a.per_category_scores {
            println!("  {name}: {value:.2}");
        }
        for w in &a.warnings {
            println!("  {} {w}", "warning:".yellow());
        }
    }
}
