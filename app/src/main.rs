// ==============================================================================
// main.rs - SNP Annotator Entry Point
// ==============================================================================
// Description: Command-line runner: load corpus, analyze one genome file,
//              export the report
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snp_annotator::config::EngineConfig;
use snp_annotator::models::{AnalysisRequest, LaneKind};
use snp_annotator::output::{write_export, ExportFormat};
use snp_annotator::reference_index::ReferenceIndex;
use snp_annotator::scheduler::LanePolicy;
use snp_annotator::session::{AnalysisService, CorpusHandle, SessionState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Reference corpus (SQLite snps table, or .jsonl / .jsonl.gz records)
    #[arg(short, long, env = "SNP_CORPUS")]
    corpus: PathBuf,

    /// Raw genome file (23andMe format, plain or gzip)
    #[arg(short, long)]
    input: PathBuf,

    /// Minimum magnitude to report (0 reports every typed finding)
    #[arg(short, long, default_value_t = 0.0)]
    threshold: f64,

    /// Examine only the first N calls
    #[arg(short, long)]
    limit: Option<usize>,

    /// Engine config file (JSON)
    #[arg(long, env = "SNP_ANNOTATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Lane policy (adaptive, round-robin, scalar, vector, accelerator)
    #[arg(long)]
    policy: Option<String>,

    /// Disable the accelerator lane
    #[arg(long)]
    no_accelerator: bool,

    /// Export format (json or tsv)
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Output directory for the report
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Number of top significant findings to log
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "SNP_ANNOTATOR_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snp_annotator=info,audit=info".into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("SNP Annotator starting...");

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(policy) = &args.policy {
        config.scheduler.policy = match policy.to_lowercase().as_str() {
            "adaptive" => LanePolicy::Adaptive,
            "round-robin" | "roundrobin" => LanePolicy::RoundRobin,
            "scalar" => LanePolicy::Only(LaneKind::Scalar),
            "vector" => LanePolicy::Only(LaneKind::Vector),
            "accelerator" => LanePolicy::Only(LaneKind::Accelerator),
            _ => {
                warn!("Invalid lane policy '{}', using adaptive", policy);
                LanePolicy::Adaptive
            }
        };
    }
    if args.no_accelerator {
        config.scheduler.accelerator.enabled = false;
    }

    let format = match args.format.to_lowercase().as_str() {
        "json" => ExportFormat::Json,
        "tsv" => ExportFormat::Tsv,
        _ => {
            warn!("Invalid export format '{}', using json", args.format);
            ExportFormat::Json
        }
    };

    // Load the corpus once; every session shares it
    let index = ReferenceIndex::open(&args.corpus)
        .with_context(|| format!("Failed to load corpus {}", args.corpus.display()))?;
    let service = AnalysisService::new(CorpusHandle::resident(Arc::new(index)), config)?;

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read genome file {}", args.input.display()))?;
    let name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    let session = service.create_session();
    let upload = service.upload(session, name.as_deref(), &bytes)?;
    info!(
        "Uploaded {} calls ({} malformed lines skipped)",
        upload.calls, upload.malformed_lines
    );

    let request = AnalysisRequest {
        magnitude_threshold: args.threshold,
        limit: args.limit,
    };
    service.start_analysis(session, request)?;

    let state = service.wait(session).await?;
    if state != SessionState::Completed {
        let status = service.get_status(session)?;
        anyhow::bail!(
            "Analysis ended in state {:?}: {}",
            state,
            status.error.unwrap_or_default()
        );
    }

    let result = service.get_result(session)?;
    for warning in &result.degraded_lanes {
        warn!("Lane {} degraded: {}", warning.lane, warning.reason);
    }

    let significant = service.config().scoring.significant_magnitude;
    let path = write_export(&result, format, &args.output_dir, &session.to_string())?;

    info!(
        "Analysis complete: {} calls, {} matched, {} reported, strategy {}",
        result.counters.total_calls,
        result.counters.matched,
        result.findings.len(),
        result.strategy.label()
    );
    info!(
        "Average significant magnitude {}, {} high-magnitude findings",
        result.average_magnitude, result.counters.high_magnitude
    );
    for finding in result.top_findings(args.top, significant) {
        info!(
            "Top finding {} ({}) magnitude {} {}: {}",
            finding.rsid,
            finding.genotype,
            finding.magnitude.unwrap_or_default(),
            finding.repute.as_str(),
            finding.summary.as_deref().unwrap_or("-")
        );
    }
    info!(
        "Metrics: risk appetite {}%, discipline {}%, panic propensity {}%, resilience {}%",
        result.metrics.risk_appetite,
        result.metrics.discipline,
        result.metrics.panic_propensity,
        result.metrics.resilience
    );
    info!("Report written to {}", path.display());

    Ok(())
}
