//! curric-resync: rebuild search index documents from PostgreSQL.
//!
//! Walks a tag id range in batches and rewrites each tag's index document
//! with its published parent keys, hidden keys, and locale names.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curric_core::{defaults, CurriculumConfig, TagId};
use curric_engine::{CurriculumEngine, ResyncReport};

#[derive(Parser, Debug)]
#[command(name = "curric-resync")]
#[command(version, about = "Rebuild curriculum tag index documents")]
struct Cli {
    /// First tag id to rebuild (inclusive)
    #[arg(long)]
    start: TagId,

    /// Last tag id to rebuild (inclusive)
    #[arg(long)]
    end: TagId,

    /// Tag ids per batch
    #[arg(long, default_value_t = defaults::RESYNC_BATCH_SIZE)]
    batch_size: i64,
}

fn init_tracing() {
    // LOG_FORMAT - "json" or "text" (default: "text")
    // RUST_LOG   - standard env filter (default: "info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<ResyncReport> {
    if cli.start > cli.end {
        anyhow::bail!("--start ({}) is greater than --end ({})", cli.start, cli.end);
    }
    let config = CurriculumConfig::load().context("failed to load configuration")?;
    let engine = CurriculumEngine::connect(config)
        .await
        .context("failed to connect to the stores")?;

    let batch_size = cli.batch_size.max(1);
    let mut total = ResyncReport::default();
    let mut cursor = cli.start;
    while cursor <= cli.end {
        let batch_end = cursor.saturating_add(batch_size - 1).min(cli.end);
        let report = engine
            .resync(cursor, batch_end)
            .await
            .with_context(|| format!("resync of {}..={} failed", cursor, batch_end))?;
        info!(
            subsystem = "resync",
            start = cursor,
            end = batch_end,
            result_count = report.rebuilt,
            failed = report.failed.len(),
            "Batch complete"
        );
        total.absorb(report);
        if batch_end == TagId::MAX {
            break;
        }
        cursor = batch_end + 1;
    }
    Ok(total)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) if report.failed.is_empty() => {
            info!(
                subsystem = "resync",
                scanned = report.scanned,
                result_count = report.rebuilt,
                "Resync finished"
            );
            ExitCode::SUCCESS
        }
        Ok(report) => {
            error!(
                subsystem = "resync",
                scanned = report.scanned,
                result_count = report.rebuilt,
                failed = ?report.failed,
                "Resync finished with failures"
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(subsystem = "resync", error = %format!("{:#}", e), "Resync aborted");
            ExitCode::FAILURE
        }
    }
}
