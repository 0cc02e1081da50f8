//! # Stockpulse CLI
//!
//! Command-line entry point for uploading sales and inventory CSVs and
//! reading back their metrics.
//!
//! ## Commands
//! ```text
//! stockpulse template  <sales|inventory> [--out FILE]
//! stockpulse upload    <sales|inventory> <FILE> [--batch ID]
//! stockpulse status    <ID>
//! stockpulse list      [--batch ID]
//! stockpulse dashboard <ID>
//! stockpulse insight   <ID>
//! stockpulse pair      (--sales ID --inventory ID | --batch ID) [--insight]
//! stockpulse batch     <ID> [--insight]
//! stockpulse mark-processed <ID>
//! stockpulse mark-failed    <ID> <MESSAGE>
//! ```
//!
//! ## Logging
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=stockpulse_engine=trace` - Trace the engine only
//! - Default: INFO level, on stderr

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stockpulse_core::schema::template_csv;
use stockpulse_core::{RecordType, UploadSummary};
use stockpulse_engine::{
    open_database, Aggregator, EngineConfig, Intake, OllamaClient, PairSelector, UploadRequest,
};

#[derive(Debug, Parser)]
#[command(name = "stockpulse", version, about = "Sales & inventory CSV analytics")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a header-only CSV template
    Template {
        record_type: RecordType,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Upload and validate a CSV file
    Upload {
        record_type: String,
        file: PathBuf,
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show an upload's status
    Status { id: i64 },
    /// List uploads, most recent first
    List {
        #[arg(long)]
        batch: Option<String>,
    },
    /// Metrics of one validated upload
    Dashboard { id: i64 },
    /// Metrics of one validated upload plus generated analysis
    Insight { id: i64 },
    /// Sales and inventory metrics side by side
    Pair(PairArgs),
    /// Metrics over every validated upload in a batch
    Batch {
        batch_id: String,
        #[arg(long)]
        insight: bool,
    },
    /// Record successful downstream processing
    MarkProcessed { id: i64 },
    /// Record failed downstream processing
    MarkFailed { id: i64, message: String },
}

#[derive(Debug, Args)]
struct PairArgs {
    #[arg(long, requires = "inventory", conflicts_with = "batch")]
    sales: Option<i64>,
    #[arg(long, requires = "sales", conflicts_with = "batch")]
    inventory: Option<i64>,
    #[arg(long)]
    batch: Option<String>,
    #[arg(long)]
    insight: bool,
}

impl PairArgs {
    fn selector(&self) -> Result<PairSelector> {
        match (self.sales, self.inventory, &self.batch) {
            (Some(sales), Some(inventory), None) => Ok(PairSelector::Ids { sales, inventory }),
            (None, None, Some(batch)) => Ok(PairSelector::Batch(batch.clone())),
            _ => bail!("pass either --sales and --inventory, or --batch"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if let Command::Template { record_type, out } = &cli.command {
        return write_template(*record_type, out.as_deref());
    }

    let config = EngineConfig::load(cli.config.clone()).context("loading configuration")?;
    let db = open_database(&config).await.context("opening database")?;
    let intake = Intake::new(db.clone(), &config);
    let aggregator = Aggregator::new(db.clone(), &config);

    let result = run(cli.command, &config, &intake, &aggregator).await;
    db.close().await;
    result
}

async fn run(
    command: Command,
    config: &EngineConfig,
    intake: &Intake,
    aggregator: &Aggregator,
) -> Result<()> {
    match command {
        Command::Template { .. } => Ok(()),
        Command::Upload {
            record_type,
            file,
            batch,
            owner,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let receipt = intake
                .accept_and_validate(UploadRequest {
                    filename,
                    bytes,
                    record_type,
                    batch_id: batch,
                    owner,
                })
                .await?;
            print_json(&receipt)
        }
        Command::Status { id } => print_json(&intake.status(id).await?),
        Command::List { batch } => {
            let uploads: Vec<UploadSummary> = aggregator
                .list_by_batch(batch.as_deref())
                .await?
                .iter()
                .map(|u| u.summary())
                .collect();
            print_json(&uploads)
        }
        Command::Dashboard { id } => print_json(&aggregator.dashboard(id).await?),
        Command::Insight { id } => {
            let generator = OllamaClient::new(&config.insight)?;
            print_json(&aggregator.insight(id, &generator).await?)
        }
        Command::Pair(args) => {
            let selector = args.selector()?;
            if args.insight {
                let generator = OllamaClient::new(&config.insight)?;
                print_json(&aggregator.pair_insight(&selector, &generator).await?)
            } else {
                print_json(&aggregator.pair_metrics(&selector).await?)
            }
        }
        Command::Batch { batch_id, insight } => {
            if insight {
                let generator = OllamaClient::new(&config.insight)?;
                print_json(&aggregator.batch_insight(&batch_id, &generator).await?)
            } else {
                print_json(&aggregator.batch_metrics(&batch_id).await?)
            }
        }
        Command::MarkProcessed { id } => print_json(&intake.mark_processed(id).await?.summary()),
        Command::MarkFailed { id, message } => {
            print_json(&intake.mark_failed(id, &message).await?.summary())
        }
    }
}

fn write_template(record_type: RecordType, out: Option<&Path>) -> Result<()> {
    let csv = template_csv(record_type);
    match out {
        Some(path) => {
            std::fs::write(path, &csv).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), record_type = %record_type, "Template written");
        }
        None => print!("{}", String::from_utf8_lossy(&csv)),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initializes the tracing subscriber for structured logging on stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
