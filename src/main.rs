mod config;
mod dataset;
mod error;
mod models;
mod orchestrator;
mod request;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;
use crate::dataset::{DatasetBuilder, DuckDbBuilder};
use crate::models::DateRangeRequest;
use crate::orchestrator::verifier::BatchVerifier;
use crate::orchestrator::Orchestrator;
use crate::scraper::{DateScraper, ScheduleScraper};
use crate::storage::artifacts::{ArtifactStore, FsArtifactStore};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "sched-backfill", about = "Date-range schedule scraping orchestrator", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape a date range (splits, batches and verifies as needed)
    Run {
        /// First date to scrape (YYYY-MM-DD)
        #[arg(long)]
        start_date: NaiveDate,

        /// Last date to scrape, inclusive (default: start date)
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Re-scrape dates that already have a success checkpoint
        #[arg(long)]
        force_scrape: bool,

        /// Dates per batch (default from config)
        #[arg(long)]
        batch_size: Option<u32>,
    },

    /// Re-scrape the trailing window ending today (scheduled resync)
    Daily {
        /// Days in the window, ending today inclusive
        #[arg(long, default_value_t = 3)]
        window_days: u32,

        /// Re-scrape even where a success checkpoint exists (on by default:
        /// the resync exists to pick up late schedule edits)
        #[arg(long, env = "SCHED_FORCE_SCRAPE", default_value_t = true, action = clap::ArgAction::Set)]
        force_scrape: bool,

        /// Dates per batch (default from config)
        #[arg(long, env = "SCHED_BATCH_SIZE")]
        batch_size: Option<u32>,
    },

    /// Run a raw JSON request file through the input validator (legacy shapes accepted)
    Submit {
        /// Path to a JSON request payload
        file: PathBuf,
    },

    /// Show checkpoint and dataset statistics
    Status,

    /// Verify stored artifacts against a date range
    Verify {
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
    },

    /// Apply schema migrations without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "sched_backfill=info,warn",
        1 => "sched_backfill=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run { start_date, end_date, force_scrape, batch_size } => {
            let mut raw = serde_json::json!({
                "start_date": start_date.to_string(),
                "end_date": end_date.unwrap_or(start_date).to_string(),
                "force_scrape": force_scrape,
            });
            if let Some(bs) = batch_size {
                raw["batch_size"] = bs.into();
            }
            let req = request::validate(&raw, &config)
                .map_err(|e| anyhow::anyhow!("{}: {}", e.component(), e))?;
            run_request(&config, req).await?;
        }

        Command::Daily { window_days, force_scrape, batch_size } => {
            let (start, end) = request::trailing_window(Utc::now().date_naive(), window_days)
                .map_err(|e| anyhow::anyhow!("{}: {}", e.component(), e))?;
            info!("Daily resync window: {} .. {}", start, end);
            let mut raw = serde_json::json!({
                "start_date": start.to_string(),
                "end_date": end.to_string(),
                "force_scrape": force_scrape,
            });
            if let Some(bs) = batch_size {
                raw["batch_size"] = bs.into();
            }
            let req = request::validate(&raw, &config)
                .map_err(|e| anyhow::anyhow!("{}: {}", e.component(), e))?;
            run_request(&config, req).await?;
        }

        Command::Submit { file } => {
            let payload = std::fs::read_to_string(&file)
                .with_context(|| format!("Could not read request file {:?}", file))?;
            let raw: serde_json::Value =
                serde_json::from_str(&payload).context("Request file is not valid JSON")?;
            let req = request::validate(&raw, &config)
                .map_err(|e| anyhow::anyhow!("{}: {}", e.component(), e))?;
            run_request(&config, req).await?;
        }

        Command::Status => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            let total = repo.checkpoint_total()?;
            let games = repo.game_count()?;
            let (min, max) = repo.game_date_range().unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  sched-backfill — Status");
            println!("─────────────────────────────────");
            println!("  Checkpoints : {}", utils::group_thousands(total));
            println!("  Games       : {}", utils::group_thousands(games));
            println!("  From        : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  To          : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }

        Command::Verify { start_date, end_date } => {
            let store: Arc<dyn ArtifactStore> =
                Arc::new(FsArtifactStore::new(&config.storage.bucket)?);
            let report = BatchVerifier::new(store).verify(start_date, end_date)?;
            if report.success {
                println!("OK: {} dates verified", report.verified_dates.len());
            } else {
                println!(
                    "MISSING {} of {} dates:",
                    report.missing_dates.len(),
                    report.verified_dates.len() + report.missing_dates.len()
                );
                for date in &report.missing_dates {
                    println!("  {}", date);
                }
                std::process::exit(1);
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

async fn run_request(config: &AppConfig, req: DateRangeRequest) -> Result<()> {
    let _t = utils::RunTimer::begin(format!("Backfill {} .. {}", req.start_date, req.end_date));

    let repo = Arc::new(Repository::open(&config.storage.db_path)?);
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }

    // The artifact root comes from the validated request so legacy payloads
    // naming their own bucket keep working.
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&req.bucket)?);
    let scraper: Arc<dyn DateScraper> =
        Arc::new(ScheduleScraper::new(&config.scraper, Arc::clone(&store))?);
    let builder: Arc<dyn DatasetBuilder> = Arc::new(DuckDbBuilder::new(
        Arc::clone(&repo),
        Arc::clone(&store),
        config.storage.dataset_path.clone(),
    ));

    let orch = Arc::new(Orchestrator::new(
        config.clone(),
        repo,
        store,
        scraper,
        builder,
    ));

    let report = orch
        .run(req)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {}", e.component(), e))?;

    info!(
        "Done: {} processed | {} skipped | {} failed | {} batches | {} sub-executions",
        report.dates_processed,
        report.dates_skipped,
        report.dates_failed.len(),
        report.batches_executed,
        report.sub_executions,
    );
    Ok(())
}
