//! Calendar Harvester: binary entrypoint.
//!
//! `run` resumes the catalog from its tail and harvests forward until
//! the calendar is caught up; `audit` reports duplicate catalog rows.
//! See `README.md` for the file formats.

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use forex_calendar_harvester::{
    audit, catalog, harvest, AnomalyLedger, CatalogWriter, ForexFactorySource, HarvestConfig,
    SystemClock,
};

#[derive(Parser)]
#[command(name = "forex-calendar-harvester")]
#[command(about = "Incremental economic calendar harvester")]
struct Cli {
    /// Config file path (TOML or JSON); falls back to
    /// $HARVEST_CONFIG_PATH, then config/harvest.toml, then defaults.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest new calendar events into the catalog
    Run,
    /// Report duplicate catalog entries
    Audit,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op elsewhere.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => HarvestConfig::load_from(Path::new(path))?,
        None => HarvestConfig::load_default()?,
    };

    match cli.command {
        Commands::Run => run_harvest(config).await,
        Commands::Audit => run_audit(config),
    }
}

async fn run_harvest(config: HarvestConfig) -> Result<()> {
    let tz = config.source_tz()?;
    let output_offset = config.output_offset()?;

    let cursor = catalog::resolve_cursor(&config.catalog_path, tz)?;
    info!(cursor = %cursor, catalog = %config.catalog_path.display(), "resuming harvest");

    let mut writer = CatalogWriter::open(&config.catalog_path, output_offset)?;
    let mut ledger = AnomalyLedger::open(&config.ledger_path, output_offset)?;
    let source = ForexFactorySource::from_base_url(config.base_url.clone());
    let clock = SystemClock::new(tz);

    let report = harvest::run(&source, &clock, &mut writer, &mut ledger, cursor).await?;
    info!(
        windows = report.windows,
        accepted = report.accepted,
        deferred = report.deferred,
        malformed = report.malformed,
        live_edge = report.reached_live_edge,
        cursor = %report.cursor,
        "harvest complete"
    );
    Ok(())
}

fn run_audit(config: HarvestConfig) -> Result<()> {
    let report = audit::scan(&config.catalog_path)?;
    if report.duplicates.is_empty() {
        println!("no duplicates across {} records", report.records);
        return Ok(());
    }
    for dup in &report.duplicates {
        println!(
            "{} | {} | {} | x{}",
            dup.timestamp, dup.currency, dup.event, dup.count
        );
    }
    println!(
        "{} duplicate groups across {} records",
        report.duplicates.len(),
        report.records
    );
    Ok(())
}
