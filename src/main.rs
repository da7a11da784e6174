use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use boannews_collector::collector::{run_once, Collector};
use boannews_collector::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "boannews-collector",
    about = "Collect Boannews category RSS feeds into SQLite"
)]
struct Args {
    /// Configuration file (missing file uses built-in defaults)
    #[arg(long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Database file, overrides [database].path from the config
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Collect and print the batch as JSON without touching the database
    #[arg(long)]
    dry_run: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid --log-level filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args).await {
        tracing::error!(error = %format!("{e:#}"), "Collection run failed");
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(path) = args.database {
        config.database.path = path;
    }

    if args.dry_run {
        let collector = Collector::new(&config).context("Failed to set up collector")?;
        let records = collector
            .run_collection()
            .await
            .context("News collection failed")?;
        let json =
            serde_json::to_string_pretty(&records).context("Failed to serialize records")?;
        println!("{json}");
        tracing::info!(records = records.len(), "Dry run, database untouched");
        return Ok(());
    }

    let saved = run_once(&config)
        .await
        .with_context(|| format!("Collection run into {} failed", config.database.path))?;
    println!("Saved {saved} records to {}", config.database.path);
    Ok(())
}
