//! sshgeo - SSH auth-log analysis pipeline
//!
//! Parses an sshd authentication log, enriches every login attempt with
//! geolocation for its source address, and persists the dataset with:
//! - SQLite storage for tabular queries
//! - optional JSON Lines export for notebooks and dashboards
//! - a geo cache reused across runs

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sshgeo::{config, dataset, db, geoip, pipeline};

#[derive(Parser, Debug)]
#[command(name = "sshgeo", about = "Parses SSH authentication logs into a geolocated dataset")]
struct Cli {
    /// Path to the auth log to analyze
    log_file: PathBuf,

    /// TOML config file (defaults to ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Year for syslog timestamps (default: the log file's mtime year)
    #[arg(long)]
    year: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = config::Config::load(cli.config.as_deref())?;
    init_tracing(&config.logging.level);
    info!("Configuration loaded");

    // Initialize database
    let store = db::Store::open(&config.database).await?;
    store.run_migrations().await?;
    info!("Database initialized");

    // Initialize the resolver, warmed from earlier runs
    let mut resolver = geoip::CachingResolver::new(&config.geoip, &config.census)?;
    if resolver.offline_available() {
        info!("GeoIP enabled");
    } else {
        info!("GeoIP disabled (database not found)");
    }
    let warmed = store.load_geo_cache().await?;
    if !warmed.is_empty() {
        info!(entries = warmed.len(), "Resolver cache warmed from previous runs");
    }
    resolver.warm(warmed);

    let output = pipeline::aggregate(&cli.log_file, &mut resolver, cli.year).await?;
    info!(
        lookups = resolver.lookup_count(),
        cached = resolver.cached_ips(),
        "Geolocation resolution complete"
    );

    store.insert_attempts(&output.collection).await?;
    let fresh = resolver.take_fresh();
    if !fresh.is_empty() {
        store.save_geo_cache(&fresh).await?;
    }

    if let Some(dataset_path) = &config.output.dataset {
        dataset::write_jsonl(Path::new(dataset_path), &output.collection).await?;
        info!(
            path = %dataset_path,
            records = output.collection.len(),
            "Dataset exported"
        );
    }

    let summary = &output.summary;
    println!(
        "Processed {} lines: {} parsed, {} dropped, {} unique IPs ({} unresolved). Results saved in {}",
        summary.lines_read,
        summary.lines_parsed,
        summary.lines_dropped,
        summary.unique_ips,
        summary.unresolved_ips,
        config.database.url
    );

    Ok(())
}

/// Initialize logging. Use LOG_FORMAT=gcp for structured GCP Cloud Logging;
/// RUST_LOG overrides the configured level.
fn init_tracing(level: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
