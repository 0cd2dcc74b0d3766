//! Lending rate monitor - Telegram bot
//!
//! Polls lending rates from exchanges and money markets and notifies
//! subscribers when rates cross their thresholds.

mod config;
mod cycle;
mod state;

use clap::Parser;
use config::{parse_threshold_arg, AppConfig, ConfigError};
use cycle::{run_fetch_loop, run_stats_reporter};
use lendwatch_alerts::{CommandHandler, Database, Notifier, SubscriberStore, TelegramBot};
use lendwatch_feeds::{default_sources, http_client, RateCache};
use state::create_state;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Lending rate monitor CLI
#[derive(Parser, Debug)]
#[command(name = "lendwatch-bot")]
#[command(about = "Lending rate aggregator and Telegram notifier", long_about = None)]
struct Args {
    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,

    /// SQLite database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Seconds between fetch cycles
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Seconds a fetched snapshot stays fresh
    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Relative change (percent) required to notify again
    #[arg(long)]
    change_threshold: Option<f64>,

    /// Lending threshold override, e.g. --threshold TIA=35 (repeatable)
    #[arg(long = "threshold", value_name = "TOKEN=PERCENT")]
    thresholds: Vec<String>,
}

fn init_logging(level: &str) {
    // RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Defaults, then the config file, then command-line overrides.
fn build_config(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    if let Some(level) = &args.log_level {
        config.log_level = level.to_lowercase();
    }
    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }
    if let Some(secs) = args.interval_secs {
        config.fetch_interval_secs = secs;
    }
    if let Some(secs) = args.cache_ttl_secs {
        config.cache_ttl_secs = secs;
    }
    if let Some(pct) = args.change_threshold {
        config.change_threshold_pct = pct;
    }
    for arg in &args.thresholds {
        let (token, value) = parse_threshold_arg(arg)?;
        config.thresholds.set(&token, value);
    }

    config.validate()?;
    Ok(config)
}

/// Create the parent directory of a file-backed SQLite URL.
fn ensure_database_dir(database_url: &str) -> std::io::Result<()> {
    let Some(path) = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

fn fatal(message: &str, e: &dyn std::fmt::Display) -> ! {
    error!(error = %e, "{}", message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            fatal("Invalid configuration", &e);
        }
    };
    init_logging(&config.log_level);

    info!("🚀 Lending rate bot starting...");
    info!("  Fetch interval: {}s", config.fetch_interval_secs);
    info!("  Cache TTL: {}s", config.cache_ttl_secs);
    info!("  Change threshold: {}%", config.change_threshold_pct);
    for token in config.thresholds.tokens() {
        info!(
            "  Threshold {}: {}%",
            token,
            config.thresholds.get(token).unwrap_or_default()
        );
    }

    let token = match std::env::var("TELEGRAM_TOKEN") {
        Ok(token) if !token.trim().is_empty() => token,
        _ => fatal("Missing TELEGRAM_TOKEN", &"environment variable not set"),
    };

    if let Err(e) = ensure_database_dir(&config.database_url) {
        fatal("Failed to create database directory", &e);
    }
    let db = match Database::connect(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => fatal("Failed to open database", &e),
    };
    match db.subscriber_count().await {
        Ok(count) => info!("  Subscribers: {}", count),
        Err(e) => warn!(error = %e, "Failed to count subscribers"),
    }

    let client = match http_client(config.request_timeout()) {
        Ok(client) => client,
        Err(e) => fatal("Failed to build HTTP client", &e),
    };
    let cache = Arc::new(RateCache::new(default_sources(client), (&config).into()));
    info!("  Sources: {}", cache.source_count());

    let bot = Arc::new(TelegramBot::new(&token));
    let store: Arc<dyn SubscriberStore> = db.clone();
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&store),
        bot.clone(),
        config.thresholds.clone(),
        (&config).into(),
    ));
    let commands = Arc::new(CommandHandler::new(
        store,
        Arc::clone(&cache),
        config.thresholds.clone(),
    ));

    // Create shared state
    let state = create_state(config, cache);
    state.start();

    let fetch_state = state.clone();
    let fetch_handle = tokio::spawn(async move {
        run_fetch_loop(fetch_state, notifier).await;
    });

    let stats_state = state.clone();
    let stats_handle = tokio::spawn(async move {
        run_stats_reporter(stats_state).await;
    });

    // Runs until Ctrl+C
    info!("Press Ctrl+C to stop...");
    if let Err(e) = bot.run(commands).await {
        error!(error = %e, "Telegram bot stopped with error");
    }

    warn!("Shutdown signal received");
    state.stop();

    // The fetch loop may be mid-cycle or waiting on its next tick
    fetch_handle.abort();
    let _ = tokio::time::timeout(Duration::from_secs(1), stats_handle).await;
    db.close().await;

    // Final stats
    let summary = state.stats_summary();
    info!("📈 Final Stats:");
    info!("  Total uptime: {} seconds", summary.uptime_secs);
    info!("  Cycles: {} ({} failed)", summary.cycles_run, summary.cycles_failed);
    info!(
        "  Notifications: {} ({} failed)",
        summary.notifications_sent, summary.notifications_failed
    );

    info!("👋 Lending rate bot stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["lendwatch-bot"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_build_config_defaults() {
        let config = build_config(&args(&[])).unwrap();
        assert_eq!(config.fetch_interval_secs, 120);
        assert_eq!(config.thresholds.get("FDUSD"), Some(30.0));
    }

    #[test]
    fn test_build_config_overrides() {
        let config = build_config(&args(&[
            "--interval-secs",
            "30",
            "--change-threshold",
            "10",
            "--threshold",
            "tia=45",
            "--threshold",
            "DAI=20",
            "-l",
            "DEBUG",
        ]))
        .unwrap();

        assert_eq!(config.fetch_interval_secs, 30);
        assert_eq!(config.change_threshold_pct, 10.0);
        assert_eq!(config.thresholds.get("TIA"), Some(45.0));
        assert_eq!(config.thresholds.get("DAI"), Some(20.0));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_build_config_rejects_invalid() {
        assert!(build_config(&args(&["--threshold", "TIA=-5"])).is_err());
        assert!(build_config(&args(&["--threshold", "TIA"])).is_err());
        assert!(build_config(&args(&["--interval-secs", "0"])).is_err());
        assert!(build_config(&args(&["--config", "/nonexistent/lendwatch.json"])).is_err());
    }

    #[test]
    fn test_ensure_database_dir_ignores_memory() {
        assert!(ensure_database_dir("sqlite::memory:").is_ok());
        assert!(ensure_database_dir("sqlite://bot.db").is_ok());
    }
}
