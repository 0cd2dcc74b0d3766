//! Application state management.

use crate::config::AppConfig;
use lendwatch_engine::RateMonitor;
use lendwatch_feeds::RateCache;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Statistics for the bot.
#[derive(Debug)]
pub struct BotStats {
    /// Fetch cycles that completed.
    pub cycles_run: AtomicU64,
    /// Fetch cycles where every source failed.
    pub cycles_failed: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub notifications_failed: AtomicU64,
    started_at: Instant,
}

impl Default for BotStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BotStats {
    pub fn new() -> Self {
        Self {
            cycles_run: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_cycle(&self) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_cycle(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deliveries(&self, sent: usize, failed: usize) {
        self.notifications_sent
            .fetch_add(sent as u64, Ordering::Relaxed);
        self.notifications_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Summary of statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSummary {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub uptime_secs: u64,
}

/// Application state shared by the fetch loop and the command handler.
pub struct AppState {
    /// Configuration.
    pub config: AppConfig,
    /// Last-known rates from every source.
    pub cache: Arc<RateCache>,
    /// Threshold filter and change detector. Only the fetch loop locks it.
    pub monitor: Mutex<RateMonitor>,
    /// Bot statistics.
    pub stats: BotStats,
    /// Running flag.
    running: AtomicBool,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: AppConfig, cache: Arc<RateCache>) -> Self {
        let monitor = RateMonitor::new((&config).into(), config.thresholds.clone());

        Self {
            config,
            cache,
            monitor: Mutex::new(monitor),
            stats: BotStats::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats_summary(&self) -> StatsSummary {
        self.stats.summary()
    }
}

/// Thread-safe shared state.
pub type SharedState = Arc<AppState>;

/// Create shared state.
pub fn create_state(config: AppConfig, cache: Arc<RateCache>) -> SharedState {
    Arc::new(AppState::new(config, cache))
}
