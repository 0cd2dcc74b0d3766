//! Timer-driven fetch and notify cycle.

use crate::state::{AppState, SharedState};
use lendwatch_alerts::{DeliveryReport, Notifier, NotifierError};
use lendwatch_feeds::CacheError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Interval between stats log lines.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] CacheError),
    #[error("Notification failed: {0}")]
    Notify(#[from] NotifierError),
}

/// Result of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing crossed a threshold with a significant change.
    Quiet { rates: usize },
    /// At least one token was sent to subscribers.
    Notified {
        tokens: Vec<String>,
        report: DeliveryReport,
    },
}

/// Fetch every source, detect significant rates, and notify subscribers.
///
/// When every source fails the cache and previous-rate table are left
/// unchanged and nothing is sent.
pub async fn run_cycle(state: &AppState, notifier: &Notifier) -> Result<CycleOutcome, CycleError> {
    let rates = match state.cache.fetch_all().await {
        Ok(rates) => rates,
        Err(e) => {
            state.stats.record_failed_cycle();
            return Err(e.into());
        }
    };

    let selected = state.monitor.lock().await.evaluate(&rates);
    state.stats.record_cycle();

    let Some(selected) = selected else {
        return Ok(CycleOutcome::Quiet { rates: rates.len() });
    };

    let report = notifier.notify(&selected).await?;
    state.stats.record_deliveries(report.sent, report.failed);

    Ok(CycleOutcome::Notified {
        tokens: selected.keys().cloned().collect(),
        report,
    })
}

/// Run `run_cycle` on a fixed interval until the state is stopped.
///
/// The first tick fires immediately, which doubles as the initial fetch.
pub async fn run_fetch_loop(state: SharedState, notifier: Arc<Notifier>) {
    let interval = state.config.fetch_interval();
    info!(interval_secs = interval.as_secs(), "Starting fetch loop");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while state.is_running() {
        ticker.tick().await;
        if !state.is_running() {
            break;
        }

        match run_cycle(&state, &notifier).await {
            Ok(CycleOutcome::Quiet { rates }) => {
                debug!(rates = rates, "Cycle complete, nothing to notify");
            }
            Ok(CycleOutcome::Notified { tokens, report }) => {
                info!(
                    tokens = ?tokens,
                    sent = report.sent,
                    failed = report.failed,
                    "Cycle complete"
                );
            }
            Err(e) => error!(error = %e, "Cycle failed"),
        }
    }

    info!("Fetch loop stopped");
}

pub async fn run_stats_reporter(state: SharedState) {
    info!("Starting stats reporter");

    let ticks = STATS_INTERVAL.as_millis() / 100;
    loop {
        // Check every 100ms if we should stop, but only report once per interval
        for _ in 0..ticks {
            if !state.is_running() {
                info!("Stats reporter stopped");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let summary = state.stats_summary();
        let cached = state.cache.get_cached().await.len();
        info!(
            "📊 Stats | Uptime: {}s | Cycles: {} ({} failed) | Sent: {} ({} failed) | Cached rates: {}",
            summary.uptime_secs,
            summary.cycles_run,
            summary.cycles_failed,
            summary.notifications_sent,
            summary.notifications_failed,
            cached
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::create_state;
    use async_trait::async_trait;
    use lendwatch_alerts::{
        Database, MessageSender, NotifierConfig, SubscriberStore, TelegramError,
    };
    use lendwatch_core::{Category, Rate};
    use lendwatch_feeds::{CacheConfig, FeedError, RateCache, SourceAdapter};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    /// Source whose next response can be swapped between cycles.
    struct ScriptedSource {
        name: &'static str,
        response: StdMutex<Result<Vec<Rate>, ()>>,
    }

    impl ScriptedSource {
        fn new(name: &'static str, rates: Vec<Rate>) -> Arc<Self> {
            Arc::new(Self {
                name,
                response: StdMutex::new(Ok(rates)),
            })
        }

        fn set(&self, response: Result<Vec<Rate>, ()>) {
            *self.response.lock().unwrap() = response;
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn category(&self) -> Category {
            Category::Cex
        }

        async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
            self.response
                .lock()
                .unwrap()
                .clone()
                .map_err(|_| FeedError::ConnectionFailed("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: StdMutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct Harness {
        state: SharedState,
        notifier: Notifier,
        sender: Arc<RecordingSender>,
        db: Database,
    }

    async fn harness(sources: Vec<Arc<dyn SourceAdapter>>) -> Harness {
        let config = AppConfig::default();
        let cache = Arc::new(RateCache::new(sources, CacheConfig::from(&config)));
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let sender = Arc::new(RecordingSender::default());
        let notifier = Notifier::new(
            Arc::new(db.clone()),
            sender.clone(),
            config.thresholds.clone(),
            NotifierConfig::from(&config),
        );
        Harness {
            state: create_state(config, cache),
            notifier,
            sender,
            db,
        }
    }

    fn tia(source: &str, lending: f64, category: Category) -> Rate {
        Rate::new(source, "TIA", lending, 0.0, category)
    }

    #[tokio::test]
    async fn test_threshold_crossing_notifies_with_notable_marker() {
        let source = ScriptedSource::new("X", vec![tia("X", 20.0, Category::Cex)]);
        let h = harness(vec![source.clone()]).await;
        h.db.add(1).await.unwrap();

        let outcome = run_cycle(&h.state, &h.notifier).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Quiet { rates: 1 });

        source.set(Ok(vec![tia("X", 35.0, Category::Cex)]));
        let outcome = run_cycle(&h.state, &h.notifier).await.unwrap();
        match outcome {
            CycleOutcome::Notified { tokens, report } => {
                assert_eq!(tokens, vec!["TIA".to_string()]);
                assert_eq!(report.sent, 1);
            }
            other => panic!("expected notification, got {other:?}"),
        }

        let sent = h.sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("🪙 <b>TIA</b>"));
        assert!(sent[0].1.contains("  • X: L: <b>35%</b>"));
    }

    #[tokio::test]
    async fn test_unchanged_rate_not_renotified() {
        let source = ScriptedSource::new("X", vec![tia("X", 35.0, Category::Cex)]);
        let h = harness(vec![source]).await;
        h.db.add(1).await.unwrap();

        assert!(matches!(
            run_cycle(&h.state, &h.notifier).await.unwrap(),
            CycleOutcome::Notified { .. }
        ));
        assert_eq!(
            run_cycle(&h.state, &h.notifier).await.unwrap(),
            CycleOutcome::Quiet { rates: 1 }
        );
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_failing_sends_nothing() {
        let sources: Vec<Arc<ScriptedSource>> = ["OKX", "Neptune", "Injera", "Binance", "Bybit"]
            .into_iter()
            .map(|name| ScriptedSource::new(name, vec![Rate::new(name, "USDT", 40.0, 0.0, Category::Cex)]))
            .collect();
        let h = harness(sources.iter().map(|s| s.clone() as Arc<dyn SourceAdapter>).collect()).await;
        h.db.add(1).await.unwrap();

        run_cycle(&h.state, &h.notifier).await.unwrap();
        let snapshot = h.state.cache.get_cached().await;
        let fetched_at = h.state.cache.fetched_at().await;
        let sent_before = h.sender.sent.lock().unwrap().len();

        for source in &sources {
            source.set(Err(()));
        }
        let err = run_cycle(&h.state, &h.notifier).await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch(CacheError::AllSourcesFailed(5))));

        assert_eq!(h.state.cache.get_cached().await, snapshot);
        assert_eq!(h.state.cache.fetched_at().await, fetched_at);
        assert_eq!(h.sender.sent.lock().unwrap().len(), sent_before);
        assert_eq!(h.state.stats_summary().cycles_failed, 1);
    }

    #[tokio::test]
    async fn test_cex_preference_differs_per_subscriber() {
        let cex = ScriptedSource::new("OKX", vec![tia("OKX", 35.0, Category::Cex)]);
        let dex = ScriptedSource::new("Neptune", vec![tia("Neptune", 12.0, Category::Dex)]);
        let h = harness(vec![cex, dex]).await;
        h.db.add(1).await.unwrap();
        h.db.add(2).await.unwrap();
        h.db.set_preference(2, false).await.unwrap();

        run_cycle(&h.state, &h.notifier).await.unwrap();

        let sent = h.sender.sent.lock().unwrap();
        let for_chat = |id: i64| sent.iter().find(|(chat, _)| *chat == id).unwrap().1.clone();
        assert!(for_chat(1).contains("OKX"));
        assert!(for_chat(1).contains("Neptune"));
        assert!(!for_chat(2).contains("OKX"));
        assert!(for_chat(2).contains("Neptune"));
    }

    #[tokio::test]
    async fn test_registry_failure_surfaces_as_notify_error() {
        let source = ScriptedSource::new("X", vec![tia("X", 35.0, Category::Cex)]);
        let h = harness(vec![source]).await;
        h.db.add(1).await.unwrap();
        h.db.close().await;

        let err = run_cycle(&h.state, &h.notifier).await.unwrap_err();
        assert!(matches!(err, CycleError::Notify(NotifierError::Db(_))));
        assert!(h.sender.sent.lock().unwrap().is_empty());
        assert_eq!(h.state.stats_summary().notifications_sent, 0);
    }

    #[tokio::test]
    async fn test_fetch_loop_stops_with_state() {
        let h = harness(vec![ScriptedSource::new("X", Vec::new())]).await;
        h.state.start();

        let state = h.state.clone();
        let handle = tokio::spawn(run_fetch_loop(state, Arc::new(h.notifier)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.state.stop();
        handle.abort();

        assert!(h.state.stats_summary().cycles_run >= 1);
    }
}
