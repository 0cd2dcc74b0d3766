//! Aggregation cache over all rate sources.
//!
//! Fetches every adapter, normalizes, and publishes the merged snapshot in a
//! single swap. Readers see either the previous snapshot or the new one.

use crate::adapter::SourceAdapter;
use crate::error::{CacheError, FeedError};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use lendwatch_core::{Rate, RateNormalizer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Snapshots older than this are refreshed on demand.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a snapshot stays fresh.
    pub ttl: Duration,
    /// Upper bound on a single adapter fetch.
    pub fetch_timeout: Duration,
    pub normalizer: RateNormalizer,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: crate::adapter::DEFAULT_REQUEST_TIMEOUT,
            normalizer: RateNormalizer::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct RateSnapshot {
    rates: Arc<Vec<Rate>>,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
}

/// Last-known merged rates from every source.
pub struct RateCache {
    sources: Vec<Arc<dyn SourceAdapter>>,
    config: CacheConfig,
    snapshot: RwLock<Option<RateSnapshot>>,
}

impl RateCache {
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>, config: CacheConfig) -> Self {
        Self {
            sources,
            config,
            snapshot: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetch every source concurrently and replace the snapshot.
    ///
    /// Fails only when every source failed; the previous snapshot is then
    /// left untouched.
    pub async fn fetch_all(&self) -> Result<Arc<Vec<Rate>>, CacheError> {
        info!("Fetching rates from {} sources", self.sources.len());

        let timeout = self.config.fetch_timeout;
        let fetches = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let result = match tokio::time::timeout(timeout, source.fetch()).await {
                    Ok(result) => result,
                    Err(_) => Err(FeedError::timed_out(source.name(), timeout)),
                };
                (source.name(), source.category(), result)
            }
        });

        let results = join_all(fetches).await;

        let mut merged = Vec::new();
        let mut failures = 0usize;
        for (name, category, result) in results {
            match result {
                Ok(rates) => {
                    for rate in &rates {
                        debug!(
                            source = name,
                            token = %rate.token,
                            lending = rate.lending_rate,
                            borrow = rate.borrow_rate,
                            "Fetched rate"
                        );
                    }
                    merged.extend(self.config.normalizer.normalize_all(rates));
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    warn!(source = name, category = %category, error = %e, "Source fetch failed");
                }
                Err(e) => {
                    failures += 1;
                    error!(source = name, category = %category, error = %e, "Source returned unusable data");
                }
            }
        }

        if !self.sources.is_empty() && failures == self.sources.len() {
            return Err(CacheError::AllSourcesFailed(failures));
        }

        let rates = Arc::new(merged);
        let snapshot = RateSnapshot {
            rates: Arc::clone(&rates),
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        };
        *self.snapshot.write().await = Some(snapshot);

        info!(
            rates = rates.len(),
            failed_sources = failures,
            "Rate snapshot updated"
        );
        Ok(rates)
    }

    /// Last snapshot without fetching. Empty before the first successful fetch.
    pub async fn get_cached(&self) -> Arc<Vec<Rate>> {
        self.snapshot
            .read()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.rates))
            .unwrap_or_default()
    }

    pub async fn fetched_at(&self) -> Option<Instant> {
        self.snapshot.read().await.as_ref().map(|s| s.fetched_at)
    }

    /// Wall-clock time of the last successful fetch.
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.as_ref().map(|s| s.fetched_at_utc)
    }

    pub async fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now()).await
    }

    /// True while `now - fetched_at < ttl`. Never fresh before the first fetch.
    pub async fn is_fresh_at(&self, now: Instant) -> bool {
        match self.fetched_at().await {
            Some(fetched_at) => now.saturating_duration_since(fetched_at) < self.config.ttl,
            None => false,
        }
    }

    /// Cached snapshot if fresh, otherwise a new `fetch_all`.
    pub async fn get_with_cache(&self) -> Result<Arc<Vec<Rate>>, CacheError> {
        if self.is_fresh().await {
            return Ok(self.get_cached().await);
        }
        self.fetch_all().await
    }
}
