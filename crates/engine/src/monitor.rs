//! Per-cycle selection of rates worth notifying about.

use crate::detector::{should_notify, MonitorConfig, PreviousRates};
use lendwatch_core::{group_by_token, LendingThresholds, Rate, RatesByToken};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Applies the threshold filter and change detector to each fetched cycle.
///
/// Not internally synchronized; callers serialize `evaluate` calls.
#[derive(Debug)]
pub struct RateMonitor {
    config: MonitorConfig,
    thresholds: LendingThresholds,
    previous: PreviousRates,
}

impl RateMonitor {
    pub fn new(config: MonitorConfig, thresholds: LendingThresholds) -> Self {
        Self {
            config,
            thresholds,
            previous: PreviousRates::new(),
        }
    }

    pub fn thresholds(&self) -> &LendingThresholds {
        &self.thresholds
    }

    pub fn previous(&self) -> &PreviousRates {
        &self.previous
    }

    /// Rates that cross their token threshold and are new or moved enough.
    fn triggering<'a>(&self, rates: &'a [Rate]) -> Vec<&'a Rate> {
        rates
            .iter()
            .filter(|rate| self.thresholds.is_candidate(rate))
            .filter(|rate| {
                let previous = self.previous.get(&rate.token, &rate.source);
                should_notify(rate, previous, self.config.change_threshold_pct)
            })
            .collect()
    }

    /// Evaluate one cycle.
    ///
    /// Returns every rate (from all sources) of each token with at least one
    /// triggering rate, or `None` when nothing triggered. The previous-rate
    /// table is updated with all `rates` either way.
    pub fn evaluate(&mut self, rates: &[Rate]) -> Option<RatesByToken> {
        let flagged: BTreeSet<&str> = self
            .triggering(rates)
            .into_iter()
            .inspect(|rate| {
                debug!(
                    token = %rate.token,
                    source = %rate.source,
                    lending = rate.lending_rate,
                    "Rate triggered notification"
                );
            })
            .map(|rate| rate.token.as_str())
            .collect();

        self.previous.record_all(rates);

        if flagged.is_empty() {
            info!("No rates met the significance threshold");
            return None;
        }

        let selected = group_by_token(rates.iter().filter(|r| flagged.contains(r.token.as_str())));
        info!(tokens = ?flagged, "Rates selected for notification");
        Some(selected)
    }
}
