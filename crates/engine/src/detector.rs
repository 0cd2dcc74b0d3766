//! Rate change detection.
//!
//! Compares each fresh observation with the previous cycle's value for the
//! same `(token, source)` pair.

use lendwatch_core::Rate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default relative change (percent) that re-triggers a notification.
pub const DEFAULT_CHANGE_THRESHOLD_PCT: f64 = 5.0;

/// Configuration for the change detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Minimum relative change of the lending rate, in percent.
    pub change_threshold_pct: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            change_threshold_pct: DEFAULT_CHANGE_THRESHOLD_PCT,
        }
    }
}

/// Relative change of the lending rate in percent, `None` when the previous
/// rate is zero.
pub fn relative_change_pct(current: &Rate, previous: &Rate) -> Option<f64> {
    if previous.lending_rate == 0.0 {
        return None;
    }
    Some((current.lending_rate - previous.lending_rate) / previous.lending_rate * 100.0)
}

/// Whether `rate` is new or moved enough since `previous` to notify again.
///
/// A missing or zero previous lending rate counts as first-seen.
pub fn should_notify(rate: &Rate, previous: Option<&Rate>, change_threshold_pct: f64) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    match relative_change_pct(rate, previous) {
        Some(change) => change.abs() >= change_threshold_pct,
        None => true,
    }
}

/// Last rate seen for every `(token, source)` pair: token -> source -> rate.
#[derive(Debug, Default, Clone)]
pub struct PreviousRates {
    by_token: HashMap<String, HashMap<String, Rate>>,
}

impl PreviousRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &str, source: &str) -> Option<&Rate> {
        self.by_token.get(token)?.get(source)
    }

    pub fn record(&mut self, rate: &Rate) {
        self.by_token
            .entry(rate.token.to_string())
            .or_default()
            .insert(rate.source.to_string(), rate.clone());
    }

    /// Record every rate of a cycle.
    pub fn record_all<'a, I>(&mut self, rates: I)
    where
        I: IntoIterator<Item = &'a Rate>,
    {
        for rate in rates {
            self.record(rate);
        }
    }

    /// Number of tracked `(token, source)` pairs.
    pub fn len(&self) -> usize {
        self.by_token.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
