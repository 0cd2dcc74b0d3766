//! Per-token lending-rate thresholds.

use crate::Rate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default minimum lending rate (percent) for tracked tokens.
pub const DEFAULT_LENDING_THRESHOLD: f64 = 30.0;

/// Tokens tracked out of the box.
pub const DEFAULT_TRACKED_TOKENS: [&str; 4] = ["USDC", "TIA", "USDT", "FDUSD"];

#[derive(Error, Debug, PartialEq)]
pub enum ThresholdError {
    #[error("Threshold for {token} must be a finite, non-negative percentage (got {value})")]
    InvalidValue { token: String, value: f64 },
    #[error("Empty token symbol in threshold configuration")]
    EmptyToken,
}

/// Token symbol -> minimum lending rate in percent.
///
/// Tokens absent from the map are never candidates. Symbols are stored
/// upper-cased, including those read from a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct LendingThresholds(BTreeMap<String, f64>);

impl Default for LendingThresholds {
    fn default() -> Self {
        Self(
            DEFAULT_TRACKED_TOKENS
                .iter()
                .map(|t| (t.to_string(), DEFAULT_LENDING_THRESHOLD))
                .collect(),
        )
    }
}

impl LendingThresholds {
    /// Thresholds with no tracked tokens.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, token: &str) -> Option<f64> {
        self.0.get(token).copied()
    }

    /// Override or add the threshold for a token. Symbols are upper-cased.
    pub fn set(&mut self, token: &str, value: f64) {
        self.0.insert(token.trim().to_uppercase(), value);
    }

    /// True iff the token is tracked and the lending rate reaches its threshold.
    pub fn is_candidate(&self, rate: &Rate) -> bool {
        self.get(rate.token.as_str())
            .is_some_and(|threshold| rate.lending_rate >= threshold)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), ThresholdError> {
        for (token, &value) in &self.0 {
            if token.trim().is_empty() {
                return Err(ThresholdError::EmptyToken);
            }
            if !value.is_finite() || value < 0.0 {
                return Err(ThresholdError::InvalidValue {
                    token: token.clone(),
                    value,
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, f64)> for LendingThresholds {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        let mut thresholds = Self::empty();
        for (token, value) in iter {
            thresholds.set(&token, value);
        }
        thresholds
    }
}

impl From<BTreeMap<String, f64>> for LendingThresholds {
    fn from(map: BTreeMap<String, f64>) -> Self {
        map.into_iter().collect()
    }
}

impl From<LendingThresholds> for BTreeMap<String, f64> {
    fn from(thresholds: LendingThresholds) -> Self {
        thresholds.0
    }
}
