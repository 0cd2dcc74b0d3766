//! APR to APY normalization.
//!
//! On-chain money markets report simple annual rates. Exchanges report
//! yields that already include compounding, so their rates pass through.

use crate::Rate;
use serde::{Deserialize, Serialize};

/// Daily compounding.
pub const DEFAULT_COMPOUNDING_PERIODS: u32 = 365;

/// Sources reporting simple APR by default.
pub const DEFAULT_APR_SOURCES: [&str; 2] = ["Neptune", "Injera"];

/// Convert a simple annual rate (percent) to its compounding equivalent (percent).
///
/// `APY = ((1 + APR/100/n)^n - 1) * 100`. `periods == 0` is treated as 1.
pub fn apr_to_apy(apr: f64, periods: u32) -> f64 {
    let n = periods.max(1);
    let apy = (1.0 + apr / 100.0 / n as f64).powf(f64::from(n)) - 1.0;
    apy * 100.0
}

/// Applies APR→APY conversion to rates from sources that report APR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateNormalizer {
    /// Source names whose rates are simple APR.
    pub apr_sources: Vec<String>,
    /// Compounding periods per year.
    pub compounding_periods: u32,
}

impl Default for RateNormalizer {
    fn default() -> Self {
        Self {
            apr_sources: DEFAULT_APR_SOURCES.iter().map(|s| s.to_string()).collect(),
            compounding_periods: DEFAULT_COMPOUNDING_PERIODS,
        }
    }
}

impl RateNormalizer {
    pub fn new(apr_sources: Vec<String>, compounding_periods: u32) -> Self {
        Self {
            apr_sources,
            compounding_periods,
        }
    }

    pub fn reports_apr(&self, source: &str) -> bool {
        self.apr_sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(source))
    }

    pub fn normalize(&self, rate: Rate) -> Rate {
        if !self.reports_apr(&rate.source) {
            return rate;
        }
        let lending = apr_to_apy(rate.lending_rate, self.compounding_periods);
        let borrow = apr_to_apy(rate.borrow_rate, self.compounding_periods);
        rate.with_rates(lending, borrow)
    }

    pub fn normalize_all(&self, rates: Vec<Rate>) -> Vec<Rate> {
        rates.into_iter().map(|r| self.normalize(r)).collect()
    }
}
