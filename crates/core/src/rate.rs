//! Lending rate observations.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Market structure of a rate source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Centralized exchange (OKX, Binance, Bybit).
    #[serde(rename = "CEX")]
    Cex,
    /// On-chain money market (Neptune, Injera).
    #[serde(rename = "DEX")]
    Dex,
}

impl Category {
    #[inline]
    pub fn is_cex(self) -> bool {
        matches!(self, Category::Cex)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Cex => "CEX",
            Category::Dex => "DEX",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time lending/borrow rate for one token on one source.
///
/// `(source, token)` identifies an observation. Rates are replaced wholesale
/// on every fetch cycle and never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    /// Source name (e.g., "OKX", "Neptune")
    pub source: CompactString,
    /// Canonical token symbol (e.g., "USDT", "TIA")
    pub token: CompactString,
    /// Annualized yield offered to lenders, in percent
    pub lending_rate: f64,
    /// Annualized cost to borrowers, in percent (0 when not applicable)
    pub borrow_rate: f64,
    pub category: Category,
}

impl Rate {
    pub fn new(
        source: &str,
        token: &str,
        lending_rate: f64,
        borrow_rate: f64,
        category: Category,
    ) -> Self {
        Self {
            source: CompactString::new(source),
            token: CompactString::new(token),
            lending_rate,
            borrow_rate,
            category,
        }
    }

    /// Identity of this observation: `(token, source)`.
    pub fn key(&self) -> (&str, &str) {
        (self.token.as_str(), self.source.as_str())
    }

    /// Copy of this rate with both percentages replaced.
    pub fn with_rates(&self, lending_rate: f64, borrow_rate: f64) -> Self {
        Self {
            lending_rate,
            borrow_rate,
            ..self.clone()
        }
    }
}

/// Rates grouped by token, tokens in lexicographic order.
pub type RatesByToken = BTreeMap<String, Vec<Rate>>;

/// Group rates by token. Each group is sorted by source name.
pub fn group_by_token<'a, I>(rates: I) -> RatesByToken
where
    I: IntoIterator<Item = &'a Rate>,
{
    let mut grouped = RatesByToken::new();
    for rate in rates {
        grouped
            .entry(rate.token.to_string())
            .or_default()
            .push(rate.clone());
    }
    for group in grouped.values_mut() {
        group.sort_by(|a, b| a.source.cmp(&b.source));
    }
    grouped
}
