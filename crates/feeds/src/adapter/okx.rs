use async_trait::async_trait;
use lendwatch_core::{Category, Rate};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{read_body, SourceAdapter};
use crate::FeedError;

const URL_BASE: &str = "https://www.okx.com/priapi/v2/financial/market-lending-info";

/// OKX currency ids for tracked tokens.
const CURRENCIES: [(u32, &str); 3] = [(2854, "TIA"), (7, "USDT"), (283, "USDC")];

/// OKX simple-earn lending market.
pub struct OkxAdapter {
    client: reqwest::Client,
    base_url: String,
    currencies: Vec<(u32, String)>,
}

#[derive(Debug, Deserialize)]
struct OkxResponse {
    data: OkxData,
}

#[derive(Debug, Deserialize)]
struct OkxData {
    #[serde(default)]
    list: Vec<OkxLendingInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxLendingInfo {
    #[serde(default)]
    currency_name: String,
    estimated_rate: f64,
    #[serde(default)]
    pre_rate: f64,
}

impl OkxAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: URL_BASE.to_string(),
            currencies: CURRENCIES
                .iter()
                .map(|(id, symbol)| (*id, symbol.to_string()))
                .collect(),
        }
    }

    /// Parse one `market-lending-info` response.
    ///
    /// `fallback_symbol` is used when OKX omits the currency name.
    fn parse_response(body: &str, fallback_symbol: &str) -> Result<Rate, FeedError> {
        let response: OkxResponse = serde_json::from_str(body)?;
        let info = response
            .data
            .list
            .into_iter()
            .next()
            .ok_or(FeedError::EmptyResponse)?;

        let token = if info.currency_name.is_empty() {
            fallback_symbol.to_string()
        } else {
            info.currency_name.to_uppercase()
        };

        Ok(Rate::new(
            "OKX",
            &token,
            info.estimated_rate * 100.0,
            info.pre_rate * 100.0,
            Category::Cex,
        ))
    }

    async fn fetch_currency(&self, currency_id: u32, symbol: &str) -> Result<Rate, FeedError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("currencyId", currency_id)])
            .send()
            .await?;
        let body = read_body(response).await?;
        Self::parse_response(&body, symbol)
    }
}

#[async_trait]
impl SourceAdapter for OkxAdapter {
    fn name(&self) -> &'static str {
        "OKX"
    }

    fn category(&self) -> Category {
        Category::Cex
    }

    async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
        let mut rates = Vec::with_capacity(self.currencies.len());
        let mut last_error = None;

        for (currency_id, symbol) in &self.currencies {
            match self.fetch_currency(*currency_id, symbol).await {
                Ok(rate) => {
                    debug!(token = %rate.token, lending = rate.lending_rate, "OKX rate");
                    rates.push(rate);
                }
                Err(e) => {
                    warn!(currency_id = currency_id, symbol = %symbol, error = %e, "OKX: skipping currency");
                    last_error = Some(e);
                }
            }
        }

        match (rates.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(rates),
        }
    }
}
