use async_trait::async_trait;
use lendwatch_core::{Category, Rate};
use serde::Deserialize;

use super::{fraction_to_percent, read_body, SourceAdapter};
use crate::FeedError;

const URL: &str =
    "https://www.binance.com/bapi/earn/v1/friendly/finance-earn/simple-earn/homepage/details";

const ASSETS: [&str; 2] = ["USDT", "FDUSD"];

/// Binance Simple Earn flexible products. Lending only.
pub struct BinanceAdapter {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SimpleEarnResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    success: bool,
    data: Option<SimpleEarnData>,
}

#[derive(Debug, Deserialize)]
struct SimpleEarnData {
    #[serde(default)]
    list: Vec<SimpleEarnProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimpleEarnProduct {
    asset: String,
    #[serde(default)]
    apy_range: Vec<String>,
}

impl BinanceAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: URL.to_string(),
        }
    }

    /// Parse the Simple Earn homepage payload. The best tier of `apyRange`
    /// is reported as the lending rate.
    fn parse_response(body: &str) -> Result<Vec<Rate>, FeedError> {
        let response: SimpleEarnResponse = serde_json::from_str(body)?;
        if !response.success {
            return Err(FeedError::Api(
                response.message.unwrap_or_else(|| "unsuccessful response".into()),
            ));
        }

        let products = response.data.map(|d| d.list).unwrap_or_default();
        // Products listed more than once collapse into one rate per asset.
        let mut rates: Vec<Rate> = Vec::new();
        for product in products.iter().filter(|p| ASSETS.contains(&p.asset.as_str())) {
            let Some(best) = product
                .apy_range
                .iter()
                .filter_map(|apy| fraction_to_percent(apy))
                .reduce(f64::max)
            else {
                continue;
            };

            match rates.iter_mut().find(|r| r.token.as_str() == product.asset) {
                Some(existing) => existing.lending_rate = existing.lending_rate.max(best),
                None => rates.push(Rate::new("Binance", &product.asset, best, 0.0, Category::Cex)),
            }
        }

        if rates.is_empty() {
            return Err(FeedError::EmptyResponse);
        }
        Ok(rates)
    }
}

#[async_trait]
impl SourceAdapter for BinanceAdapter {
    fn name(&self) -> &'static str {
        "Binance"
    }

    fn category(&self) -> Category {
        Category::Cex
    }

    async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "*/*")
            .send()
            .await?;
        let body = read_body(response).await?;
        Self::parse_response(&body)
    }
}
