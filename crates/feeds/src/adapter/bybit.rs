use async_trait::async_trait;
use lendwatch_core::{Category, Rate};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{read_body, SourceAdapter};
use crate::FeedError;

const URL: &str = "https://api2.bybit.com/s1/byfi/get-product-detail";

/// Flexible savings product ids: 1 = USDT, 2 = USDC.
const PRODUCT_IDS: [&str; 2] = ["1", "2"];

/// Flexible savings product type.
const PRODUCT_TYPE: u32 = 4;

/// Tier reported as the lending rate (the first tier is a promotional cap).
const RATE_TIER: usize = 1;

/// Bybit Earn flexible savings. Lending only.
pub struct BybitAdapter {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<BybitResult>,
}

#[derive(Debug, Deserialize)]
struct BybitResult {
    flexible_saving_product_detail: ProductDetail,
}

#[derive(Debug, Deserialize)]
struct ProductDetail {
    #[serde(default)]
    tiered_apy_list: Vec<ApyTier>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApyTier {
    apy_e8: String,
}

impl BybitAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: URL.to_string(),
        }
    }

    /// Parse one product detail response.
    ///
    /// Returns `Ok(None)` when the product has no tier to report.
    fn parse_response(body: &str) -> Result<Option<Rate>, FeedError> {
        let response: BybitResponse = serde_json::from_str(body)?;
        if response.ret_code != 0 {
            return Err(FeedError::Api(format!(
                "{} (code: {})",
                response.ret_msg, response.ret_code
            )));
        }

        let Some(detail) = response.result.map(|r| r.flexible_saving_product_detail) else {
            return Ok(None);
        };
        let Some(tier) = detail.tiered_apy_list.get(RATE_TIER) else {
            return Ok(None);
        };
        if detail.name.is_empty() {
            return Err(FeedError::ParseError("product without name".into()));
        }

        // apy_e8 is a fraction scaled by 1e8; dividing by 1e6 yields percent.
        let apy_e8: i64 = tier
            .apy_e8
            .trim()
            .parse()
            .map_err(|_| FeedError::ParseError(format!("invalid apy_e8: {}", tier.apy_e8)))?;
        let percent = apy_e8 as f64 / 1_000_000.0;

        Ok(Some(Rate::new(
            "Bybit",
            &detail.name.to_uppercase(),
            percent,
            0.0,
            Category::Cex,
        )))
    }

    async fn fetch_product(&self, product_id: &str) -> Result<Option<Rate>, FeedError> {
        let payload = serde_json::json!({
            "product_type": PRODUCT_TYPE,
            "product_id": product_id,
        });
        let response = self
            .client
            .post(&self.url)
            .header("Accept", "*/*")
            .header("Referer", "https://www.bybit.com/")
            .json(&payload)
            .send()
            .await?;
        let body = read_body(response).await?;
        Self::parse_response(&body)
    }
}

#[async_trait]
impl SourceAdapter for BybitAdapter {
    fn name(&self) -> &'static str {
        "Bybit"
    }

    fn category(&self) -> Category {
        Category::Cex
    }

    async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
        let mut rates = Vec::new();
        let mut failures = 0;
        let mut last_error = None;

        for product_id in PRODUCT_IDS {
            match self.fetch_product(product_id).await {
                Ok(Some(rate)) => {
                    debug!(token = %rate.token, lending = rate.lending_rate, "Bybit rate");
                    rates.push(rate);
                }
                Ok(None) => debug!(product_id = product_id, "Bybit: product has no rate tier"),
                Err(e) => {
                    warn!(product_id = product_id, error = %e, "Bybit: skipping product");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failures == PRODUCT_IDS.len() => Err(e),
            _ => Ok(rates),
        }
    }
}
