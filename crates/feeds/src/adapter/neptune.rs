use async_trait::async_trait;
use lendwatch_core::{Category, Rate};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::{fraction_to_percent, read_body, SourceAdapter};
use crate::FeedError;

const URL: &str = "https://neptune-api-production-6ojz3.ondigitalocean.app/v1/aprs?refresh=false";

/// Injective denoms -> canonical symbols.
const DENOMS: [(&str, &str); 3] = [
    (
        "ibc/2CBC2EA121AE42563B08028466F37B600F2D7D4282342DE938283CC3FB2BC00E",
        "USDC",
    ),
    (
        "ibc/F51BB221BAA275F2EBF654F70B005627D7E713AFFD6D86AFD1E43CAA886149F4",
        "TIA",
    ),
    ("peggy0xdAC17F958D2ee523a2206206994597C13D831ec7", "USDT"),
];

/// Neptune money market on Injective. Reports simple APR.
pub struct NeptuneAdapter {
    client: reqwest::Client,
    url: String,
    denoms: HashMap<String, String>,
}

#[derive(Clone, Copy)]
enum Side {
    Lend,
    Borrow,
}

impl NeptuneAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: URL.to_string(),
            denoms: DENOMS
                .iter()
                .map(|(denom, symbol)| (denom.to_string(), symbol.to_string()))
                .collect(),
        }
    }

    /// Parse the `/v1/aprs` payload.
    ///
    /// Entries look like `[{"native_token": {"denom": "..."}}, "0.1234"]`.
    /// Unknown denoms and malformed entries are skipped.
    fn parse_response(
        body: &str,
        denoms: &HashMap<String, String>,
    ) -> Result<Vec<Rate>, FeedError> {
        let json: Value = serde_json::from_str(body)?;
        if !json.is_object() {
            return Err(FeedError::ParseError("Neptune payload is not an object".into()));
        }

        // token -> (lend, borrow)
        let mut by_token: BTreeMap<String, (f64, f64)> = BTreeMap::new();

        for (key, side) in [("lend_aprs", Side::Lend), ("borrow_aprs", Side::Borrow)] {
            let Some(entries) = json[key].as_array() else {
                continue;
            };
            for entry in entries {
                let Some((symbol, percent)) = Self::parse_entry(entry, denoms) else {
                    continue;
                };
                let slot = by_token.entry(symbol).or_insert((0.0, 0.0));
                match side {
                    Side::Lend => slot.0 = percent,
                    Side::Borrow => slot.1 = percent,
                }
            }
        }

        Ok(by_token
            .into_iter()
            .map(|(token, (lend, borrow))| Rate::new("Neptune", &token, lend, borrow, Category::Dex))
            .collect())
    }

    fn parse_entry(entry: &Value, denoms: &HashMap<String, String>) -> Option<(String, f64)> {
        let pair = entry.as_array().filter(|p| p.len() == 2)?;
        let denom = pair[0]["native_token"]["denom"].as_str()?;
        let symbol = denoms.get(denom)?;
        let percent = fraction_to_percent(pair[1].as_str()?)?;
        Some((symbol.clone(), percent))
    }
}

#[async_trait]
impl SourceAdapter for NeptuneAdapter {
    fn name(&self) -> &'static str {
        "Neptune"
    }

    fn category(&self) -> Category {
        Category::Dex
    }

    async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
        let response = self.client.get(&self.url).send().await?;
        let body = read_body(response).await?;
        Self::parse_response(&body, &self.denoms)
    }
}
