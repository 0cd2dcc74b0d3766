use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lendwatch_core::{Category, Rate};
use serde::Deserialize;
use tracing::debug;

use super::{fraction_to_percent, read_body, SourceAdapter};
use crate::FeedError;

/// CosmWasm smart query aggregating the Injera USDT market.
const URL: &str = "https://inj24984.allnodes.me:1317/iAeAChGmajFpOeRk/cosmwasm/wasm/v1/contract/inj1578zx2zmp46l554zlw5jqq3nslth6ss04dv0ee/smart/ewogICJhZ2dyZWdhdGUiOiB7CiAgICAicXVlcmllcyI6IFsKICAgICAgewogICAgICAgICJhZGRyZXNzIjogImluajFkZmZ1ajR1ZDJmbjd2aGh3N2RlYzZhcng3dHV5eGQ1NnNyandrNCIsCiAgICAgICAgImRhdGEiOiAiZXlKdFlYSnJaWFFpT25zaVpHVnViMjBpT2lKd1pXZG5lVEI0WkVGRE1UZEdPVFU0UkRKbFpUVXlNMkV5TWpBMk1qQTJPVGswTlRrM1F6RXpSRGd6TVdWak55SjlmUT09IgogICAgICB9LAogICAgICB7CiAgICAgICAgImFkZHJlc3MiOiAiaW5qMXE1ZTZwbGVoMmg5ZDJxcjNtN2RybXhqN2tsZ3VnZzdweHZ1a3d0IiwKICAgICAgICAiZGF0YSI6ICJleUpoWTNScGRtVmZaVzFwYzNOcGIyNXpJanA3SW1OdmJHeGhkR1Z5WVd4ZlpHVnViMjBpT2lKd1pXZG5lVEI0WkVGRE1UZEdPVFU0UkRKbFpUVXlNMkV5TWpBMk1qQTJPVGswTlRrM1F6RXpSRGd6TVdWak55SjlmUT09IgogICAgICB9CiAgICBdCiAgfQp9";

/// Injera money market on Injective. Reports simple APR, USDT only.
pub struct InjeraAdapter {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct InjeraResponse {
    data: InjeraData,
}

#[derive(Debug, Deserialize)]
struct InjeraData {
    #[serde(default)]
    return_data: Vec<InjeraQueryResult>,
}

#[derive(Debug, Deserialize)]
struct InjeraQueryResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct InjeraMarket {
    borrow_rate: String,
    liquidity_rate: String,
}

impl InjeraAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: URL.to_string(),
        }
    }

    /// Parse the aggregate query response.
    ///
    /// The first sub-query that decodes into a market yields the USDT rate;
    /// the remaining sub-queries carry unrelated contract state.
    fn parse_response(body: &str) -> Result<Vec<Rate>, FeedError> {
        let response: InjeraResponse = serde_json::from_str(body)?;

        let rate = response
            .data
            .return_data
            .iter()
            .filter(|item| item.success && !item.data.is_empty())
            .find_map(|item| Self::decode_market(&item.data));

        Ok(rate.into_iter().collect())
    }

    fn decode_market(encoded: &str) -> Option<Rate> {
        let decoded = match BASE64.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Injera: undecodable query result");
                return None;
            }
        };
        let market: InjeraMarket = serde_json::from_slice(&decoded).ok()?;
        let borrow = fraction_to_percent(&market.borrow_rate)?;
        let lending = fraction_to_percent(&market.liquidity_rate)?;
        Some(Rate::new("Injera", "USDT", lending, borrow, Category::Dex))
    }
}

#[async_trait]
impl SourceAdapter for InjeraAdapter {
    fn name(&self) -> &'static str {
        "Injera"
    }

    fn category(&self) -> Category {
        Category::Dex
    }

    async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
        let response = self.client.get(&self.url).send().await?;
        let body = read_body(response).await?;
        Self::parse_response(&body)
    }
}
