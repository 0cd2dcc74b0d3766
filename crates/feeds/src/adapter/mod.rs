//! Source adapter trait and implementations.
//!
//! Each lending-rate provider has its own REST endpoint and payload format.
//! Adapters normalize these into `Rate` records with canonical token symbols.

mod binance;
mod bybit;
mod injera;
mod neptune;
mod okx;

pub use binance::BinanceAdapter;
pub use bybit::BybitAdapter;
pub use injera::InjeraAdapter;
pub use neptune::NeptuneAdapter;
pub use okx::OkxAdapter;

use crate::FeedError;
use async_trait::async_trait;
use lendwatch_core::{Category, Rate};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for every outbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0";

/// A provider of lending rates.
///
/// A malformed entry for one token is skipped; `fetch` fails only when the
/// source is unreachable or its payload is unusable as a whole.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name stamped on every produced rate.
    fn name(&self) -> &'static str;

    /// Market structure of this source.
    fn category(&self) -> Category;

    /// Fetch the current rates.
    async fn fetch(&self) -> Result<Vec<Rate>, FeedError>;
}

/// Build the shared HTTP client used by all adapters.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, FeedError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .gzip(true)
        .build()
        .map_err(|e| FeedError::ConnectionFailed(e.to_string()))
}

/// All production sources sharing one client.
pub fn default_sources(client: reqwest::Client) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(OkxAdapter::new(client.clone())),
        Arc::new(NeptuneAdapter::new(client.clone())),
        Arc::new(InjeraAdapter::new(client.clone())),
        Arc::new(BinanceAdapter::new(client.clone())),
        Arc::new(BybitAdapter::new(client)),
    ]
}

/// Read a response body, mapping non-2xx statuses to `FeedError::HttpStatus`.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, FeedError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(FeedError::HttpStatus {
            status: status.as_u16(),
            body: truncate(&body, 200),
        });
    }
    Ok(body)
}

/// Parse a decimal fraction ("0.1234") into a percentage (12.34).
pub(crate) fn fraction_to_percent(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * 100.0)
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_to_percent() {
        assert_eq!(fraction_to_percent("0.25"), Some(25.0));
        assert_eq!(fraction_to_percent(" 0 "), Some(0.0));
        assert_eq!(fraction_to_percent("abc"), None);
        assert_eq!(fraction_to_percent("NaN"), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_default_sources_names() {
        let client = http_client(DEFAULT_REQUEST_TIMEOUT).unwrap();
        let names: Vec<_> = default_sources(client).iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["OKX", "Neptune", "Injera", "Binance", "Bybit"]);
    }
}
