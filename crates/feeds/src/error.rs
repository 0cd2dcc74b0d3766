//! Error types for rate fetching.

use std::time::Duration;
use thiserror::Error;

/// Errors from a single source adapter.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("No usable rates in response")]
    EmptyResponse,
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::ConnectionFailed(_) | FeedError::Timeout(_) | FeedError::HttpStatus { .. }
        )
    }

    pub(crate) fn timed_out(source: &str, after: Duration) -> Self {
        FeedError::Timeout(format!("{} did not respond within {:?}", source, after))
    }
}

/// Errors from the aggregation cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("All {0} rate sources failed")]
    AllSourcesFailed(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FeedError::Timeout("x".into()).is_transient());
        assert!(FeedError::ConnectionFailed("x".into()).is_transient());
        assert!(!FeedError::ParseError("x".into()).is_transient());
        assert!(!FeedError::EmptyResponse.is_transient());
    }

    #[test]
    fn test_serde_error_maps_to_parse_error() {
        let err: FeedError = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, FeedError::ParseError(_)));
    }

    #[test]
    fn test_timed_out_message() {
        let err = FeedError::timed_out("OKX", Duration::from_secs(30));
        assert!(err.to_string().contains("OKX"));
    }
}
