//! Lending-rate collection from exchanges and on-chain money markets.
//!
//! ## Architecture
//!
//! - `adapter/` - Source-specific REST clients producing `Rate` records
//! - `cache` - Concurrent fetch, APR→APY normalization and TTL snapshot
//! - `error` - `FeedError` per source, `CacheError` for the aggregate

pub mod adapter;
pub mod cache;
pub mod error;

pub use adapter::{
    default_sources, http_client, BinanceAdapter, BybitAdapter, InjeraAdapter, NeptuneAdapter,
    OkxAdapter, SourceAdapter, DEFAULT_REQUEST_TIMEOUT,
};
pub use cache::*;
pub use error::*;
