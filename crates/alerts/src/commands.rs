//! Replies to user commands.

use crate::db::SubscriberStore;
use crate::format::{format_notification, format_token_section};
use crate::telegram::Command;
use lendwatch_core::{group_by_token, LendingThresholds};
use lendwatch_feeds::RateCache;
use std::sync::Arc;
use teloxide::utils::html::escape;
use tracing::{error, info};

const WELCOME: &str =
    "Welcome! You will now receive notifications when lending rates exceed thresholds.";
const UNSUBSCRIBED: &str = "You have been unsubscribed from notifications.";
const REQUEST_FAILED: &str =
    "Sorry, there was an error processing your request. Please try again later.";
const PREFERENCE_FAILED: &str =
    "Sorry, there was an error saving your preference. Please try again later.";
const FETCH_FAILED: &str = "Error fetching rates. Please try again later.";
const NO_RATES: &str = "No rates available yet. Please try again in a few minutes.";
const ALL_HIDDEN: &str = "Only CEX rates are available right now. Use /cex to show them.";

/// Help lines, sorted by command.
const HELP: [(&str, &str); 5] = [
    ("/cex", "Toggle visibility of CEX (Centralized Exchange) rates"),
    ("/help", "Show this help message"),
    (
        "/rate",
        "Show current rates for all tokens\nUsage: /rate [token]\nExample: /rate USDT",
    ),
    ("/start", "Subscribe to rate notifications"),
    ("/stop", "Unsubscribe from rate notifications"),
];

/// Static help listing.
pub fn help_message() -> String {
    let mut message = String::from("<b>Available Commands</b>\n\n");
    for (command, description) in HELP {
        message.push_str(&format!("<b>{}</b>\n{}\n\n", command, description));
    }
    message
}

/// Builds the reply for each incoming command.
pub struct CommandHandler {
    store: Arc<dyn SubscriberStore>,
    cache: Arc<RateCache>,
    thresholds: LendingThresholds,
}

impl CommandHandler {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        cache: Arc<RateCache>,
        thresholds: LendingThresholds,
    ) -> Self {
        Self {
            store,
            cache,
            thresholds,
        }
    }

    /// Handle a command from `chat_id` and return the HTML reply.
    ///
    /// Internal failures are logged; the reply only carries an apology.
    pub async fn handle(&self, chat_id: i64, command: Command) -> String {
        match command {
            Command::Start => self.subscribe(chat_id).await,
            Command::Stop => self.unsubscribe(chat_id).await,
            Command::Rate(args) => {
                let token = args.split_whitespace().next().unwrap_or_default();
                self.rates(chat_id, token).await
            }
            Command::Cex => self.toggle_cex(chat_id).await,
            Command::Help => help_message(),
        }
    }

    async fn subscribe(&self, chat_id: i64) -> String {
        match self.store.add(chat_id).await {
            Ok(added) => {
                info!(chat_id = chat_id, new = added, "Subscriber added");
                WELCOME.to_string()
            }
            Err(e) => {
                error!(chat_id = chat_id, error = %e, "Failed to add subscriber");
                REQUEST_FAILED.to_string()
            }
        }
    }

    async fn unsubscribe(&self, chat_id: i64) -> String {
        match self.store.remove(chat_id).await {
            Ok(removed) => {
                info!(chat_id = chat_id, existed = removed, "Subscriber removed");
                UNSUBSCRIBED.to_string()
            }
            Err(e) => {
                error!(chat_id = chat_id, error = %e, "Failed to remove subscriber");
                REQUEST_FAILED.to_string()
            }
        }
    }

    async fn toggle_cex(&self, chat_id: i64) -> String {
        let result = async {
            let show_cex = !self.store.get_preference(chat_id).await?;
            self.store.set_preference(chat_id, show_cex).await?;
            Ok::<_, crate::db::DbError>(show_cex)
        }
        .await;

        match result {
            Ok(show_cex) => {
                let status = if show_cex { "enabled" } else { "disabled" };
                format!("CEX rates are now {}.", status)
            }
            Err(e) => {
                error!(chat_id = chat_id, error = %e, "Failed to save CEX preference");
                PREFERENCE_FAILED.to_string()
            }
        }
    }

    async fn rates(&self, chat_id: i64, token: &str) -> String {
        let rates = match self.cache.get_with_cache().await {
            Ok(rates) => rates,
            Err(e) => {
                error!(chat_id = chat_id, error = %e, "Failed to fetch rates for command");
                return FETCH_FAILED.to_string();
            }
        };
        if rates.is_empty() {
            return NO_RATES.to_string();
        }

        let show_cex = match self.store.get_preference(chat_id).await {
            Ok(show_cex) => show_cex,
            Err(e) => {
                error!(chat_id = chat_id, error = %e, "Failed to read CEX preference");
                return REQUEST_FAILED.to_string();
            }
        };

        let mut message = if token.is_empty() {
            let grouped = group_by_token(rates.iter());
            let body = format_notification(&grouped, &self.thresholds, show_cex);
            if body.is_empty() {
                return ALL_HIDDEN.to_string();
            }
            format!("<b>Current Rates for All Tokens</b>\n\n{}", body)
        } else {
            let token = token.to_uppercase();
            let token_rates: Vec<_> = rates
                .iter()
                .filter(|r| r.token.as_str() == token)
                .cloned()
                .collect();
            let threshold = self.thresholds.get(&token);
            match format_token_section(&token, &token_rates, threshold, show_cex) {
                Some(section) => format!("<b>Current Rates for {}</b>\n\n{}", escape(&token), section),
                None => return format!("No rates found for token: {}", escape(&token)),
            }
        };

        if let Some(updated) = self.cache.last_updated().await {
            message.push_str(&format!("\n<i>Updated {}</i>", updated.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DbError};
    use async_trait::async_trait;
    use lendwatch_core::{Category, Rate};
    use lendwatch_feeds::{CacheConfig, FeedError, SourceAdapter};

    struct FixedSource(Vec<Rate>);

    #[async_trait]
    impl SourceAdapter for FixedSource {
        fn name(&self) -> &'static str {
            "Fixed"
        }

        fn category(&self) -> Category {
            Category::Cex
        }

        async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
            Ok(self.0.clone())
        }
    }

    struct DownSource;

    #[async_trait]
    impl SourceAdapter for DownSource {
        fn name(&self) -> &'static str {
            "Down"
        }

        fn category(&self) -> Category {
            Category::Dex
        }

        async fn fetch(&self) -> Result<Vec<Rate>, FeedError> {
            Err(FeedError::ConnectionFailed("connection refused".into()))
        }
    }

    /// Registry whose backing pool is gone.
    struct FailingStore;

    fn closed() -> DbError {
        DbError::Sqlx(sqlx::Error::PoolClosed)
    }

    #[async_trait]
    impl SubscriberStore for FailingStore {
        async fn add(&self, _chat_id: i64) -> Result<bool, DbError> {
            Err(closed())
        }

        async fn remove(&self, _chat_id: i64) -> Result<bool, DbError> {
            Err(closed())
        }

        async fn list(&self) -> Result<Vec<i64>, DbError> {
            Err(closed())
        }

        async fn get_preference(&self, _chat_id: i64) -> Result<bool, DbError> {
            Err(closed())
        }

        async fn set_preference(&self, _chat_id: i64, _show_cex: bool) -> Result<(), DbError> {
            Err(closed())
        }
    }

    fn cache_with(sources: Vec<Arc<dyn SourceAdapter>>) -> Arc<RateCache> {
        let config = CacheConfig {
            normalizer: lendwatch_core::RateNormalizer::new(Vec::new(), 365),
            ..CacheConfig::default()
        };
        Arc::new(RateCache::new(sources, config))
    }

    async fn handler(rates: Vec<Rate>) -> (CommandHandler, Database) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let cache = cache_with(vec![Arc::new(FixedSource(rates))]);
        let handler = CommandHandler::new(Arc::new(db.clone()), cache, LendingThresholds::default());
        (handler, db)
    }

    fn sample_rates() -> Vec<Rate> {
        vec![
            Rate::new("OKX", "TIA", 35.0, 40.0, Category::Cex),
            Rate::new("Neptune", "TIA", 12.0, 18.0, Category::Dex),
            Rate::new("Binance", "USDT", 8.0, 0.0, Category::Cex),
        ]
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (handler, db) = handler(Vec::new()).await;

        assert_eq!(handler.handle(5, Command::Start).await, WELCOME);
        assert_eq!(db.list().await.unwrap(), vec![5]);

        assert_eq!(handler.handle(5, Command::Stop).await, UNSUBSCRIBED);
        assert!(db.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cex_toggle() {
        let (handler, db) = handler(Vec::new()).await;

        assert_eq!(handler.handle(5, Command::Cex).await, "CEX rates are now disabled.");
        assert!(!db.get_preference(5).await.unwrap());
        assert_eq!(handler.handle(5, Command::Cex).await, "CEX rates are now enabled.");
        assert!(db.get_preference(5).await.unwrap());
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let (handler, _db) = handler(Vec::new()).await;
        let reply = handler.handle(5, Command::Help).await;
        for command in ["/cex", "/help", "/rate", "/start", "/stop"] {
            assert!(reply.contains(command), "missing {command}");
        }
    }

    #[tokio::test]
    async fn test_rate_without_data() {
        let (handler, _db) = handler(Vec::new()).await;
        assert_eq!(handler.handle(5, Command::Rate(String::new())).await, NO_RATES);
    }

    #[tokio::test]
    async fn test_rate_all_tokens() {
        let (handler, _db) = handler(sample_rates()).await;
        let reply = handler.handle(5, Command::Rate(String::new())).await;

        assert!(reply.starts_with("<b>Current Rates for All Tokens</b>"));
        assert!(reply.contains("🪙 <b>TIA</b>"));
        assert!(reply.contains("🪙 <b>USDT</b>"));
        assert!(reply.contains("  • OKX: L: <b>35%</b> | B: 40%"));
        assert!(reply.contains("Updated "));
    }

    #[tokio::test]
    async fn test_rate_single_token_case_insensitive() {
        let (handler, _db) = handler(sample_rates()).await;
        let reply = handler.handle(5, Command::Rate(" tia ".into())).await;

        assert!(reply.starts_with("<b>Current Rates for TIA</b>"));
        assert!(reply.contains("Neptune"));
        assert!(!reply.contains("USDT"));
    }

    #[tokio::test]
    async fn test_rate_unknown_token() {
        let (handler, _db) = handler(sample_rates()).await;
        let reply = handler.handle(5, Command::Rate("DOGE".into())).await;
        assert_eq!(reply, "No rates found for token: DOGE");
    }

    #[tokio::test]
    async fn test_rate_respects_cex_preference() {
        let (handler, db) = handler(sample_rates()).await;
        db.set_preference(5, false).await.unwrap();

        let reply = handler.handle(5, Command::Rate("TIA".into())).await;
        assert!(!reply.contains("OKX"));
        assert!(reply.contains("Neptune"));

        let reply = handler.handle(5, Command::Rate("USDT".into())).await;
        assert_eq!(reply, "No rates found for token: USDT");
    }

    #[tokio::test]
    async fn test_rate_fetch_failure_hides_cause() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let handler = CommandHandler::new(
            Arc::new(db),
            cache_with(vec![Arc::new(DownSource)]),
            LendingThresholds::default(),
        );

        let reply = handler.handle(5, Command::Rate(String::new())).await;
        assert_eq!(reply, FETCH_FAILED);
        assert!(!reply.contains("refused"));
    }

    #[tokio::test]
    async fn test_rate_uses_first_word_only() {
        let (handler, _db) = handler(sample_rates()).await;
        let reply = handler.handle(5, Command::Rate("tia please".into())).await;
        assert!(reply.starts_with("<b>Current Rates for TIA</b>"));
    }

    #[tokio::test]
    async fn test_registry_failure_replies_with_apology() {
        let handler = CommandHandler::new(
            Arc::new(FailingStore),
            cache_with(vec![Arc::new(FixedSource(sample_rates()))]),
            LendingThresholds::default(),
        );

        assert_eq!(handler.handle(5, Command::Start).await, REQUEST_FAILED);
        assert_eq!(handler.handle(5, Command::Stop).await, REQUEST_FAILED);
        assert_eq!(handler.handle(5, Command::Cex).await, PREFERENCE_FAILED);
        assert_eq!(handler.handle(5, Command::Rate(String::new())).await, REQUEST_FAILED);
        assert_eq!(handler.handle(5, Command::Rate("TIA".into())).await, REQUEST_FAILED);

        let cause = closed().to_string();
        for command in [Command::Start, Command::Stop, Command::Cex, Command::Rate(String::new())] {
            let reply = handler.handle(5, command).await;
            assert!(!reply.contains(&cause));
            assert!(!reply.contains("Database error"));
        }
    }
}
