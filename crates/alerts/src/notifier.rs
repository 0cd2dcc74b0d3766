//! Fan-out of rate notifications to subscribers.

use crate::db::{DbError, SubscriberStore};
use crate::format::format_notification;
use crate::telegram::MessageSender;
use lendwatch_core::{LendingThresholds, RatesByToken};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

/// Configuration for the notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Upper bound on in-flight sends.
    pub max_concurrent_sends: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sends: 16,
        }
    }
}

/// Outcome of one notification round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
    /// Recipients for whom nothing was visible under their preference.
    pub skipped: usize,
}

/// Sends rendered notifications to every subscriber.
pub struct Notifier {
    store: Arc<dyn SubscriberStore>,
    sender: Arc<dyn MessageSender>,
    thresholds: LendingThresholds,
    config: NotifierConfig,
}

impl Notifier {
    /// Create a new notifier.
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        sender: Arc<dyn MessageSender>,
        thresholds: LendingThresholds,
        config: NotifierConfig,
    ) -> Self {
        Self {
            store,
            sender,
            thresholds,
            config,
        }
    }

    /// Render and deliver `rates_by_token` to all subscribers.
    ///
    /// Delivery failures are logged and counted; they never stop delivery to
    /// other recipients.
    pub async fn notify(&self, rates_by_token: &RatesByToken) -> Result<DeliveryReport, NotifierError> {
        let subscribers = self.store.subscribers().await?;
        let mut report = DeliveryReport {
            recipients: subscribers.len(),
            ..DeliveryReport::default()
        };

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_sends.max(1)));
        let mut tasks = JoinSet::new();

        for subscriber in subscribers {
            let text = format_notification(rates_by_token, &self.thresholds, subscriber.show_cex);
            if text.is_empty() {
                debug!(chat_id = subscriber.chat_id, "Nothing visible for subscriber");
                report.skipped += 1;
                continue;
            }

            let sender = Arc::clone(&self.sender);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let result = sender.send(subscriber.chat_id, &text).await;
                (subscriber.chat_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chat_id, Ok(()))) => {
                    debug!(chat_id = chat_id, "Notification sent");
                    report.sent += 1;
                }
                Ok((chat_id, Err(e))) => {
                    error!(chat_id = chat_id, error = %e, "Failed to send notification");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Notification task failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            recipients = report.recipients,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "Notification round complete"
        );
        Ok(report)
    }
}
