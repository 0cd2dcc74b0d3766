//! Subscriber types.

use serde::{Deserialize, Serialize};

/// A registered chat together with its display preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Telegram chat ID.
    pub chat_id: i64,
    /// Whether CEX rows are rendered for this chat.
    pub show_cex: bool,
}

impl Subscriber {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            show_cex: true,
        }
    }
}
