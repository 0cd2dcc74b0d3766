//! Telegram delivery for lending rate alerts.
//!
//! This crate provides:
//! - SQLite-backed subscriber registry
//! - HTML message formatting
//! - Telegram bot integration for commands and notifications

pub mod commands;
pub mod db;
pub mod format;
pub mod notifier;
pub mod subscriber;
pub mod telegram;

pub use commands::CommandHandler;
pub use db::{Database, DbError, SubscriberStore};
pub use format::{format_notification, format_rate_line, format_token_section, Emphasis};
pub use notifier::{DeliveryReport, Notifier, NotifierConfig, NotifierError};
pub use subscriber::Subscriber;
pub use telegram::{parse_command, Command, MessageSender, TelegramBot, TelegramError};
