//! Telegram bot transport and command dispatch.

use crate::commands::CommandHandler;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
}

/// Delivers formatted (HTML) messages to a chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;
}

/// Bot commands.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Subscribe to rate notifications")]
    Start,
    #[command(description = "Unsubscribe from rate notifications")]
    Stop,
    #[command(description = "Show current rates. Usage: /rate [token]")]
    Rate(String),
    #[command(description = "Toggle visibility of CEX rates")]
    Cex,
    #[command(description = "Show help")]
    Help,
}

/// Parse incoming text. Anything that is not a known command maps to `Help`.
pub fn parse_command(text: &str, bot_name: &str) -> Command {
    if let Ok(cmd) = Command::parse(text, bot_name) {
        return cmd;
    }

    // A bare `/rate` may be rejected for its missing argument.
    let first = text.split_whitespace().next().unwrap_or_default();
    let name = first.split('@').next().unwrap_or_default();
    if name == "/rate" {
        return Command::Rate(String::new());
    }
    Command::Help
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Register the command menu and run the update dispatcher until Ctrl-C.
    pub async fn run(self: Arc<Self>, commands: Arc<CommandHandler>) -> Result<(), TelegramError> {
        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!(error = %e, "Failed to register bot commands");
        }

        let me = self.bot.get_me().await?;
        let bot_name = me.username().to_string();
        info!(bot = %bot_name, "Telegram bot started");

        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let commands = Arc::clone(&commands);
            let bot_name = bot_name.clone();
            async move { handle_message(bot, msg, &commands, &bot_name).await }
        });

        Dispatcher::builder(self.bot.clone(), handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Telegram dispatcher stopped");
        Ok(())
    }
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    commands: &CommandHandler,
    bot_name: &str,
) -> Result<(), TelegramError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let cmd = parse_command(text, bot_name);
    debug!(chat_id = msg.chat.id.0, command = ?cmd, "Received command");

    let reply = commands.handle(msg.chat.id.0, cmd).await;
    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

#[async_trait]
impl MessageSender for TelegramBot {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}
