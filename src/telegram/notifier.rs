use async_trait::async_trait;
use teloxide::Bot;
use teloxide::prelude::Requester;
use teloxide::types::ChatId;

use crate::error::{Error, Result};

/// Outbound message channel to a Telegram chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Sends through the Telegram Bot API.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    #[must_use]
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot: Bot::new(bot_token),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text.to_string())
            .await
            .map_err(|e| Error::Telegram(e.to_string()))?;
        tracing::debug!("Sent Telegram message to chat {chat_id}");
        Ok(())
    }
}

/// Used when no bot token is configured. Every send fails.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, chat_id: i64, _text: &str) -> Result<()> {
        tracing::warn!("Telegram bot not configured, dropping message for chat {chat_id}");
        Err(Error::Telegram("bot token not configured".to_string()))
    }
}
