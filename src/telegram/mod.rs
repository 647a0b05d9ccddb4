//! Telegram account linking and notifications.
//!
//! The bot is driven by webhook: Telegram posts updates to
//! `/api/v1/telegram/webhook` and replies go out through a [`Notifier`].

mod connections;
mod notifier;
mod webhook;

pub use connections::{PendingLink, Redeemed, TelegramConnection, TelegramConnectionStore};
pub use notifier::{NoopNotifier, Notifier, TelegramNotifier};
pub use webhook::{BotCommand, HELP_TEXT, IncomingMessage, TelegramUpdate, parse_command};

/// `https://t.me/<bot>?start=<code>` when the bot username is known.
#[must_use]
pub fn deep_link(bot_username: Option<&str>, code: &str) -> Option<String> {
    bot_username
        .map(|b| b.trim_start_matches('@'))
        .filter(|b| !b.is_empty())
        .map(|b| format!("https://t.me/{b}?start={code}"))
}
