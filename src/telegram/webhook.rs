use serde::Deserialize;

/// The subset of a Bot API `Update` the webhook reads. Unknown fields and
/// update kinds are ignored.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl IncomingMessage {
    /// Best display handle for the sender.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.from
            .as_ref()
            .and_then(|f| f.username.clone().or_else(|| f.first_name.clone()))
            .or_else(|| self.chat.username.clone())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BotCommand {
    Link(String),
    MissingCode,
    Status,
    Unlink,
    Help,
}

pub const HELP_TEXT: &str = "Budget App bot\n\n\
/link CODE - connect this chat to your account (get the code in Settings)\n\
/status - show which account this chat is linked to\n\
/unlink - stop notifications in this chat";

fn looks_like_code(text: &str) -> bool {
    text.len() == 6 && text.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parses a message text into a bot command. Commands may carry the bot's
/// username (`/status@budget_bot`). A bare six character code links too.
#[must_use]
pub fn parse_command(text: &str) -> BotCommand {
    let mut words = text.split_whitespace();
    let Some(first) = words.next() else {
        return BotCommand::Help;
    };

    if !first.starts_with('/') {
        return if looks_like_code(first) && words.next().is_none() {
            BotCommand::Link(first.to_string())
        } else {
            BotCommand::Help
        };
    }

    let command = first
        .split('@')
        .next()
        .unwrap_or(first)
        .to_ascii_lowercase();
    let argument = words.next().map(str::to_string);

    match (command.as_str(), argument) {
        ("/start" | "/link", Some(code)) => BotCommand::Link(code),
        ("/link", None) => BotCommand::MissingCode,
        ("/status", _) => BotCommand::Status,
        ("/unlink" | "/stop", _) => BotCommand::Unlink,
        _ => BotCommand::Help,
    }
}
