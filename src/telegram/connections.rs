use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;

const CODE_LENGTH: usize = 6;
// No 0/O or 1/I, codes get typed by hand.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Serialize)]
pub struct TelegramConnection {
    pub user_id: String,
    pub email: String,
    pub chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub linked_at: DateTime<Utc>,
}

/// Result of redeeming a link code.
#[derive(Debug, Clone)]
pub struct Redeemed {
    pub connection: TelegramConnection,
    /// The other account's link this chat replaced.
    pub displaced: Option<TelegramConnection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingLink {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct LinkCode {
    user_id: String,
    email: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Connections {
    by_email: HashMap<String, TelegramConnection>,
    by_chat: HashMap<i64, String>,
    codes: HashMap<String, LinkCode>,
}

impl Connections {
    /// Returns the connection of another account that held the same chat.
    fn insert(&mut self, connection: TelegramConnection) -> Option<TelegramConnection> {
        // A chat belongs to at most one account.
        let displaced = self
            .by_chat
            .remove(&connection.chat_id)
            .and_then(|previous| self.by_email.remove(&previous))
            .filter(|previous| previous.email != connection.email);
        if let Some(previous) = self.by_email.remove(&connection.email) {
            self.by_chat.remove(&previous.chat_id);
        }
        self.by_chat
            .insert(connection.chat_id, connection.email.clone());
        self.by_email.insert(connection.email.clone(), connection);
        displaced
    }

    fn remove(&mut self, email: &str) -> Option<TelegramConnection> {
        let connection = self.by_email.remove(email)?;
        self.by_chat.remove(&connection.chat_id);
        Some(connection)
    }
}

/// Process-local map of linked Telegram chats, keyed by account email.
///
/// Nothing here survives a restart. Handlers fall back to the link kept in
/// the local store (or the chat id in the user's settings row) and
/// re-register it with [`remember`].
///
/// [`remember`]: TelegramConnectionStore::remember
pub struct TelegramConnectionStore {
    inner: RwLock<Connections>,
    code_ttl: Duration,
}

impl Default for TelegramConnectionStore {
    fn default() -> Self {
        Self::new(Duration::minutes(15))
    }
}

impl TelegramConnectionStore {
    #[must_use]
    pub fn new(code_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Connections::default()),
            code_ttl,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Connections> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Connections> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a link code for the account, replacing any earlier one.
    pub fn create_link_code(&self, user_id: &str, email: &str) -> PendingLink {
        let mut rng = rand::thread_rng();
        let expires_at = Utc::now() + self.code_ttl;

        let mut inner = self.write();
        let now = Utc::now();
        inner
            .codes
            .retain(|_, c| c.email != email && c.expires_at > now);

        let code = loop {
            let candidate: String = (0..CODE_LENGTH)
                .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
                .collect();
            if !inner.codes.contains_key(&candidate) {
                break candidate;
            }
        };

        inner.codes.insert(
            code.clone(),
            LinkCode {
                user_id: user_id.to_string(),
                email: email.to_string(),
                expires_at,
            },
        );

        PendingLink { code, expires_at }
    }

    /// Consumes a link code and binds the chat to its account.
    /// Returns None for unknown or expired codes.
    pub fn redeem(
        &self,
        code: &str,
        chat_id: i64,
        username: Option<String>,
    ) -> Option<Redeemed> {
        let mut inner = self.write();
        let link = inner.codes.remove(&code.trim().to_ascii_uppercase())?;
        if link.expires_at <= Utc::now() {
            return None;
        }

        let connection = TelegramConnection {
            user_id: link.user_id,
            email: link.email,
            chat_id,
            username,
            linked_at: Utc::now(),
        };
        let displaced = inner.insert(connection.clone());
        Some(Redeemed {
            connection,
            displaced,
        })
    }

    pub fn get(&self, email: &str) -> Option<TelegramConnection> {
        self.read().by_email.get(email).cloned()
    }

    pub fn by_chat(&self, chat_id: i64) -> Option<TelegramConnection> {
        let inner = self.read();
        let email = inner.by_chat.get(&chat_id)?;
        inner.by_email.get(email).cloned()
    }

    /// Registers a connection restored from persisted state. Ignored when the
    /// chat is already held by another account.
    pub fn remember(&self, connection: TelegramConnection) -> bool {
        let mut inner = self.write();
        if inner
            .by_chat
            .get(&connection.chat_id)
            .is_some_and(|email| *email != connection.email)
        {
            return false;
        }
        inner.insert(connection);
        true
    }

    pub fn remove(&self, email: &str) -> Option<TelegramConnection> {
        self.write().remove(email)
    }

    pub fn remove_chat(&self, chat_id: i64) -> Option<TelegramConnection> {
        let mut inner = self.write();
        let email = inner.by_chat.get(&chat_id)?.clone();
        inner.remove(&email)
    }
}
