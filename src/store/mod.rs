mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the server-side database interface. User budget data lives
/// in each user's spreadsheet; this store only holds what the server needs to
/// reach it.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Account operations
    fn create_account(&self, account: &Account) -> Result<()>;
    fn get_account(&self, id: &str) -> Result<Option<Account>>;
    fn get_account_by_email(&self, email: &str) -> Result<Option<Account>>;
    fn update_account(&self, account: &Account) -> Result<()>;
    fn set_account_spreadsheet(&self, id: &str, spreadsheet_id: &str) -> Result<()>;

    // Google credential operations
    fn upsert_credentials(&self, credentials: &GoogleCredentials) -> Result<()>;
    fn get_credentials(&self, account_id: &str) -> Result<Option<GoogleCredentials>>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn list_account_sessions(&self, account_id: &str) -> Result<Vec<Session>>;
    fn delete_session(&self, id: &str) -> Result<bool>;
    fn delete_account_sessions(&self, account_id: &str) -> Result<usize>;
    fn delete_expired_sessions(&self) -> Result<usize>;
    fn update_session_last_used(&self, id: &str) -> Result<()>;

    // Telegram link operations
    /// Binds the chat to the account, replacing any link either had.
    /// Returns the account that previously owned the chat, if different.
    fn link_telegram_chat(&self, link: &TelegramLink) -> Result<Option<String>>;
    fn get_telegram_link(&self, account_id: &str) -> Result<Option<TelegramLink>>;
    fn get_telegram_link_by_chat(&self, chat_id: i64) -> Result<Option<TelegramLink>>;
    fn delete_telegram_link(&self, account_id: &str) -> Result<bool>;

    fn close(&self) -> Result<()>;
}
