use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::configure(conn)
    }

    /// An in-memory database, for tests and throwaway servers.
    pub fn in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

const ACCOUNT_COLUMNS: &str = "id, email, name, picture, spreadsheet_id, created_at, updated_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        picture: row.get(3)?,
        spreadsheet_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const SESSION_COLUMNS: &str =
    "id, token_hash, token_lookup, account_id, kind, created_at, expires_at, last_used_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let kind: String = row.get(4)?;
    Ok(Session {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        account_id: row.get(3)?,
        kind: SessionKind::parse(&kind).unwrap_or(SessionKind::Access),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: parse_datetime(&row.get::<_, String>(6)?),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

const TELEGRAM_LINK_COLUMNS: &str = "chat_id, account_id, username, linked_at";

fn telegram_link_from_row(row: &Row<'_>) -> rusqlite::Result<TelegramLink> {
    Ok(TelegramLink {
        chat_id: row.get(0)?,
        account_id: row.get(1)?,
        username: row.get(2)?,
        linked_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Account operations

    fn create_account(&self, account: &Account) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO accounts (id, email, name, picture, spreadsheet_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                account.id,
                account.email,
                account.name,
                account.picture,
                account.spreadsheet_id,
                format_datetime(&account.created_at),
                format_datetime(&account.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AlreadyExists)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            params![id],
            account_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1 COLLATE NOCASE"),
            params![email],
            account_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_account(&self, account: &Account) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE accounts SET name = ?1, picture = ?2, spreadsheet_id = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                account.name,
                account.picture,
                account.spreadsheet_id,
                format_datetime(&Utc::now()),
                account.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn set_account_spreadsheet(&self, id: &str, spreadsheet_id: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE accounts SET spreadsheet_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![spreadsheet_id, format_datetime(&Utc::now()), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Google credential operations

    fn upsert_credentials(&self, credentials: &GoogleCredentials) -> Result<()> {
        // A refresh without a new refresh token keeps the stored one.
        self.conn().execute(
            "INSERT INTO google_credentials (account_id, access_token, refresh_token, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, google_credentials.refresh_token),
                expires_at = excluded.expires_at",
            params![
                credentials.account_id,
                credentials.access_token,
                credentials.refresh_token,
                format_datetime(&credentials.expires_at),
            ],
        )?;
        Ok(())
    }

    fn get_credentials(&self, account_id: &str) -> Result<Option<GoogleCredentials>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT account_id, access_token, refresh_token, expires_at
             FROM google_credentials WHERE account_id = ?1",
            params![account_id],
            |row| {
                Ok(GoogleCredentials {
                    account_id: row.get(0)?,
                    access_token: row.get(1)?,
                    refresh_token: row.get(2)?,
                    expires_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO sessions (id, token_hash, token_lookup, account_id, kind, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.token_hash,
                session.token_lookup,
                session.account_id,
                session.kind.as_str(),
                format_datetime(&session.created_at),
                format_datetime(&session.expires_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_lookup = ?1"),
            params![lookup],
            session_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_account_sessions(&self, account_id: &str) -> Result<Vec<Session>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE account_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![account_id], session_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn delete_account_sessions(&self, account_id: &str) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM sessions WHERE account_id = ?1",
            params![account_id],
        )?;
        Ok(rows)
    }

    fn delete_expired_sessions(&self) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![format_datetime(&Utc::now())],
        )?;
        Ok(rows)
    }

    fn update_session_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sessions SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Telegram link operations

    fn link_telegram_chat(&self, link: &TelegramLink) -> Result<Option<String>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT account_id FROM telegram_links WHERE chat_id = ?1",
                params![link.chat_id],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "DELETE FROM telegram_links WHERE chat_id = ?1 OR account_id = ?2",
            params![link.chat_id, link.account_id],
        )?;
        tx.execute(
            "INSERT INTO telegram_links (chat_id, account_id, username, linked_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                link.chat_id,
                link.account_id,
                link.username,
                format_datetime(&link.linked_at),
            ],
        )?;
        tx.commit()?;

        Ok(previous.filter(|id| *id != link.account_id))
    }

    fn get_telegram_link(&self, account_id: &str) -> Result<Option<TelegramLink>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TELEGRAM_LINK_COLUMNS} FROM telegram_links WHERE account_id = ?1"),
            params![account_id],
            telegram_link_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_telegram_link_by_chat(&self, chat_id: i64) -> Result<Option<TelegramLink>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TELEGRAM_LINK_COLUMNS} FROM telegram_links WHERE chat_id = ?1"),
            params![chat_id],
            telegram_link_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_telegram_link(&self, account_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM telegram_links WHERE account_id = ?1",
            params![account_id],
        )?;
        Ok(rows > 0)
    }

    fn close(&self) -> Result<()> {
        self.conn().execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use tempfile::TempDir;

    fn account(id: &str, email: &str) -> Account {
        Account {
            id: id.to_string(),
            email: email.to_string(),
            name: "Test".to_string(),
            picture: None,
            spreadsheet_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn session(id: &str, lookup: &str, account_id: &str, expires_at: DateTime<Utc>) -> Session {
        Session {
            id: id.to_string(),
            token_hash: "hash".to_string(),
            token_lookup: lookup.to_string(),
            account_id: account_id.to_string(),
            kind: SessionKind::Access,
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"google_credentials".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"telegram_links".to_string()));
    }

    #[test]
    fn test_account_crud() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();

        store.create_account(&account("a-1", "Ann@Example.com")).unwrap();
        assert!(matches!(
            store.create_account(&account("a-2", "Ann@Example.com")),
            Err(Error::AlreadyExists)
        ));

        let by_email = store
            .get_account_by_email("ann@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, "a-1");

        store.set_account_spreadsheet("a-1", "sheet-1").unwrap();
        let fetched = store.get_account("a-1").unwrap().unwrap();
        assert_eq!(fetched.spreadsheet_id.as_deref(), Some("sheet-1"));

        assert!(matches!(
            store.set_account_spreadsheet("missing", "x"),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_credentials_keep_refresh_token() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store.create_account(&account("a-1", "a@example.com")).unwrap();

        store
            .upsert_credentials(&GoogleCredentials {
                account_id: "a-1".to_string(),
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_at: Utc::now(),
            })
            .unwrap();
        store
            .upsert_credentials(&GoogleCredentials {
                account_id: "a-1".to_string(),
                access_token: "access-2".to_string(),
                refresh_token: None,
                expires_at: Utc::now(),
            })
            .unwrap();

        let creds = store.get_credentials("a-1").unwrap().unwrap();
        assert_eq!(creds.access_token, "access-2");
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_session_lookup_collision_and_expiry() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store.create_account(&account("a-1", "a@example.com")).unwrap();

        let live = session("s-1", "lookup01", "a-1", Utc::now() + Duration::hours(1));
        store.create_session(&live).unwrap();

        let dup = session("s-2", "lookup01", "a-1", Utc::now() + Duration::hours(1));
        assert!(matches!(
            store.create_session(&dup),
            Err(Error::TokenLookupCollision)
        ));

        let stale = session("s-3", "lookup02", "a-1", Utc::now() - Duration::hours(1));
        store.create_session(&stale).unwrap();

        assert_eq!(store.delete_expired_sessions().unwrap(), 1);
        assert!(store.get_session_by_lookup("lookup02").unwrap().is_none());
        assert_eq!(store.list_account_sessions("a-1").unwrap().len(), 1);

        assert_eq!(store.delete_account_sessions("a-1").unwrap(), 1);
        assert!(store.get_session_by_lookup("lookup01").unwrap().is_none());
    }

    #[test]
    fn test_relinking_chat_displaces_previous_owner() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store.create_account(&account("a-1", "a@example.com")).unwrap();
        store.create_account(&account("a-2", "b@example.com")).unwrap();

        let link = |chat_id: i64, account_id: &str| TelegramLink {
            chat_id,
            account_id: account_id.to_string(),
            username: None,
            linked_at: Utc::now(),
        };

        assert_eq!(store.link_telegram_chat(&link(500, "a-1")).unwrap(), None);
        assert_eq!(store.link_telegram_chat(&link(500, "a-1")).unwrap(), None);
        assert_eq!(
            store.link_telegram_chat(&link(500, "a-2")).unwrap().as_deref(),
            Some("a-1")
        );

        assert!(store.get_telegram_link("a-1").unwrap().is_none());
        let owner = store.get_telegram_link_by_chat(500).unwrap().unwrap();
        assert_eq!(owner.account_id, "a-2");

        // Moving an account to a new chat frees the old chat.
        store.link_telegram_chat(&link(600, "a-2")).unwrap();
        assert!(store.get_telegram_link_by_chat(500).unwrap().is_none());

        assert!(store.delete_telegram_link("a-2").unwrap());
        assert!(!store.delete_telegram_link("a-2").unwrap());
    }
}
