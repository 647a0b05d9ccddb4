use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TokenGenerator;
use super::helpers::{SessionValidationError, validate_session};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Session, SessionKind};

const MAX_RETRIES: u32 = 3;

/// Token pair returned to the client after login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

/// Issues, validates, rotates and revokes backend sessions.
pub struct SessionIssuer {
    store: Arc<dyn Store>,
    generator: TokenGenerator,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            store,
            generator: TokenGenerator::new(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, account_id: &str) -> Result<SessionTokens> {
        let (access_token, expires_at) =
            self.create(account_id, SessionKind::Access, self.access_ttl)?;
        let (refresh_token, _) = self.create(account_id, SessionKind::Refresh, self.refresh_ttl)?;

        Ok(SessionTokens {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
            expires_at,
        })
    }

    fn create(
        &self,
        account_id: &str,
        kind: SessionKind,
        ttl: Duration,
    ) -> Result<(String, DateTime<Utc>)> {
        for _ in 0..MAX_RETRIES {
            let token = self.generator.generate()?;
            let now = Utc::now();
            let session = Session {
                id: Uuid::new_v4().to_string(),
                token_hash: token.hash,
                token_lookup: token.lookup,
                account_id: account_id.to_string(),
                kind,
                created_at: now,
                expires_at: now + ttl,
                last_used_at: None,
            };

            match self.store.create_session(&session) {
                Ok(()) => return Ok((token.raw, session.expires_at)),
                Err(Error::TokenLookupCollision) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::TokenLookupCollision)
    }

    pub fn validate(
        &self,
        raw_token: &str,
        kind: SessionKind,
    ) -> std::result::Result<Session, SessionValidationError> {
        validate_session(self.store.as_ref(), &self.generator, raw_token, kind)
    }

    /// Exchanges a refresh token for a new pair. The presented refresh
    /// session is deleted, so each refresh token works once.
    pub fn refresh(&self, raw_refresh_token: &str) -> Result<(String, SessionTokens)> {
        let session = self
            .validate(raw_refresh_token, SessionKind::Refresh)
            .map_err(|e| match e {
                SessionValidationError::TokenExpired => Error::TokenExpired,
                SessionValidationError::InternalError => {
                    Error::Config("session validation failed".to_string())
                }
                _ => Error::Unauthorized,
            })?;

        if !self.store.delete_session(&session.id)? {
            // Lost a race with a concurrent refresh of the same token.
            return Err(Error::Unauthorized);
        }

        let tokens = self.issue(&session.account_id)?;
        Ok((session.account_id, tokens))
    }

    /// Deletes every session of the account.
    pub fn revoke_all(&self, account_id: &str) -> Result<usize> {
        let removed = self.store.delete_account_sessions(account_id)?;
        tracing::info!("Revoked {removed} sessions for account {account_id}");
        Ok(removed)
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.store.delete_expired_sessions()
    }
}
