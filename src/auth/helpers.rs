use chrono::Utc;

use super::{TokenGenerator, parse_token};
use crate::store::Store;
use crate::types::{Session, SessionKind};

#[derive(Debug)]
pub enum SessionValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

/// Validates a raw session token against the store.
///
/// The session must be of `kind`; an access token presented where a refresh
/// token is expected (or the reverse) is treated as invalid.
pub fn validate_session(
    store: &dyn Store,
    generator: &TokenGenerator,
    raw_token: &str,
    kind: SessionKind,
) -> Result<Session, SessionValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| SessionValidationError::InvalidToken)?;

    let session = store
        .get_session_by_lookup(&lookup)
        .map_err(|e| {
            tracing::error!("Session lookup failed: {e}");
            SessionValidationError::InternalError
        })?
        .ok_or(SessionValidationError::InvalidToken)?;

    if !generator
        .verify(raw_token, &session.token_hash)
        .map_err(|_| SessionValidationError::InternalError)?
    {
        return Err(SessionValidationError::InvalidToken);
    }

    if session.kind != kind {
        return Err(SessionValidationError::InvalidToken);
    }

    if session.expires_at < Utc::now() {
        return Err(SessionValidationError::TokenExpired);
    }

    if let Err(e) = store.update_session_last_used(&session.id) {
        tracing::warn!("Failed to update session last_used_at: {e}");
    }

    Ok(session)
}

/// Extracts a bearer token from an Authorization header value.
/// Returns None if no header is present, Err for any other scheme.
pub fn extract_bearer(auth_header: Option<&str>) -> Result<Option<String>, SessionValidationError> {
    match auth_header {
        Some(header) => match header.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
            Some(_) => Err(SessionValidationError::InvalidToken),
            None => Err(SessionValidationError::InvalidScheme),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(None).unwrap(), None);
        assert_eq!(
            extract_bearer(Some("Bearer sb_abc")).unwrap().as_deref(),
            Some("sb_abc")
        );
        assert!(matches!(
            extract_bearer(Some("Basic eC10b2tlbjp5")),
            Err(SessionValidationError::InvalidScheme)
        ));
        assert!(matches!(
            extract_bearer(Some("Bearer  ")),
            Err(SessionValidationError::InvalidToken)
        ));
    }
}
