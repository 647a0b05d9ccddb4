use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{SessionValidationError, extract_bearer};
use crate::server::AppState;
use crate::types::{Account, Session, SessionKind};

/// Extractor that requires a valid access token belonging to a known account.
pub struct RequireUser {
    pub session: Session,
    pub account: Account,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    UnknownAccount,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::UnknownAccount => (StatusCode::UNAUTHORIZED, "Account no longer exists"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"sheetbudget\""),
            );
        }

        response
    }
}

impl From<SessionValidationError> for AuthError {
    fn from(e: SessionValidationError) -> Self {
        match e {
            SessionValidationError::InvalidScheme => AuthError::InvalidScheme,
            SessionValidationError::InvalidToken => AuthError::InvalidToken,
            SessionValidationError::TokenExpired => AuthError::TokenExpired,
            SessionValidationError::InternalError => AuthError::InternalError,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let raw_token = extract_bearer(auth_header)?.ok_or(AuthError::MissingAuth)?;
        let session = state.sessions.validate(&raw_token, SessionKind::Access)?;

        let account = state
            .store
            .get_account(&session.account_id)
            .map_err(|e| {
                tracing::error!("Failed to load account {}: {e}", session.account_id);
                AuthError::InternalError
            })?
            .ok_or(AuthError::UnknownAccount)?;

        Ok(RequireUser { session, account })
    }
}
