use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use uuid::Uuid;

use super::access::load_settings;
use super::telegram::linked_chat;
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    AccountResponse, AuthUrlResponse, GoogleLoginParams, LoginResponse, OAuthCallbackParams,
    RefreshRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::{Account, GoogleCredentials, UserRow};

pub async fn google_login(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GoogleLoginParams>,
) -> Response {
    let oauth_state = state.oauth_states.issue();
    let url = state.google.authorization_url(&oauth_state);

    if params.format.as_deref() == Some("json") {
        return Json(ApiResponse::success(AuthUrlResponse {
            url,
            state: oauth_state,
        }))
        .into_response();
    }

    Redirect::to(&url).into_response()
}

pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    let outcome = complete_login(&state, params).await;

    let Some(frontend) = state.config.frontend_url.as_deref() else {
        return match outcome {
            Ok(login) => Json(ApiResponse::success(login)).into_response(),
            Err(e) => e.into_response(),
        };
    };

    let frontend = frontend.trim_end_matches('/');
    let target = match outcome {
        // Tokens go in the fragment so they never reach server logs.
        Ok(login) => format!(
            "{frontend}/auth/callback#access_token={}&refresh_token={}&expires_in={}",
            urlencoding::encode(&login.tokens.access_token),
            urlencoding::encode(&login.tokens.refresh_token),
            login.tokens.expires_in
        ),
        Err(e) => format!(
            "{frontend}/auth/callback?error={}",
            urlencoding::encode(&e.message)
        ),
    };
    Redirect::to(&target).into_response()
}

async fn complete_login(
    state: &AppState,
    params: OAuthCallbackParams,
) -> Result<LoginResponse, ApiError> {
    if let Some(error) = params.error {
        tracing::warn!("Google sign-in was not completed: {error}");
        return Err(ApiError::bad_request(format!("Google sign-in failed: {error}")));
    }

    let oauth_state = params
        .state
        .ok_or_else(|| ApiError::bad_request("Missing OAuth state"))?;
    if !state.oauth_states.consume(&oauth_state) {
        return Err(ApiError::bad_request("Invalid or expired OAuth state"));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let tokens = state
        .google
        .exchange_code(&code)
        .await
        .api_err("Failed to exchange authorization code")?;
    let profile = state
        .google
        .user_info(&tokens.access_token)
        .await
        .api_err("Failed to read Google profile")?;

    let store = state.store.as_ref();
    let now = Utc::now();
    let account = match store
        .get_account_by_email(&profile.email)
        .api_err("Failed to look up account")?
    {
        Some(mut account) => {
            if let Some(name) = profile.name {
                account.name = name;
            }
            if profile.picture.is_some() {
                account.picture = profile.picture;
            }
            store
                .update_account(&account)
                .api_err("Failed to update account")?;
            account
        }
        None => {
            let account = Account {
                id: Uuid::new_v4().to_string(),
                name: profile.name.unwrap_or_else(|| profile.email.clone()),
                email: profile.email,
                picture: profile.picture,
                spreadsheet_id: None,
                created_at: now,
                updated_at: now,
            };
            store
                .create_account(&account)
                .api_err("Failed to create account")?;
            tracing::info!("Created account {} for {}", account.id, account.email);
            account
        }
    };

    store
        .upsert_credentials(&GoogleCredentials {
            account_id: account.id.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        })
        .api_err("Failed to store Google credentials")?;

    let wb = state
        .workbook(&account)
        .await
        .api_err("Failed to provision spreadsheet")?;

    let created_at = wb
        .find_by_key::<UserRow>(&account.id)
        .await
        .api_err("Failed to read users")?
        .map_or(now, |u| u.created_at);
    wb.upsert(&UserRow {
        id: account.id.clone(),
        email: account.email.clone(),
        name: account.name.clone(),
        picture: account.picture.clone(),
        created_at,
        updated_at: now,
    })
    .await
    .api_err("Failed to write user row")?;

    let settings = load_settings(&wb, &account.id).await?;
    if linked_chat(&state, &account, &settings).is_some() {
        tracing::debug!("Restored Telegram link for {}", account.email);
    }

    if let Err(e) = state.sessions.purge_expired() {
        tracing::warn!("Failed to purge expired sessions: {e}");
    }

    let account = store
        .get_account(&account.id)
        .api_err("Failed to reload account")?
        .or_not_found("Account not found")?;
    let tokens = state
        .sessions
        .issue(&account.id)
        .api_err("Failed to create session")?;

    tracing::info!("{} signed in", account.email);

    Ok(LoginResponse {
        tokens,
        user: account.into(),
    })
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> impl IntoResponse {
    let (account_id, tokens) = state
        .sessions
        .refresh(req.refresh_token.trim())
        .api_err("Failed to refresh session")?;

    let account = state
        .store
        .get_account(&account_id)
        .api_err("Failed to load account")?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(LoginResponse {
        tokens,
        user: account.into(),
    })))
}

pub async fn logout(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .sessions
        .revoke_all(&auth.account.id)
        .api_err("Failed to revoke sessions")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn me(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(AccountResponse::from(auth.account)))
}
