use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use super::access::{load_settings, open_workbook};
use crate::auth::RequireUser;
use crate::budget::{GoalProgress, alert_text};
use crate::server::AppState;
use crate::server::dto::{
    LinkCodeResponse, ListMessagesParams, TelegramStatusResponse, TestMessageRequest,
    WebhookResponse,
};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::sheets::Workbook;
use crate::telegram::{
    BotCommand, HELP_TEXT, Redeemed, TelegramConnection, TelegramUpdate, deep_link, parse_command,
};
use crate::types::{Account, MessageStatus, Settings, TelegramLink, TelegramMessage};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const DEFAULT_MESSAGE_LIMIT: usize = 50;
const MAX_MESSAGE_LIMIT: usize = 200;

fn stored_link(state: &AppState, account_id: &str) -> Option<TelegramLink> {
    state.store.get_telegram_link(account_id).unwrap_or_else(|e| {
        tracing::warn!("Failed to read Telegram link for {account_id}: {e}");
        None
    })
}

fn stored_chat_owner(state: &AppState, chat_id: i64) -> Option<TelegramLink> {
    state
        .store
        .get_telegram_link_by_chat(chat_id)
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to read Telegram link for chat {chat_id}: {e}");
            None
        })
}

/// The chat linked to the account. The in-memory map is consulted first,
/// then the local store, then the settings row. A settings value is only
/// trusted while no other account owns that chat.
pub(super) fn linked_chat(state: &AppState, account: &Account, settings: &Settings) -> Option<TelegramConnection> {
    if let Some(connection) = state.telegram.get(&account.email) {
        return Some(connection);
    }

    let link = match stored_link(state, &account.id) {
        Some(link) => link,
        None => {
            let chat_id = settings.telegram_chat_id?;
            match state.store.get_telegram_link_by_chat(chat_id) {
                Ok(None) => {}
                Ok(Some(owner)) => {
                    tracing::debug!(
                        "Ignoring stale chat {chat_id} for {}, now linked to {}",
                        account.email,
                        owner.account_id
                    );
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Failed to read Telegram link for chat {chat_id}: {e}");
                    return None;
                }
            }
            let link = TelegramLink {
                chat_id,
                account_id: account.id.clone(),
                username: settings.telegram_username.clone(),
                linked_at: settings.updated_at,
            };
            if let Err(e) = state.store.link_telegram_chat(&link) {
                tracing::warn!("Failed to store Telegram link for {}: {e}", account.email);
            }
            link
        }
    };

    let connection = TelegramConnection {
        user_id: account.id.clone(),
        email: account.email.clone(),
        chat_id: link.chat_id,
        username: link.username,
        linked_at: link.linked_at,
    };
    state
        .telegram
        .remember(connection.clone())
        .then_some(connection)
}

/// Sends `text` and appends the attempt to the `telegram_messages` tab.
async fn deliver(
    state: &AppState,
    wb: &Workbook,
    user_id: &str,
    chat_id: i64,
    text: &str,
) -> TelegramMessage {
    let status = match state.notifier.send(chat_id, text).await {
        Ok(()) => MessageStatus::Sent,
        Err(e) => {
            tracing::warn!("Telegram delivery to chat {chat_id} failed: {e}");
            MessageStatus::Failed
        }
    };

    let message = TelegramMessage {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        chat_id,
        payload: text.to_string(),
        status,
        created_at: Utc::now(),
    };
    if let Err(e) = wb.insert(&message).await {
        tracing::warn!("Failed to record Telegram message {}: {e}", message.id);
    }
    message
}

/// Delivers goal alerts when the user has a linked chat and notifications on.
pub(super) async fn send_goal_alerts(
    state: &AppState,
    wb: &Workbook,
    account: &Account,
    alerts: &[GoalProgress],
) {
    if alerts.is_empty() {
        return;
    }

    let settings = match wb.find_by_key::<Settings>(&account.id).await {
        Ok(Some(settings)) => settings,
        Ok(None) => Settings::defaults_for(&account.id),
        Err(e) => {
            tracing::warn!("Skipping goal alerts for {}: {e}", account.email);
            return;
        }
    };

    if !settings.notifications_enabled {
        tracing::debug!("Notifications disabled for {}", account.email);
        return;
    }
    let Some(connection) = linked_chat(state, account, &settings) else {
        tracing::debug!("No Telegram chat linked for {}", account.email);
        return;
    };

    for alert in alerts {
        let text = alert_text(alert, &settings.currency);
        deliver(state, wb, &account.id, connection.chat_id, &text).await;
    }
}

/// Writes (or clears, for `None`) the chat binding in the account's settings
/// row. Failures are logged; the stored link stays in effect.
async fn persist_link(state: &AppState, user_id: &str, connection: Option<&TelegramConnection>) {
    let account = match state.store.get_account(user_id) {
        Ok(Some(account)) => account,
        Ok(None) => {
            tracing::warn!("Linked account {user_id} no longer exists");
            return;
        }
        Err(e) => {
            tracing::warn!("Failed to load account {user_id}: {e}");
            return;
        }
    };

    if let Err(e) = save_link(state, &account, connection).await {
        tracing::warn!("Failed to save Telegram link for {}: {e}", account.email);
    }
}

async fn save_link(
    state: &AppState,
    account: &Account,
    connection: Option<&TelegramConnection>,
) -> crate::error::Result<()> {
    let wb = state.workbook(account).await?;
    let mut settings = wb
        .find_by_key::<Settings>(&account.id)
        .await?
        .unwrap_or_else(|| Settings::defaults_for(&account.id));
    settings.telegram_chat_id = connection.map(|c| c.chat_id);
    settings.telegram_username = connection.and_then(|c| c.username.clone());
    settings.updated_at = Utc::now();
    wb.upsert(&settings).await
}

/// Binds the chat to the redeemed account and clears the link of any account
/// that held the chat before.
async fn link_chat(state: &AppState, redeemed: Redeemed) -> TelegramConnection {
    let Redeemed {
        connection,
        displaced,
    } = redeemed;
    let mut released: Vec<String> = displaced.map(|c| c.user_id).into_iter().collect();

    let link = TelegramLink {
        chat_id: connection.chat_id,
        account_id: connection.user_id.clone(),
        username: connection.username.clone(),
        linked_at: connection.linked_at,
    };
    match state.store.link_telegram_chat(&link) {
        Ok(Some(previous)) => {
            if !released.contains(&previous) {
                released.push(previous);
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to store Telegram link for {}: {e}", connection.email),
    }

    persist_link(state, &connection.user_id, Some(&connection)).await;
    for user_id in released {
        tracing::info!("Telegram chat {} moved away from account {user_id}", connection.chat_id);
        persist_link(state, &user_id, None).await;
    }
    connection
}

/// Removes the chat's link wherever it is recorded. Returns the account id
/// that owned it.
async fn unlink_chat(state: &AppState, chat_id: i64) -> Option<String> {
    let user_id = state
        .telegram
        .remove_chat(chat_id)
        .map(|c| c.user_id)
        .or_else(|| stored_chat_owner(state, chat_id).map(|link| link.account_id))?;

    if let Err(e) = state.store.delete_telegram_link(&user_id) {
        tracing::warn!("Failed to delete Telegram link for {user_id}: {e}");
    }
    persist_link(state, &user_id, None).await;
    Some(user_id)
}

/// Email of the account that owns the chat, if any.
fn chat_owner_email(state: &AppState, chat_id: i64) -> Option<String> {
    if let Some(connection) = state.telegram.by_chat(chat_id) {
        return Some(connection.email);
    }
    let link = stored_chat_owner(state, chat_id)?;
    match state.store.get_account(&link.account_id) {
        Ok(account) => account.map(|a| a.email),
        Err(e) => {
            tracing::warn!("Failed to load account {}: {e}", link.account_id);
            None
        }
    }
}

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<TelegramUpdate>,
) -> impl IntoResponse {
    if let Some(secret) = state.config.telegram.webhook_secret.as_deref() {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(secret) {
            tracing::warn!("Rejected Telegram update {} with bad secret", update.update_id);
            return Err(ApiError::unauthorized("Invalid webhook secret"));
        }
    }

    let ack = Json(ApiResponse::success(WebhookResponse { ok: true }));
    let Some(message) = update.message else {
        return Ok(ack);
    };
    let Some(text) = message.text.as_deref() else {
        return Ok(ack);
    };
    let chat_id = message.chat.id;

    let reply = match parse_command(text) {
        BotCommand::Link(code) => match state.telegram.redeem(&code, chat_id, message.username()) {
            Some(redeemed) => {
                let connection = link_chat(&state, redeemed).await;
                tracing::info!("Linked Telegram chat {chat_id} to {}", connection.email);
                format!(
                    "✅ Linked to {}. Budget alerts will be sent to this chat.",
                    connection.email
                )
            }
            None => "That code is invalid or has expired. Create a new one in Settings.".to_string(),
        },
        BotCommand::MissingCode => "Send /link CODE using the code shown in Settings.".to_string(),
        BotCommand::Status => match chat_owner_email(&state, chat_id) {
            Some(email) => format!("This chat is linked to {email}."),
            None => "This chat is not linked to any account.".to_string(),
        },
        BotCommand::Unlink => match unlink_chat(&state, chat_id).await {
            Some(user_id) => {
                tracing::info!("Unlinked Telegram chat {chat_id} from account {user_id}");
                "Unlinked. You will no longer receive alerts here.".to_string()
            }
            None => "This chat is not linked to any account.".to_string(),
        },
        BotCommand::Help => HELP_TEXT.to_string(),
    };

    if let Err(e) = state.notifier.send(chat_id, &reply).await {
        tracing::warn!("Failed to reply to Telegram chat {chat_id}: {e}");
    }

    Ok::<_, ApiError>(ack)
}

pub async fn create_link(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let link = state
        .telegram
        .create_link_code(&auth.account.id, &auth.account.email);
    let bot_username = state.config.telegram.bot_username.clone();

    let response = LinkCodeResponse {
        deep_link: deep_link(bot_username.as_deref(), &link.code),
        code: link.code,
        expires_at: link.expires_at,
        bot_username,
    };

    (StatusCode::CREATED, Json(ApiResponse::success(response)))
}

pub async fn unlink(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.telegram.remove(&auth.account.email);
    state
        .store
        .delete_telegram_link(&auth.account.id)
        .api_err("Failed to unlink Telegram chat")?;

    let wb = open_workbook(&state, &auth.account).await?;
    let mut settings = load_settings(&wb, &auth.account.id).await?;
    if settings.telegram_chat_id.is_some() {
        settings.telegram_chat_id = None;
        settings.telegram_username = None;
        settings.updated_at = Utc::now();
        wb.update(&settings)
            .await
            .api_err("Failed to update settings")?;
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn status(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let settings = load_settings(&wb, &auth.account.id).await?;
    let connection = linked_chat(&state, &auth.account, &settings);

    Ok::<_, ApiError>(Json(ApiResponse::success(TelegramStatusResponse {
        linked: connection.is_some(),
        chat_id: connection.as_ref().map(|c| c.chat_id),
        username: connection.and_then(|c| c.username),
        notifications_enabled: settings.notifications_enabled,
        bot_configured: state.config.telegram.bot_token.is_some(),
    })))
}

pub async fn send_test(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TestMessageRequest>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let settings = load_settings(&wb, &auth.account.id).await?;
    let connection = linked_chat(&state, &auth.account, &settings)
        .ok_or_else(|| ApiError::bad_request("No Telegram chat is linked"))?;

    let text = req
        .text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "👋 Test message from Budget App.".to_string());
    let message = deliver(&state, &wb, &auth.account.id, connection.chat_id, &text).await;

    if message.status == MessageStatus::Failed {
        return Err(ApiError::bad_gateway("Failed to send Telegram message"));
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(message)))
}

pub async fn list_messages(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListMessagesParams>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let limit = params
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .clamp(1, MAX_MESSAGE_LIMIT);

    let wb = open_workbook(&state, &auth.account).await?;
    let mut messages = wb
        .find(|m: &TelegramMessage| m.user_id == user_id)
        .await
        .api_err("Failed to read Telegram messages")?;
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    messages.truncate(limit);

    Ok::<_, ApiError>(Json(ApiResponse::success(messages)))
}
