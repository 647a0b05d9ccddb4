use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;

use super::access::{load_settings, open_workbook};
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::UpdateSettingsRequest;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{validate_currency, validate_language, validate_theme};

pub async fn get_settings(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let settings = load_settings(&wb, &auth.account.id).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(settings)))
}

/// Partial update. Telegram fields are managed by the link endpoints.
pub async fn update_settings(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let mut settings = load_settings(&wb, &auth.account.id).await?;

    if let Some(currency) = req.currency {
        let currency = currency.trim().to_ascii_uppercase();
        validate_currency(&currency)?;
        settings.currency = currency;
    }
    if let Some(language) = req.language {
        let language = language.trim().to_string();
        validate_language(&language)?;
        settings.language = language;
    }
    if let Some(theme) = req.theme {
        let theme = theme.trim().to_ascii_lowercase();
        validate_theme(&theme)?;
        settings.theme = theme;
    }
    if let Some(enabled) = req.notifications_enabled {
        settings.notifications_enabled = enabled;
    }
    settings.updated_at = Utc::now();

    wb.update(&settings)
        .await
        .api_err("Failed to update settings")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(settings)))
}
