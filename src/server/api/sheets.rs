use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use super::access::open_workbook;
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::SheetsInfo;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::sheets::migration::migrate_category_emoji;
use crate::sheets::spreadsheet_url;

pub async fn get_sheets(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let tabs = wb
        .api()
        .sheet_tabs(wb.token(), wb.spreadsheet_id())
        .await
        .api_err("Failed to read spreadsheet")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(SheetsInfo {
        spreadsheet_id: wb.spreadsheet_id().to_string(),
        url: spreadsheet_url(wb.spreadsheet_id()),
        tabs,
    })))
}

/// Creates the spreadsheet if needed and adds any missing tabs or columns.
pub async fn init_sheets(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (_, report) = state
        .init_workbook(&auth.account)
        .await
        .api_err("Failed to initialize spreadsheet")?;
    if !report.is_noop() {
        tracing::info!(
            "Repaired spreadsheet for {}: {} tabs, {} columns",
            auth.account.email,
            report.created_tabs.len(),
            report.added_columns.len()
        );
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(report)))
}

pub async fn migrate_emoji(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let report = migrate_category_emoji(&wb)
        .await
        .api_err("Failed to migrate categories")?;
    tracing::info!(
        "Category emoji migration for {}: {} of {} updated",
        auth.account.email,
        report.updated,
        report.scanned
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(report)))
}
