use std::collections::HashSet;

use axum::http::StatusCode;
use uuid::Uuid;

use crate::server::AppState;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_client_id;
use crate::sheets::{Record, Workbook};
use crate::types::{Account, Budget, Category, Settings};

pub async fn open_workbook(state: &AppState, account: &Account) -> Result<Workbook, ApiError> {
    state
        .workbook(account)
        .await
        .api_err("Failed to open spreadsheet")
}

/// Uses the client supplied id when present, otherwise a new UUID.
fn record_id(client_id: Option<String>) -> Result<String, ApiError> {
    match client_id {
        Some(id) => {
            validate_client_id(&id)?;
            Ok(id)
        }
        None => Ok(Uuid::new_v4().to_string()),
    }
}

/// Ids for new records of `R`, one per request entry. Client supplied ids
/// must be unique within the request and not yet present in the tab.
pub async fn claim_ids<R: Record>(
    wb: &Workbook,
    client_ids: Vec<Option<String>>,
) -> Result<Vec<String>, ApiError> {
    let mut requested = HashSet::new();
    let mut ids = Vec::with_capacity(client_ids.len());
    for client_id in client_ids {
        let supplied = client_id.is_some();
        let id = record_id(client_id)?;
        if supplied && !requested.insert(id.clone()) {
            return Err(ApiError::bad_request(format!("Id {id} appears more than once")));
        }
        ids.push(id);
    }

    if !requested.is_empty() {
        let taken = wb.keys(R::TABLE).await.api_err("Failed to read spreadsheet")?;
        if let Some(id) = requested.iter().find(|id| taken.contains(*id)) {
            return Err(ApiError::conflict(format!("Id {id} is already in use")));
        }
    }
    Ok(ids)
}

pub async fn claim_id<R: Record>(wb: &Workbook, client_id: Option<String>) -> Result<String, ApiError> {
    let mut ids = claim_ids::<R>(wb, vec![client_id]).await?;
    Ok(ids.pop().unwrap_or_default())
}

/// Empty strings mean "no value".
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn owned_category(wb: &Workbook, user_id: &str, id: &str) -> Result<Category, ApiError> {
    wb.find_by_key::<Category>(id)
        .await
        .api_err("Failed to read categories")?
        .filter(|c| c.user_id == user_id)
        .or_not_found("Category not found")
}

/// Like [`owned_category`], but a missing category is a client error.
pub async fn referenced_category(wb: &Workbook, user_id: &str, id: &str) -> Result<Category, ApiError> {
    owned_category(wb, user_id, id).await.map_err(|e| {
        if e.status == StatusCode::NOT_FOUND {
            ApiError::bad_request("Category does not exist")
        } else {
            e
        }
    })
}

pub async fn owned_budget(wb: &Workbook, user_id: &str, id: &str) -> Result<Budget, ApiError> {
    wb.find_by_key::<Budget>(id)
        .await
        .api_err("Failed to read budgets")?
        .filter(|b| b.user_id == user_id)
        .or_not_found("Budget not found")
}

/// The user's settings row, created with defaults when missing.
pub async fn load_settings(wb: &Workbook, user_id: &str) -> Result<Settings, ApiError> {
    if let Some(settings) = wb
        .find_by_key::<Settings>(user_id)
        .await
        .api_err("Failed to read settings")?
    {
        return Ok(settings);
    }

    let settings = Settings::defaults_for(user_id);
    wb.insert(&settings)
        .await
        .api_err("Failed to create settings")?;
    tracing::info!("Created default settings for user {user_id}");
    Ok(settings)
}
