use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Datelike, Utc};

use super::access::{claim_id, non_empty, open_workbook, referenced_category};
use super::telegram::send_goal_alerts;
use crate::auth::RequireUser;
use crate::budget::crossed_goals;
use crate::server::AppState;
use crate::server::dto::{
    CreateTransactionRequest, ListTransactionsParams, UpdateTransactionRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{parse_date_field, validate_amount, validate_description};
use crate::sheets::Workbook;
use crate::types::{Goal, Transaction};

async fn owned_transaction(wb: &Workbook, user_id: &str, id: &str) -> Result<Transaction, ApiError> {
    wb.find_by_key::<Transaction>(id)
        .await
        .api_err("Failed to read transactions")?
        .filter(|t| t.user_id == user_id)
        .or_not_found("Transaction not found")
}

pub async fn list_transactions(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTransactionsParams>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    if params.month.is_some_and(|m| !(1..=12).contains(&m)) {
        return Err(ApiError::bad_request("Month must be between 1 and 12"));
    }

    let wb = open_workbook(&state, &auth.account).await?;
    let mut transactions = wb
        .find(|t: &Transaction| {
            t.user_id == user_id
                && params.year.is_none_or(|y| t.date.year() == y)
                && params.month.is_none_or(|m| t.date.month() == m)
                && params
                    .category_id
                    .as_deref()
                    .is_none_or(|c| t.category_id == c)
        })
        .await
        .api_err("Failed to read transactions")?;
    // Newest first.
    transactions.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));

    Ok::<_, ApiError>(Json(ApiResponse::success(transactions)))
}

pub async fn create_transaction(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTransactionRequest>,
) -> impl IntoResponse {
    let account = &auth.account;
    validate_amount(req.amount, "Amount")?;
    let date = parse_date_field(&req.date)?;
    let description = non_empty(req.description);
    if let Some(description) = &description {
        validate_description(description)?;
    }

    let wb = open_workbook(&state, account).await?;
    referenced_category(&wb, &account.id, &req.category_id).await?;
    let id = claim_id::<Transaction>(&wb, req.id).await?;

    let now = Utc::now();
    let transaction = Transaction {
        id,
        user_id: account.id.clone(),
        category_id: req.category_id,
        amount: req.amount,
        date,
        description,
        created_at: now,
        updated_at: now,
    };
    wb.insert(&transaction)
        .await
        .api_err("Failed to create transaction")?;

    check_goals(&state, &wb, &auth, &transaction).await;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(transaction))))
}

/// Evaluates spending goals after a new transaction. Nothing here fails the
/// request.
async fn check_goals(state: &AppState, wb: &Workbook, auth: &RequireUser, transaction: &Transaction) {
    let user_id = auth.account.id.as_str();
    let goals = match wb.find(|g: &Goal| g.user_id == user_id && g.notify).await {
        Ok(goals) => goals,
        Err(e) => {
            tracing::warn!("Skipping goal check: {e}");
            return;
        }
    };
    if goals.is_empty() {
        return;
    }

    let transactions = match wb.find(|t: &Transaction| t.user_id == user_id).await {
        Ok(transactions) => transactions,
        Err(e) => {
            tracing::warn!("Skipping goal check: {e}");
            return;
        }
    };

    let alerts = crossed_goals(&goals, &transactions, transaction);
    for alert in &alerts {
        tracing::info!(
            "Goal {} exceeded for {}: {} of {}",
            alert.goal_id,
            auth.account.email,
            alert.spent,
            alert.limit_amount
        );
    }
    send_goal_alerts(state, wb, &auth.account, &alerts).await;
}

pub async fn get_transaction(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let transaction = owned_transaction(&wb, &auth.account.id, &id).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(transaction)))
}

pub async fn update_transaction(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTransactionRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let mut transaction = owned_transaction(&wb, user_id, &id).await?;

    if let Some(category_id) = req.category_id {
        if category_id != transaction.category_id {
            referenced_category(&wb, user_id, &category_id).await?;
        }
        transaction.category_id = category_id;
    }
    if let Some(amount) = req.amount {
        validate_amount(amount, "Amount")?;
        transaction.amount = amount;
    }
    if let Some(date) = req.date {
        transaction.date = parse_date_field(&date)?;
    }
    if let Some(description) = req.description {
        let description = non_empty(Some(description));
        if let Some(description) = &description {
            validate_description(description)?;
        }
        transaction.description = description;
    }
    transaction.updated_at = Utc::now();

    wb.update(&transaction)
        .await
        .api_err("Failed to update transaction")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(transaction)))
}

pub async fn delete_transaction(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let transaction = owned_transaction(&wb, &auth.account.id, &id).await?;

    wb.delete::<Transaction>(&transaction.id)
        .await
        .api_err("Failed to delete transaction")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
