use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use super::access::{claim_id, non_empty, open_workbook};
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreateIncomeRequest, ListIncomesParams, UpdateIncomeRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{validate_amount, validate_period};
use crate::sheets::Workbook;
use crate::types::BudgetIncome;

const DEFAULT_SOURCE: &str = "Income";
const MAX_SOURCE_LEN: usize = 100;

fn income_source(source: Option<String>) -> Result<String, ApiError> {
    let source = non_empty(source).unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    if source.chars().count() > MAX_SOURCE_LEN {
        return Err(ApiError::bad_request(format!(
            "Source cannot exceed {MAX_SOURCE_LEN} characters"
        )));
    }
    Ok(source)
}

async fn owned_income(wb: &Workbook, user_id: &str, id: &str) -> Result<BudgetIncome, ApiError> {
    wb.find_by_key::<BudgetIncome>(id)
        .await
        .api_err("Failed to read incomes")?
        .filter(|i| i.user_id == user_id)
        .or_not_found("Income not found")
}

pub async fn list_incomes(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListIncomesParams>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;

    let mut incomes = wb
        .find(|i: &BudgetIncome| {
            i.user_id == user_id
                && params.year.is_none_or(|y| i.year == y)
                && params.month.is_none_or(|m| i.month == m)
        })
        .await
        .api_err("Failed to read incomes")?;
    incomes.sort_by(|a, b| {
        (b.year, b.month)
            .cmp(&(a.year, a.month))
            .then(a.created_at.cmp(&b.created_at))
    });

    Ok::<_, ApiError>(Json(ApiResponse::success(incomes)))
}

pub async fn create_income(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIncomeRequest>,
) -> impl IntoResponse {
    validate_period(req.year, req.month)?;
    validate_amount(req.amount, "Amount")?;
    let source = income_source(req.source)?;

    let wb = open_workbook(&state, &auth.account).await?;
    let id = claim_id::<BudgetIncome>(&wb, req.id).await?;
    let now = Utc::now();
    let income = BudgetIncome {
        id,
        user_id: auth.account.id.clone(),
        year: req.year,
        month: req.month,
        amount: req.amount,
        source,
        created_at: now,
        updated_at: now,
    };
    wb.insert(&income).await.api_err("Failed to create income")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(income))))
}

pub async fn update_income(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateIncomeRequest>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let mut income = owned_income(&wb, &auth.account.id, &id).await?;

    let year = req.year.unwrap_or(income.year);
    let month = req.month.unwrap_or(income.month);
    validate_period(year, month)?;
    income.year = year;
    income.month = month;
    if let Some(amount) = req.amount {
        validate_amount(amount, "Amount")?;
        income.amount = amount;
    }
    if req.source.is_some() {
        income.source = income_source(req.source)?;
    }
    income.updated_at = Utc::now();

    wb.update(&income).await.api_err("Failed to update income")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(income)))
}

pub async fn delete_income(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let income = owned_income(&wb, &auth.account.id, &id).await?;

    wb.delete::<BudgetIncome>(&income.id)
        .await
        .api_err("Failed to delete income")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
