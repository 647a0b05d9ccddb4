use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::{Datelike, Utc};

use super::access::{load_settings, open_workbook};
use crate::auth::RequireUser;
use crate::budget::{SummaryInput, month_summary};
use crate::server::AppState;
use crate::server::dto::{SummaryParams, UserData};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::validate_period;
use crate::types::{Budget, BudgetIncome, BudgetItem, Category, Goal, Transaction, UserRow};

/// Everything the user owns, one read per tab.
pub async fn get_data(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;

    let settings = load_settings(&wb, user_id).await?;
    let user = wb
        .find_by_key::<UserRow>(user_id)
        .await
        .api_err("Failed to read user")?;
    let categories = wb
        .find(|c: &Category| c.user_id == user_id)
        .await
        .api_err("Failed to read categories")?;
    let transactions = wb
        .find(|t: &Transaction| t.user_id == user_id)
        .await
        .api_err("Failed to read transactions")?;
    let budgets = wb
        .find(|b: &Budget| b.user_id == user_id)
        .await
        .api_err("Failed to read budgets")?;

    let budget_ids: HashSet<&str> = budgets.iter().map(|b| b.id.as_str()).collect();
    let budget_items = wb
        .find(|i: &BudgetItem| budget_ids.contains(i.budget_id.as_str()))
        .await
        .api_err("Failed to read budget items")?;
    let budget_incomes = wb
        .find(|i: &BudgetIncome| i.user_id == user_id)
        .await
        .api_err("Failed to read incomes")?;
    let goals = wb
        .find(|g: &Goal| g.user_id == user_id)
        .await
        .api_err("Failed to read goals")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(UserData {
        user,
        settings,
        categories,
        transactions,
        budgets,
        budget_items,
        budget_incomes,
        goals,
    })))
}

/// Income, spending and per-category totals for `?year&month`, defaulting
/// to the current month.
pub async fn get_summary(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryParams>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let today = Utc::now().date_naive();
    let year = params.year.unwrap_or(today.year());
    let month = params.month.unwrap_or(today.month());
    validate_period(year, month)?;

    let wb = open_workbook(&state, &auth.account).await?;
    let categories = wb
        .find(|c: &Category| c.user_id == user_id)
        .await
        .api_err("Failed to read categories")?;
    let transactions = wb
        .find(|t: &Transaction| t.user_id == user_id)
        .await
        .api_err("Failed to read transactions")?;
    let budget = wb
        .find_one(|b: &Budget| b.user_id == user_id && b.year == year && b.month == month)
        .await
        .api_err("Failed to read budgets")?;
    let items = match &budget {
        Some(budget) => wb
            .find(|i: &BudgetItem| i.budget_id == budget.id)
            .await
            .api_err("Failed to read budget items")?,
        None => Vec::new(),
    };
    let incomes = wb
        .find(|i: &BudgetIncome| i.user_id == user_id && i.year == year && i.month == month)
        .await
        .api_err("Failed to read incomes")?;

    let input = SummaryInput {
        categories: &categories,
        transactions: &transactions,
        budget: budget.as_ref(),
        items: &items,
        incomes: &incomes,
    };
    Ok::<_, ApiError>(Json(ApiResponse::success(month_summary(&input, year, month))))
}
