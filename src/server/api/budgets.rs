use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use super::access::{claim_id, claim_ids, open_workbook, owned_budget, referenced_category};
use crate::auth::RequireUser;
use crate::budget::{recompute_spent, spent_in_month};
use crate::server::AppState;
use crate::server::dto::{
    BudgetDetail, CreateBudgetItemRequest, CreateBudgetRequest, ListBudgetsParams,
    UpdateBudgetItemRequest, UpdateBudgetRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{validate_non_negative, validate_period};
use crate::sheets::Workbook;
use crate::types::{Budget, BudgetIncome, BudgetItem, Transaction};

async fn user_transactions(wb: &Workbook, user_id: &str) -> Result<Vec<Transaction>, ApiError> {
    wb.find(|t: &Transaction| t.user_id == user_id)
        .await
        .api_err("Failed to read transactions")
}

async fn budget_items(wb: &Workbook, budget_id: &str) -> Result<Vec<BudgetItem>, ApiError> {
    wb.find(|i: &BudgetItem| i.budget_id == budget_id)
        .await
        .api_err("Failed to read budget items")
}

async fn ensure_period_free(
    wb: &Workbook,
    user_id: &str,
    year: i32,
    month: u32,
    except_id: Option<&str>,
) -> Result<(), ApiError> {
    let taken = wb
        .find_one(|b: &Budget| {
            b.user_id == user_id
                && b.year == year
                && b.month == month
                && except_id.is_none_or(|id| b.id != id)
        })
        .await
        .api_err("Failed to read budgets")?
        .is_some();

    if taken {
        return Err(ApiError::conflict(format!(
            "A budget for {year}-{month:02} already exists"
        )));
    }
    Ok(())
}

async fn budget_detail(wb: &Workbook, user_id: &str, budget: Budget) -> Result<BudgetDetail, ApiError> {
    let mut items = budget_items(wb, &budget.id).await?;
    let transactions = user_transactions(wb, user_id).await?;
    recompute_spent(&budget, &mut items, &transactions);

    let (year, month) = (budget.year, budget.month);
    let incomes = wb
        .find(|i: &BudgetIncome| i.user_id == user_id && i.year == year && i.month == month)
        .await
        .api_err("Failed to read incomes")?;

    let total_income = budget.income + incomes.iter().map(|i| i.amount).sum::<f64>();
    let total_budgeted = items.iter().map(|i| i.amount).sum();
    let total_spent = items.iter().map(|i| i.spent).sum();

    Ok(BudgetDetail {
        budget,
        items,
        incomes,
        total_income,
        total_budgeted,
        total_spent,
    })
}

fn new_item(
    budget: &Budget,
    id: String,
    req: CreateBudgetItemRequest,
    transactions: &[Transaction],
) -> Result<BudgetItem, ApiError> {
    validate_non_negative(req.amount, "Amount")?;
    let now = Utc::now();
    Ok(BudgetItem {
        id,
        budget_id: budget.id.clone(),
        spent: spent_in_month(transactions, &req.category_id, budget.year, budget.month),
        category_id: req.category_id,
        amount: req.amount,
        created_at: now,
        updated_at: now,
    })
}

pub async fn list_budgets(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListBudgetsParams>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;

    let mut budgets = wb
        .find(|b: &Budget| b.user_id == user_id && params.year.is_none_or(|y| b.year == y))
        .await
        .api_err("Failed to read budgets")?;
    budgets.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));

    Ok::<_, ApiError>(Json(ApiResponse::success(budgets)))
}

/// Creates a budget and, optionally, its items in one request. The items are
/// appended after the budget row; a failure there leaves the budget in place.
pub async fn create_budget(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBudgetRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    validate_period(req.year, req.month)?;
    let income = req.income.unwrap_or(0.0);
    validate_non_negative(income, "Income")?;

    let mut seen = HashSet::new();
    if let Some(dup) = req.items.iter().find(|i| !seen.insert(i.category_id.as_str())) {
        return Err(ApiError::bad_request(format!(
            "Category {} appears more than once",
            dup.category_id
        )));
    }

    let wb = open_workbook(&state, &auth.account).await?;
    ensure_period_free(&wb, user_id, req.year, req.month, None).await?;
    for item in &req.items {
        referenced_category(&wb, user_id, &item.category_id).await?;
    }
    let id = claim_id::<Budget>(&wb, req.id).await?;
    let item_ids = if req.items.is_empty() {
        Vec::new()
    } else {
        claim_ids::<BudgetItem>(&wb, req.items.iter().map(|i| i.id.clone()).collect()).await?
    };

    let now = Utc::now();
    let budget = Budget {
        id,
        user_id: user_id.to_string(),
        year: req.year,
        month: req.month,
        income,
        created_at: now,
        updated_at: now,
    };

    let transactions = if req.items.is_empty() {
        Vec::new()
    } else {
        user_transactions(&wb, user_id).await?
    };
    let items = req
        .items
        .into_iter()
        .zip(item_ids)
        .map(|(i, id)| new_item(&budget, id, i, &transactions))
        .collect::<Result<Vec<_>, _>>()?;

    wb.insert(&budget).await.api_err("Failed to create budget")?;
    wb.insert_many(&items)
        .await
        .api_err("Failed to create budget items")?;
    tracing::info!(
        "Created budget {}-{:02} with {} items for {}",
        budget.year,
        budget.month,
        items.len(),
        auth.account.email
    );

    let detail = budget_detail(&wb, user_id, budget).await?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

pub async fn get_budget(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let budget = owned_budget(&wb, user_id, &id).await?;
    let detail = budget_detail(&wb, user_id, budget).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}

pub async fn get_budget_for_period(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((year, month)): Path<(i32, u32)>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    validate_period(year, month)?;
    let wb = open_workbook(&state, &auth.account).await?;

    let budget = wb
        .find_one(|b: &Budget| b.user_id == user_id && b.year == year && b.month == month)
        .await
        .api_err("Failed to read budgets")?
        .or_not_found("No budget for this period")?;
    let detail = budget_detail(&wb, user_id, budget).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}

pub async fn update_budget(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBudgetRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let mut budget = owned_budget(&wb, user_id, &id).await?;

    let year = req.year.unwrap_or(budget.year);
    let month = req.month.unwrap_or(budget.month);
    if (year, month) != (budget.year, budget.month) {
        validate_period(year, month)?;
        ensure_period_free(&wb, user_id, year, month, Some(&budget.id)).await?;
        budget.year = year;
        budget.month = month;
    }
    if let Some(income) = req.income {
        validate_non_negative(income, "Income")?;
        budget.income = income;
    }
    budget.updated_at = Utc::now();

    wb.update(&budget).await.api_err("Failed to update budget")?;

    let detail = budget_detail(&wb, user_id, budget).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}

/// Deletes the budget's items, then the budget. There is no rollback if the
/// second step fails.
pub async fn delete_budget(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let budget = owned_budget(&wb, &auth.account.id, &id).await?;

    let removed = wb
        .delete_where(|i: &BudgetItem| i.budget_id == budget.id)
        .await
        .api_err("Failed to delete budget items")?;
    wb.delete::<Budget>(&budget.id)
        .await
        .api_err("Failed to delete budget")?;
    tracing::debug!("Deleted budget {} and {removed} items", budget.id);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_items(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let budget = owned_budget(&wb, user_id, &id).await?;

    let mut items = budget_items(&wb, &budget.id).await?;
    let transactions = user_transactions(&wb, user_id).await?;
    recompute_spent(&budget, &mut items, &transactions);

    Ok::<_, ApiError>(Json(ApiResponse::success(items)))
}

pub async fn create_item(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateBudgetItemRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let budget = owned_budget(&wb, user_id, &id).await?;
    referenced_category(&wb, user_id, &req.category_id).await?;

    let items = budget_items(&wb, &budget.id).await?;
    if items.iter().any(|i| i.category_id == req.category_id) {
        return Err(ApiError::conflict("This budget already has an item for the category"));
    }

    let id = claim_id::<BudgetItem>(&wb, req.id.clone()).await?;
    let transactions = user_transactions(&wb, user_id).await?;
    let item = new_item(&budget, id, req, &transactions)?;
    wb.insert(&item)
        .await
        .api_err("Failed to create budget item")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

async fn owned_item(wb: &Workbook, budget: &Budget, item_id: &str) -> Result<BudgetItem, ApiError> {
    wb.find_by_key::<BudgetItem>(item_id)
        .await
        .api_err("Failed to read budget items")?
        .filter(|i| i.budget_id == budget.id)
        .or_not_found("Budget item not found")
}

pub async fn update_item(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(String, String)>,
    Json(req): Json<UpdateBudgetItemRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let budget = owned_budget(&wb, user_id, &id).await?;
    let mut item = owned_item(&wb, &budget, &item_id).await?;

    if let Some(category_id) = req.category_id.filter(|c| *c != item.category_id) {
        referenced_category(&wb, user_id, &category_id).await?;
        let clash = budget_items(&wb, &budget.id)
            .await?
            .iter()
            .any(|i| i.category_id == category_id);
        if clash {
            return Err(ApiError::conflict("This budget already has an item for the category"));
        }
        item.category_id = category_id;
    }
    if let Some(amount) = req.amount {
        validate_non_negative(amount, "Amount")?;
        item.amount = amount;
    }

    let transactions = user_transactions(&wb, user_id).await?;
    item.spent = spent_in_month(&transactions, &item.category_id, budget.year, budget.month);
    item.updated_at = Utc::now();

    wb.update(&item)
        .await
        .api_err("Failed to update budget item")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(item)))
}

pub async fn delete_item(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let budget = owned_budget(&wb, &auth.account.id, &id).await?;
    let item = owned_item(&wb, &budget, &item_id).await?;

    wb.delete::<BudgetItem>(&item.id)
        .await
        .api_err("Failed to delete budget item")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
