use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use super::access::{claim_id, non_empty, open_workbook, owned_category};
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreateCategoryRequest, DeleteCategoryParams, UpdateCategoryRequest};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{validate_category_name, validate_color};
use crate::sheets::Workbook;
use crate::types::{BudgetItem, Category, Goal, Transaction};

async fn ensure_unique_name(
    wb: &Workbook,
    user_id: &str,
    name: &str,
    except_id: Option<&str>,
) -> Result<(), ApiError> {
    let taken = wb
        .find_one(|c: &Category| {
            c.user_id == user_id
                && c.name.eq_ignore_ascii_case(name)
                && except_id.is_none_or(|id| c.id != id)
        })
        .await
        .api_err("Failed to read categories")?
        .is_some();

    if taken {
        return Err(ApiError::conflict(format!(
            "A category named \"{name}\" already exists"
        )));
    }
    Ok(())
}

pub async fn list_categories(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;

    let mut categories = wb
        .find(|c: &Category| c.user_id == user_id)
        .await
        .api_err("Failed to read categories")?;
    categories.sort_by_key(|c| c.name.to_lowercase());

    Ok::<_, ApiError>(Json(ApiResponse::success(categories)))
}

pub async fn create_category(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let name = req.name.trim().to_string();
    validate_category_name(&name)?;
    let color = non_empty(req.color);
    if let Some(color) = &color {
        validate_color(color)?;
    }

    let wb = open_workbook(&state, &auth.account).await?;
    ensure_unique_name(&wb, user_id, &name, None).await?;
    let id = claim_id::<Category>(&wb, req.id).await?;

    let now = Utc::now();
    let category = Category {
        id,
        user_id: user_id.to_string(),
        name,
        emoji: non_empty(req.emoji),
        color,
        created_at: now,
        updated_at: now,
    };
    wb.insert(&category)
        .await
        .api_err("Failed to create category")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(category))))
}

pub async fn get_category(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let category = owned_category(&wb, &auth.account.id, &id).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(category)))
}

pub async fn update_category(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let mut category = owned_category(&wb, user_id, &id).await?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        validate_category_name(&name)?;
        if !name.eq_ignore_ascii_case(&category.name) {
            ensure_unique_name(&wb, user_id, &name, Some(&category.id)).await?;
        }
        category.name = name;
    }
    if let Some(emoji) = req.emoji {
        category.emoji = non_empty(Some(emoji));
    }
    if let Some(color) = req.color {
        let color = non_empty(Some(color));
        if let Some(color) = &color {
            validate_color(color)?;
        }
        category.color = color;
    }
    category.updated_at = Utc::now();

    wb.update(&category)
        .await
        .api_err("Failed to update category")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(category)))
}

/// Refuses while transactions, budget items or goals reference the category
/// unless `force` is set. With `force`, those records go with it.
pub async fn delete_category(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DeleteCategoryParams>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let category = owned_category(&wb, user_id, &id).await?;
    let category_id = category.id.as_str();

    let uses_transaction =
        |t: &Transaction| t.user_id == user_id && t.category_id == category_id;
    let uses_item = |i: &BudgetItem| i.category_id == category_id;
    let uses_goal =
        |g: &Goal| g.user_id == user_id && g.category_id.as_deref() == Some(category_id);

    if !params.force {
        let transactions = wb
            .find(uses_transaction)
            .await
            .api_err("Failed to read transactions")?
            .len();
        let items = wb
            .find(uses_item)
            .await
            .api_err("Failed to read budget items")?
            .len();
        let goals = wb
            .find(uses_goal)
            .await
            .api_err("Failed to read goals")?
            .len();

        if transactions + items + goals > 0 {
            return Err(ApiError::conflict(format!(
                "Category is used by {transactions} transactions, {items} budget items \
                 and {goals} goals; pass force=true to delete them too"
            )));
        }
    } else {
        let removed = wb
            .delete_where(uses_transaction)
            .await
            .api_err("Failed to delete transactions")?;
        let items = wb
            .delete_where(uses_item)
            .await
            .api_err("Failed to delete budget items")?;
        let goals = wb
            .delete_where(uses_goal)
            .await
            .api_err("Failed to delete goals")?;
        tracing::info!(
            "Force-deleting category {category_id} removed {removed} transactions, \
             {items} budget items and {goals} goals"
        );
    }

    wb.delete::<Category>(category_id)
        .await
        .api_err("Failed to delete category")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
