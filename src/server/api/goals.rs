use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use super::access::{claim_id, non_empty, open_workbook, referenced_category};
use crate::auth::RequireUser;
use crate::budget;
use crate::server::AppState;
use crate::server::dto::{CreateGoalRequest, GoalProgressParams, UpdateGoalRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{parse_date_field, parse_goal_period, validate_amount, validate_goal_name};
use crate::sheets::Workbook;
use crate::types::{Goal, GoalPeriod, Transaction};

async fn owned_goal(wb: &Workbook, user_id: &str, id: &str) -> Result<Goal, ApiError> {
    wb.find_by_key::<Goal>(id)
        .await
        .api_err("Failed to read goals")?
        .filter(|g| g.user_id == user_id)
        .or_not_found("Goal not found")
}

pub async fn list_goals(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;

    let mut goals = wb
        .find(|g: &Goal| g.user_id == user_id)
        .await
        .api_err("Failed to read goals")?;
    goals.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok::<_, ApiError>(Json(ApiResponse::success(goals)))
}

pub async fn create_goal(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGoalRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let name = req.name.trim().to_string();
    validate_goal_name(&name)?;
    validate_amount(req.limit_amount, "Limit")?;
    let period = match req.period.as_deref() {
        Some(raw) => parse_goal_period(raw)?,
        None => GoalPeriod::default(),
    };

    let wb = open_workbook(&state, &auth.account).await?;
    let id = claim_id::<Goal>(&wb, req.id).await?;
    let category_id = non_empty(req.category_id);
    if let Some(category_id) = &category_id {
        referenced_category(&wb, user_id, category_id).await?;
    }

    let now = Utc::now();
    let goal = Goal {
        id,
        user_id: user_id.to_string(),
        name,
        category_id,
        limit_amount: req.limit_amount,
        period,
        notify: req.notify.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    wb.insert(&goal).await.api_err("Failed to create goal")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(goal))))
}

pub async fn get_goal(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let goal = owned_goal(&wb, &auth.account.id, &id).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(goal)))
}

pub async fn update_goal(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateGoalRequest>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let wb = open_workbook(&state, &auth.account).await?;
    let mut goal = owned_goal(&wb, user_id, &id).await?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        validate_goal_name(&name)?;
        goal.name = name;
    }
    if let Some(category_id) = req.category_id {
        let category_id = non_empty(Some(category_id));
        if let Some(category_id) = &category_id {
            if goal.category_id.as_ref() != Some(category_id) {
                referenced_category(&wb, user_id, category_id).await?;
            }
        }
        goal.category_id = category_id;
    }
    if let Some(limit) = req.limit_amount {
        validate_amount(limit, "Limit")?;
        goal.limit_amount = limit;
    }
    if let Some(period) = req.period {
        goal.period = parse_goal_period(&period)?;
    }
    if let Some(notify) = req.notify {
        goal.notify = notify;
    }
    goal.updated_at = Utc::now();

    wb.update(&goal).await.api_err("Failed to update goal")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(goal)))
}

pub async fn delete_goal(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let wb = open_workbook(&state, &auth.account).await?;
    let goal = owned_goal(&wb, &auth.account.id, &id).await?;

    wb.delete::<Goal>(&goal.id)
        .await
        .api_err("Failed to delete goal")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

/// Progress in the period containing `?date`, today when omitted.
pub async fn goal_progress(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<GoalProgressParams>,
) -> impl IntoResponse {
    let user_id = auth.account.id.as_str();
    let anchor = match params.date.as_deref() {
        Some(raw) => parse_date_field(raw)?,
        None => Utc::now().date_naive(),
    };

    let wb = open_workbook(&state, &auth.account).await?;
    let goal = owned_goal(&wb, user_id, &id).await?;
    let transactions = wb
        .find(|t: &Transaction| t.user_id == user_id)
        .await
        .api_err("Failed to read transactions")?;

    let progress = budget::goal_progress(&goal, &transactions, anchor);
    Ok::<_, ApiError>(Json(ApiResponse::success(progress)))
}
