mod access;
mod auth;
mod budgets;
mod categories;
mod data;
mod goals;
mod incomes;
mod settings;
mod sheets;
mod telegram;
mod transactions;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::server::AppState;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Auth
        .route("/auth/google", get(auth::google_login))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        // Whole-account reads
        .route("/data", get(data::get_data))
        .route("/data/summary", get(data::get_summary))
        // Categories
        .route("/categories", get(categories::list_categories))
        .route("/categories", post(categories::create_category))
        .route("/categories/{id}", get(categories::get_category))
        .route("/categories/{id}", patch(categories::update_category))
        .route("/categories/{id}", delete(categories::delete_category))
        // Transactions
        .route("/transactions", get(transactions::list_transactions))
        .route("/transactions", post(transactions::create_transaction))
        .route("/transactions/{id}", get(transactions::get_transaction))
        .route("/transactions/{id}", patch(transactions::update_transaction))
        .route("/transactions/{id}", delete(transactions::delete_transaction))
        // Budgets
        .route("/budgets", get(budgets::list_budgets))
        .route("/budgets", post(budgets::create_budget))
        .route(
            "/budgets/period/{year}/{month}",
            get(budgets::get_budget_for_period),
        )
        .route("/budgets/{id}", get(budgets::get_budget))
        .route("/budgets/{id}", patch(budgets::update_budget))
        .route("/budgets/{id}", delete(budgets::delete_budget))
        // Budget items
        .route("/budgets/{id}/items", get(budgets::list_items))
        .route("/budgets/{id}/items", post(budgets::create_item))
        .route("/budgets/{id}/items/{item_id}", patch(budgets::update_item))
        .route("/budgets/{id}/items/{item_id}", delete(budgets::delete_item))
        // Incomes
        .route("/incomes", get(incomes::list_incomes))
        .route("/incomes", post(incomes::create_income))
        .route("/incomes/{id}", patch(incomes::update_income))
        .route("/incomes/{id}", delete(incomes::delete_income))
        // Goals
        .route("/goals", get(goals::list_goals))
        .route("/goals", post(goals::create_goal))
        .route("/goals/{id}", get(goals::get_goal))
        .route("/goals/{id}", patch(goals::update_goal))
        .route("/goals/{id}", delete(goals::delete_goal))
        .route("/goals/{id}/progress", get(goals::goal_progress))
        // Settings
        .route("/settings", get(settings::get_settings))
        .route("/settings", put(settings::update_settings))
        // Telegram
        .route("/telegram/webhook", post(telegram::webhook))
        .route("/telegram/link", post(telegram::create_link))
        .route("/telegram/link", delete(telegram::unlink))
        .route("/telegram/status", get(telegram::status))
        .route("/telegram/test", post(telegram::send_test))
        .route("/telegram/messages", get(telegram::list_messages))
        // Spreadsheet maintenance
        .route("/sheets", get(sheets::get_sheets))
        .route("/sheets/init", post(sheets::init_sheets))
        .route(
            "/sheets/migrations/category-emoji",
            post(sheets::migrate_emoji),
        )
}
