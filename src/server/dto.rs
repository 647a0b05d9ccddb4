use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::SessionTokens;
use crate::sheets::SheetTab;
use crate::types::{
    Account, Budget, BudgetIncome, BudgetItem, Category, Goal, Settings, Transaction, UserRow,
};

// Auth

#[derive(Debug, Default, Deserialize)]
pub struct GoogleLoginParams {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        let spreadsheet_url = account
            .spreadsheet_id
            .as_deref()
            .map(crate::sheets::spreadsheet_url);
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            picture: account.picture,
            spreadsheet_id: account.spreadsheet_id,
            spreadsheet_url,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: SessionTokens,
    pub user: AccountResponse,
}

// Categories

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Empty strings clear `emoji` and `color`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteCategoryParams {
    #[serde(default)]
    pub force: bool,
}

// Transactions

#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsParams {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub category_id: String,
    pub amount: f64,
    pub date: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTransactionRequest {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// Budgets

#[derive(Debug, Default, Deserialize)]
pub struct ListBudgetsParams {
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub income: Option<f64>,
    #[serde(default)]
    pub items: Vec<CreateBudgetItemRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBudgetRequest {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub income: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBudgetItemRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub category_id: String,
    pub amount: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBudgetItemRequest {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct BudgetDetail {
    #[serde(flatten)]
    pub budget: Budget,
    pub items: Vec<BudgetItem>,
    pub incomes: Vec<BudgetIncome>,
    pub total_income: f64,
    pub total_budgeted: f64,
    pub total_spent: f64,
}

// Incomes

#[derive(Debug, Default, Deserialize)]
pub struct ListIncomesParams {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIncomeRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub year: i32,
    pub month: u32,
    pub amount: f64,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateIncomeRequest {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

// Goals

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub limit_amount: f64,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub notify: Option<bool>,
}

/// An empty `category_id` makes the goal cover all spending.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateGoalRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub limit_amount: Option<f64>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub notify: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GoalProgressParams {
    #[serde(default)]
    pub date: Option<String>,
}

// Settings

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub notifications_enabled: Option<bool>,
}

// Data

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRow>,
    pub settings: Settings,
    pub categories: Vec<Category>,
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<Budget>,
    pub budget_items: Vec<BudgetItem>,
    pub budget_incomes: Vec<BudgetIncome>,
    pub goals: Vec<Goal>,
}

// Telegram

#[derive(Debug, Serialize)]
pub struct LinkCodeResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TelegramStatusResponse {
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub notifications_enabled: bool,
    pub bot_configured: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMessagesParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

// Sheets

#[derive(Debug, Serialize)]
pub struct SheetsInfo {
    pub spreadsheet_id: String,
    pub url: String,
    pub tabs: Vec<SheetTab>,
}
