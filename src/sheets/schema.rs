use serde::Serialize;

use super::api::SheetsApi;
use super::range::A1Range;
use super::row::TableDef;
use super::workbook::Workbook;
use crate::error::Result;

pub const USERS: TableDef = TableDef {
    name: "users",
    columns: &["id", "email", "name", "picture", "created_at", "updated_at"],
    key: "id",
};

pub const SETTINGS: TableDef = TableDef {
    name: "settings",
    columns: &[
        "user_id",
        "currency",
        "language",
        "theme",
        "notifications_enabled",
        "telegram_chat_id",
        "telegram_username",
        "created_at",
        "updated_at",
    ],
    key: "user_id",
};

pub const CATEGORIES: TableDef = TableDef {
    name: "categories",
    columns: &["id", "user_id", "name", "emoji", "color", "created_at", "updated_at"],
    key: "id",
};

pub const TRANSACTIONS: TableDef = TableDef {
    name: "transactions",
    columns: &[
        "id",
        "user_id",
        "category_id",
        "amount",
        "date",
        "description",
        "created_at",
        "updated_at",
    ],
    key: "id",
};

pub const BUDGETS: TableDef = TableDef {
    name: "budgets",
    columns: &["id", "user_id", "year", "month", "income", "created_at", "updated_at"],
    key: "id",
};

pub const BUDGET_ITEMS: TableDef = TableDef {
    name: "budget_items",
    columns: &[
        "id",
        "budget_id",
        "category_id",
        "amount",
        "spent",
        "created_at",
        "updated_at",
    ],
    key: "id",
};

pub const BUDGET_INCOMES: TableDef = TableDef {
    name: "budget_incomes",
    columns: &[
        "id",
        "user_id",
        "year",
        "month",
        "amount",
        "source",
        "created_at",
        "updated_at",
    ],
    key: "id",
};

pub const GOALS: TableDef = TableDef {
    name: "goals",
    columns: &[
        "id",
        "user_id",
        "name",
        "category_id",
        "limit_amount",
        "period",
        "notify",
        "created_at",
        "updated_at",
    ],
    key: "id",
};

pub const TELEGRAM_MESSAGES: TableDef = TableDef {
    name: "telegram_messages",
    columns: &["id", "user_id", "chat_id", "payload", "status", "created_at"],
    key: "id",
};

pub const TABLES: [&TableDef; 9] = [
    &USERS,
    &SETTINGS,
    &CATEGORIES,
    &TRANSACTIONS,
    &BUDGETS,
    &BUDGET_ITEMS,
    &BUDGET_INCOMES,
    &GOALS,
    &TELEGRAM_MESSAGES,
];

#[derive(Debug, Default, Serialize)]
pub struct SchemaReport {
    pub created_tabs: Vec<String>,
    pub added_columns: Vec<String>,
}

impl SchemaReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created_tabs.is_empty() && self.added_columns.is_empty()
    }
}

#[must_use]
pub fn spreadsheet_title(email: &str) -> String {
    format!("Budget App - {email}")
}

/// Brings a spreadsheet up to the current schema.
///
/// Missing tabs are created with a header row; existing tabs get any missing
/// columns appended to their header. Each step is a separate call, so a
/// failure part-way leaves the earlier steps applied. Running it again picks
/// up where it stopped.
pub async fn ensure_schema(workbook: &Workbook) -> Result<SchemaReport> {
    let api = workbook.api();
    let token = workbook.token();
    let id = workbook.spreadsheet_id();

    let existing: Vec<String> = api
        .sheet_tabs(token, id)
        .await?
        .into_iter()
        .map(|t| t.title)
        .collect();

    let mut report = SchemaReport::default();

    for table in TABLES {
        if !existing.iter().any(|t| t == table.name) {
            api.add_sheet(token, id, table.name).await?;
            report.created_tabs.push(table.name.to_string());
        }

        let mut header = workbook.header(table).await?;
        let missing: Vec<&str> = table
            .columns
            .iter()
            .copied()
            .filter(|c| !header.iter().any(|h| h == c))
            .collect();
        if missing.is_empty() {
            continue;
        }

        let had_header = !header.is_empty();
        header.extend(missing.iter().map(|c| (*c).to_string()));
        let width = header.len();
        api.update_values(token, id, &A1Range::row(table.name, 1, width), vec![header])
            .await?;

        if had_header {
            for column in missing {
                tracing::info!("Added column {column} to {}", table.name);
                report.added_columns.push(format!("{}.{column}", table.name));
            }
        }
    }

    if !report.created_tabs.is_empty() {
        tracing::info!(
            "Created tabs [{}] in spreadsheet {id}",
            report.created_tabs.join(", ")
        );
    }

    Ok(report)
}

/// Returns the user's spreadsheet id, creating the spreadsheet when no
/// spreadsheet with the expected title exists in their Drive.
pub async fn provision(api: &dyn SheetsApi, token: &str, email: &str) -> Result<String> {
    let title = spreadsheet_title(email);
    if let Some(id) = api.find_spreadsheet(token, &title).await? {
        tracing::info!("Found existing spreadsheet {id} for {email}");
        return Ok(id);
    }
    let id = api.create_spreadsheet(token, &title).await?;
    tracing::info!("Created spreadsheet {id} for {email}");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sheets::memory::MemorySheets;

    #[tokio::test]
    async fn test_ensure_schema_creates_all_tabs_once() {
        let api = Arc::new(MemorySheets::new());
        let id = provision(api.as_ref(), "tok", "a@b.c").await.unwrap();
        let wb = Workbook::new(api.clone(), "tok", id.clone());

        let first = ensure_schema(&wb).await.unwrap();
        assert_eq!(first.created_tabs.len(), TABLES.len());
        assert!(first.added_columns.is_empty());

        let header = api.grid(&id, "goals").unwrap().remove(0);
        assert_eq!(header, GOALS.columns);

        let second = ensure_schema(&wb).await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_ensure_schema_adds_emoji_column_to_old_tab() {
        let api = Arc::new(MemorySheets::new());
        let id = api.create_spreadsheet("tok", "Book").await.unwrap();
        api.add_sheet("tok", &id, "categories").await.unwrap();
        let old: Vec<String> = ["id", "user_id", "name", "color"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        api.update_values("tok", &id, &A1Range::header("categories"), vec![old])
            .await
            .unwrap();

        let wb = Workbook::new(api.clone(), "tok", id.clone());
        let report = ensure_schema(&wb).await.unwrap();

        assert!(report.added_columns.contains(&"categories.emoji".to_string()));
        let header = api.grid(&id, "categories").unwrap().remove(0);
        assert_eq!(&header[..4], ["id", "user_id", "name", "color"]);
        assert!(header.contains(&"emoji".to_string()));
    }

    #[tokio::test]
    async fn test_provision_reuses_existing_spreadsheet() {
        let api = MemorySheets::new();
        let first = provision(&api, "tok", "a@b.c").await.unwrap();
        let second = provision(&api, "tok", "a@b.c").await.unwrap();
        assert_eq!(first, second);
        let other = provision(&api, "tok", "z@b.c").await.unwrap();
        assert_ne!(first, other);
    }
}
