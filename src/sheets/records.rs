use super::row::{Record, Row, TableDef, format_amount, format_timestamp};
use super::schema::{
    BUDGET_INCOMES, BUDGET_ITEMS, BUDGETS, CATEGORIES, GOALS, SETTINGS, TELEGRAM_MESSAGES,
    TRANSACTIONS, USERS,
};
use crate::error::{Error, Result};
use crate::types::*;

impl Record for UserRow {
    const TABLE: &'static TableDef = &USERS;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("email", &self.email)
            .with("name", &self.name)
            .with_opt("picture", self.picture.as_deref())
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = USERS.name;
        Ok(Self {
            id: row.required(t, "id")?,
            email: row.required(t, "email")?,
            name: row.get("name").to_string(),
            picture: row.opt("picture"),
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for Settings {
    const TABLE: &'static TableDef = &SETTINGS;

    fn key(&self) -> &str {
        &self.user_id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("user_id", &self.user_id)
            .with("currency", &self.currency)
            .with("language", &self.language)
            .with("theme", &self.theme)
            .with("notifications_enabled", self.notifications_enabled.to_string())
            .with_opt("telegram_chat_id", self.telegram_chat_id.map(|id| id.to_string()))
            .with_opt("telegram_username", self.telegram_username.as_deref())
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = SETTINGS.name;
        let defaults = Settings::defaults_for("");
        Ok(Self {
            user_id: row.required(t, "user_id")?,
            currency: row.opt("currency").unwrap_or(defaults.currency),
            language: row.opt("language").unwrap_or(defaults.language),
            theme: row.opt("theme").unwrap_or(defaults.theme),
            notifications_enabled: row.flag("notifications_enabled", true),
            telegram_chat_id: row.opt("telegram_chat_id").and_then(|s| s.parse().ok()),
            telegram_username: row.opt("telegram_username"),
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for Category {
    const TABLE: &'static TableDef = &CATEGORIES;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("user_id", &self.user_id)
            .with("name", &self.name)
            .with_opt("emoji", self.emoji.as_deref())
            .with_opt("color", self.color.as_deref())
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = CATEGORIES.name;
        Ok(Self {
            id: row.required(t, "id")?,
            user_id: row.required(t, "user_id")?,
            name: row.required(t, "name")?,
            emoji: row.opt("emoji"),
            color: row.opt("color"),
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for Transaction {
    const TABLE: &'static TableDef = &TRANSACTIONS;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("user_id", &self.user_id)
            .with("category_id", &self.category_id)
            .with("amount", format_amount(self.amount))
            .with("date", self.date.format("%Y-%m-%d").to_string())
            .with_opt("description", self.description.as_deref())
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = TRANSACTIONS.name;
        Ok(Self {
            id: row.required(t, "id")?,
            user_id: row.required(t, "user_id")?,
            category_id: row.get("category_id").to_string(),
            amount: row.parse(t, "amount")?,
            date: row.date(t, "date")?,
            description: row.opt("description"),
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for Budget {
    const TABLE: &'static TableDef = &BUDGETS;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("user_id", &self.user_id)
            .with("year", self.year.to_string())
            .with("month", self.month.to_string())
            .with("income", format_amount(self.income))
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = BUDGETS.name;
        let month: u32 = row.parse(t, "month")?;
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidRow {
                table: t,
                reason: format!("month out of range: {month}"),
            });
        }
        Ok(Self {
            id: row.required(t, "id")?,
            user_id: row.required(t, "user_id")?,
            year: row.parse(t, "year")?,
            month,
            income: row.parse_or(t, "income", 0.0)?,
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for BudgetItem {
    const TABLE: &'static TableDef = &BUDGET_ITEMS;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("budget_id", &self.budget_id)
            .with("category_id", &self.category_id)
            .with("amount", format_amount(self.amount))
            .with("spent", format_amount(self.spent))
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = BUDGET_ITEMS.name;
        Ok(Self {
            id: row.required(t, "id")?,
            budget_id: row.required(t, "budget_id")?,
            category_id: row.required(t, "category_id")?,
            amount: row.parse_or(t, "amount", 0.0)?,
            spent: row.parse_or(t, "spent", 0.0)?,
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for BudgetIncome {
    const TABLE: &'static TableDef = &BUDGET_INCOMES;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("user_id", &self.user_id)
            .with("year", self.year.to_string())
            .with("month", self.month.to_string())
            .with("amount", format_amount(self.amount))
            .with("source", &self.source)
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = BUDGET_INCOMES.name;
        Ok(Self {
            id: row.required(t, "id")?,
            user_id: row.required(t, "user_id")?,
            year: row.parse(t, "year")?,
            month: row.parse(t, "month")?,
            amount: row.parse(t, "amount")?,
            source: row.get("source").to_string(),
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for Goal {
    const TABLE: &'static TableDef = &GOALS;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("user_id", &self.user_id)
            .with("name", &self.name)
            .with_opt("category_id", self.category_id.as_deref())
            .with("limit_amount", format_amount(self.limit_amount))
            .with("period", self.period.as_str())
            .with("notify", self.notify.to_string())
            .with("created_at", format_timestamp(&self.created_at))
            .with("updated_at", format_timestamp(&self.updated_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = GOALS.name;
        let period = match row.opt("period") {
            None => GoalPeriod::default(),
            Some(raw) => GoalPeriod::parse(&raw).ok_or_else(|| Error::InvalidRow {
                table: t,
                reason: format!("invalid period: {raw}"),
            })?,
        };
        Ok(Self {
            id: row.required(t, "id")?,
            user_id: row.required(t, "user_id")?,
            name: row.get("name").to_string(),
            category_id: row.opt("category_id"),
            limit_amount: row.parse(t, "limit_amount")?,
            period,
            notify: row.flag("notify", true),
            created_at: row.timestamp("created_at"),
            updated_at: row.timestamp("updated_at"),
        })
    }
}

impl Record for TelegramMessage {
    const TABLE: &'static TableDef = &TELEGRAM_MESSAGES;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("user_id", &self.user_id)
            .with("chat_id", self.chat_id.to_string())
            .with("payload", &self.payload)
            .with("status", self.status.as_str())
            .with("created_at", format_timestamp(&self.created_at))
    }

    fn from_row(row: &Row) -> Result<Self> {
        let t = TELEGRAM_MESSAGES.name;
        let raw_status = row.get("status");
        Ok(Self {
            id: row.required(t, "id")?,
            user_id: row.required(t, "user_id")?,
            chat_id: row.parse(t, "chat_id")?,
            payload: row.get("payload").to_string(),
            status: MessageStatus::parse(raw_status).ok_or_else(|| Error::InvalidRow {
                table: t,
                reason: format!("invalid status: {raw_status}"),
            })?,
            created_at: row.timestamp("created_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    #[test]
    fn test_transaction_row_shape() {
        let now = Utc::now();
        let tx = Transaction {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            category_id: "c1".to_string(),
            amount: 42.5,
            date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            description: None,
            created_at: now,
            updated_at: now,
        };
        let row = tx.to_row();
        assert_eq!(row.get("amount"), "42.5");
        assert_eq!(row.get("date"), "2024-06-02");
        assert_eq!(row.get("description"), "");

        let back = Transaction::from_row(&row).unwrap();
        assert_eq!(back.amount, 42.5);
        assert_eq!(back.date, tx.date);
    }

    #[test]
    fn test_category_without_emoji_column() {
        let header: Vec<String> = ["id", "user_id", "name", "color"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let values: Vec<String> = ["c1", "u1", "Food", "#FF0000"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let category = Category::from_row(&Row::from_values(&header, &values)).unwrap();
        assert_eq!(category.emoji, None);
        assert_eq!(category.color.as_deref(), Some("#FF0000"));
    }

    #[test]
    fn test_budget_rejects_bad_month() {
        let row = Row::new()
            .with("id", "b1")
            .with("user_id", "u1")
            .with("year", "2024")
            .with("month", "13");
        assert!(Budget::from_row(&row).is_err());
    }

    #[test]
    fn test_settings_defaults_fill_blank_cells() {
        let row = Row::new().with("user_id", "u1").with("currency", "");
        let settings = Settings::from_row(&row).unwrap();
        assert_eq!(settings.currency, "USD");
        assert!(settings.notifications_enabled);
        assert_eq!(settings.telegram_chat_id, None);
    }
}
