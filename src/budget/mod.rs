//! Spending arithmetic over records already read from a workbook.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{
    Budget, BudgetIncome, BudgetItem, Category, Goal, Transaction, month_bounds,
};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn in_month(date: NaiveDate, year: i32, month: u32) -> bool {
    month_bounds(year, month).is_some_and(|(start, end)| date >= start && date < end)
}

/// Total spent in `category_id` during the month.
#[must_use]
pub fn spent_in_month(transactions: &[Transaction], category_id: &str, year: i32, month: u32) -> f64 {
    round2(
        transactions
            .iter()
            .filter(|t| t.category_id == category_id && in_month(t.date, year, month))
            .map(|t| t.amount)
            .sum(),
    )
}

/// Sets each item's `spent` from the transactions of the budget's month.
pub fn recompute_spent(budget: &Budget, items: &mut [BudgetItem], transactions: &[Transaction]) {
    for item in items {
        item.spent = spent_in_month(transactions, &item.category_id, budget.year, budget.month);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalProgress {
    pub goal_id: String,
    pub name: String,
    pub period: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub limit_amount: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percent: f64,
    pub exceeded: bool,
}

/// Spending against a goal in the period that contains `anchor`.
#[must_use]
pub fn goal_progress(goal: &Goal, transactions: &[Transaction], anchor: NaiveDate) -> GoalProgress {
    let (start, end) = goal.period.bounds(anchor);
    let spent = round2(
        transactions
            .iter()
            .filter(|t| goal.applies_to(&t.category_id) && t.date >= start && t.date < end)
            .map(|t| t.amount)
            .sum(),
    );
    let percent = if goal.limit_amount > 0.0 {
        round2(spent / goal.limit_amount * 100.0)
    } else {
        0.0
    };

    GoalProgress {
        goal_id: goal.id.clone(),
        name: goal.name.clone(),
        period: goal.period.to_string(),
        period_start: start,
        period_end: end,
        limit_amount: goal.limit_amount,
        spent,
        remaining: round2(goal.limit_amount - spent),
        percent,
        exceeded: spent > goal.limit_amount,
    }
}

/// Goals whose limit was crossed by `new_tx`. `transactions` must already
/// contain `new_tx`. A goal that was over its limit before is not reported
/// again.
#[must_use]
pub fn crossed_goals(goals: &[Goal], transactions: &[Transaction], new_tx: &Transaction) -> Vec<GoalProgress> {
    goals
        .iter()
        .filter(|g| g.notify && g.applies_to(&new_tx.category_id))
        .map(|g| goal_progress(g, transactions, new_tx.date))
        .filter(|p| p.exceeded && p.spent - new_tx.amount <= p.limit_amount)
        .collect()
}

#[must_use]
pub fn alert_text(progress: &GoalProgress, currency: &str) -> String {
    format!(
        "⚠️ Goal \"{}\" exceeded: spent {:.2} {currency} of {:.2} {currency} this {} ({}%).",
        progress.name,
        progress.spent,
        progress.limit_amount,
        period_noun(&progress.period),
        progress.percent
    )
}

fn period_noun(period: &str) -> &'static str {
    match period {
        "weekly" => "week",
        "yearly" => "year",
        _ => "month",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub budgeted: f64,
    pub spent: f64,
    pub remaining: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthSummary {
    pub year: i32,
    pub month: u32,
    pub income: f64,
    pub expenses: f64,
    pub budgeted: f64,
    pub remaining: f64,
    pub transaction_count: usize,
    pub categories: Vec<CategorySummary>,
}

/// Everything the inputs need to summarize one month. Records outside the
/// month are ignored.
pub struct SummaryInput<'a> {
    pub categories: &'a [Category],
    pub transactions: &'a [Transaction],
    pub budget: Option<&'a Budget>,
    pub items: &'a [BudgetItem],
    pub incomes: &'a [BudgetIncome],
}

#[must_use]
pub fn month_summary(input: &SummaryInput<'_>, year: i32, month: u32) -> MonthSummary {
    let month_txs: Vec<&Transaction> = input
        .transactions
        .iter()
        .filter(|t| in_month(t.date, year, month))
        .collect();

    let mut spent_by_category: HashMap<&str, f64> = HashMap::new();
    for t in &month_txs {
        *spent_by_category.entry(t.category_id.as_str()).or_default() += t.amount;
    }

    let budget = input.budget.filter(|b| b.year == year && b.month == month);
    let budgeted_by_category: HashMap<&str, f64> = budget
        .map(|b| {
            input
                .items
                .iter()
                .filter(|i| i.budget_id == b.id)
                .map(|i| (i.category_id.as_str(), i.amount))
                .collect()
        })
        .unwrap_or_default();

    let categories = input
        .categories
        .iter()
        .filter(|c| {
            spent_by_category.contains_key(c.id.as_str())
                || budgeted_by_category.contains_key(c.id.as_str())
        })
        .map(|c| {
            let spent = round2(spent_by_category.get(c.id.as_str()).copied().unwrap_or(0.0));
            let budgeted = budgeted_by_category.get(c.id.as_str()).copied().unwrap_or(0.0);
            CategorySummary {
                category_id: c.id.clone(),
                name: c.name.clone(),
                emoji: c.emoji.clone(),
                budgeted,
                spent,
                remaining: round2(budgeted - spent),
            }
        })
        .collect();

    let income = budget.map_or(0.0, |b| b.income)
        + input
            .incomes
            .iter()
            .filter(|i| i.year == year && i.month == month)
            .map(|i| i.amount)
            .sum::<f64>();
    let expenses: f64 = month_txs.iter().map(|t| t.amount).sum();

    MonthSummary {
        year,
        month,
        income: round2(income),
        expenses: round2(expenses),
        budgeted: round2(budgeted_by_category.values().sum()),
        remaining: round2(income - expenses),
        transaction_count: month_txs.len(),
        categories,
    }
}
