use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// The window a spending goal is measured over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPeriod {
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl GoalPeriod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            GoalPeriod::Weekly => "weekly",
            GoalPeriod::Monthly => "monthly",
            GoalPeriod::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<GoalPeriod> {
        match s.to_ascii_lowercase().as_str() {
            "weekly" | "week" => Some(GoalPeriod::Weekly),
            "monthly" | "month" => Some(GoalPeriod::Monthly),
            "yearly" | "year" => Some(GoalPeriod::Yearly),
            _ => None,
        }
    }

    /// Returns the `[start, end)` window containing `date`.
    /// Weeks start on Monday.
    #[must_use]
    pub fn bounds(self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            GoalPeriod::Weekly => {
                let offset = u64::from(date.weekday().num_days_from_monday());
                let start = date - Days::new(offset);
                (start, start + Days::new(7))
            }
            GoalPeriod::Monthly => {
                let (start, end) = month_bounds(date.year(), date.month())
                    .unwrap_or((date, date + Days::new(1)));
                (start, end)
            }
            GoalPeriod::Yearly => {
                let start = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
                (start, start + Months::new(12))
            }
        }
    }

    #[must_use]
    pub fn contains(self, anchor: NaiveDate, date: NaiveDate) -> bool {
        let (start, end) = self.bounds(anchor);
        date >= start && date < end
    }
}

impl fmt::Display for GoalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[first day, first day of next month)` for a calendar month.
#[must_use]
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some((start, start + Months::new(1)))
}
