use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};

/// A spreadsheet tab used as a table.
#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    /// Columns in the order they are created in a new tab.
    pub columns: &'static [&'static str],
    /// Column holding the record's unique key.
    pub key: &'static str,
}

/// A record mapped onto one row of a tab.
pub trait Record: Sized {
    const TABLE: &'static TableDef;

    fn key(&self) -> &str;
    fn to_row(&self) -> Row;
    fn from_row(row: &Row) -> Result<Self>;
}

/// Cell values of one row, addressed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: HashMap<String, String>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zips a header with the row's values. Short rows leave columns empty.
    #[must_use]
    pub fn from_values(header: &[String], values: &[String]) -> Self {
        let empty = String::new();
        let cells = header
            .iter()
            .zip(values.iter().chain(std::iter::repeat(&empty)))
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self { cells }
    }

    #[must_use]
    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.cells.insert(column.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_opt(self, column: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.with(column, v),
            None => self.with(column, ""),
        }
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column.to_string(), value.into());
    }

    /// The cell's value, or `""` when the column is absent.
    #[must_use]
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map_or("", String::as_str)
    }

    #[must_use]
    pub fn opt(&self, column: &str) -> Option<String> {
        let value = self.get(column).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn required(&self, table: &'static str, column: &str) -> Result<String> {
        self.opt(column).ok_or_else(|| Error::InvalidRow {
            table,
            reason: format!("missing {column}"),
        })
    }

    pub fn parse<T: FromStr>(&self, table: &'static str, column: &str) -> Result<T> {
        let raw = self.required(table, column)?;
        raw.parse().map_err(|_| Error::InvalidRow {
            table,
            reason: format!("invalid {column}: {raw}"),
        })
    }

    /// Parses an optional cell; blank cells yield `default`.
    pub fn parse_or<T: FromStr>(&self, table: &'static str, column: &str, default: T) -> Result<T> {
        match self.opt(column) {
            None => Ok(default),
            Some(_) => self.parse(table, column),
        }
    }

    pub fn flag(&self, column: &str, default: bool) -> bool {
        match self.get(column).trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        }
    }

    pub fn date(&self, table: &'static str, column: &str) -> Result<NaiveDate> {
        let raw = self.required(table, column)?;
        parse_date(&raw).ok_or_else(|| Error::InvalidRow {
            table,
            reason: format!("invalid {column}: {raw}"),
        })
    }

    /// Timestamps written by hand into the sheet may be unparseable; those
    /// fall back to the Unix epoch rather than rejecting the row.
    #[must_use]
    pub fn timestamp(&self, column: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(self.get(column).trim())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Lays the row out along `header`.
    #[must_use]
    pub fn to_values(&self, header: &[String]) -> Vec<String> {
        header.iter().map(|h| self.get(h).to_string()).collect()
    }

    /// Lays the row out along `header`, keeping `existing` cells for
    /// columns this row does not know about.
    #[must_use]
    pub fn merge_values(&self, header: &[String], existing: &[String]) -> Vec<String> {
        header
            .iter()
            .enumerate()
            .map(|(i, h)| match self.cells.get(h) {
                Some(v) => v.clone(),
                None => existing.get(i).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// Accepts `YYYY-MM-DD`, or an RFC 3339 timestamp truncated to its date.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[must_use]
pub fn format_amount(amount: f64) -> String {
    let rounded = (amount * 100.0).round() / 100.0;
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_values_pads_short_rows() {
        let row = Row::from_values(&header(&["id", "name", "emoji"]), &header(&["1", "Food"]));
        assert_eq!(row.get("name"), "Food");
        assert_eq!(row.get("emoji"), "");
        assert_eq!(row.opt("emoji"), None);
    }

    #[test]
    fn test_merge_keeps_unknown_columns() {
        let head = header(&["id", "note", "name"]);
        let existing = header(&["1", "keep me", "Old"]);
        let row = Row::new().with("id", "1").with("name", "New");
        assert_eq!(row.merge_values(&head, &existing), header(&["1", "keep me", "New"]));
        assert_eq!(row.to_values(&head), header(&["1", "", "New"]));
    }

    #[test]
    fn test_parse_reports_column() {
        let row = Row::new().with("amount", "abc");
        let err = row.parse::<f64>("transactions", "amount").unwrap_err();
        assert!(err.to_string().contains("invalid amount"));
        assert_eq!(row.parse_or::<f64>("transactions", "spent", 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_flag_and_dates() {
        let row = Row::new()
            .with("a", "TRUE")
            .with("b", "0")
            .with("d", "2024-03-01T10:00:00Z");
        assert!(row.flag("a", false));
        assert!(!row.flag("b", true));
        assert!(row.flag("missing", true));
        assert_eq!(
            row.date("t", "d").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(12.0), "12");
        assert_eq!(format_amount(12.346), "12.35");
        assert_eq!(format_amount(0.1 + 0.2), "0.3");
    }
}
