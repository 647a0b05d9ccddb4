use async_trait::async_trait;
use serde::Serialize;

use super::range::A1Range;
use crate::error::Result;

/// A tab inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetTab {
    pub sheet_id: i64,
    pub title: String,
}

/// The subset of the Google Sheets and Drive APIs the workbook is built on.
///
/// Every call carries the caller's OAuth access token; implementations hold
/// no per-user state. Values travel as strings, written with
/// `valueInputOption=RAW`.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    async fn create_spreadsheet(&self, token: &str, title: &str) -> Result<String>;

    /// Looks up a spreadsheet owned by the caller by exact title.
    async fn find_spreadsheet(&self, token: &str, title: &str) -> Result<Option<String>>;

    async fn sheet_tabs(&self, token: &str, spreadsheet_id: &str) -> Result<Vec<SheetTab>>;

    async fn add_sheet(&self, token: &str, spreadsheet_id: &str, title: &str) -> Result<SheetTab>;

    /// Reads a range. Trailing empty rows and cells are not returned.
    async fn get_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
    ) -> Result<Vec<Vec<String>>>;

    /// Appends rows after the last non-empty row of the range's sheet.
    async fn append_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
    ) -> Result<()>;

    /// Overwrites cells starting at the top-left of `range`.
    async fn update_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
    ) -> Result<()>;

    /// Deletes rows `[start, end)` (0-based) and shifts the rest up.
    async fn delete_rows(
        &self,
        token: &str,
        spreadsheet_id: &str,
        sheet_id: i64,
        start: u32,
        end: u32,
    ) -> Result<()>;
}

/// Human-facing URL of a spreadsheet.
#[must_use]
pub fn spreadsheet_url(spreadsheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{spreadsheet_id}/edit")
}
