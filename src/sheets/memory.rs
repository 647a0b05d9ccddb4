use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::api::{SheetTab, SheetsApi};
use super::range::A1Range;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct MemorySheet {
    sheet_id: i64,
    title: String,
    grid: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct MemorySpreadsheet {
    title: String,
    sheets: Vec<MemorySheet>,
    next_sheet_id: i64,
}

impl MemorySpreadsheet {
    fn sheet(&self, title: &str) -> Result<&MemorySheet> {
        self.sheets
            .iter()
            .find(|s| s.title == title)
            .ok_or_else(|| Error::MissingSheet(title.to_string()))
    }

    fn sheet_mut(&mut self, title: &str) -> Result<&mut MemorySheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.title == title)
            .ok_or_else(|| Error::MissingSheet(title.to_string()))
    }
}

/// In-process `SheetsApi` with the same range semantics as Google Sheets.
///
/// Spreadsheets are keyed by id and shared by every access token; the
/// `calls` counter lets tests observe how many remote calls an operation
/// would have made.
#[derive(Debug, Default)]
pub struct MemorySheets {
    books: Mutex<HashMap<String, MemorySpreadsheet>>,
    calls: Mutex<u64>,
}

impl MemorySheets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn books(&self) -> MutexGuard<'_, HashMap<String, MemorySpreadsheet>> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.books.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of API calls served so far.
    pub fn call_count(&self) -> u64 {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of a tab's raw grid, header included.
    pub fn grid(&self, spreadsheet_id: &str, sheet: &str) -> Option<Vec<Vec<String>>> {
        let books = self.books.lock().unwrap_or_else(|e| e.into_inner());
        books
            .get(spreadsheet_id)?
            .sheets
            .iter()
            .find(|s| s.title == sheet)
            .map(|s| s.grid.clone())
    }

    fn with_book<T>(
        &self,
        spreadsheet_id: &str,
        f: impl FnOnce(&mut MemorySpreadsheet) -> Result<T>,
    ) -> Result<T> {
        let mut books = self.books();
        let book = books.get_mut(spreadsheet_id).ok_or_else(|| Error::Google {
            status: 404,
            message: format!("Requested entity was not found: {spreadsheet_id}"),
        })?;
        f(book)
    }
}

fn check_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(Error::Google {
            status: 401,
            message: "Request is missing required authentication credential".to_string(),
        });
    }
    Ok(())
}

fn trim_row(mut row: Vec<String>) -> Vec<String> {
    while row.last().is_some_and(String::is_empty) {
        row.pop();
    }
    row
}

fn trim_grid(mut grid: Vec<Vec<String>>) -> Vec<Vec<String>> {
    while grid.last().is_some_and(Vec::is_empty) {
        grid.pop();
    }
    grid
}

/// Converts a range into 0-based inclusive row bounds and column bounds.
fn bounds(range: &A1Range) -> (usize, Option<usize>, usize, Option<usize>) {
    let first_row = range
        .start
        .and_then(|c| c.row)
        .map_or(0, |r| r as usize - 1);
    let first_col = range.start.and_then(|c| c.col).map_or(0, |c| c as usize);
    let (last_row, last_col) = match (range.start, range.end) {
        (_, Some(end)) => (
            end.row.map(|r| r as usize - 1),
            end.col.map(|c| c as usize),
        ),
        // A single cell reference without an end covers only that cell.
        (Some(start), None) if start.row.is_some() && start.col.is_some() => {
            (Some(first_row), Some(first_col))
        }
        _ => (None, None),
    };
    (first_row, last_row, first_col, last_col)
}

#[async_trait]
impl SheetsApi for MemorySheets {
    async fn create_spreadsheet(&self, token: &str, title: &str) -> Result<String> {
        check_token(token)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let book = MemorySpreadsheet {
            title: title.to_string(),
            sheets: vec![MemorySheet {
                sheet_id: 0,
                title: "Sheet1".to_string(),
                grid: Vec::new(),
            }],
            next_sheet_id: 1,
        };
        self.books().insert(id.clone(), book);
        Ok(id)
    }

    async fn find_spreadsheet(&self, token: &str, title: &str) -> Result<Option<String>> {
        check_token(token)?;
        Ok(self
            .books()
            .iter()
            .find(|(_, b)| b.title == title)
            .map(|(id, _)| id.clone()))
    }

    async fn sheet_tabs(&self, token: &str, spreadsheet_id: &str) -> Result<Vec<SheetTab>> {
        check_token(token)?;
        self.with_book(spreadsheet_id, |book| {
            Ok(book
                .sheets
                .iter()
                .map(|s| SheetTab {
                    sheet_id: s.sheet_id,
                    title: s.title.clone(),
                })
                .collect())
        })
    }

    async fn add_sheet(&self, token: &str, spreadsheet_id: &str, title: &str) -> Result<SheetTab> {
        check_token(token)?;
        self.with_book(spreadsheet_id, |book| {
            if book.sheets.iter().any(|s| s.title == title) {
                return Err(Error::Google {
                    status: 400,
                    message: format!("A sheet with the name \"{title}\" already exists."),
                });
            }
            let sheet_id = book.next_sheet_id;
            book.next_sheet_id += 1;
            book.sheets.push(MemorySheet {
                sheet_id,
                title: title.to_string(),
                grid: Vec::new(),
            });
            Ok(SheetTab {
                sheet_id,
                title: title.to_string(),
            })
        })
    }

    async fn get_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
    ) -> Result<Vec<Vec<String>>> {
        check_token(token)?;
        self.with_book(spreadsheet_id, |book| {
            let sheet = book.sheet(&range.sheet)?;
            let (first_row, last_row, first_col, last_col) = bounds(range);

            let rows = sheet
                .grid
                .iter()
                .enumerate()
                .filter(|(i, _)| *i >= first_row && last_row.is_none_or(|last| *i <= last))
                .map(|(_, row)| {
                    let cells: Vec<String> = row
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j >= first_col && last_col.is_none_or(|last| *j <= last))
                        .map(|(_, c)| c.clone())
                        .collect();
                    trim_row(cells)
                })
                .collect();
            Ok(trim_grid(rows))
        })
    }

    async fn append_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        check_token(token)?;
        self.with_book(spreadsheet_id, |book| {
            let sheet = book.sheet_mut(&range.sheet)?;
            let grid = std::mem::take(&mut sheet.grid);
            sheet.grid = trim_grid(grid);
            sheet.grid.extend(rows);
            Ok(())
        })
    }

    async fn update_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        check_token(token)?;
        self.with_book(spreadsheet_id, |book| {
            let sheet = book.sheet_mut(&range.sheet)?;
            let (first_row, _, first_col, _) = bounds(range);

            for (i, values) in rows.into_iter().enumerate() {
                let r = first_row + i;
                if sheet.grid.len() <= r {
                    sheet.grid.resize_with(r + 1, Vec::new);
                }
                let row = &mut sheet.grid[r];
                for (j, value) in values.into_iter().enumerate() {
                    let c = first_col + j;
                    if row.len() <= c {
                        row.resize(c + 1, String::new());
                    }
                    row[c] = value;
                }
                let trimmed = trim_row(std::mem::take(row));
                *row = trimmed;
            }
            Ok(())
        })
    }

    async fn delete_rows(
        &self,
        token: &str,
        spreadsheet_id: &str,
        sheet_id: i64,
        start: u32,
        end: u32,
    ) -> Result<()> {
        check_token(token)?;
        self.with_book(spreadsheet_id, |book| {
            let sheet = book
                .sheets
                .iter_mut()
                .find(|s| s.sheet_id == sheet_id)
                .ok_or_else(|| Error::MissingSheet(format!("sheet id {sheet_id}")))?;
            let len = sheet.grid.len();
            let start = (start as usize).min(len);
            let end = (end as usize).min(len);
            if start < end {
                sheet.grid.drain(start..end);
            }
            Ok(())
        })
    }
}
