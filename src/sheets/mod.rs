//! Google Sheets as a record store.
//!
//! Each user owns one spreadsheet; each tab is a table whose first row names
//! the columns. [`Workbook`] turns value-range reads and writes into
//! insert/find/update/delete over [`Record`] types.

mod api;
mod google;
pub mod memory;
pub mod migration;
pub mod range;
mod records;
mod row;
pub mod schema;
mod workbook;

pub use api::{SheetTab, SheetsApi, spreadsheet_url};
pub use google::{DRIVE_BASE_URL, GoogleSheetsClient, SHEETS_BASE_URL};
pub(crate) use google::parse_json;
pub use memory::MemorySheets;
pub use range::A1Range;
pub use row::{Record, Row, TableDef, format_amount, parse_date};
pub use workbook::Workbook;
