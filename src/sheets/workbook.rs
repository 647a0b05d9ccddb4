use std::collections::HashSet;
use std::sync::Arc;

use super::api::SheetsApi;
use super::range::A1Range;
use super::row::{Record, Row, TableDef};
use crate::error::{Error, Result};

/// One user's spreadsheet, addressed as a set of tables.
///
/// Every operation is a full read of the tab followed by at most one write;
/// there is no caching and no locking. Concurrent writers to the same tab can
/// interleave between the read and the write.
#[derive(Clone)]
pub struct Workbook {
    api: Arc<dyn SheetsApi>,
    token: String,
    spreadsheet_id: String,
}

/// A tab read in full: its header and the data rows below it.
struct TableSnapshot {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableSnapshot {
    fn key_index(&self, table: &TableDef) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == table.key)
            .ok_or_else(|| Error::InvalidRow {
                table: table.name,
                reason: format!("header has no {} column", table.key),
            })
    }

    /// Data-row positions (0-based, below the header) whose key matches.
    fn positions(&self, table: &TableDef, key: &str) -> Result<Vec<usize>> {
        let idx = self.key_index(table)?;
        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.get(idx).is_some_and(|v| v == key))
            .map(|(i, _)| i)
            .collect())
    }
}

fn sheet_row_number(position: usize) -> u32 {
    // Row 1 is the header.
    u32::try_from(position + 2).unwrap_or(u32::MAX)
}

impl Workbook {
    #[must_use]
    pub fn new(api: Arc<dyn SheetsApi>, token: impl Into<String>, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            api,
            token: token.into(),
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    #[must_use]
    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    #[must_use]
    pub fn api(&self) -> &dyn SheetsApi {
        self.api.as_ref()
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn header(&self, table: &TableDef) -> Result<Vec<String>> {
        let values = self
            .api
            .get_values(&self.token, &self.spreadsheet_id, &A1Range::header(table.name))
            .await?;
        Ok(values.into_iter().next().unwrap_or_default())
    }

    async fn snapshot(&self, table: &TableDef) -> Result<TableSnapshot> {
        let mut values = self
            .api
            .get_values(&self.token, &self.spreadsheet_id, &A1Range::whole(table.name))
            .await?
            .into_iter();
        let header = values.next().unwrap_or_default();
        if header.is_empty() {
            return Err(Error::MissingSheet(table.name.to_string()));
        }
        Ok(TableSnapshot {
            header,
            rows: values.collect(),
        })
    }

    /// Every non-blank row of a tab, keyed by its header.
    pub async fn rows(&self, table: &TableDef) -> Result<Vec<Row>> {
        let snapshot = self.snapshot(table).await?;
        Ok(snapshot
            .rows
            .iter()
            .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
            .map(|r| Row::from_values(&snapshot.header, r))
            .collect())
    }

    /// The header and every data row exactly as stored, blank rows included,
    /// so that positions match sheet rows.
    pub async fn raw_rows(&self, table: &TableDef) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let snapshot = self.snapshot(table).await?;
        Ok((snapshot.header, snapshot.rows))
    }

    /// Every key present in the tab, including rows no record can be read from.
    pub async fn keys(&self, table: &TableDef) -> Result<HashSet<String>> {
        let snapshot = self.snapshot(table).await?;
        let idx = snapshot.key_index(table)?;
        Ok(snapshot
            .rows
            .iter()
            .filter_map(|r| r.get(idx))
            .filter(|k| !k.is_empty())
            .cloned()
            .collect())
    }

    pub async fn all<R: Record>(&self) -> Result<Vec<R>> {
        let rows = self.rows(R::TABLE).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match R::from_row(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping unreadable row: {e}");
                    None
                }
            })
            .collect())
    }

    pub async fn find<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<Vec<R>> {
        let mut records = self.all::<R>().await?;
        records.retain(|r| predicate(r));
        Ok(records)
    }

    pub async fn find_one<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<Option<R>> {
        Ok(self.all::<R>().await?.into_iter().find(|r| predicate(r)))
    }

    pub async fn find_by_key<R: Record>(&self, key: &str) -> Result<Option<R>> {
        self.find_one(|r: &R| r.key() == key).await
    }

    pub async fn insert<R: Record>(&self, record: &R) -> Result<()> {
        self.insert_many(std::slice::from_ref(record)).await
    }

    /// Appends records in a single call.
    pub async fn insert_many<R: Record>(&self, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let header = self.header(R::TABLE).await?;
        if header.is_empty() {
            return Err(Error::MissingSheet(R::TABLE.name.to_string()));
        }
        let rows = records.iter().map(|r| r.to_row().to_values(&header)).collect();
        self.api
            .append_values(
                &self.token,
                &self.spreadsheet_id,
                &A1Range::anchor(R::TABLE.name),
                rows,
            )
            .await
    }

    /// Overwrites the row holding `record`'s key. Cells in columns the record
    /// does not know are kept.
    pub async fn update<R: Record>(&self, record: &R) -> Result<()> {
        let table = R::TABLE;
        let snapshot = self.snapshot(table).await?;
        let position = snapshot
            .positions(table, record.key())?
            .into_iter()
            .next()
            .ok_or(Error::NotFound)?;

        let values = record
            .to_row()
            .merge_values(&snapshot.header, &snapshot.rows[position]);
        let range = A1Range::row(table.name, sheet_row_number(position), snapshot.header.len());

        self.api
            .update_values(&self.token, &self.spreadsheet_id, &range, vec![values])
            .await
    }

    /// Inserts the record, or updates it when its key is already present.
    pub async fn upsert<R: Record>(&self, record: &R) -> Result<()> {
        match self.update(record).await {
            Err(Error::NotFound) => self.insert(record).await,
            other => other,
        }
    }

    pub async fn delete<R: Record>(&self, key: &str) -> Result<bool> {
        let deleted = self.delete_where(|r: &R| r.key() == key).await?;
        Ok(deleted > 0)
    }

    /// Deletes every row whose record matches. Rows are removed bottom-up so
    /// earlier positions stay valid between calls.
    pub async fn delete_where<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<usize> {
        let table = R::TABLE;
        let snapshot = self.snapshot(table).await?;
        let mut positions: Vec<usize> = snapshot
            .rows
            .iter()
            .enumerate()
            .filter(|(_, values)| {
                R::from_row(&Row::from_values(&snapshot.header, values))
                    .is_ok_and(|r| predicate(&r))
            })
            .map(|(i, _)| i)
            .collect();

        if positions.is_empty() {
            return Ok(0);
        }

        let sheet_id = self.sheet_id(table).await?;
        positions.sort_unstable_by(|a, b| b.cmp(a));
        for position in &positions {
            let index = u32::try_from(position + 1).unwrap_or(u32::MAX);
            self.api
                .delete_rows(&self.token, &self.spreadsheet_id, sheet_id, index, index + 1)
                .await?;
        }
        Ok(positions.len())
    }

    /// Writes `rows` over the data area starting at row 2. Rows below the
    /// last written one are left untouched.
    pub async fn overwrite_rows(&self, table: &TableDef, width: usize, rows: Vec<Vec<String>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let last = sheet_row_number(rows.len() - 1);
        let range = A1Range::rows(table.name, 2, last, width);
        self.api
            .update_values(&self.token, &self.spreadsheet_id, &range, rows)
            .await
    }

    async fn sheet_id(&self, table: &TableDef) -> Result<i64> {
        self.api
            .sheet_tabs(&self.token, &self.spreadsheet_id)
            .await?
            .into_iter()
            .find(|t| t.title == table.name)
            .map(|t| t.sheet_id)
            .ok_or_else(|| Error::MissingSheet(table.name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::sheets::memory::MemorySheets;
    use crate::sheets::schema::ensure_schema;
    use crate::types::Category;

    async fn workbook() -> (Arc<MemorySheets>, Workbook) {
        let api = Arc::new(MemorySheets::new());
        let id = api.create_spreadsheet("tok", "Budget App - a@b.c").await.unwrap();
        let workbook = Workbook::new(api.clone(), "tok", id);
        ensure_schema(&workbook).await.unwrap();
        (api, workbook)
    }

    fn category(id: &str, name: &str) -> Category {
        let now = Utc::now();
        Category {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
            emoji: Some("🍔".to_string()),
            color: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_find_update_delete() {
        let (_, wb) = workbook().await;
        wb.insert(&category("c1", "Food")).await.unwrap();
        wb.insert(&category("c2", "Rent")).await.unwrap();

        let found: Option<Category> = wb.find_by_key("c2").await.unwrap();
        assert_eq!(found.unwrap().name, "Rent");

        let mut food = category("c1", "Groceries");
        food.emoji = None;
        wb.update(&food).await.unwrap();
        let all: Vec<Category> = wb.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Groceries");
        assert_eq!(all[0].emoji, None);

        assert!(wb.delete::<Category>("c1").await.unwrap());
        assert!(!wb.delete::<Category>("c1").await.unwrap());
        let all: Vec<Category> = wb.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "c2");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (_, wb) = workbook().await;
        let result = wb.update(&category("nope", "x")).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_follows_existing_header_order_and_keeps_extra_columns() {
        let api = Arc::new(MemorySheets::new());
        let id = api.create_spreadsheet("tok", "Book").await.unwrap();
        api.add_sheet("tok", &id, "categories").await.unwrap();
        let header: Vec<String> = ["name", "notes", "id", "user_id"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        api.update_values("tok", &id, &A1Range::header("categories"), vec![header])
            .await
            .unwrap();
        let wb = Workbook::new(api.clone(), "tok", id.clone());

        wb.insert(&category("c1", "Food")).await.unwrap();
        api.update_values("tok", &id, &"categories!B2".parse().unwrap(), vec![vec!["hand note".to_string()]])
            .await
            .unwrap();
        wb.update(&category("c1", "Dining")).await.unwrap();

        let grid = api.grid(&id, "categories").unwrap();
        assert_eq!(grid[1], vec!["Dining", "hand note", "c1", "u1"]);
    }

    #[tokio::test]
    async fn test_delete_where_removes_all_matches() {
        let (api, wb) = workbook().await;
        for (id, name) in [("a", "x"), ("b", "y"), ("c", "x"), ("d", "x")] {
            wb.insert(&category(id, name)).await.unwrap();
        }
        let removed = wb.delete_where(|c: &Category| c.name == "x").await.unwrap();
        assert_eq!(removed, 3);
        let grid = api.grid(wb.spreadsheet_id(), "categories").unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1][0], "b");
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_skipped() {
        let (api, wb) = workbook().await;
        wb.insert(&category("c1", "Food")).await.unwrap();
        api.append_values(
            "tok",
            wb.spreadsheet_id(),
            &A1Range::anchor("categories"),
            vec![vec!["".to_string(), "u1".to_string()]],
        )
        .await
        .unwrap();
        let all: Vec<Category> = wb.all().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
