use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::api::{SheetTab, SheetsApi};
use super::range::A1Range;
use crate::error::{Error, Result};

pub const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// `SheetsApi` backed by the Google Sheets v4 and Drive v3 REST APIs.
#[derive(Clone)]
pub struct GoogleSheetsClient {
    client: Client,
    sheets_base: String,
    drive_base: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateReply {
    #[serde(default)]
    replies: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsClient {
    pub fn new() -> Result<Self> {
        Self::with_base_urls(SHEETS_BASE_URL, DRIVE_BASE_URL)
    }

    pub fn with_base_urls(sheets_base: &str, drive_base: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            sheets_base: sheets_base.trim_end_matches('/').to_string(),
            drive_base: drive_base.trim_end_matches('/').to_string(),
        })
    }

    fn values_url(&self, spreadsheet_id: &str, range: &A1Range) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.sheets_base,
            spreadsheet_id,
            urlencoding::encode(&range.to_string())
        )
    }

    async fn batch_update(&self, token: &str, spreadsheet_id: &str, requests: Value) -> Result<BatchUpdateReply> {
        let url = format!("{}/spreadsheets/{}:batchUpdate", self.sheets_base, spreadsheet_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        parse_json(resp).await
    }
}

/// Maps a non-2xx Google response to `Error::Google`, keeping Google's own message.
pub(crate) async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GoogleErrorBody>(&text)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });
    Err(Error::Google {
        status: status.as_u16(),
        message,
    })
}

pub(crate) async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    Ok(check_status(resp).await?.json().await?)
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn create_spreadsheet(&self, token: &str, title: &str) -> Result<String> {
        let url = format!("{}/spreadsheets", self.sheets_base);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "properties": { "title": title } }))
            .send()
            .await?;
        let created: CreatedSpreadsheet = parse_json(resp).await?;
        Ok(created.spreadsheet_id)
    }

    async fn find_spreadsheet(&self, token: &str, title: &str) -> Result<Option<String>> {
        let query = format!(
            "name = '{}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false",
            title.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let url = format!("{}/files", self.drive_base);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id)"),
                ("spaces", "drive"),
                ("pageSize", "1"),
            ])
            .send()
            .await?;
        let list: DriveFileList = parse_json(resp).await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn sheet_tabs(&self, token: &str, spreadsheet_id: &str) -> Result<Vec<SheetTab>> {
        let url = format!("{}/spreadsheets/{}", self.sheets_base, spreadsheet_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .send()
            .await?;
        let meta: SpreadsheetMeta = parse_json(resp).await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|s| SheetTab {
                sheet_id: s.properties.sheet_id,
                title: s.properties.title,
            })
            .collect())
    }

    async fn add_sheet(&self, token: &str, spreadsheet_id: &str, title: &str) -> Result<SheetTab> {
        let reply = self
            .batch_update(
                token,
                spreadsheet_id,
                json!([{ "addSheet": { "properties": { "title": title } } }]),
            )
            .await?;

        let properties = reply
            .replies
            .into_iter()
            .next()
            .and_then(|r| r.get("addSheet").and_then(|a| a.get("properties")).cloned())
            .ok_or_else(|| Error::Google {
                status: 200,
                message: "addSheet reply missing properties".to_string(),
            })?;
        let properties: SheetProperties =
            serde_json::from_value(properties).map_err(|e| Error::Google {
                status: 200,
                message: format!("unexpected addSheet reply: {e}"),
            })?;

        Ok(SheetTab {
            sheet_id: properties.sheet_id,
            title: properties.title,
        })
    }

    async fn get_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
    ) -> Result<Vec<Vec<String>>> {
        let resp = self
            .client
            .get(self.values_url(spreadsheet_id, range))
            .bearer_auth(token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await?;
        let body: ValueRange = parse_json(resp).await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let url = format!("{}:append", self.values_url(spreadsheet_id, range));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn update_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let resp = self
            .client
            .put(self.values_url(spreadsheet_id, range))
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn delete_rows(
        &self,
        token: &str,
        spreadsheet_id: &str,
        sheet_id: i64,
        start: u32,
        end: u32,
    ) -> Result<()> {
        self.batch_update(
            token,
            spreadsheet_id,
            json!([{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": start,
                        "endIndex": end,
                    }
                }
            }]),
        )
        .await?;
        Ok(())
    }
}
