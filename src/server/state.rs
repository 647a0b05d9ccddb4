use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::auth::{PendingStates, SessionIssuer};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::google::GoogleAuth;
use crate::sheets::SheetsApi;
use crate::sheets::Workbook;
use crate::sheets::schema::{SchemaReport, ensure_schema, provision};
use crate::store::Store;
use crate::telegram::{Notifier, TelegramConnectionStore};
use crate::types::{Account, GoogleCredentials};

/// Google access tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECONDS: i64 = 60;

pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn Store>,
    pub sessions: SessionIssuer,
    pub oauth_states: PendingStates,
    pub google: Arc<dyn GoogleAuth>,
    pub sheets: Arc<dyn SheetsApi>,
    pub notifier: Arc<dyn Notifier>,
    pub telegram: TelegramConnectionStore,
    /// Spreadsheets whose schema was checked since startup.
    schema_checked: Mutex<HashSet<String>>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn Store>,
        google: Arc<dyn GoogleAuth>,
        sheets: Arc<dyn SheetsApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sessions = SessionIssuer::new(store.clone(), config.session_ttl, config.refresh_ttl);
        Self {
            config,
            store,
            sessions,
            oauth_states: PendingStates::default(),
            google,
            sheets,
            notifier,
            telegram: TelegramConnectionStore::default(),
            schema_checked: Mutex::new(HashSet::new()),
        }
    }

    /// A Google access token for the account, refreshed when close to expiry.
    pub async fn google_token(&self, account: &Account) -> Result<String> {
        let credentials = self
            .store
            .get_credentials(&account.id)?
            .ok_or(Error::Unauthorized)?;

        if credentials.expires_at - Duration::seconds(REFRESH_MARGIN_SECONDS) > Utc::now() {
            return Ok(credentials.access_token);
        }

        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or(Error::Unauthorized)?;
        let tokens = self.google.refresh(refresh_token).await?;
        tracing::debug!("Refreshed Google access token for {}", account.email);

        self.store.upsert_credentials(&GoogleCredentials {
            account_id: account.id.clone(),
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        })?;

        Ok(tokens.access_token)
    }

    /// Opens the account's spreadsheet, creating it on first use. The schema
    /// is checked once per spreadsheet per process.
    pub async fn workbook(&self, account: &Account) -> Result<Workbook> {
        let (workbook, _) = self.open_workbook(account, false).await?;
        Ok(workbook)
    }

    /// Opens the spreadsheet and always runs the schema check.
    pub async fn init_workbook(&self, account: &Account) -> Result<(Workbook, SchemaReport)> {
        let (workbook, report) = self.open_workbook(account, true).await?;
        Ok((workbook, report.unwrap_or_default()))
    }

    async fn open_workbook(
        &self,
        account: &Account,
        force_schema: bool,
    ) -> Result<(Workbook, Option<SchemaReport>)> {
        let token = self.google_token(account).await?;

        let spreadsheet_id = match self.stored_spreadsheet_id(account)? {
            Some(id) => id,
            None => {
                let id = provision(self.sheets.as_ref(), &token, &account.email).await?;
                self.store.set_account_spreadsheet(&account.id, &id)?;
                id
            }
        };

        let workbook = Workbook::new(self.sheets.clone(), token, spreadsheet_id.clone());

        let checked = self
            .schema_checked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&spreadsheet_id);
        if checked && !force_schema {
            return Ok((workbook, None));
        }

        let report = ensure_schema(&workbook).await?;
        self.schema_checked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(spreadsheet_id);

        Ok((workbook, Some(report)))
    }

    fn stored_spreadsheet_id(&self, account: &Account) -> Result<Option<String>> {
        if account.spreadsheet_id.is_some() {
            return Ok(account.spreadsheet_id.clone());
        }
        // The extractor's copy may predate provisioning by another request.
        Ok(self
            .store
            .get_account(&account.id)?
            .and_then(|a| a.spreadsheet_id))
    }
}
