use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use sheetbudget::config::{ServerConfig, TelegramConfig};
use sheetbudget::error::{Error, Result};
use sheetbudget::google::{GoogleAuth, GoogleProfile, GoogleTokens};
use sheetbudget::server::{AppState, create_router};
use sheetbudget::sheets::MemorySheets;
use sheetbudget::store::{SqliteStore, Store};
use sheetbudget::telegram::Notifier;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const WEBHOOK_SECRET: &str = "webhook-secret";
pub const BOT_USERNAME: &str = "sheetbudget_test_bot";

/// Google stand-in. The authorization code doubles as the user's local part:
/// code `alice` signs in `alice@example.com`. The refresh token
/// `google-refresh-revoked` is rejected with a 401.
pub struct FakeGoogle;

#[async_trait]
impl GoogleAuth for FakeGoogle {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example.com/o/oauth2/auth?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens> {
        if code == "bad" {
            return Err(Error::Google {
                status: 400,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(GoogleTokens {
            access_token: format!("google-{code}"),
            refresh_token: Some(format!("google-refresh-{code}")),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<GoogleTokens> {
        let user = refresh_token.trim_start_matches("google-refresh-");
        if user == "revoked" {
            return Err(Error::Google {
                status: 401,
                message: "Token has been expired or revoked.".to_string(),
            });
        }
        Ok(GoogleTokens {
            access_token: format!("google-{user}"),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn user_info(&self, access_token: &str) -> Result<GoogleProfile> {
        let user = access_token.trim_start_matches("google-");
        Ok(GoogleProfile {
            email: format!("{user}@example.com"),
            name: Some(user.to_string()),
            picture: None,
        })
    }
}

/// Keeps every message instead of calling Telegram.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

pub struct TestServer {
    pub temp_dir: TempDir,
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Arc<SqliteStore>,
    pub sheets: Arc<MemorySheets>,
    pub notifier: Arc<RecordingNotifier>,
    server_task: JoinHandle<()>,
}

/// Access and refresh tokens from a completed sign-in.
pub struct Login {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Value,
}

impl TestServer {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let sheets = Arc::new(MemorySheets::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let (store, base_url, server_task) =
            Self::spawn(&temp_dir, sheets.clone(), notifier.clone()).await;

        Self {
            temp_dir,
            base_url,
            client: reqwest::Client::new(),
            store,
            sheets,
            notifier,
            server_task,
        }
    }

    /// Stops the server and starts a new one over the same database and
    /// spreadsheets. Everything held only in memory is lost.
    pub async fn restart(&mut self) {
        self.server_task.abort();
        let (store, base_url, server_task) =
            Self::spawn(&self.temp_dir, self.sheets.clone(), self.notifier.clone()).await;
        self.store = store;
        self.base_url = base_url;
        self.server_task = server_task;
    }

    async fn spawn(
        temp_dir: &TempDir,
        sheets: Arc<MemorySheets>,
        notifier: Arc<RecordingNotifier>,
    ) -> (Arc<SqliteStore>, String, JoinHandle<()>) {
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            telegram: TelegramConfig {
                bot_token: Some("test-bot-token".to_string()),
                bot_username: Some(BOT_USERNAME.to_string()),
                webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            },
            ..ServerConfig::default()
        };

        let store = Arc::new(SqliteStore::new(config.db_path()).expect("open store"));
        store.initialize().expect("initialize store");

        let state = Arc::new(AppState::new(
            config,
            store.clone(),
            Arc::new(FakeGoogle),
            sheets,
            notifier,
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let app = create_router(state);
        let server_task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        let base_url = format!("http://127.0.0.1:{}", port);
        Self::wait_for_ready(&base_url).await;
        (store, base_url, server_task)
    }

    async fn wait_for_ready(base_url: &str) {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", base_url))
                .send()
                .await
                .is_ok()
            {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("Server did not become ready");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Runs the OAuth round trip for `user@example.com`.
    pub async fn login(&self, user: &str) -> Login {
        let resp: Value = self
            .client
            .get(self.url("/auth/google?format=json"))
            .send()
            .await
            .expect("start login")
            .json()
            .await
            .expect("parse login url");
        let state = resp["data"]["state"].as_str().expect("oauth state");

        let resp = self
            .client
            .get(self.url("/auth/google/callback"))
            .query(&[("code", user), ("state", state)])
            .send()
            .await
            .expect("callback");
        assert_eq!(resp.status(), 200, "login callback failed");
        let body: Value = resp.json().await.expect("parse callback");

        Login {
            access_token: body["data"]["access_token"]
                .as_str()
                .expect("access token")
                .to_string(),
            refresh_token: body["data"]["refresh_token"]
                .as_str()
                .expect("refresh token")
                .to_string(),
            user: body["data"]["user"].clone(),
        }
    }

    pub async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("GET")
    }

    pub async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("POST")
    }

    pub async fn patch(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("PATCH")
    }

    pub async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("PUT")
    }

    pub async fn delete(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("DELETE")
    }

    /// Delivers a Telegram update as the Bot API would.
    pub async fn telegram_update(&self, chat_id: i64, text: &str) -> reqwest::Response {
        self.client
            .post(self.url("/telegram/webhook"))
            .header("X-Telegram-Bot-Api-Secret-Token", WEBHOOK_SECRET)
            .json(&serde_json::json!({
                "update_id": 1,
                "message": {
                    "message_id": 7,
                    "chat": {"id": chat_id, "type": "private", "username": "tester"},
                    "from": {"id": chat_id, "is_bot": false, "first_name": "Test", "username": "tester"},
                    "text": text
                }
            }))
            .send()
            .await
            .expect("webhook")
    }
}

/// The `data` field of a successful response.
pub async fn data(resp: reqwest::Response) -> Value {
    let status = resp.status();
    let body: Value = resp.json().await.expect("parse body");
    assert!(status.is_success(), "unexpected {status}: {body}");
    body["data"].clone()
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
