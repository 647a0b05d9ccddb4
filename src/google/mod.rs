//! Google OAuth2: consent URL, code exchange, token refresh and profile lookup.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::GoogleConfig;
use crate::error::Result;
use crate::sheets::parse_json;

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub const SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

#[derive(Debug, Clone)]
pub struct GoogleTokens {
    pub access_token: String,
    /// Only returned on the first consent, or when `prompt=consent` is used.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[async_trait]
pub trait GoogleAuth: Send + Sync {
    fn authorization_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens>;
    async fn refresh(&self, refresh_token: &str) -> Result<GoogleTokens>;
    async fn user_info(&self, access_token: &str) -> Result<GoogleProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_tokens(self) -> GoogleTokens {
        GoogleTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
        }
    }
}

pub struct GoogleOAuthClient {
    client: Client,
    config: GoogleConfig,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            config,
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<GoogleTokens> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await?;
        let body: TokenResponse = parse_json(resp).await?;
        Ok(body.into_tokens())
    }
}

#[async_trait]
impl GoogleAuth for GoogleOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        let scope = SCOPES.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("include_granted_scopes", "true"),
            ("state", state),
        ];
        let query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect();
        format!("{AUTH_URL}?{}", query.join("&"))
    }

    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens> {
        self.token_request(&[
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<GoogleTokens> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn user_info(&self, access_token: &str) -> Result<GoogleProfile> {
        let resp = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        parse_json(resp).await
    }
}
