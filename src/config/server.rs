use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    /// Bot API token. Without it notifications are logged and dropped.
    pub bot_token: Option<String>,
    /// Bot username (without `@`), used to build `t.me` deep links.
    pub bot_username: Option<String>,
    /// Expected value of the `X-Telegram-Bot-Api-Secret-Token` header.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub google: GoogleConfig,
    pub telegram: TelegramConfig,
    /// Where the OAuth callback sends the browser after login.
    /// If not set, the callback answers with JSON.
    pub frontend_url: Option<String>,
    /// CORS origins. Empty means any origin is accepted.
    pub allowed_origins: Vec<String>,
    pub session_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sheetbudget.db")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            data_dir: PathBuf::from("./data"),
            google: GoogleConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "http://localhost:4000/api/v1/auth/google/callback".to_string(),
            },
            telegram: TelegramConfig::default(),
            frontend_url: None,
            allowed_origins: Vec::new(),
            session_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(30),
        }
    }
}

/// Splits a comma separated origin list, dropping blanks and trailing slashes.
#[must_use]
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins("http://localhost:3000/, https://budget.example.com ,,");
        assert_eq!(
            origins,
            vec!["http://localhost:3000", "https://budget.example.com"]
        );
    }

    #[test]
    fn test_db_path_under_data_dir() {
        let config = ServerConfig {
            data_dir: PathBuf::from("/tmp/sb"),
            ..ServerConfig::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/tmp/sb/sheetbudget.db"));
    }
}
