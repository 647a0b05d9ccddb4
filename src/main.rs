use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sheetbudget::config::{GoogleConfig, ServerConfig, TelegramConfig, parse_origins};
use sheetbudget::google::GoogleOAuthClient;
use sheetbudget::server::{AppState, create_router};
use sheetbudget::sheets::GoogleSheetsClient;
use sheetbudget::store::{SqliteStore, Store};
use sheetbudget::telegram::{NoopNotifier, Notifier, TelegramNotifier};

#[derive(Parser)]
#[command(name = "sheetbudget")]
#[command(about = "A budget API backed by Google Sheets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve(ServeArgs),
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create the local database
    Init {
        /// Data directory for the local database
        #[arg(long, env = "DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Delete expired sessions from the local database
    PurgeSessions {
        /// Data directory for the local database
        #[arg(long, env = "DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(long, short, env = "PORT", default_value = "4000")]
    port: u16,

    /// Data directory for the local database
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// OAuth client id from the Google Cloud console
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    google_client_id: String,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    google_client_secret: String,

    /// Must match a redirect URI registered for the OAuth client
    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URI",
        default_value = "http://localhost:4000/api/v1/auth/google/callback"
    )]
    google_redirect_uri: String,

    /// Browser destination after login (e.g., "https://budget.example.com").
    /// If not set, the OAuth callback answers with JSON.
    #[arg(long, env = "FRONTEND_URL")]
    frontend_url: Option<String>,

    /// Comma separated CORS origins. Empty allows any origin.
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    allowed_origins: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "SESSION_TTL_SECONDS", default_value = "3600")]
    session_ttl_seconds: i64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TTL_SECONDS", default_value = "2592000")]
    refresh_ttl_seconds: i64,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,

    /// Bot username without the leading @, used for t.me links
    #[arg(long, env = "TELEGRAM_BOT_USERNAME")]
    telegram_bot_username: Option<String>,

    /// Secret Telegram sends in X-Telegram-Bot-Api-Secret-Token
    #[arg(long, env = "TELEGRAM_WEBHOOK_SECRET", hide_env_values = true)]
    telegram_webhook_secret: Option<String>,
}

impl ServeArgs {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        if self.session_ttl_seconds <= 0 || self.refresh_ttl_seconds <= 0 {
            anyhow::bail!("Session and refresh TTLs must be positive");
        }
        if self.refresh_ttl_seconds < self.session_ttl_seconds {
            anyhow::bail!("Refresh TTL must not be shorter than the session TTL");
        }

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            data_dir: self.data_dir,
            google: GoogleConfig {
                client_id: self.google_client_id,
                client_secret: self.google_client_secret,
                redirect_uri: self.google_redirect_uri,
            },
            telegram: TelegramConfig {
                bot_token: self.telegram_bot_token.filter(|t| !t.is_empty()),
                bot_username: self
                    .telegram_bot_username
                    .map(|u| u.trim_start_matches('@').to_string())
                    .filter(|u| !u.is_empty()),
                webhook_secret: self.telegram_webhook_secret.filter(|s| !s.is_empty()),
            },
            frontend_url: self
                .frontend_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            allowed_origins: parse_origins(&self.allowed_origins),
            session_ttl: Duration::seconds(self.session_ttl_seconds),
            refresh_ttl: Duration::seconds(self.refresh_ttl_seconds),
        })
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    fs::create_dir_all(data_dir)?;
    let store = SqliteStore::new(data_dir.join("sheetbudget.db"))?;
    store.initialize()?;
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config()?;
    let store = Arc::new(open_store(&config.data_dir)?);
    info!("Database ready at {}", config.db_path().display());

    let notifier: Arc<dyn Notifier> = match config.telegram.bot_token.as_deref() {
        Some(token) => Arc::new(TelegramNotifier::new(token)),
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, Telegram notifications are disabled");
            Arc::new(NoopNotifier)
        }
    };
    let google = Arc::new(GoogleOAuthClient::new(config.google.clone())?);
    let sheets = Arc::new(GoogleSheetsClient::new()?);

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(config, store.clone(), google, sheets, notifier));
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sheetbudget=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => {
                open_store(&data_dir)?;
                println!("Initialized database in {}", data_dir.display());
            }
            AdminCommands::PurgeSessions { data_dir } => {
                let store = open_store(&data_dir)?;
                let removed = store.delete_expired_sessions()?;
                println!("Removed {removed} expired sessions");
            }
        },
        Commands::Serve(args) => run_serve(args).await?,
    }

    Ok(())
}
