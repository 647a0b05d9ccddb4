//! # Sheetbudget
//!
//! A personal budget API that stores each user's data in a Google Sheets
//! spreadsheet they own, usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! sheetbudget = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sheetbudget::config::ServerConfig;
//! use sheetbudget::google::GoogleOAuthClient;
//! use sheetbudget::server::{AppState, create_router};
//! use sheetbudget::sheets::GoogleSheetsClient;
//! use sheetbudget::store::{SqliteStore, Store};
//! use sheetbudget::telegram::NoopNotifier;
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(&config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(
//!     config.clone(),
//!     Arc::new(store),
//!     Arc::new(GoogleOAuthClient::new(config.google.clone()).unwrap()),
//!     Arc::new(GoogleSheetsClient::new().unwrap()),
//!     Arc::new(NoopNotifier),
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `sheetbudget` binary. Disable with `default-features = false`.

pub mod auth;
pub mod budget;
pub mod config;
pub mod error;
pub mod google;
pub mod server;
pub mod sheets;
pub mod store;
pub mod telegram;
pub mod types;
