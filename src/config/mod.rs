mod server;

pub use server::{GoogleConfig, ServerConfig, TelegramConfig, parse_origins};
