use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("google api error ({status}): {message}")]
    Google { status: u16, message: String },

    #[error("telegram error: {0}")]
    Telegram(String),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token expired")]
    TokenExpired,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    #[error("missing sheet: {0}")]
    MissingSheet(String),
}

impl Error {
    /// True when the error originated from a rejected Google API call.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Google { .. } | Error::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
