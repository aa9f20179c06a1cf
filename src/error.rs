#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Upstream {url} answered {status}")]
    Upstream { url: String, status: u16 },

    #[error("Upstream {url} still answered {status} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("Activity for {date} cannot be merged: target already holds that date twice")]
    MergeInvariant { date: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl UsageError {
    /// True for the conditions the retry loop recovers from locally.
    pub fn is_transient_status(status: u16) -> bool {
        status == 429 || status == 502
    }
}

pub type Result<T> = std::result::Result<T, UsageError>;
