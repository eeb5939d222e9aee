use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] netwarden_store::StoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a 4xx/5xx status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Upstream call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
