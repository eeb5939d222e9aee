use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Store error: {0}")]
    Store(#[from] netwarden_store::StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] netwarden_cache::CacheError),

    #[error("Command timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Command handler failed: {0}")]
    HandlerFailed(String),

    #[error("Command handler panicked")]
    HandlerPanicked,
}

pub type Result<T> = std::result::Result<T, GuardError>;
