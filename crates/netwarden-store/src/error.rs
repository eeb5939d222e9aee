use thiserror::Error;

/// Errors raised by the persistent store. Every one of them is an
/// infrastructure failure; denials never travel through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the connection lock.
    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
