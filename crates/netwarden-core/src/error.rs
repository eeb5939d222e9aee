use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetwardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid CIDR block: {0}")]
    InvalidCidr(String),

    #[error("Unknown role {role} assigned to chat {chat_id}")]
    UnknownRole { chat_id: i64, role: String },
}

impl NetwardenError {
    /// Short error code used in operator-facing output.
    pub fn code(&self) -> &'static str {
        match self {
            NetwardenError::Config(_) => "CONFIG_ERROR",
            NetwardenError::InvalidCidr(_) => "INVALID_CIDR",
            NetwardenError::UnknownRole { .. } => "UNKNOWN_ROLE",
        }
    }
}

pub type Result<T> = std::result::Result<T, NetwardenError>;
