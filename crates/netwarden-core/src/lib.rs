//! `netwarden-core`: configuration, identity types and the shared error type
//! used by every other netwarden crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::NetwardenConfig;
pub use error::{NetwardenError, Result};
pub use types::{ChatId, Principal};
