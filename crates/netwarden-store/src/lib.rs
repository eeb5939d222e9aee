//! `netwarden-store`: the crash-durable SQLite store shared by every
//! access-control component.
//!
//! # Tables
//!
//! | Table             | Owner          | Lifecycle                                   |
//! |-------------------|----------------|---------------------------------------------|
//! | `rate_events`     | RateLimiter    | one row per admitted command, swept at 1h   |
//! | `failed_attempts` | BanTracker     | one row per principal, never auto-deleted   |
//! | `command_history` | audit log      | append-only                                 |
//! | `api_cache`       | ResponseCache  | replaced wholesale, swept once expired      |
//!
//! All timestamps are Unix epoch seconds.

pub mod audit;
pub mod db;
pub mod error;

pub use audit::{AuditRecord, SecurityStats};
pub use db::{unix_now, Store};
pub use error::{Result, StoreError};
