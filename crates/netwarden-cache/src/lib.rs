//! `netwarden-cache`: TTL response cache in front of the monitoring backend.
//!
//! Only idempotent reads are cached. Writes go straight through and bust every
//! cached read under the same resource root, so a `PUT /api/v0/alerts/7` makes
//! the next `GET /api/v0/alerts?state=1` hit the backend again.

pub mod cache;
pub mod error;
pub mod key;
pub mod upstream;

pub use cache::ResponseCache;
pub use error::{CacheError, Result};
pub use key::CacheKey;
pub use upstream::{CachedUpstream, HttpUpstream, Method, Upstream};
