use chrono::Duration;
use netwarden_core::config::CacheConfig;
use netwarden_store::{unix_now, Store};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::key::CacheKey;

/// TTL cache of upstream read responses, persisted in `api_cache`.
///
/// An entry is served only while `now < expires_at`. Expired rows stay on
/// disk until [`ResponseCache::sweep_expired_at`] removes them but are never
/// returned.
#[derive(Clone)]
pub struct ResponseCache {
    store: Store,
    enabled: bool,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Store, config: &CacheConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            default_ttl: Duration::seconds(config.ttl_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        self.get_at(key, unix_now())
    }

    pub fn get_at(&self, key: &CacheKey, now: i64) -> Result<Option<Value>> {
        if !self.enabled {
            return Ok(None);
        }
        let data: Option<String> = self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT data FROM api_cache WHERE cache_key = ?1 AND expires_at > ?2",
                params![key.as_str(), now],
                |r| r.get(0),
            )
            .optional()
        })?;

        let Some(data) = data else {
            return Ok(None);
        };
        match serde_json::from_str(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(endpoint = key.endpoint(), error = %e, "dropping unreadable cache entry");
                self.purge(key)?;
                Ok(None)
            }
        }
    }

    /// Store `value` under `key` for `ttl`.
    ///
    /// # Panics
    ///
    /// Panics if `ttl` is not positive. Sub-second TTLs round up to one second.
    pub fn put(&self, key: &CacheKey, value: &Value, ttl: Duration) -> Result<()> {
        self.put_at(key, value, ttl, unix_now())
    }

    pub fn put_at(&self, key: &CacheKey, value: &Value, ttl: Duration, now: i64) -> Result<()> {
        assert!(ttl > Duration::zero(), "cache TTL must be positive, got {ttl}");
        if !self.enabled {
            return Ok(());
        }
        let data = value.to_string();
        let expires_at = now + (ttl.num_milliseconds() + 999) / 1000;
        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO api_cache (cache_key, endpoint, data, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key.as_str(), key.endpoint(), data, now, expires_at],
            )
        })?;
        debug!(endpoint = key.endpoint(), expires_at, "cached upstream response");
        Ok(())
    }

    /// Remove one entry. Returns whether it existed.
    pub fn purge(&self, key: &CacheKey) -> Result<bool> {
        let removed = self.store.with_conn(|conn| {
            conn.execute(
                "DELETE FROM api_cache WHERE cache_key = ?1",
                params![key.as_str()],
            )
        })?;
        Ok(removed > 0)
    }

    /// Remove every entry whose endpoint starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
        // substr rather than LIKE: endpoints contain `_`, which LIKE treats as a wildcard.
        let removed = self.store.with_conn(|conn| {
            conn.execute(
                "DELETE FROM api_cache WHERE substr(endpoint, 1, length(?1)) = ?1",
                params![prefix],
            )
        })?;
        if removed > 0 {
            debug!(prefix, removed, "invalidated cached reads");
        }
        Ok(removed)
    }

    /// Delete up to `limit` rows expired at `now`.
    pub fn sweep_expired_at(&self, now: i64, limit: usize) -> Result<usize> {
        let removed = self.store.with_conn(|conn| {
            conn.execute(
                "DELETE FROM api_cache WHERE cache_key IN (
                    SELECT cache_key FROM api_cache WHERE expires_at <= ?1 LIMIT ?2
                 )",
                params![now, limit as i64],
            )
        })?;
        Ok(removed)
    }
}
