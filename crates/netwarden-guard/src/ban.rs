use netwarden_core::config::SecurityConfig;
use netwarden_core::ChatId;
use netwarden_store::{unix_now, Store};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// Failure counter and ban state of one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanRecord {
    pub chat_id: ChatId,
    pub attempts: u32,
    pub last_attempt: i64,
    pub last_reason: Option<String>,
    /// Epoch seconds; `0` when no ban was ever set or after a reset.
    pub banned_until: i64,
}

impl BanRecord {
    pub fn is_banned_at(&self, now: i64) -> bool {
        self.banned_until > now
    }
}

/// What a recorded failure did to the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure logging is switched off.
    Ignored,
    Counted { attempts: u32 },
    /// This failure crossed the threshold and started a new ban.
    Banned { attempts: u32, until: i64 },
}

/// Counts failures per principal and bans after `max_failed_attempts`.
///
/// The counter is not reset when a ban expires. A principal that fails again
/// after its ban lapsed is immediately re-banned, until an operator calls
/// [`BanTracker::reset`].
#[derive(Clone)]
pub struct BanTracker {
    store: Store,
    enabled: bool,
    threshold: u32,
    ban_duration_secs: i64,
}

impl BanTracker {
    pub fn new(store: Store, config: &SecurityConfig) -> Self {
        Self {
            store,
            enabled: config.log_failed_attempts,
            threshold: config.max_failed_attempts,
            ban_duration_secs: config.ban_duration_secs,
        }
    }

    pub fn is_banned(&self, chat_id: ChatId) -> Result<bool> {
        self.is_banned_at(chat_id, unix_now())
    }

    pub fn is_banned_at(&self, chat_id: ChatId, now: i64) -> Result<bool> {
        let until: Option<i64> = self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT banned_until FROM failed_attempts WHERE chat_id = ?1",
                params![chat_id.as_i64()],
                |r| r.get(0),
            )
            .optional()
        })?;
        Ok(until.is_some_and(|until| until > now))
    }

    pub fn record_failure(&self, chat_id: ChatId, reason: &str) -> Result<FailureOutcome> {
        self.record_failure_at(chat_id, reason, unix_now())
    }

    /// Count one failure and start a ban if the threshold is reached.
    ///
    /// Increment and ban decision run in one immediate transaction, so
    /// concurrent failures for the same principal are all counted and at most
    /// one of them activates the ban.
    pub fn record_failure_at(
        &self,
        chat_id: ChatId,
        reason: &str,
        now: i64,
    ) -> Result<FailureOutcome> {
        if !self.enabled {
            return Ok(FailureOutcome::Ignored);
        }
        let threshold = self.threshold;
        let until = now + self.ban_duration_secs;

        let outcome = self.store.transaction(|tx| {
            let (attempts, banned_until): (u32, i64) = tx.query_row(
                "INSERT INTO failed_attempts (chat_id, attempts, last_attempt, last_reason, banned_until)
                 VALUES (?1, 1, ?2, ?3, 0)
                 ON CONFLICT(chat_id) DO UPDATE SET
                    attempts = attempts + 1,
                    last_attempt = excluded.last_attempt,
                    last_reason = excluded.last_reason
                 RETURNING attempts, banned_until",
                params![chat_id.as_i64(), now, reason],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;

            if attempts >= threshold && banned_until <= now {
                tx.execute(
                    "UPDATE failed_attempts SET banned_until = ?2 WHERE chat_id = ?1",
                    params![chat_id.as_i64(), until],
                )?;
                Ok(FailureOutcome::Banned { attempts, until })
            } else {
                Ok(FailureOutcome::Counted { attempts })
            }
        })?;

        match outcome {
            FailureOutcome::Banned { attempts, until } => {
                warn!(chat_id = %chat_id, reason, attempts, banned_until = until, "principal banned");
            }
            FailureOutcome::Counted { attempts } => {
                warn!(chat_id = %chat_id, reason, attempts, "failed attempt recorded");
            }
            FailureOutcome::Ignored => {}
        }
        Ok(outcome)
    }

    /// Clear the counter and lift any ban. The row is kept for the audit trail.
    pub fn reset(&self, chat_id: ChatId) -> Result<()> {
        self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE failed_attempts SET attempts = 0, banned_until = 0 WHERE chat_id = ?1",
                params![chat_id.as_i64()],
            )
        })?;
        info!(chat_id = %chat_id, "failed attempts reset");
        Ok(())
    }

    pub fn record(&self, chat_id: ChatId) -> Result<Option<BanRecord>> {
        let record = self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT attempts, last_attempt, last_reason, banned_until
                 FROM failed_attempts WHERE chat_id = ?1",
                params![chat_id.as_i64()],
                |r| {
                    Ok(BanRecord {
                        chat_id,
                        attempts: r.get(0)?,
                        last_attempt: r.get(1)?,
                        last_reason: r.get(2)?,
                        banned_until: r.get(3)?,
                    })
                },
            )
            .optional()
        })?;
        Ok(record)
    }
}
