use netwarden_core::config::SecurityConfig;
use netwarden_core::ChatId;
use netwarden_store::{unix_now, Store};
use rusqlite::params;
use tracing::{debug, warn};

use crate::error::Result;

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;

/// Sliding-window command ceilings per principal.
///
/// Windows are half-open: an event at `t` counts toward the minute window
/// while `now - 60 < t`. Rejected attempts are not recorded, so a principal
/// hammering the limit does not extend its own lockout.
#[derive(Clone)]
pub struct RateLimiter {
    store: Store,
    enabled: bool,
    per_minute: u32,
    per_hour: u32,
}

impl RateLimiter {
    /// # Panics
    ///
    /// Panics if limiting is enabled with a zero ceiling.
    pub fn new(store: Store, config: &SecurityConfig) -> Self {
        assert!(
            !config.rate_limiting
                || (config.max_commands_per_minute > 0 && config.max_commands_per_hour > 0),
            "rate ceilings must be positive when rate limiting is enabled"
        );
        Self {
            store,
            enabled: config.rate_limiting,
            per_minute: config.max_commands_per_minute,
            per_hour: config.max_commands_per_hour,
        }
    }

    pub fn allow(&self, chat_id: ChatId) -> Result<bool> {
        self.allow_at(chat_id, unix_now())
    }

    /// Admit one command at `now` if both windows have room, recording it.
    ///
    /// Count and insert happen in one immediate transaction, so concurrent
    /// callers for the same principal can never admit more than the ceiling.
    pub fn allow_at(&self, chat_id: ChatId, now: i64) -> Result<bool> {
        if !self.enabled {
            return Ok(true);
        }
        let (per_minute, per_hour) = (i64::from(self.per_minute), i64::from(self.per_hour));
        let id = chat_id.as_i64();

        let verdict = self.store.transaction(|tx| {
            tx.execute(
                "DELETE FROM rate_events WHERE chat_id = ?1 AND command_time <= ?2",
                params![id, now - HOUR],
            )?;

            let last_minute: i64 = tx.query_row(
                "SELECT COUNT(*) FROM rate_events WHERE chat_id = ?1 AND command_time > ?2",
                params![id, now - MINUTE],
                |r| r.get(0),
            )?;
            if last_minute >= per_minute {
                return Ok(Some(("minute", last_minute)));
            }

            let last_hour: i64 = tx.query_row(
                "SELECT COUNT(*) FROM rate_events WHERE chat_id = ?1 AND command_time > ?2",
                params![id, now - HOUR],
                |r| r.get(0),
            )?;
            if last_hour >= per_hour {
                return Ok(Some(("hour", last_hour)));
            }

            tx.execute(
                "INSERT INTO rate_events (chat_id, command_time) VALUES (?1, ?2)",
                params![id, now],
            )?;
            Ok(None)
        })?;

        match verdict {
            None => {
                debug!(chat_id = %chat_id, "command admitted by rate limiter");
                Ok(true)
            }
            Some((window, count)) => {
                warn!(chat_id = %chat_id, window, count, "rate limit exceeded");
                Ok(false)
            }
        }
    }

    /// Delete up to `limit` events older than the hour window, across all principals.
    pub fn sweep_stale_at(&self, now: i64, limit: usize) -> Result<usize> {
        let removed = self.store.with_conn(|conn| {
            conn.execute(
                "DELETE FROM rate_events WHERE id IN (
                    SELECT id FROM rate_events WHERE command_time <= ?1 LIMIT ?2
                 )",
                params![now - HOUR, limit as i64],
            )
        })?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const ALICE: ChatId = ChatId(111);

    fn limiter(per_minute: u32, per_hour: u32) -> RateLimiter {
        RateLimiter::new(
            Store::open_in_memory().unwrap(),
            &SecurityConfig {
                max_commands_per_minute: per_minute,
                max_commands_per_hour: per_hour,
                ..SecurityConfig::default()
            },
        )
    }

    fn events(limiter: &RateLimiter) -> i64 {
        limiter
            .store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM rate_events", [], |r| r.get(0)))
            .unwrap()
    }

    #[test]
    fn minute_ceiling() {
        let rl = limiter(3, 100);
        for i in 0..3 {
            assert!(rl.allow_at(ALICE, NOW + i).unwrap());
        }
        assert!(!rl.allow_at(ALICE, NOW + 3).unwrap());
        // Rejected attempts are not recorded.
        assert_eq!(events(&rl), 3);
    }

    #[test]
    fn minute_window_slides() {
        let rl = limiter(2, 100);
        assert!(rl.allow_at(ALICE, NOW).unwrap());
        assert!(rl.allow_at(ALICE, NOW).unwrap());
        assert!(!rl.allow_at(ALICE, NOW + 59).unwrap());
        assert!(rl.allow_at(ALICE, NOW + 60).unwrap());
    }

    #[test]
    fn same_second_events_are_distinct() {
        let rl = limiter(10, 100);
        for _ in 0..5 {
            assert!(rl.allow_at(ALICE, NOW).unwrap());
        }
        assert_eq!(events(&rl), 5);
    }

    #[test]
    fn hour_ceiling() {
        let rl = limiter(100, 3);
        assert!(rl.allow_at(ALICE, NOW).unwrap());
        assert!(rl.allow_at(ALICE, NOW + 600).unwrap());
        assert!(rl.allow_at(ALICE, NOW + 1200).unwrap());
        assert!(!rl.allow_at(ALICE, NOW + 1800).unwrap());
        assert!(rl.allow_at(ALICE, NOW + 3600).unwrap());
    }

    #[test]
    fn old_events_are_pruned_on_admission() {
        let rl = limiter(10, 100);
        rl.allow_at(ALICE, NOW).unwrap();
        rl.allow_at(ALICE, NOW + 1).unwrap();
        rl.allow_at(ALICE, NOW + HOUR + 1).unwrap();
        assert_eq!(events(&rl), 1);
    }

    #[test]
    fn disabled_limiter_admits_everything() {
        let rl = RateLimiter::new(
            Store::open_in_memory().unwrap(),
            &SecurityConfig {
                rate_limiting: false,
                max_commands_per_minute: 1,
                ..SecurityConfig::default()
            },
        );
        for _ in 0..10 {
            assert!(rl.allow_at(ALICE, NOW).unwrap());
        }
        assert_eq!(events(&rl), 0);
    }

    #[test]
    #[should_panic(expected = "rate ceilings must be positive")]
    fn zero_ceiling_panics() {
        limiter(0, 60);
    }

    #[test]
    fn principals_have_separate_budgets() {
        let rl = limiter(1, 100);
        assert!(rl.allow_at(ALICE, NOW).unwrap());
        assert!(!rl.allow_at(ALICE, NOW).unwrap());
        assert!(rl.allow_at(ChatId(222), NOW).unwrap());
    }

    #[test]
    fn concurrent_callers_never_exceed_ceiling() {
        let rl = limiter(10, 100);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || {
                    (0..5).filter(|_| rl.allow_at(ALICE, NOW).unwrap()).count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn sweep_is_bounded_and_global() {
        let rl = limiter(100, 100);
        for chat in 0..4 {
            rl.allow_at(ChatId(chat), NOW).unwrap();
        }
        rl.allow_at(ALICE, NOW + HOUR).unwrap();

        assert_eq!(rl.sweep_stale_at(NOW + HOUR + 10, 3).unwrap(), 3);
        assert_eq!(rl.sweep_stale_at(NOW + HOUR + 10, 3).unwrap(), 1);
        assert_eq!(events(&rl), 1);
    }
}
