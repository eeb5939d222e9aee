use netwarden_cache::ResponseCache;
use netwarden_store::unix_now;
use rand::Rng;
use tracing::debug;

use crate::error::Result;
use crate::ratelimit::RateLimiter;

/// Upper bound on rows deleted per table in one run.
const SWEEP_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rate_events: usize,
    pub cache_entries: usize,
}

/// Opportunistic cleanup of stale rate events and expired cache entries.
///
/// Meant to be poked once per polling-loop iteration; it only does work on
/// roughly one call in `one_in`, and then a bounded amount of it.
pub struct Housekeeper {
    limiter: RateLimiter,
    cache: ResponseCache,
    one_in: u32,
}

impl Housekeeper {
    /// `one_in = 0` disables the opportunistic path; `run_now` still works.
    pub fn new(limiter: RateLimiter, cache: ResponseCache, one_in: u32) -> Self {
        Self {
            limiter,
            cache,
            one_in,
        }
    }

    pub fn maybe_run(&self) -> Result<Option<SweepReport>> {
        if self.one_in == 0 || !rand::thread_rng().gen_ratio(1, self.one_in) {
            return Ok(None);
        }
        self.run_now().map(Some)
    }

    pub fn run_now(&self) -> Result<SweepReport> {
        self.run_at(unix_now())
    }

    pub fn run_at(&self, now: i64) -> Result<SweepReport> {
        let report = SweepReport {
            rate_events: self.limiter.sweep_stale_at(now, SWEEP_BATCH)?,
            cache_entries: self.cache.sweep_expired_at(now, SWEEP_BATCH)?,
        };
        debug!(
            rate_events = report.rate_events,
            cache_entries = report.cache_entries,
            "housekeeping sweep"
        );
        Ok(report)
    }
}
