/**
 * Configuration constants for the query cache, pollers and mutations
 */
use std::time::Duration;

/// Delay between job progress fetches while a job is still running
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// List and detail views refetch on every (re)mount, deduplicated in flight
pub const DEFAULT_STALE_SECS: u64 = 0;

/// Overview statistics are served from cache for this long
pub const STATS_OVERVIEW_STALE_SECS: u64 = 30;

/// Score timeseries are served from cache for this long
pub const TIMESERIES_STALE_SECS: u64 = 60;

/// Judge/human agreement is recomputed server-side on every request
pub const META_EVALUATION_STALE_SECS: u64 = 60;

/// Caller-visible upper bound on a single transport call
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How long an entry without subscribers is kept before eviction
pub const DEFAULT_GC_DELAY_SECS: u64 = 300;

/// Interval of the background eviction sweep
pub const GC_SWEEP_INTERVAL_SECS: u64 = 60;

/// Days covered by the default score timeseries
pub const DEFAULT_TIMESERIES_DAYS: u32 = 7;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout applied around every transport call made by the cache and
    /// the mutation coordinator
    pub request_timeout: Duration,
    pub gc_delay: Duration,
    pub gc_sweep_interval: Duration,
    /// Interval used by job progress queries
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            gc_delay: Duration::from_secs(DEFAULT_GC_DELAY_SECS),
            gc_sweep_interval: Duration::from_secs(GC_SWEEP_INTERVAL_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_POLL_INTERVAL_MS > 0, "DEFAULT_POLL_INTERVAL_MS must be greater than 0");
    assert!(DEFAULT_REQUEST_TIMEOUT_SECS > 0, "DEFAULT_REQUEST_TIMEOUT_SECS must be greater than 0");
    assert!(GC_SWEEP_INTERVAL_SECS > 0, "GC_SWEEP_INTERVAL_SECS must be greater than 0");
    assert!(STATS_OVERVIEW_STALE_SECS < TIMESERIES_STALE_SECS, "overview must refresh before timeseries");
    assert!(DEFAULT_PAGE_SIZE > 0 && DEFAULT_PAGE_SIZE <= 100, "DEFAULT_PAGE_SIZE must be in 1..=100");
};
