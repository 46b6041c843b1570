use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;

/// Fixed-window per-key request admission (§5): default 60/min per user,
/// 10/min per anonymous IP, overridable per User record.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

struct Window {
    started_at_secs: AtomicU64,
    count: AtomicU32,
}

const WINDOW_SECS: u64 = 60;

impl RateLimiter {
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }

    /// Returns `true` if `key` may proceed under `limit_per_min`, recording
    /// the attempt either way.
    pub fn admit(&self, key: &str, limit_per_min: u32, now_secs: u64) -> bool {
        let entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window { started_at_secs: AtomicU64::new(now_secs), count: AtomicU32::new(0) });

        let started = entry.started_at_secs.load(Ordering::Relaxed);
        if now_secs.saturating_sub(started) >= WINDOW_SECS {
            entry.started_at_secs.store(now_secs, Ordering::Relaxed);
            entry.count.store(0, Ordering::Relaxed);
        }
        let count = entry.count.fetch_add(1, Ordering::Relaxed) + 1;
        count <= limit_per_min
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
