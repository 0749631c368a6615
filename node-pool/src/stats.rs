//! Process-wide connection counters.
//!
//! Every successful dial is counted once, split by the role the node had
//! at dial time. Counters are cumulative until [`reset`] is called.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct Stats {
    enabled: AtomicBool,
    primary_conns: AtomicU64,
    secondary_conns: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            primary_conns: AtomicU64::new(0),
            secondary_conns: AtomicU64::new(0),
        }
    }

    fn record_dial(&self, primary: bool) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        let counter = if primary {
            &self.primary_conns
        } else {
            &self.secondary_conns
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            primary_conns: self.primary_conns.load(Ordering::Relaxed),
            secondary_conns: self.secondary_conns.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.primary_conns.store(0, Ordering::Relaxed);
        self.secondary_conns.store(0, Ordering::Relaxed);
    }
}

static STATS: Lazy<Stats> = Lazy::new(Stats::new);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub primary_conns: u64,
    pub secondary_conns: u64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.primary_conns + self.secondary_conns
    }
}

pub fn set_enabled(enabled: bool) {
    STATS.enabled.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    STATS.enabled.load(Ordering::Relaxed)
}

pub fn snapshot() -> StatsSnapshot {
    STATS.snapshot()
}

pub fn reset() {
    STATS.reset();
}

pub(crate) fn record_dial(primary: bool) {
    STATS.record_dial(primary);
}
