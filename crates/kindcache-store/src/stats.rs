//! Cache statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for a [`KindCache`](crate::cache::KindCache)
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub adds: AtomicU64,
    pub deletes: AtomicU64,
    pub lists: AtomicU64,
    pub stores_created: AtomicU64,
}

impl CacheStats {
    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            adds: self.adds.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            lists: self.lists.load(Ordering::Relaxed),
            stores_created: self.stores_created.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Plain copy of [`CacheStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub adds: u64,
    pub deletes: u64,
    pub lists: u64,
    pub stores_created: u64,
}

impl StatsSnapshot {
    /// Share of `get` lookups that found a record, `None` before the first one
    #[must_use]
    pub fn hit_ratio(&self) -> Option<f64> {
        let lookups = self.hits + self.misses;
        (lookups > 0).then(|| self.hits as f64 / lookups as f64)
    }
}
