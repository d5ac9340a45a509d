//! Cache statistics
//!
//! Each layer records its traffic in an [`AtomicCacheMetrics`] so the hot
//! path never takes a lock just to count. Snapshots are plain serializable
//! structs suitable for logging or printing.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for one cache layer
#[derive(Debug, Default)]
pub struct AtomicCacheMetrics {
    get_count: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    put_count: AtomicU64,
    remove_count: AtomicU64,
    eviction_count: AtomicU64,
    expiration_count: AtomicU64,
    write_failure_count: AtomicU64,
}

impl AtomicCacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup
    #[inline]
    pub fn record_get(&self, hit: bool) {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        if hit {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_put(&self) {
        self.put_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remove(&self) {
        self.remove_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a capacity eviction
    #[inline]
    pub fn record_eviction(&self) {
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record entries dropped because their TTL passed
    #[inline]
    pub fn record_expirations(&self, count: u64) {
        self.expiration_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a write the backing store refused
    #[inline]
    pub fn record_write_failure(&self) {
        self.write_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LayerCounters {
        LayerCounters {
            get_count: self.get_count.load(Ordering::Relaxed),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            put_count: self.put_count.load(Ordering::Relaxed),
            remove_count: self.remove_count.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            expiration_count: self.expiration_count.load(Ordering::Relaxed),
            write_failure_count: self.write_failure_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`AtomicCacheMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerCounters {
    pub get_count: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub put_count: u64,
    pub remove_count: u64,
    pub eviction_count: u64,
    pub expiration_count: u64,
    pub write_failure_count: u64,
}

impl LayerCounters {
    /// Calculate hit rate (hits / total gets)
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        if self.get_count == 0 {
            0.0
        } else {
            self.hit_count as f64 / self.get_count as f64
        }
    }
}

/// Occupancy and traffic of a bounded in-memory cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Entries currently held, expired ones included until touched
    pub size: usize,
    pub max_size: usize,
    pub counters: LayerCounters,
}

/// Snapshot of every cache layer held by the manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub chart_data: MemoryStats,
    pub user_profile: MemoryStats,
    pub api_response: MemoryStats,
    /// Entries under this namespace in the persistent store
    pub persistent_entries: usize,
    pub persistent: LayerCounters,
    /// When the snapshot was taken, ms since epoch
    pub timestamp_ms: u64,
}

impl CacheStats {
    /// Entries across every in-memory layer
    pub fn memory_entries(&self) -> usize {
        self.chart_data.size + self.user_profile.size + self.api_response.size
    }
}

/// Snapshot of the query layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Query entries retained
    pub queries: usize,
    /// Entries whose fetch is currently running
    pub in_flight: usize,
    /// Entries holding data younger than their stale time
    pub fresh: usize,
    /// Lookups answered without running a fetch
    pub hits: u64,
    /// Fetches started
    pub fetches: u64,
    /// Callers that joined a fetch already in flight
    pub coalesced: u64,
}

/// Combined snapshot returned by [`CacheContext::stats`](crate::CacheContext::stats)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub cache: CacheStats,
    pub queries: QueryStats,
}
