//! Bounded in-memory cache with per-entry TTL
//!
//! Entries are evicted in insertion order once `max_entries` is reached.
//! Overwriting a key keeps its original position and evicts nothing.
//! Expired entries are dropped lazily on read, or in bulk by
//! [`MemoryCache::clear_expired`].
#![allow(missing_docs)]

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    clock::Clock,
    config::{MemoryCacheConfig, SCHEMA_VERSION},
    error::{CacheError, CacheResult},
    stats::{AtomicCacheMetrics, MemoryStats},
    traits::CacheEntry,
};

#[derive(Debug)]
struct Slots<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
}

impl<V> Slots<V> {
    fn detach(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(entry)
    }
}

/// FIFO-bounded map of string keys to cloneable values
#[derive(Debug)]
pub struct MemoryCache<V> {
    slots: Mutex<Slots<V>>,
    config: MemoryCacheConfig,
    clock: Arc<dyn Clock>,
    metrics: AtomicCacheMetrics,
}

impl<V: Clone> MemoryCache<V> {
    /// Create a new memory cache with the given configuration
    pub fn new(config: MemoryCacheConfig, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        Ok(Self {
            slots: Mutex::new(Slots {
                entries: HashMap::with_capacity(config.max_entries.min(1024)),
                order: VecDeque::with_capacity(config.max_entries.min(1024)),
            }),
            config,
            clock,
            metrics: AtomicCacheMetrics::new(),
        })
    }

    /// Insert or overwrite `key`, expiring after `ttl` or the default TTL
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = self.clock.now_ms();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let entry = CacheEntry::new(value, now, Some(ttl), SCHEMA_VERSION);

        let mut slots = self.slots.lock();
        if let Some(existing) = slots.entries.get_mut(&key) {
            *existing = entry;
        } else {
            while slots.entries.len() >= self.config.max_entries {
                let Some(oldest) = slots.order.pop_front() else {
                    break;
                };
                slots.entries.remove(&oldest);
                self.metrics.record_eviction();
            }
            slots.order.push_back(key.clone());
            slots.entries.insert(key, entry);
        }
        drop(slots);

        self.metrics.record_put();
    }

    /// Value for `key` if present and unexpired
    ///
    /// An expired entry is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        let mut slots = self.slots.lock();

        let hit = match slots.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        };
        let expired = hit.is_none() && slots.detach(key).is_some();
        drop(slots);

        if expired {
            self.metrics.record_expirations(1);
        }
        self.metrics.record_get(hit.is_some());
        hit
    }

    /// Whether `key` holds an unexpired value, without touching metrics
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.slots
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.slots.lock().detach(key).is_some();
        if removed {
            self.metrics.record_remove();
        }
        removed
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.entries.clear();
        slots.order.clear();
    }

    /// Drop every expired entry, returning how many went
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let removed = self.retain(|_, entry| !entry.is_expired(now));
        if removed > 0 {
            self.metrics.record_expirations(removed as u64);
        }
        removed
    }

    /// Keep only entries for which `keep` returns true
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str, &CacheEntry<V>) -> bool,
    {
        let mut slots = self.slots.lock();
        let before = slots.entries.len();
        slots.entries.retain(|key, entry| keep(key, entry));

        let Slots { entries, order } = &mut *slots;
        order.retain(|key| entries.contains_key(key));
        before - entries.len()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.slots.lock().order.iter().cloned().collect()
    }

    /// Number of held entries, expired ones included until touched
    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.config.max_entries
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            size: self.len(),
            max_size: self.config.max_entries,
            counters: self.metrics.snapshot(),
        }
    }
}
