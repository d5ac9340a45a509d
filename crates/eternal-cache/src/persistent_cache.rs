//! Namespaced, versioned cache over a [`KvStore`]
//!
//! Values are stored as JSON [`CacheEntry`] envelopes under
//! `<namespace><key>`. Reads never surface storage problems: an envelope
//! that fails to parse, carries another schema version, has expired, or no
//! longer decodes into the requested type is deleted and reported as a miss.
//! Writes that the store refuses are logged, trigger an expiry sweep, and
//! are otherwise dropped.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    clock::Clock,
    config::PersistentCacheConfig,
    error::{CacheError, CacheResult},
    stats::{AtomicCacheMetrics, LayerCounters},
    traits::{CacheEntry, KvStore},
};

#[derive(Debug)]
pub struct PersistentCache {
    store: Arc<dyn KvStore>,
    config: PersistentCacheConfig,
    clock: Arc<dyn Clock>,
    metrics: AtomicCacheMetrics,
}

impl PersistentCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        config: PersistentCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        Ok(Self {
            store,
            config,
            clock,
            metrics: AtomicCacheMetrics::new(),
        })
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.config.namespace)
    }

    /// Store keys that belong to this namespace
    fn namespaced_keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(&self.config.namespace))
                .collect(),
            Err(e) => {
                warn!("Failed to list persistent keys: {}", e);
                Vec::new()
            }
        }
    }

    /// Write `value` under `key`, swallowing storage failures
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Err(e) = self.try_set(key, value, ttl) {
            self.metrics.record_write_failure();
            warn!("Persistent cache write for '{}' failed: {}", key, e);

            let removed = self.clear_expired();
            debug!("Reclaimed {} expired entries after failed write", removed);
        }
    }

    /// Write `value` under `key`, reporting storage failures
    pub fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let entry = CacheEntry::new(
            value,
            self.clock.now_ms(),
            Some(ttl.unwrap_or(self.config.default_ttl)),
            self.config.schema_version.as_str(),
        );
        let raw =
            serde_json::to_string(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        self.store.set_item(&self.storage_key(key), &raw)?;
        self.metrics.record_put();
        Ok(())
    }

    /// Read the envelope at a full storage key, deleting it if unusable
    fn read_entry(&self, storage_key: &str) -> Option<CacheEntry<Value>> {
        let raw = match self.store.get_item(storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Persistent cache read for '{}' failed: {}", storage_key, e);
                return None;
            }
        };

        let entry: CacheEntry<Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Discarding unparsable entry '{}': {}", storage_key, e);
                self.discard(storage_key);
                return None;
            }
        };

        if entry.version != self.config.schema_version {
            debug!(
                "Discarding entry '{}' with schema version {}",
                storage_key, entry.version
            );
            self.discard(storage_key);
            return None;
        }

        if entry.is_expired(self.clock.now_ms()) {
            self.metrics.record_expirations(1);
            self.discard(storage_key);
            return None;
        }

        Some(entry)
    }

    fn discard(&self, storage_key: &str) {
        if let Err(e) = self.store.remove_item(storage_key) {
            warn!("Failed to remove entry '{}': {}", storage_key, e);
        }
    }

    /// Value under `key` if present, current, unexpired and decodable as `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let storage_key = self.storage_key(key);
        let value = self.read_entry(&storage_key).and_then(|entry| {
            match serde_json::from_value(entry.value) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!("Discarding entry '{}' of unexpected shape: {}", storage_key, e);
                    self.discard(&storage_key);
                    None
                }
            }
        });

        self.metrics.record_get(value.is_some());
        value
    }

    /// Remaining lifetime of the entry under `key`
    pub fn time_to_live(&self, key: &str) -> Option<Duration> {
        self.read_entry(&self.storage_key(key))
            .and_then(|entry| entry.time_to_live(self.clock.now_ms()))
    }

    pub fn delete(&self, key: &str) -> bool {
        match self.store.remove_item(&self.storage_key(key)) {
            Ok(removed) => {
                if removed {
                    self.metrics.record_remove();
                }
                removed
            }
            Err(e) => {
                warn!("Failed to delete '{}': {}", key, e);
                false
            }
        }
    }

    /// Remove every key in this namespace, leaving other keys alone
    pub fn clear(&self) -> usize {
        self.namespaced_keys()
            .iter()
            .filter(|key| self.store.remove_item(key).unwrap_or(false))
            .count()
    }

    /// Remove every expired, unparsable or other-version entry
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;

        for storage_key in self.namespaced_keys() {
            let stale = match self.store.get_item(&storage_key) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry<Value>>(&raw) {
                    Ok(entry) => !entry.is_valid(now, &self.config.schema_version),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(e) => {
                    warn!("Failed to read '{}' during sweep: {}", storage_key, e);
                    false
                }
            };

            if stale && self.store.remove_item(&storage_key).unwrap_or(false) {
                removed += 1;
            }
        }

        if removed > 0 {
            self.metrics.record_expirations(removed as u64);
        }
        removed
    }

    /// Keys in this namespace with the namespace stripped
    pub fn keys(&self) -> Vec<String> {
        self.namespaced_keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.config.namespace).map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.namespaced_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn counters(&self) -> LayerCounters {
        self.metrics.snapshot()
    }
}
