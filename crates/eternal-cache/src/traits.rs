//! Core types shared by the cache layers
//!
//! [`CacheEntry`] is the envelope every layer wraps values in, and
//! [`KvStore`] is the seam between the persistent cache and whatever holds
//! its strings (browser-style storage, a directory, a test double).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::clock::duration_ms;
use crate::error::CacheResult;

/// A value with its creation time, expiry and schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<V> {
    pub value: V,
    /// Milliseconds since epoch
    pub created_at: u64,
    /// Milliseconds since epoch, `None` never expires
    pub expires_at: Option<u64>,
    pub version: String,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, now_ms: u64, ttl: Option<Duration>, version: impl Into<String>) -> Self {
        Self {
            value,
            created_at: now_ms,
            expires_at: ttl.map(|ttl| now_ms.saturating_add(duration_ms(ttl))),
            version: version.into(),
        }
    }

    /// Expired once `now_ms` reaches the expiry instant
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|expires| now_ms >= expires)
    }

    /// Unexpired and written under `version`
    pub fn is_valid(&self, now_ms: u64, version: &str) -> bool {
        self.version == version && !self.is_expired(now_ms)
    }

    /// Time left before expiry
    pub fn time_to_live(&self, now_ms: u64) -> Option<Duration> {
        self.expires_at
            .map(|expires| Duration::from_millis(expires.saturating_sub(now_ms)))
    }

    pub fn age(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.created_at))
    }
}

/// Synchronous string key-value store with browser-storage semantics
///
/// Writes may fail with [`StorageQuotaExceeded`](crate::CacheError::StorageQuotaExceeded)
/// when the store is full.
pub trait KvStore: Send + Sync + fmt::Debug {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Returns whether a value was present
    fn remove_item(&self, key: &str) -> CacheResult<bool>;

    /// Every key currently in the store, in no particular order
    fn keys(&self) -> CacheResult<Vec<String>>;
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry::new("v", 1_000, Some(Duration::from_millis(500)), "1.0.0");
        assert_eq!(entry.expires_at, Some(1_500));
        assert!(!entry.is_expired(1_499));
        assert!(entry.is_expired(1_500));
        assert_eq!(entry.time_to_live(1_200), Some(Duration::from_millis(300)));
        assert_eq!(entry.age(1_200), Duration::from_millis(200));
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = CacheEntry::new(1u8, 0, None, "1.0.0");
        assert!(!entry.is_expired(u64::MAX));
        assert!(entry.time_to_live(10).is_none());
    }

    #[test]
    fn test_entry_version_check() {
        let entry = CacheEntry::new(1u8, 0, None, "0.9.0");
        assert!(!entry.is_valid(0, "1.0.0"));
        assert!(entry.is_valid(0, "0.9.0"));
    }

    #[test]
    fn test_entry_json_layout() {
        let entry = CacheEntry::new(5u32, 10, Some(Duration::from_millis(5)), "1.0.0");
        let json = serde_json::to_value(&entry).expect("Test operation should succeed");
        assert_eq!(
            json,
            serde_json::json!({
                "value": 5,
                "createdAt": 10,
                "expiresAt": 15,
                "version": "1.0.0"
            })
        );
    }
}
