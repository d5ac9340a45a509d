//! Cache configuration structures
//!
//! Each layer has its own configuration with defaults matching the
//! production tuning, builder style setters and a `validate` method whose
//! message ends up in [`CacheError::InvalidConfiguration`](crate::CacheError).

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Schema version stamped on every stored entry
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Namespace prefix for every persistent key
pub const DEFAULT_NAMESPACE: &str = "eternal_soul_";

/// Bounded in-memory cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries before FIFO eviction
    pub max_entries: usize,
    /// TTL used when a write does not carry one
    pub default_ttl: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            default_ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl MemoryCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of entries
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set default TTL
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }

        if self.default_ttl.is_zero() {
            return Err("default_ttl must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Persistent key-value cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentCacheConfig {
    /// Prefix applied to every key in the backing store
    pub namespace: String,
    /// Entries stamped with any other version read as misses
    pub schema_version: String,
    /// TTL used when a write does not carry one
    pub default_ttl: Duration,
}

impl Default for PersistentCacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            default_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl PersistentCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.is_empty() {
            return Err("namespace must not be empty".to_string());
        }

        if self.schema_version.is_empty() {
            return Err("schema_version must not be empty".to_string());
        }

        if self.default_ttl.is_zero() {
            return Err("default_ttl must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Whether the query layer may reach the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// Fetch on miss, retry transient failures
    #[default]
    Online,
    /// Serve only cached data and fail fast otherwise
    Offline,
}

/// Query orchestration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default window in which cached query data is served without refetch
    pub stale_time: Duration,
    /// Default retention of unused query entries
    pub gc_time: Duration,
    /// Deadline for a single fetch attempt
    pub request_timeout: Duration,
    /// Backoff applied between attempts
    pub retry: RetryPolicy,
    /// Initial network mode
    pub network_mode: NetworkMode,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            network_mode: NetworkMode::Online,
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    #[must_use]
    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_network_mode(mut self, mode: NetworkMode) -> Self {
        self.network_mode = mode;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if self.gc_time < self.stale_time {
            return Err("gc_time must not be shorter than stale_time".to_string());
        }

        self.retry.validate()
    }
}

/// Configuration for a whole [`CacheContext`](crate::CacheContext)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Shape of each domain cache's in-memory layer
    pub memory: MemoryCacheConfig,
    /// Persistent layer shared by the domain caches
    pub persistent: PersistentCacheConfig,
    /// Query orchestration defaults
    pub query: QueryConfig,
    /// Period of the background expiry sweep
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryCacheConfig::default(),
            persistent: PersistentCacheConfig::default(),
            query: QueryConfig::default(),
            sweep_interval: Duration::from_secs(30 * 60),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build configuration from `ETERNAL_*` environment variables
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        fn env_u64(name: &str) -> Option<u64> {
            std::env::var(name).ok().and_then(|s| s.parse().ok())
        }

        let mut config = Self::new();

        if let Some(max) = env_u64("ETERNAL_MEMORY_MAX_ENTRIES") {
            config.memory.max_entries = usize::try_from(max).unwrap_or(usize::MAX);
        }
        if let Some(ms) = env_u64("ETERNAL_STALE_TIME_MS") {
            config.query.stale_time = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("ETERNAL_GC_TIME_MS") {
            config.query.gc_time = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("ETERNAL_API_TIMEOUT_MS") {
            config.query.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("ETERNAL_SWEEP_INTERVAL_MS") {
            config.sweep_interval = Duration::from_millis(ms);
        }
        if let Ok(namespace) = std::env::var("ETERNAL_CACHE_NAMESPACE") {
            config.persistent.namespace = namespace;
        }
        config.query.retry = RetryPolicy::from_env();

        config
    }

    #[must_use]
    pub fn with_memory(mut self, memory: MemoryCacheConfig) -> Self {
        self.memory = memory;
        self
    }

    #[must_use]
    pub fn with_persistent(mut self, persistent: PersistentCacheConfig) -> Self {
        self.persistent = persistent;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.memory.validate()?;
        self.persistent.validate()?;
        self.query.validate()?;

        if self.sweep_interval.is_zero() {
            return Err("sweep_interval must be greater than 0".to_string());
        }

        Ok(())
    }
}
