//! Multi-layer caching for astrology chart, profile and API data
//!
//! Computing a natal chart or generating reflections is slow and costs
//! backend time, so results are kept in layers from fastest to slowest:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         CacheContext                │
//! │  (explicit, cloneable, sweeps)      │
//! └─────────────────────────────────────┘
//!                  │
//! ┌─────────────────────────────────────┐
//! │         QueryClient                 │
//! │  stale time · coalescing · retry    │
//! └─────────────────────────────────────┘
//!                  │
//! ┌─────────────────────────────────────┐
//! │         CacheManager                │
//! │  ┌───────┐ ┌─────────┐ ┌─────────┐  │
//! │  │ Chart │ │ Profile │ │ API     │  │
//! │  └───────┘ └─────────┘ └─────────┘  │
//! │   each: MemoryCache (FIFO, TTL)     │
//! └─────────────────────────────────────┘
//!                  │
//! ┌─────────────────────────────────────┐
//! │  PersistentCache over a KvStore     │
//! │  namespaced · versioned · TTL       │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use eternal_cache::{
//!     BirthData, CacheConfig, CacheContext, ChartData, FetchError, MemoryStore, Operation,
//!     QueryOptions,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = CacheContext::new(CacheConfig::default(), Arc::new(MemoryStore::new()))?;
//! context.start();
//!
//! let birth = BirthData::new("1990-01-01", "12:00", 22.5726, 88.3639, "+05:30");
//! let chart: ChartData = context
//!     .get_or_fetch(
//!         Operation::NatalChart,
//!         &birth,
//!         QueryOptions::for_operation(Operation::NatalChart),
//!         || async { Err(FetchError::Network("backend unreachable".to_string())) },
//!     )
//!     .await?;
//! # let _ = chart;
//!
//! context.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[allow(missing_docs)]
pub mod clock;
#[allow(missing_docs)]
pub mod config;
#[allow(missing_docs)]
pub mod context;
#[allow(missing_docs)]
pub mod domain;
pub mod error;
pub mod key;
pub mod manager;
#[allow(missing_docs)]
pub mod memory_cache;
#[allow(missing_docs)]
pub mod model;
#[allow(missing_docs)]
pub mod operation;
#[allow(missing_docs)]
pub mod persistent_cache;
#[allow(missing_docs)]
pub mod query;
#[allow(missing_docs)]
pub mod retry;
#[allow(missing_docs)]
pub mod stats;
#[allow(missing_docs)]
pub mod store;
#[allow(missing_docs)]
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, DEFAULT_NAMESPACE, MemoryCacheConfig, NetworkMode, PersistentCacheConfig,
    QueryConfig, SCHEMA_VERSION,
};
pub use context::CacheContext;
pub use domain::{ApiResponseCache, ChartDataCache, UserProfileCache};
pub use error::{CacheError, CacheResult, FetchError};
pub use key::{ApiKey, CacheKey, ChartKey, ProfileKey, QueryKey, canonical_json};
pub use manager::{CacheManager, UserData};
pub use memory_cache::MemoryCache;
pub use model::{BirthData, ChartData, Insight, PlanetPosition, UserProfile, ValidationError};
pub use operation::{Operation, TtlPolicy};
pub use persistent_cache::PersistentCache;
pub use query::{QueryClient, QueryOptions};
pub use retry::RetryPolicy;
pub use stats::{CacheStats, ContextStats, LayerCounters, MemoryStats, QueryStats};
pub use store::{FileStore, MemoryStore};
pub use traits::{CacheEntry, KvStore};
