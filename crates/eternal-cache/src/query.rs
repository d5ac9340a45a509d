//! Query orchestration: freshness, coalescing, retry and garbage collection
//!
//! Every query is identified by a [`QueryKey`]. Data younger than the
//! query's stale time is served without running the fetch. Concurrent
//! requests for a key whose fetch is already running await that same fetch,
//! so the fetch runs exactly once. Failed fetches are never stored.
//! Entries unused for longer than their GC time are dropped by
//! [`QueryClient::collect_garbage`].

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::{
    clock::{Clock, duration_ms},
    config::{NetworkMode, QueryConfig},
    error::{CacheError, CacheResult, FetchError},
    key::QueryKey,
    operation::Operation,
    retry::RetryPolicy,
    stats::QueryStats,
};

type SharedFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

/// Per-request overrides of the query defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Option<Duration>,
    pub gc_time: Option<Duration>,
    pub max_retries: Option<u32>,
    /// Deadline for each attempt
    pub timeout: Option<Duration>,
    /// Fast-layer TTL used when the result is written through
    pub cache_ttl: Option<Duration>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freshness, retention and retry tuning of `operation`
    pub fn for_operation(operation: Operation) -> Self {
        Self {
            stale_time: Some(operation.stale_time()),
            gc_time: Some(operation.gc_time()),
            max_retries: Some(operation.max_retries()),
            timeout: None,
            cache_ttl: Some(operation.ttl_policy().fast),
        }
    }

    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    #[must_use]
    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = Some(gc_time);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

struct InFlight {
    generation: u64,
    future: SharedFetch,
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct QueryState {
    data: Option<Value>,
    updated_at: u64,
    last_used: u64,
    stale_time_ms: u64,
    gc_time_ms: u64,
    in_flight: Option<InFlight>,
}

impl QueryState {
    fn new(now: u64, stale_time_ms: u64, gc_time_ms: u64) -> Self {
        Self {
            data: None,
            updated_at: 0,
            last_used: now,
            stale_time_ms,
            gc_time_ms,
            in_flight: None,
        }
    }

    fn is_fresh(&self, now: u64) -> bool {
        self.data.is_some() && now.saturating_sub(self.updated_at) < self.stale_time_ms
    }
}

/// Run one attempt under `timeout`
async fn with_deadline<Fut>(timeout: Duration, attempt: Fut) -> Result<Value, FetchError>
where
    Fut: Future<Output = Result<Value, FetchError>>,
{
    tokio::time::timeout(timeout, attempt)
        .await
        .unwrap_or_else(|_| Err(FetchError::Timeout(timeout)))
}

#[derive(Debug)]
pub struct QueryClient {
    queries: DashMap<String, QueryState>,
    config: QueryConfig,
    clock: Arc<dyn Clock>,
    network_mode: RwLock<NetworkMode>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
}

impl QueryClient {
    pub fn new(config: QueryConfig, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        Ok(Self {
            queries: DashMap::new(),
            network_mode: RwLock::new(config.network_mode),
            config,
            clock,
            next_generation: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn network_mode(&self) -> NetworkMode {
        *self.network_mode.read()
    }

    pub fn set_network_mode(&self, mode: NetworkMode) {
        let previous = std::mem::replace(&mut *self.network_mode.write(), mode);
        if previous != mode {
            debug!("Network mode changed from {:?} to {:?}", previous, mode);
        }
    }

    pub fn is_offline(&self) -> bool {
        self.network_mode() == NetworkMode::Offline
    }

    /// Retry policy for a request; offline requests are never retried
    pub fn retry_policy(&self, options: &QueryOptions) -> RetryPolicy {
        if self.is_offline() {
            return self.config.retry.clone().with_max_retries(0);
        }
        match options.max_retries {
            Some(max_retries) => self.config.retry.clone().with_max_retries(max_retries),
            None => self.config.retry.clone(),
        }
    }

    /// Cached data for `key` if fresh, otherwise the result of `fetch`
    ///
    /// `fetch` is invoked once per attempt. While offline, stale data is
    /// served rather than refetched.
    pub async fn fetch_query<F, Fut>(
        &self,
        key: &QueryKey,
        options: &QueryOptions,
        mut fetch: F,
    ) -> Result<Value, FetchError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let now = self.clock.now_ms();
        let stale_time_ms = duration_ms(options.stale_time.unwrap_or(self.config.stale_time));
        let gc_time_ms = duration_ms(options.gc_time.unwrap_or(self.config.gc_time));
        let offline = self.is_offline();

        let (generation, future) = {
            let mut state = self
                .queries
                .entry(key.as_cache_key().to_string())
                .or_insert_with(|| QueryState::new(now, stale_time_ms, gc_time_ms));
            state.last_used = now;
            state.stale_time_ms = stale_time_ms;
            state.gc_time_ms = gc_time_ms;

            if let Some(data) = &state.data
                && (offline || state.is_fresh(now))
            {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(data.clone());
            }

            if let Some(in_flight) = &state.in_flight {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                (in_flight.generation, in_flight.future.clone())
            } else {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let policy = self.retry_policy(options);
                let timeout = options.timeout.unwrap_or(self.config.request_timeout);

                let future = async move {
                    policy
                        .execute(|| with_deadline(timeout, fetch()))
                        .await
                }
                .boxed()
                .shared();

                state.in_flight = Some(InFlight {
                    generation,
                    future: future.clone(),
                });
                self.fetches.fetch_add(1, Ordering::Relaxed);
                debug!("Fetching query {}", key);
                (generation, future)
            }
        };

        let result = future.await;
        self.settle(key, generation, &result);
        result
    }

    /// Record the outcome of fetch `generation`, once, for whoever finishes
    /// first. Invalidation during the fetch leaves nothing to record.
    fn settle(&self, key: &QueryKey, generation: u64, result: &Result<Value, FetchError>) {
        let Some(mut state) = self.queries.get_mut(key.as_cache_key()) else {
            return;
        };
        if !state
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            return;
        }

        state.in_flight = None;
        if let Ok(value) = result {
            state.data = Some(value.clone());
            state.updated_at = self.clock.now_ms();
        }
    }

    /// Seed or replace the data for `key`, marking it fresh
    pub fn set_query_data(&self, key: &QueryKey, value: Value) {
        let now = self.clock.now_ms();
        let mut state = self
            .queries
            .entry(key.as_cache_key().to_string())
            .or_insert_with(|| {
                QueryState::new(
                    now,
                    duration_ms(self.config.stale_time),
                    duration_ms(self.config.gc_time),
                )
            });
        state.data = Some(value);
        state.updated_at = now;
        state.last_used = now;
    }

    /// Data for `key` regardless of freshness
    pub fn get_query_data(&self, key: &QueryKey) -> Option<Value> {
        self.queries
            .get(key.as_cache_key())
            .and_then(|state| state.data.clone())
    }

    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        let now = self.clock.now_ms();
        self.queries
            .get(key.as_cache_key())
            .is_some_and(|state| state.is_fresh(now))
    }

    /// Forget `key` so the next request fetches
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.queries.remove(key.as_cache_key()).is_some()
    }

    /// Forget every query of `operation`
    pub fn invalidate_operation(&self, operation: Operation) -> usize {
        let prefix = format!("{}:", operation.name());
        let before = self.queries.len();
        self.queries.retain(|key, _| !key.starts_with(&prefix));
        before.saturating_sub(self.queries.len())
    }

    /// Drop entries unused for longer than their GC time
    ///
    /// Entries with a fetch in flight are kept.
    pub fn collect_garbage(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.queries.len();
        self.queries.retain(|_, state| {
            state.in_flight.is_some() || now.saturating_sub(state.last_used) < state.gc_time_ms
        });
        let removed = before.saturating_sub(self.queries.len());
        if removed > 0 {
            debug!("Collected {} unused queries", removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.queries.clear();
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn stats(&self) -> QueryStats {
        let now = self.clock.now_ms();
        let mut stats = QueryStats {
            queries: self.queries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            ..QueryStats::default()
        };
        for state in &self.queries {
            if state.in_flight.is_some() {
                stats.in_flight += 1;
            }
            if state.is_fresh(now) {
                stats.fresh += 1;
            }
        }
        stats
    }
}
