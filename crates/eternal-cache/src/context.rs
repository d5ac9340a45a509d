//! Explicitly constructed cache context
//!
//! A [`CacheContext`] owns the domain caches, the persistent layer and the
//! query client, and runs the periodic expiry sweep. Nothing in the crate
//! is global: callers construct a context and pass clones around. The
//! sweep task stops on [`CacheContext::shutdown`], or is aborted when the
//! last clone is dropped.

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::{CacheConfig, NetworkMode},
    error::{CacheResult, FetchError},
    key::QueryKey,
    manager::CacheManager,
    model::{BirthData, ChartData, UserProfile},
    operation::Operation,
    query::{QueryClient, QueryOptions},
    stats::ContextStats,
    traits::KvStore,
};

/// Where a query's result lives in the domain caches
#[derive(Debug, Clone)]
enum DomainSlot {
    Chart(BirthData),
    Profile(String),
    Api {
        endpoint: &'static str,
        params: Value,
    },
}

impl DomainSlot {
    fn resolve(operation: Operation, inputs: &Value) -> Result<Self, FetchError> {
        match operation {
            Operation::NatalChart => {
                let birth: BirthData = serde_json::from_value(inputs.clone())
                    .map_err(|e| FetchError::Validation(format!("birth data: {e}")))?;
                birth.validate()?;
                Ok(Self::Chart(birth))
            }
            Operation::UserProfile => {
                let user_id = inputs
                    .as_str()
                    .or_else(|| inputs.get("userId").and_then(Value::as_str))
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| FetchError::Validation("user id is required".to_string()))?;
                Ok(Self::Profile(user_id.to_string()))
            }
            other => match other.endpoint() {
                Some(endpoint) => Ok(Self::Api {
                    endpoint,
                    params: inputs.clone(),
                }),
                None => Err(FetchError::Validation(format!(
                    "{other} has no backend endpoint"
                ))),
            },
        }
    }
}

#[derive(Debug)]
struct SweepTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

#[derive(Debug)]
struct ContextInner {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    manager: CacheManager,
    queries: QueryClient,
    sweeper: Mutex<Option<SweepTask>>,
}

impl ContextInner {
    fn lookup(&self, slot: &DomainSlot) -> Option<Value> {
        match slot {
            DomainSlot::Chart(birth) => self
                .manager
                .chart_data
                .get_chart_data(birth)
                .and_then(|chart| serde_json::to_value(chart).ok()),
            DomainSlot::Profile(user_id) => self
                .manager
                .user_profile
                .get_user_profile(user_id)
                .and_then(|profile| serde_json::to_value(profile).ok()),
            DomainSlot::Api { endpoint, params } => {
                self.manager.api_response.get_api_response(endpoint, params)
            }
        }
    }

    fn write_through(&self, slot: &DomainSlot, value: &Value, ttl: Duration) {
        let result = match slot {
            DomainSlot::Chart(birth) => serde_json::from_value::<ChartData>(value.clone())
                .map_err(|e| e.to_string())
                .and_then(|chart| {
                    self.manager
                        .chart_data
                        .cache_chart_data(birth, &chart)
                        .map_err(|e| e.to_string())
                }),
            DomainSlot::Profile(_) => serde_json::from_value::<UserProfile>(value.clone())
                .map_err(|e| e.to_string())
                .and_then(|profile| {
                    self.manager
                        .user_profile
                        .cache_user_profile(&profile)
                        .map_err(|e| e.to_string())
                }),
            DomainSlot::Api { endpoint, params } => self
                .manager
                .api_response
                .cache_api_response(endpoint, params, value, Some(ttl))
                .map_err(|e| e.to_string()),
        };

        if let Err(e) = result {
            warn!("Not caching fetched value: {}", e);
        }
    }

    fn remove(&self, slot: &DomainSlot) -> bool {
        match slot {
            DomainSlot::Chart(birth) => self.manager.chart_data.remove_chart_data(birth),
            DomainSlot::Profile(user_id) => self.manager.user_profile.clear_user_profile(user_id),
            DomainSlot::Api { endpoint, params } => {
                self.manager.api_response.remove_api_response(endpoint, params)
            }
        }
    }

    fn sweep(&self) -> usize {
        let expired = self.manager.clear_expired();
        let collected = self.queries.collect_garbage();
        debug!(
            "Sweep removed {} expired entries and {} unused queries",
            expired, collected
        );
        expired + collected
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.get_mut().take() {
            task.handle.abort();
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheContext {
    inner: Arc<ContextInner>,
}

impl CacheContext {
    /// Context over `store` using the system clock
    pub fn new(config: CacheConfig, store: Arc<dyn KvStore>) -> CacheResult<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Context over `store` reading time from `clock`
    pub fn with_clock(
        config: CacheConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        let manager = CacheManager::new(&config, store, clock.clone())?;
        let queries = QueryClient::new(config.query.clone(), clock.clone())?;

        Ok(Self {
            inner: Arc::new(ContextInner {
                config,
                clock,
                manager,
                queries,
                sweeper: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn manager(&self) -> &CacheManager {
        &self.inner.manager
    }

    pub fn queries(&self) -> &QueryClient {
        &self.inner.queries
    }

    pub fn set_network_mode(&self, mode: NetworkMode) {
        self.inner.queries.set_network_mode(mode);
    }

    /// Sweep once now, then every `sweep_interval` until shutdown
    ///
    /// Must be called within a Tokio runtime. Calling it again while the
    /// sweeper runs only performs the immediate sweep.
    pub fn start(&self) -> usize {
        let removed = self.inner.sweep();

        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.is_none() {
            let (shutdown, mut stopped) = watch::channel(false);
            let weak: Weak<ContextInner> = Arc::downgrade(&self.inner);
            let period = self.inner.config.sweep_interval;

            let handle = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let Some(inner) = weak.upgrade() else {
                                break;
                            };
                            inner.sweep();
                        }
                        changed = stopped.changed() => {
                            if changed.is_err() || *stopped.borrow() {
                                break;
                            }
                        }
                    }
                }

                debug!("Cache sweeper stopped");
            });

            *sweeper = Some(SweepTask { handle, shutdown });
            info!("Cache sweeper started with period {:?}", period);
        }

        removed
    }

    /// Stop the sweeper, wait for it, and run a final sweep
    pub async fn shutdown(&self) -> usize {
        let task = self.inner.sweeper.lock().take();

        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await
                && !e.is_cancelled()
            {
                warn!("Cache sweeper ended abnormally: {}", e);
            }
        }

        let removed = self.inner.sweep();
        info!("Cache context shut down");
        removed
    }

    /// Whether the background sweeper is running
    pub fn is_running(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Sweep expired entries and unused queries now
    pub fn clear_expired(&self) -> usize {
        self.inner.sweep()
    }

    /// Empty every layer, query state included
    pub fn clear_all(&self) {
        self.inner.queries.clear();
        self.inner.manager.clear_all();
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            cache: self.inner.manager.stats(),
            queries: self.inner.queries.stats(),
        }
    }

    /// Serve `operation` for `inputs` from the fastest layer holding it,
    /// otherwise run `fetch` and write the result through every layer.
    ///
    /// Inputs are validated before any cache or network I/O. Concurrent
    /// calls with the same operation and inputs share one fetch.
    pub async fn get_or_fetch<T, I, F, Fut>(
        &self,
        operation: Operation,
        inputs: &I,
        options: QueryOptions,
        mut fetch: F,
    ) -> Result<T, FetchError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        I: Serialize + ?Sized,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let inputs = serde_json::to_value(inputs)
            .map_err(|e| FetchError::Validation(format!("inputs: {e}")))?;
        let slot = DomainSlot::resolve(operation, &inputs)?;
        let key = QueryKey::new(operation, &inputs);
        let ttl = options
            .cache_ttl
            .unwrap_or_else(|| operation.ttl_policy().fast);

        let inner = Arc::clone(&self.inner);
        // The caller's fetch only runs once both the domain caches and the
        // network mode have been consulted.
        let fetch_value = move || -> BoxFuture<'static, Result<Value, FetchError>> {
            if let Some(hit) = inner.lookup(&slot) {
                return future::ready(Ok(hit)).boxed();
            }
            if inner.queries.is_offline() {
                return future::ready(Err(FetchError::Offline(format!(
                    "no cached {operation} data"
                ))))
                .boxed();
            }

            let inner = Arc::clone(&inner);
            let slot = slot.clone();
            let pending = fetch();
            async move {
                let value = serde_json::to_value(pending.await?)
                    .map_err(|e| FetchError::Decode(e.to_string()))?;
                inner.write_through(&slot, &value, ttl);
                Ok(value)
            }
            .boxed()
        };

        let value = self
            .inner
            .queries
            .fetch_query(&key, &options, fetch_value)
            .await?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Warm the caches for `operation` in the background
    ///
    /// Failures are logged, never surfaced.
    pub fn prefetch<T, I, F, Fut>(
        &self,
        operation: Operation,
        inputs: &I,
        options: QueryOptions,
        fetch: F,
    ) -> JoinHandle<()>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        I: Serialize + ?Sized,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let context = self.clone();
        let inputs = serde_json::to_value(inputs);

        tokio::spawn(async move {
            let inputs = match inputs {
                Ok(inputs) => inputs,
                Err(e) => {
                    warn!("Prefetch of {} skipped: {}", operation, e);
                    return;
                }
            };

            match context
                .get_or_fetch::<T, _, _, _>(operation, &inputs, options, fetch)
                .await
            {
                Ok(_) => debug!("Prefetched {}", operation),
                Err(e) => warn!("Prefetch of {} failed: {}", operation, e),
            }
        })
    }

    /// Drop `operation`'s query state and domain entry for `inputs`
    pub fn invalidate<I: Serialize + ?Sized>(&self, operation: Operation, inputs: &I) -> bool {
        let inputs = match serde_json::to_value(inputs) {
            Ok(inputs) => inputs,
            Err(e) => {
                warn!("Cannot invalidate {}: {}", operation, e);
                return false;
            }
        };

        let query = self
            .inner
            .queries
            .invalidate(&QueryKey::new(operation, &inputs));
        let domain = DomainSlot::resolve(operation, &inputs)
            .map(|slot| self.inner.remove(&slot))
            .unwrap_or(false);
        query || domain
    }

    /// Seed the query layer with `value` for `operation` and `inputs`
    pub fn set_query_data<I, T>(&self, operation: Operation, inputs: &I, value: &T) -> bool
    where
        I: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        match (serde_json::to_value(inputs), serde_json::to_value(value)) {
            (Ok(inputs), Ok(value)) => {
                self.inner
                    .queries
                    .set_query_data(&QueryKey::new(operation, &inputs), value);
                true
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Cannot seed {} query data: {}", operation, e);
                false
            }
        }
    }
}
