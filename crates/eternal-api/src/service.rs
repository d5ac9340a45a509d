//! Cache-backed astrology operations
//!
//! [`AstrologyService`] pairs a [`CacheContext`] with an
//! [`AstrologyBackend`]. Every read goes through
//! [`CacheContext::get_or_fetch`], so repeated and concurrent requests for
//! the same inputs reach the backend once, failures are retried according
//! to the operation's policy, and successful results are written through
//! to the memory and persistent layers.

use eternal_cache::{
    BirthData, CacheContext, CacheResult, ChartData, Clock, FetchError, Operation, QueryOptions,
    UserProfile,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::AstrologyBackend;
use crate::error::ApiError;
use crate::types::chart_from_response;

type BackendCall =
    dyn Fn(Arc<dyn AstrologyBackend>) -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync;

#[derive(Debug, Clone)]
pub struct AstrologyService {
    cache: CacheContext,
    backend: Arc<dyn AstrologyBackend>,
}

impl AstrologyService {
    pub fn new(cache: CacheContext, backend: Arc<dyn AstrologyBackend>) -> Self {
        Self { cache, backend }
    }

    pub fn cache(&self) -> &CacheContext {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<dyn AstrologyBackend> {
        &self.backend
    }

    /// Natal chart for `birth`, computed by the backend on a cache miss
    pub async fn natal_chart(&self, birth: &BirthData) -> Result<ChartData, FetchError> {
        self.natal_chart_for(birth, None).await
    }

    pub async fn transit_scores(
        &self,
        natal: &Value,
        transit: &Value,
    ) -> Result<Value, FetchError> {
        require_present("natal", natal)?;
        require_present("transit", transit)?;

        let (natal, transit) = (natal.clone(), transit.clone());
        let inputs = json!({"natal": natal, "transit": transit});
        self.fetch_value(
            Operation::Transit,
            &inputs,
            Arc::new(move |backend: Arc<dyn AstrologyBackend>| {
                let (natal, transit) = (natal.clone(), transit.clone());
                async move { backend.score_transit(&natal, &transit).await }.boxed()
            }),
        )
        .await
    }

    /// Synastry between two people
    pub async fn compatibility(&self, user_a: &Value, user_b: &Value) -> Result<Value, FetchError> {
        require_present("userA", user_a)?;
        require_present("userB", user_b)?;

        let inputs = json!({"userA": user_a, "userB": user_b});
        self.fetch_value(Operation::Compatibility, &inputs, compare_call(user_a, user_b))
            .await
    }

    /// AI-generated insights for a computed chart
    pub async fn ai_insights(&self, chart: &ChartData) -> Result<Value, FetchError> {
        chart.validate()?;

        let inputs = json!({"chartData": chart});
        let payload = inputs.clone();
        self.fetch_value(
            Operation::AiInsights,
            &inputs,
            Arc::new(move |backend: Arc<dyn AstrologyBackend>| {
                let payload = payload.clone();
                async move { backend.generate_reflections(&payload).await }.boxed()
            }),
        )
        .await
    }

    /// Reflections for a set of life-area scores
    pub async fn reflections(&self, scores: &Value) -> Result<Value, FetchError> {
        require_present("scores", scores)?;

        let payload = scores.clone();
        self.fetch_value(
            Operation::Reflections,
            scores,
            Arc::new(move |backend: Arc<dyn AstrologyBackend>| {
                let payload = payload.clone();
                async move { backend.generate_reflections(&payload).await }.boxed()
            }),
        )
        .await
    }

    /// Cached profile for `user_id`; profiles are never fetched
    pub fn user_profile(&self, user_id: &str) -> Option<UserProfile> {
        if user_id.trim().is_empty() {
            return None;
        }

        let profile = self.cache.manager().user_profile.get_user_profile(user_id)?;
        self.cache
            .set_query_data(Operation::UserProfile, user_id, &profile);
        Some(profile)
    }

    pub fn cache_user_profile(&self, profile: &UserProfile) -> CacheResult<()> {
        self.cache.manager().user_profile.cache_user_profile(profile)?;
        self.cache
            .set_query_data(Operation::UserProfile, profile.id.as_str(), profile);
        Ok(())
    }

    /// Record new birth data for `user_id` and compute its chart
    ///
    /// The cached profile is dropped rather than patched, so the next read
    /// sees whatever the profile store holds. Persistent-layer failures do
    /// not fail the submission.
    pub async fn submit_birth_data(
        &self,
        user_id: &str,
        birth: &BirthData,
    ) -> Result<ChartData, FetchError> {
        if user_id.trim().is_empty() {
            return Err(FetchError::Validation("user id is required".to_string()));
        }
        birth.validate()?;

        self.cache.invalidate(Operation::UserProfile, user_id);
        let chart = self.natal_chart_for(birth, Some(user_id)).await?;

        info!("Stored birth data for user {}", user_id);
        Ok(chart)
    }

    /// Drop every cached profile and chart belonging to `user_id`
    pub fn forget_user(&self, user_id: &str) -> usize {
        let profile = usize::from(self.cache.invalidate(Operation::UserProfile, user_id));
        let charts = self
            .cache
            .manager()
            .chart_data
            .clear_user_chart_data(user_id);
        // Natal queries are keyed by birth data, not owner
        self.cache
            .queries()
            .invalidate_operation(Operation::NatalChart);

        debug!("Forgot user {}: {} entries", user_id, profile + charts);
        profile + charts
    }

    /// Seed the query layer from whatever is cached for `user_id`
    pub fn warm_user_cache(&self, user_id: &str) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let data = cache.manager().preload_user_data(&user_id);
            if let Some(profile) = &data.profile {
                cache.set_query_data(Operation::UserProfile, user_id.as_str(), profile);
                if let (Some(birth), Some(chart)) = (&profile.birth_data, &data.chart_data) {
                    cache.set_query_data(Operation::NatalChart, birth, chart);
                }
            }
            info!("Cache warmed for user {}", user_id);
        })
    }

    /// Compute and cache the natal chart for `birth` in the background
    pub fn warm_astrology_cache(&self, birth: &BirthData) -> JoinHandle<()> {
        self.cache.prefetch(
            Operation::NatalChart,
            birth,
            QueryOptions::for_operation(Operation::NatalChart),
            self.natal_fetch(birth.clone(), None),
        )
    }

    /// Compute and cache the compatibility of two people in the background
    pub fn prefetch_compatibility(&self, user_a: &Value, user_b: &Value) -> JoinHandle<()> {
        let inputs = json!({"userA": user_a, "userB": user_b});
        self.cache.prefetch(
            Operation::Compatibility,
            &inputs,
            QueryOptions::for_operation(Operation::Compatibility),
            self.value_fetch(compare_call(user_a, user_b)),
        )
    }

    /// Backend health probe, never cached
    pub async fn health(&self) -> Result<Value, ApiError> {
        self.backend.health().await
    }

    async fn natal_chart_for(
        &self,
        birth: &BirthData,
        owner: Option<&str>,
    ) -> Result<ChartData, FetchError> {
        self.cache
            .get_or_fetch(
                Operation::NatalChart,
                birth,
                QueryOptions::for_operation(Operation::NatalChart),
                self.natal_fetch(birth.clone(), owner.map(str::to_string)),
            )
            .await
    }

    fn natal_fetch(
        &self,
        birth: BirthData,
        owner: Option<String>,
    ) -> impl FnMut() -> BoxFuture<'static, Result<ChartData, FetchError>> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let clock: Arc<dyn Clock> = Arc::clone(self.cache.clock());

        move || {
            let backend = Arc::clone(&backend);
            let clock = Arc::clone(&clock);
            let birth = birth.clone();
            let owner = owner.clone();

            async move {
                debug!("Scoring natal chart for {}", birth.date);
                let response = backend.score_natal(&birth).await?;
                let chart = chart_from_response(response, clock.now_ms(), owner.as_deref())?;
                Ok::<_, FetchError>(chart)
            }
            .boxed()
        }
    }

    fn value_fetch(
        &self,
        call: Arc<BackendCall>,
    ) -> impl FnMut() -> BoxFuture<'static, Result<Value, FetchError>> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        move || {
            let pending = call(Arc::clone(&backend));
            async move { pending.await.map_err(FetchError::from) }.boxed()
        }
    }

    async fn fetch_value(
        &self,
        operation: Operation,
        inputs: &Value,
        call: Arc<BackendCall>,
    ) -> Result<Value, FetchError> {
        self.cache
            .get_or_fetch(
                operation,
                inputs,
                QueryOptions::for_operation(operation),
                self.value_fetch(call),
            )
            .await
    }
}

fn compare_call(user_a: &Value, user_b: &Value) -> Arc<BackendCall> {
    let (user_a, user_b) = (user_a.clone(), user_b.clone());
    Arc::new(move |backend: Arc<dyn AstrologyBackend>| {
        let (user_a, user_b) = (user_a.clone(), user_b.clone());
        async move { backend.compare_users(&user_a, &user_b).await }.boxed()
    })
}

fn require_present(field: &str, value: &Value) -> Result<(), FetchError> {
    if value.is_null() {
        return Err(FetchError::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{ApiErrorKind, Result as ApiResult};
    use async_trait::async_trait;
    use eternal_cache::{
        CacheConfig, KvStore, ManualClock, MemoryStore, QueryKey, RetryPolicy,
    };
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const NOW_MS: u64 = 1_700_000_000_000;

    #[derive(Debug, Default)]
    struct FakeBackend {
        natal_calls: AtomicU32,
        compare_calls: AtomicU32,
        reflection_calls: AtomicU32,
        /// Number of natal calls that fail with a 503 before one succeeds
        natal_outages: AtomicU32,
        reject_natal: bool,
    }

    fn outage() -> ApiError {
        ApiError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: ApiErrorKind::ServerError,
            message: "ephemeris worker restarting".to_string(),
        }
    }

    #[async_trait]
    impl AstrologyBackend for FakeBackend {
        async fn score_natal(&self, _birth: &BirthData) -> ApiResult<Value> {
            self.natal_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_natal {
                return Err(ApiError::Status {
                    status: StatusCode::BAD_REQUEST,
                    kind: ApiErrorKind::ValidationError,
                    message: "Invalid date".to_string(),
                });
            }
            let remaining = self.natal_outages.load(Ordering::SeqCst);
            if remaining > 0 {
                self.natal_outages.store(remaining - 1, Ordering::SeqCst);
                return Err(outage());
            }
            Ok(json!({
                "planets": [{"name": "Sun", "longitude": 280.5, "sign": "Capricorn"}],
                "scores": {"career": 7.5, "love": 6.0}
            }))
        }

        async fn score_transit(&self, _natal: &Value, _transit: &Value) -> ApiResult<Value> {
            Ok(json!({"scores": {"career": 4.0}}))
        }

        async fn compare_users(&self, _user_a: &Value, _user_b: &Value) -> ApiResult<Value> {
            self.compare_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"score": 81}))
        }

        async fn generate_reflections(&self, _payload: &Value) -> ApiResult<Value> {
            self.reflection_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"reflections": ["Slow down this week"]}))
        }

        async fn health(&self) -> ApiResult<Value> {
            Ok(json!({"files": []}))
        }
    }

    fn service_with(
        backend: Arc<FakeBackend>,
        store: Arc<dyn KvStore>,
    ) -> AstrologyService {
        let retry = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            jitter: false,
            ..RetryPolicy::default()
        };
        let mut config = CacheConfig::default();
        config.query = config.query.with_retry(retry);

        let clock = Arc::new(ManualClock::new(NOW_MS));
        let cache = CacheContext::with_clock(config, store, clock)
            .expect("Test operation should succeed");
        AstrologyService::new(cache, backend)
    }

    fn service(backend: Arc<FakeBackend>) -> AstrologyService {
        service_with(backend, Arc::new(MemoryStore::new()))
    }

    fn birth() -> BirthData {
        BirthData::new("1990-01-01", "12:00:00", 22.5726, 88.3639, "+00:00")
    }

    #[tokio::test]
    async fn test_natal_chart_fetched_once() {
        let backend = Arc::new(FakeBackend::default());
        let service = service(backend.clone());

        let first = service
            .natal_chart(&birth())
            .await
            .expect("Test operation should succeed");
        let second = service
            .natal_chart(&birth())
            .await
            .expect("Test operation should succeed");

        assert_eq!(first, second);
        assert_eq!(first.user_id, "unknown");
        assert_eq!(first.calculated_at, NOW_MS);
        assert_eq!(first.planets[0].name, "Sun");
        assert_eq!(backend.natal_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_birth_data_skips_backend() {
        let backend = Arc::new(FakeBackend::default());
        let service = service(backend.clone());

        let bad = BirthData::new("1990-01-01", "12:00", 95.0, 0.0, "+00:00");
        let err = service
            .natal_chart(&bad)
            .await
            .expect_err("Test operation should fail");

        assert!(matches!(err, FetchError::Validation(_)));
        assert_eq!(backend.natal_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(FakeBackend::default());
        backend.natal_outages.store(2, Ordering::SeqCst);
        let service = service(backend.clone());

        service
            .natal_chart(&birth())
            .await
            .expect("Test operation should succeed");
        assert_eq!(backend.natal_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backend_validation_error_not_retried_or_cached() {
        let backend = Arc::new(FakeBackend {
            reject_natal: true,
            ..FakeBackend::default()
        });
        let service = service(backend.clone());

        for expected in 1..=2 {
            let err = service
                .natal_chart(&birth())
                .await
                .expect_err("Test operation should fail");
            assert_eq!(err, FetchError::Validation("Invalid date".to_string()));
            assert_eq!(backend.natal_calls.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn test_submit_birth_data_drops_stale_profile() {
        let backend = Arc::new(FakeBackend::default());
        let service = service(backend.clone());
        service
            .cache_user_profile(&UserProfile::new("u1"))
            .expect("Test operation should succeed");
        assert!(service.user_profile("u1").is_some());

        let chart = service
            .submit_birth_data("u1", &birth())
            .await
            .expect("Test operation should succeed");

        assert_eq!(chart.user_id, "u1");
        assert_eq!(service.user_profile("u1"), None);
    }

    #[tokio::test]
    async fn test_submit_survives_full_storage() {
        let backend = Arc::new(FakeBackend::default());
        let service = service_with(backend, Arc::new(MemoryStore::with_quota(16)));

        let chart = service
            .submit_birth_data("u1", &birth())
            .await
            .expect("Test operation should succeed");

        assert_eq!(
            service.cache().manager().chart_data.get_chart_data(&birth()),
            Some(chart)
        );
        assert_eq!(service.cache().manager().persistent().len(), 0);
    }

    #[tokio::test]
    async fn test_prefetched_compatibility_is_served_from_cache() {
        let backend = Arc::new(FakeBackend::default());
        let service = service(backend.clone());
        let (a, b) = (json!({"date": "1990-01-01"}), json!({"date": "1992-02-02"}));

        service
            .prefetch_compatibility(&a, &b)
            .await
            .expect("Test operation should succeed");
        let result = service
            .compatibility(&a, &b)
            .await
            .expect("Test operation should succeed");

        assert_eq!(result, json!({"score": 81}));
        assert_eq!(backend.compare_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reflections_require_scores() {
        let backend = Arc::new(FakeBackend::default());
        let service = service(backend.clone());

        let err = service
            .reflections(&Value::Null)
            .await
            .expect_err("Test operation should fail");
        assert!(matches!(err, FetchError::Validation(_)));

        let scores = json!([{"lifeArea": "career", "score": 7.5}]);
        service
            .reflections(&scores)
            .await
            .expect("Test operation should succeed");
        service
            .reflections(&scores)
            .await
            .expect("Test operation should succeed");
        assert_eq!(backend.reflection_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_warm_user_cache_seeds_queries() {
        let backend = Arc::new(FakeBackend::default());
        let service = service(backend.clone());
        let chart = service
            .natal_chart(&birth())
            .await
            .expect("Test operation should succeed");
        service.cache().queries().clear();

        service
            .cache()
            .manager()
            .cache_user_data(
                &UserProfile::new("u1").with_birth_data(birth()),
                Some(&chart),
            )
            .expect("Test operation should succeed");

        service
            .warm_user_cache("u1")
            .await
            .expect("Test operation should succeed");

        let birth_value = serde_json::to_value(birth()).expect("Test operation should succeed");
        let key = QueryKey::new(Operation::NatalChart, &birth_value);
        assert!(service.cache().queries().get_query_data(&key).is_some());
        assert!(
            service
                .cache()
                .queries()
                .get_query_data(&QueryKey::new(Operation::UserProfile, &json!("u1")))
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_forget_user_removes_profile_and_charts() {
        let backend = Arc::new(FakeBackend::default());
        let service = service(backend.clone());
        service
            .cache_user_profile(&UserProfile::new("u1"))
            .expect("Test operation should succeed");
        service
            .submit_birth_data("u1", &birth())
            .await
            .expect("Test operation should succeed");

        // Chart in memory and persisted
        assert_eq!(service.forget_user("u1"), 2);
        assert_eq!(
            service.cache().manager().chart_data.get_chart_data(&birth()),
            None
        );

        service
            .natal_chart(&birth())
            .await
            .expect("Test operation should succeed");
        assert_eq!(backend.natal_calls.load(Ordering::SeqCst), 2);
    }
}
