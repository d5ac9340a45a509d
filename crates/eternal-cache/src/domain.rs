//! Domain caches: charts, user profiles and raw API responses
//!
//! Each cache owns a bounded in-memory layer and shares the persistent
//! layer. Reads check memory first. A persistent hit re-warms memory with
//! the cache's re-warm TTL. Writes go to memory and, when the policy has
//! a durable TTL, to the persistent layer.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{
    clock::Clock,
    config::MemoryCacheConfig,
    error::{CacheError, CacheResult},
    key::{ApiKey, CHART_KEY_PREFIX, ChartKey, ProfileKey},
    memory_cache::MemoryCache,
    model::{BirthData, ChartData, UserProfile, ValidationError},
    operation::{Operation, TtlPolicy, is_expensive_endpoint},
    persistent_cache::PersistentCache,
    stats::MemoryStats,
};

/// Fast-layer TTL for API responses when the caller does not pick one
pub const API_DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
/// Persistent TTL for responses from expensive endpoints
pub const API_DURABLE_TTL: Duration = Duration::from_secs(2 * 3600);

type Validator<V> = fn(&V) -> Result<(), ValidationError>;

/// Memory layer in front of the shared persistent layer
#[derive(Debug)]
struct Layered<V> {
    memory: MemoryCache<V>,
    persistent: Arc<PersistentCache>,
    rewarm_ttl: Duration,
    validator: Option<Validator<V>>,
}

impl<V: Clone + Serialize + DeserializeOwned> Layered<V> {
    fn new(
        config: &MemoryCacheConfig,
        persistent: Arc<PersistentCache>,
        clock: Arc<dyn Clock>,
        rewarm_ttl: Duration,
        validator: Option<Validator<V>>,
    ) -> CacheResult<Self> {
        Ok(Self {
            memory: MemoryCache::new(config.clone(), clock)?,
            persistent,
            rewarm_ttl,
            validator,
        })
    }

    fn check(&self, value: &V) -> CacheResult<()> {
        match self.validator {
            Some(validate) => validate(value).map_err(|e| CacheError::InvalidPayload(e.to_string())),
            None => Ok(()),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            return Some(value);
        }

        let value: V = self.persistent.get(key)?;
        if let Err(e) = self.check(&value) {
            debug!("Dropping persisted '{}': {}", key, e);
            self.persistent.delete(key);
            return None;
        }

        self.memory.set(key, value.clone(), Some(self.rewarm_ttl));
        Some(value)
    }

    fn put(&self, key: &str, value: V, policy: TtlPolicy) -> CacheResult<()> {
        self.check(&value)?;

        self.memory.set(key, value.clone(), Some(policy.fast));
        if let Some(durable) = policy.durable {
            self.persistent.set(key, &value, Some(durable));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> bool {
        let in_memory = self.memory.remove(key);
        let persisted = self.persistent.delete(key);
        in_memory || persisted
    }
}

/// Charts keyed by the birth data they were computed from
#[derive(Debug)]
pub struct ChartDataCache {
    layers: Layered<ChartData>,
    policy: TtlPolicy,
}

impl ChartDataCache {
    pub fn new(
        config: &MemoryCacheConfig,
        persistent: Arc<PersistentCache>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        let policy = Operation::NatalChart.ttl_policy();
        Ok(Self {
            layers: Layered::new(
                config,
                persistent,
                clock,
                policy.fast,
                Some(ChartData::validate),
            )?,
            policy,
        })
    }

    /// Cache `chart` under the key derived from `birth`
    pub fn cache_chart_data(&self, birth: &BirthData, chart: &ChartData) -> CacheResult<()> {
        birth
            .validate()
            .map_err(|e| CacheError::InvalidPayload(e.to_string()))?;
        self.layers
            .put(ChartKey::new(birth).as_cache_key(), chart.clone(), self.policy)
    }

    pub fn get_chart_data(&self, birth: &BirthData) -> Option<ChartData> {
        self.layers.get(ChartKey::new(birth).as_cache_key())
    }

    pub fn remove_chart_data(&self, birth: &BirthData) -> bool {
        self.layers.remove(ChartKey::new(birth).as_cache_key())
    }

    /// Remove every chart owned by `user_id` from both layers
    pub fn clear_user_chart_data(&self, user_id: &str) -> usize {
        if user_id.is_empty() {
            return 0;
        }

        let mut removed = self.layers.memory.retain(|key, entry| {
            !(key.starts_with(CHART_KEY_PREFIX) && entry.value.user_id == user_id)
        });

        let persistent = &self.layers.persistent;
        for key in persistent.keys() {
            if !key.starts_with(CHART_KEY_PREFIX) {
                continue;
            }
            let owned = persistent
                .get::<ChartData>(&key)
                .is_some_and(|chart| chart.user_id == user_id);
            if owned && persistent.delete(&key) {
                removed += 1;
            }
        }

        removed
    }

    pub(crate) fn clear_memory(&self) {
        self.layers.memory.clear();
    }

    pub fn stats(&self) -> MemoryStats {
        self.layers.memory.stats()
    }
}

/// User profiles keyed by user id
#[derive(Debug)]
pub struct UserProfileCache {
    layers: Layered<UserProfile>,
    policy: TtlPolicy,
}

impl UserProfileCache {
    pub fn new(
        config: &MemoryCacheConfig,
        persistent: Arc<PersistentCache>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        let policy = Operation::UserProfile.ttl_policy();
        Ok(Self {
            layers: Layered::new(
                config,
                persistent,
                clock,
                policy.fast,
                Some(UserProfile::validate),
            )?,
            policy,
        })
    }

    pub fn cache_user_profile(&self, profile: &UserProfile) -> CacheResult<()> {
        let key = ProfileKey::new(profile.id.as_str());
        self.layers
            .put(key.as_cache_key(), profile.clone(), self.policy)
    }

    pub fn get_user_profile(&self, user_id: &str) -> Option<UserProfile> {
        self.layers.get(ProfileKey::new(user_id).as_cache_key())
    }

    /// Remove the profile for `user_id` only
    pub fn clear_user_profile(&self, user_id: &str) -> bool {
        self.layers.remove(ProfileKey::new(user_id).as_cache_key())
    }

    pub(crate) fn clear_memory(&self) {
        self.layers.memory.clear();
    }

    pub fn stats(&self) -> MemoryStats {
        self.layers.memory.stats()
    }
}

fn reject_null(value: &Value) -> Result<(), ValidationError> {
    if value.is_null() {
        Err(ValidationError {
            field: "response",
            reason: "null responses are not cached".to_string(),
        })
    } else {
        Ok(())
    }
}

/// Raw backend responses keyed by endpoint and parameters
///
/// Only expensive endpoints reach the persistent layer.
#[derive(Debug)]
pub struct ApiResponseCache {
    layers: Layered<Value>,
}

impl ApiResponseCache {
    pub fn new(
        config: &MemoryCacheConfig,
        persistent: Arc<PersistentCache>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        Ok(Self {
            layers: Layered::new(config, persistent, clock, API_DEFAULT_TTL, Some(reject_null))?,
        })
    }

    pub fn generate_key(endpoint: &str, params: &Value) -> ApiKey {
        ApiKey::new(endpoint, params)
    }

    /// Cache `response`; `ttl` overrides the fast-layer TTL
    pub fn cache_api_response(
        &self,
        endpoint: &str,
        params: &Value,
        response: &Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let policy = TtlPolicy {
            fast: ttl.unwrap_or(API_DEFAULT_TTL),
            durable: is_expensive_endpoint(endpoint).then_some(API_DURABLE_TTL),
        };
        let key = Self::generate_key(endpoint, params);
        self.layers.put(key.as_cache_key(), response.clone(), policy)
    }

    pub fn get_api_response(&self, endpoint: &str, params: &Value) -> Option<Value> {
        self.layers
            .get(Self::generate_key(endpoint, params).as_cache_key())
    }

    pub fn remove_api_response(&self, endpoint: &str, params: &Value) -> bool {
        self.layers
            .remove(Self::generate_key(endpoint, params).as_cache_key())
    }

    pub(crate) fn clear_memory(&self) {
        self.layers.memory.clear();
    }

    pub fn stats(&self) -> MemoryStats {
        self.layers.memory.stats()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PersistentCacheConfig;
    use crate::model::tests::{sample_birth, sample_chart};
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Fixture {
        clock: Arc<ManualClock>,
        persistent: Arc<PersistentCache>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::over(MemoryStore::new())
        }

        fn over(store: MemoryStore) -> Self {
            let clock = Arc::new(ManualClock::new(1_700_000_000_000));
            let persistent = Arc::new(
                PersistentCache::new(
                    Arc::new(store),
                    PersistentCacheConfig::default(),
                    clock.clone(),
                )
                .expect("Test operation should succeed"),
            );
            Self { clock, persistent }
        }

        fn charts(&self) -> ChartDataCache {
            ChartDataCache::new(
                &MemoryCacheConfig::default(),
                self.persistent.clone(),
                self.clock.clone(),
            )
            .expect("Test operation should succeed")
        }

        fn profiles(&self) -> UserProfileCache {
            UserProfileCache::new(
                &MemoryCacheConfig::default(),
                self.persistent.clone(),
                self.clock.clone(),
            )
            .expect("Test operation should succeed")
        }

        fn api(&self) -> ApiResponseCache {
            ApiResponseCache::new(
                &MemoryCacheConfig::default(),
                self.persistent.clone(),
                self.clock.clone(),
            )
            .expect("Test operation should succeed")
        }
    }

    #[test]
    fn test_chart_roundtrip() {
        let fx = Fixture::new();
        let charts = fx.charts();
        let birth = sample_birth();

        charts
            .cache_chart_data(&birth, &sample_chart("u1"))
            .expect("Test operation should succeed");
        assert_eq!(charts.get_chart_data(&birth), Some(sample_chart("u1")));
        assert_eq!(fx.persistent.len(), 1);
    }

    #[test]
    fn test_chart_rewarms_from_persistent() {
        let fx = Fixture::new();
        let birth = sample_birth();
        fx.charts()
            .cache_chart_data(&birth, &sample_chart("u1"))
            .expect("Test operation should succeed");

        // Fresh cache shares only the persistent layer
        let charts = fx.charts();
        assert_eq!(charts.stats().size, 0);
        assert_eq!(charts.get_chart_data(&birth), Some(sample_chart("u1")));
        assert_eq!(charts.stats().size, 1);
    }

    #[test]
    fn test_chart_reaches_memory_when_store_is_full() {
        let fx = Fixture::over(MemoryStore::with_quota(0));
        let charts = fx.charts();
        let birth = sample_birth();

        charts
            .cache_chart_data(&birth, &sample_chart("u1"))
            .expect("Test operation should succeed");

        assert_eq!(charts.stats().size, 1);
        assert!(fx.persistent.is_empty());
        assert_eq!(fx.persistent.counters().write_failure_count, 1);
        assert_eq!(charts.get_chart_data(&birth), Some(sample_chart("u1")));
    }

    #[test]
    fn test_chart_memory_expires_before_persistent() {
        let fx = Fixture::new();
        let charts = fx.charts();
        let birth = sample_birth();
        charts
            .cache_chart_data(&birth, &sample_chart("u1"))
            .expect("Test operation should succeed");

        fx.clock.advance(Duration::from_secs(31 * 60));
        assert!(charts.get_chart_data(&birth).is_some());
        assert_eq!(charts.stats().counters.expiration_count, 1);

        fx.clock.advance(Duration::from_secs(8 * 24 * 3600));
        assert!(charts.get_chart_data(&birth).is_none());
        assert!(fx.persistent.is_empty());
    }

    #[test]
    fn test_invalid_chart_rejected() {
        let fx = Fixture::new();
        let charts = fx.charts();
        let mut chart = sample_chart("u1");
        chart.planets.clear();
        chart.scores.clear();

        let result = charts.cache_chart_data(&sample_birth(), &chart);
        assert!(matches!(result, Err(CacheError::InvalidPayload(_))));
        assert!(charts.get_chart_data(&sample_birth()).is_none());

        let bad_birth = BirthData::new("1990-01-01", "99:00", 0.0, 0.0, "+00:00");
        assert!(charts.cache_chart_data(&bad_birth, &sample_chart("u1")).is_err());
    }

    #[test]
    fn test_remove_chart_data() {
        let fx = Fixture::new();
        let charts = fx.charts();
        let birth = sample_birth();
        charts
            .cache_chart_data(&birth, &sample_chart("u1"))
            .expect("Test operation should succeed");

        assert!(charts.remove_chart_data(&birth));
        assert!(charts.get_chart_data(&birth).is_none());
        assert!(!charts.remove_chart_data(&birth));
    }

    #[test]
    fn test_clear_user_chart_data_scans_both_layers() {
        let fx = Fixture::new();
        let charts = fx.charts();
        let mine = sample_birth();
        let other = BirthData::new("1985-05-05", "08:15", -33.8688, 151.2093, "+10:00");
        let also_mine = BirthData::new("2001-09-09", "23:59", 51.5, -0.1276, "+01:00");

        charts
            .cache_chart_data(&mine, &sample_chart("u1"))
            .expect("Test operation should succeed");
        charts
            .cache_chart_data(&other, &sample_chart("u2"))
            .expect("Test operation should succeed");

        // Only in the persistent layer
        fx.charts()
            .cache_chart_data(&also_mine, &sample_chart("u1"))
            .expect("Test operation should succeed");

        let removed = charts.clear_user_chart_data("u1");
        assert_eq!(removed, 3);
        assert!(charts.get_chart_data(&mine).is_none());
        assert!(charts.get_chart_data(&also_mine).is_none());
        assert!(charts.get_chart_data(&other).is_some());
        assert_eq!(charts.clear_user_chart_data(""), 0);
    }

    #[test]
    fn test_profile_roundtrip_and_clear() {
        let fx = Fixture::new();
        let profiles = fx.profiles();
        let profile = UserProfile::new("u1").with_birth_data(sample_birth());

        profiles
            .cache_user_profile(&profile)
            .expect("Test operation should succeed");
        profiles
            .cache_user_profile(&UserProfile::new("u2"))
            .expect("Test operation should succeed");
        assert_eq!(profiles.get_user_profile("u1"), Some(profile));

        assert!(profiles.clear_user_profile("u1"));
        assert!(profiles.get_user_profile("u1").is_none());
        assert!(profiles.get_user_profile("u2").is_some());
    }

    #[test]
    fn test_profile_persists_thirty_days() {
        let fx = Fixture::new();
        fx.profiles()
            .cache_user_profile(&UserProfile::new("u1"))
            .expect("Test operation should succeed");

        fx.clock.advance(Duration::from_secs(29 * 24 * 3600));
        assert!(fx.profiles().get_user_profile("u1").is_some());

        fx.clock.advance(Duration::from_secs(2 * 24 * 3600));
        assert!(fx.profiles().get_user_profile("u1").is_none());
    }

    #[test]
    fn test_api_persists_only_expensive_endpoints() {
        let fx = Fixture::new();
        let api = fx.api();
        let params = json!({"date": "1990-01-01"});

        api.cache_api_response("/score-transit", &params, &json!({"score": 1}), None)
            .expect("Test operation should succeed");
        assert!(fx.persistent.is_empty());

        api.cache_api_response("/score-natal", &params, &json!({"score": 2}), None)
            .expect("Test operation should succeed");
        assert_eq!(fx.persistent.len(), 1);

        let fresh = fx.api();
        assert!(fresh.get_api_response("/score-transit", &params).is_none());
        assert_eq!(
            fresh.get_api_response("/score-natal", &params),
            Some(json!({"score": 2}))
        );
    }

    #[test]
    fn test_api_ttl_and_null_rejection() {
        let fx = Fixture::new();
        let api = fx.api();
        let params = json!({"a": 1});

        api.cache_api_response(
            "/compare-users",
            &params,
            &json!([1, 2]),
            Some(Duration::from_secs(60)),
        )
        .expect("Test operation should succeed");
        fx.clock.advance(Duration::from_secs(61));
        assert!(api.get_api_response("/compare-users", &params).is_none());

        assert!(
            api.cache_api_response("/compare-users", &params, &Value::Null, None)
                .is_err()
        );
    }

    #[test]
    fn test_remove_api_response() {
        let fx = Fixture::new();
        let api = fx.api();
        let params = json!({"a": 1});
        api.cache_api_response("/generate-reflections", &params, &json!("text"), None)
            .expect("Test operation should succeed");

        assert!(api.remove_api_response("/generate-reflections", &params));
        assert!(api.get_api_response("/generate-reflections", &params).is_none());
        assert!(fx.persistent.is_empty());
    }
}
