//! End-to-end cache scenarios through the public API

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use eternal_cache::{
    BirthData, CacheConfig, CacheContext, CacheManager, ChartData, FetchError, FileStore,
    KvStore, ManualClock, MemoryStore, NetworkMode, Operation, PersistentCacheConfig,
    PlanetPosition, QueryOptions, RetryPolicy, UserProfile,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

const START_MS: u64 = 1_700_000_000_000;

fn birth() -> BirthData {
    BirthData::new("1990-01-01", "12:00", 22.5726, 88.3639, "+05:30")
}

fn chart(user_id: &str) -> ChartData {
    ChartData {
        planets: vec![PlanetPosition {
            name: "Moon".to_string(),
            longitude: 12.25,
            latitude: Some(-4.1),
            speed: Some(13.2),
            sign: Some("Aries".to_string()),
            house: Some(3),
            retrograde: false,
        }],
        scores: BTreeMap::from([("love".to_string(), 6.0), ("career".to_string(), 8.5)]),
        insights: vec![],
        calculated_at: START_MS,
        user_id: user_id.to_string(),
    }
}

fn fast_config() -> CacheConfig {
    let retry = RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        jitter: false,
        ..RetryPolicy::default()
    };
    let mut config = CacheConfig::default();
    config.query = config.query.with_retry(retry);
    config
}

fn context_over(store: Arc<dyn KvStore>) -> (CacheContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let context = CacheContext::with_clock(fast_config(), store, clock.clone())
        .expect("Test operation should succeed");
    (context, clock)
}

#[tokio::test]
async fn test_natal_chart_miss_then_hit() {
    let (context, _) = context_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let counter = calls.clone();
        let result: ChartData = context
            .get_or_fetch(
                Operation::NatalChart,
                &birth(),
                QueryOptions::for_operation(Operation::NatalChart),
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(chart("u1")) }
                },
            )
            .await
            .expect("Test operation should succeed");
        assert_eq!(result, chart("u1"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        context.manager().chart_data.get_chart_data(&birth()),
        Some(chart("u1"))
    );
}

#[tokio::test]
async fn test_invalid_birth_data_never_reaches_backend() {
    let (context, _) = context_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let bad = BirthData::new("1990-02-30", "12:00", 22.5, 88.3, "+05:30");
    let result: Result<ChartData, _> = context
        .get_or_fetch(
            Operation::NatalChart,
            &bad,
            QueryOptions::for_operation(Operation::NatalChart),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(chart("u1")) }
            },
        )
        .await;

    assert!(matches!(result, Err(FetchError::Validation(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_chart_expires_after_durable_ttl() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let manager = CacheManager::new(
        &CacheConfig::default(),
        Arc::new(MemoryStore::new()),
        clock.clone(),
    )
    .expect("Test operation should succeed");

    manager
        .chart_data
        .cache_chart_data(&birth(), &chart("u1"))
        .expect("Test operation should succeed");

    // Past the memory lifetime the persistent copy still answers
    clock.advance(Duration::from_secs(2 * 3600));
    assert_eq!(manager.chart_data.get_chart_data(&birth()), Some(chart("u1")));

    clock.advance(Duration::from_secs(8 * 24 * 3600));
    assert_eq!(manager.chart_data.get_chart_data(&birth()), None);
    assert_eq!(manager.persistent().len(), 0);
}

#[test]
fn test_schema_version_change_discards_entries() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START_MS));

    let old = CacheManager::new(&CacheConfig::default(), store.clone(), clock.clone())
        .expect("Test operation should succeed");
    old.user_profile
        .cache_user_profile(&UserProfile::new("u1"))
        .expect("Test operation should succeed");

    let config = CacheConfig::default()
        .with_persistent(PersistentCacheConfig::default().with_schema_version("2.0.0"));
    let upgraded = CacheManager::new(&config, store, clock)
        .expect("Test operation should succeed");

    assert_eq!(upgraded.user_profile.get_user_profile("u1"), None);
    assert_eq!(upgraded.persistent().len(), 0);
}

#[test]
fn test_quota_exhaustion_keeps_memory_layer_working() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let manager = CacheManager::new(
        &CacheConfig::default(),
        Arc::new(MemoryStore::with_quota(64)),
        clock,
    )
    .expect("Test operation should succeed");

    manager
        .chart_data
        .cache_chart_data(&birth(), &chart("u1"))
        .expect("Test operation should succeed");

    assert_eq!(manager.chart_data.get_chart_data(&birth()), Some(chart("u1")));
    assert_eq!(manager.persistent().len(), 0);
    assert_eq!(manager.stats().persistent.write_failure_count, 1);
}

#[test]
fn test_entries_survive_restart_on_disk() {
    let dir = TempDir::new().expect("Test operation should succeed");
    let clock = Arc::new(ManualClock::new(START_MS));
    let profile = UserProfile::new("u1").with_birth_data(birth());

    {
        let store = Arc::new(FileStore::new(dir.path()).expect("Test operation should succeed"));
        let manager = CacheManager::new(&CacheConfig::default(), store, clock.clone())
            .expect("Test operation should succeed");
        manager
            .cache_user_data(&profile, Some(&chart("u1")))
            .expect("Test operation should succeed");
    }

    let store = Arc::new(FileStore::new(dir.path()).expect("Test operation should succeed"));
    let manager = CacheManager::new(&CacheConfig::default(), store, clock)
        .expect("Test operation should succeed");

    let data = manager.get_user_data("u1");
    assert_eq!(data.profile, Some(profile));
    assert_eq!(data.chart_data, Some(chart("u1")));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_fetch() {
    let (context, _) = context_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicU32::new(0));
    let params = json!({"date": "2024-05-01", "userId": "u1"});

    let callers = (0..5).map(|_| {
        let context = context.clone();
        let params = params.clone();
        let counter = calls.clone();
        tokio::spawn(async move {
            context
                .get_or_fetch::<Value, _, _, _>(
                    Operation::Transit,
                    &params,
                    QueryOptions::for_operation(Operation::Transit),
                    move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(json!({"scores": {"career": 5}}))
                        }
                    },
                )
                .await
        })
    });

    for caller in futures::future::join_all(callers).await {
        let value = caller
            .expect("Test operation should succeed")
            .expect("Test operation should succeed");
        assert_eq!(value, json!({"scores": {"career": 5}}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

fn counted_chart_fetch(
    calls: &Arc<AtomicU32>,
) -> impl FnMut() -> futures::future::BoxFuture<'static, Result<ChartData, FetchError>>
+ Send
+ 'static {
    let counter = calls.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(chart("u1"))
        })
    }
}

#[tokio::test]
async fn test_expired_chart_refetched_once_for_simultaneous_callers() {
    let (context, clock) = context_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicU32::new(0));
    let options = QueryOptions::for_operation(Operation::NatalChart);

    let first: ChartData = context
        .get_or_fetch(
            Operation::NatalChart,
            &birth(),
            options.clone(),
            counted_chart_fetch(&calls),
        )
        .await
        .expect("Test operation should succeed");
    assert_eq!(first, chart("u1"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Past the 7 day durable TTL, and so past every stale time too
    clock.advance(Duration::from_secs(8 * 24 * 3600));

    let birth_a = birth();
    let birth_b = birth();
    let (a, b) = tokio::join!(
        context.get_or_fetch::<ChartData, _, _, _>(
            Operation::NatalChart,
            &birth_a,
            options.clone(),
            counted_chart_fetch(&calls),
        ),
        context.get_or_fetch::<ChartData, _, _, _>(
            Operation::NatalChart,
            &birth_b,
            options,
            counted_chart_fetch(&calls),
        ),
    );

    assert_eq!(a.expect("Test operation should succeed"), chart("u1"));
    assert_eq!(b.expect("Test operation should succeed"), chart("u1"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_offline_serves_cache_and_fails_fast_on_miss() {
    let (context, _) = context_over(Arc::new(MemoryStore::new()));
    let params = json!({"userA": "u1", "userB": "u2"});

    let first: Value = context
        .get_or_fetch(
            Operation::Compatibility,
            &params,
            QueryOptions::for_operation(Operation::Compatibility),
            || async { Ok(json!({"score": 72})) },
        )
        .await
        .expect("Test operation should succeed");
    assert_eq!(first, json!({"score": 72}));

    context.set_network_mode(NetworkMode::Offline);

    let cached: Value = context
        .get_or_fetch(
            Operation::Compatibility,
            &params,
            QueryOptions::for_operation(Operation::Compatibility),
            || async { Err(FetchError::Network("unreachable".to_string())) },
        )
        .await
        .expect("Test operation should succeed");
    assert_eq!(cached, first);

    let miss: Result<Value, _> = context
        .get_or_fetch(
            Operation::Compatibility,
            &json!({"userA": "u1", "userB": "u3"}),
            QueryOptions::for_operation(Operation::Compatibility),
            || async { Ok(json!({"score": 1})) },
        )
        .await;
    assert!(matches!(miss, Err(FetchError::Offline(_))));
}

#[tokio::test]
async fn test_clear_all_forces_refetch() {
    let (context, _) = context_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicU32::new(0));
    let params = json!({"userId": "u1", "lifeArea": "career"});

    for expected_calls in [1, 1, 2] {
        if expected_calls == 2 {
            context.clear_all();
        }
        let counter = calls.clone();
        let _: Value = context
            .get_or_fetch(
                Operation::Reflections,
                &params,
                QueryOptions::for_operation(Operation::Reflections),
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(json!({"reflections": ["Breathe"]})) }
                },
            )
            .await
            .expect("Test operation should succeed");
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
    }

    assert_eq!(context.stats().cache.api_response.size, 1);
}
