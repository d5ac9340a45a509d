//! Service behaviour against a mocked HTTP backend

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use eternal_api::{ApiConfig, AstrologyClient, AstrologyService};
use eternal_cache::{
    BirthData, CacheConfig, CacheContext, FetchError, MemoryStore, NetworkMode, RetryPolicy,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_for(server: &MockServer) -> AstrologyService {
    let client =
        AstrologyClient::new(ApiConfig::new(server.uri())).expect("Test operation should succeed");

    let retry = RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        jitter: false,
        ..RetryPolicy::default()
    };
    let mut config = CacheConfig::default();
    config.query = config.query.with_retry(retry);

    let cache = CacheContext::new(config, Arc::new(MemoryStore::new()))
        .expect("Test operation should succeed");
    AstrologyService::new(cache, Arc::new(client))
}

fn birth() -> BirthData {
    BirthData::new("1985-07-13", "06:45", -33.8688, 151.2093, "+10:00")
}

#[tokio::test]
async fn test_natal_chart_hits_backend_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/score-natal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "planets": [{"name": "Moon", "longitude": 101.3}],
            "userId": "u7"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server);
    for _ in 0..3 {
        let chart = service
            .natal_chart(&birth())
            .await
            .expect("Test operation should succeed");
        assert_eq!(chart.user_id, "u7");
    }
}

#[tokio::test]
async fn test_server_errors_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compare-users"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "Service Unavailable",
            "type": "server_error"
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/compare-users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 55})))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server);
    let result = service
        .compatibility(&json!({"date": "1990-01-01"}), &json!({"date": "1991-01-01"}))
        .await
        .expect("Test operation should succeed");

    assert_eq!(result, json!({"score": 55}));
}

#[tokio::test]
async fn test_unauthorized_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate-reflections"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server);
    let err = service
        .reflections(&json!([{"lifeArea": "love", "score": 3.0}]))
        .await
        .expect_err("Test operation should fail");

    assert_eq!(err, FetchError::Unauthorized { status: 401 });
}

#[tokio::test]
async fn test_offline_miss_never_calls_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/score-transit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"scores": {}})))
        .expect(0)
        .mount(&server)
        .await;

    let service = service_for(&server);
    service.cache().set_network_mode(NetworkMode::Offline);

    let err = service
        .transit_scores(&json!({"date": "1990-01-01"}), &json!({"date": "2025-01-01"}))
        .await
        .expect_err("Test operation should fail");
    assert!(matches!(err, FetchError::Offline(_)));
}
