//! HTTP client for the astrology backend

use eternal_cache::BirthData;
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{ApiError, Result};
use crate::transport::build_http_client;
use crate::types::{CompareRequest, NatalRequest, TransitRequest};

/// JSON-over-HTTP client for the scoring and reflection endpoints
#[derive(Debug, Clone)]
pub struct AstrologyClient {
    http: Client,
    config: ApiConfig,
}

impl AstrologyClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate().map_err(ApiError::InvalidConfiguration)?;
        let http = build_http_client(&config)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Score the natal chart for `birth`
    pub async fn score_natal(&self, birth: &BirthData) -> Result<Value> {
        self.post(&self.config.endpoints.natal_chart, &NatalRequest::from(birth))
            .await
    }

    /// Generate reflections; the payload is sent as-is
    pub async fn generate_reflections(&self, payload: &Value) -> Result<Value> {
        self.post(&self.config.endpoints.reflections, payload).await
    }

    pub async fn score_transit(&self, natal: &Value, transit: &Value) -> Result<Value> {
        self.post(
            &self.config.endpoints.transit,
            &TransitRequest { natal, transit },
        )
        .await
    }

    pub async fn compare_users(&self, user_a: &Value, user_b: &Value) -> Result<Value> {
        self.post(
            &self.config.endpoints.compatibility,
            &CompareRequest { user_a, user_b },
        )
        .await
    }

    /// Probe the backend; it lists its ephemeris files when healthy
    pub async fn health(&self) -> Result<Value> {
        let url = self.config.url_for(&self.config.endpoints.health);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        Self::handle_response(response).await
    }

    async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value> {
        let url = self.config.url_for(endpoint);
        let body =
            serde_json::to_vec(body).map_err(|e| ApiError::Parse(format!("request body: {e}")))?;
        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(ApiError::from_response(status, &body));
        }
        if status == StatusCode::NO_CONTENT || body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::Parse(format!("response body: {e}")))
    }
}
