//! Seam between the service and whatever answers its requests

use async_trait::async_trait;
use eternal_cache::BirthData;
use serde_json::Value;
use std::fmt;

use crate::client::AstrologyClient;
use crate::error::Result;

/// Calls the service makes against the astrology backend
#[async_trait]
pub trait AstrologyBackend: Send + Sync + fmt::Debug {
    async fn score_natal(&self, birth: &BirthData) -> Result<Value>;

    async fn score_transit(&self, natal: &Value, transit: &Value) -> Result<Value>;

    async fn compare_users(&self, user_a: &Value, user_b: &Value) -> Result<Value>;

    async fn generate_reflections(&self, payload: &Value) -> Result<Value>;

    async fn health(&self) -> Result<Value>;
}

#[async_trait]
impl AstrologyBackend for AstrologyClient {
    async fn score_natal(&self, birth: &BirthData) -> Result<Value> {
        Self::score_natal(self, birth).await
    }

    async fn score_transit(&self, natal: &Value, transit: &Value) -> Result<Value> {
        Self::score_transit(self, natal, transit).await
    }

    async fn compare_users(&self, user_a: &Value, user_b: &Value) -> Result<Value> {
        Self::compare_users(self, user_a, user_b).await
    }

    async fn generate_reflections(&self, payload: &Value) -> Result<Value> {
        Self::generate_reflections(self, payload).await
    }

    async fn health(&self) -> Result<Value> {
        Self::health(self).await
    }
}
