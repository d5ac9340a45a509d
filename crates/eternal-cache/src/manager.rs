//! Facade over the domain caches
#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    clock::Clock,
    config::CacheConfig,
    domain::{ApiResponseCache, ChartDataCache, UserProfileCache},
    error::{CacheError, CacheResult},
    model::{ChartData, UserProfile},
    persistent_cache::PersistentCache,
    stats::CacheStats,
    traits::KvStore,
};

/// A user's cached profile and, when known, their natal chart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub profile: Option<UserProfile>,
    pub chart_data: Option<ChartData>,
}

/// Owns the three domain caches and the persistent layer they share
#[derive(Debug)]
pub struct CacheManager {
    pub chart_data: ChartDataCache,
    pub user_profile: UserProfileCache,
    pub api_response: ApiResponseCache,
    persistent: Arc<PersistentCache>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(
        config: &CacheConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        let persistent = Arc::new(PersistentCache::new(
            store,
            config.persistent.clone(),
            clock.clone(),
        )?);

        Ok(Self {
            chart_data: ChartDataCache::new(&config.memory, persistent.clone(), clock.clone())?,
            user_profile: UserProfileCache::new(&config.memory, persistent.clone(), clock.clone())?,
            api_response: ApiResponseCache::new(&config.memory, persistent.clone(), clock.clone())?,
            persistent,
            clock,
        })
    }

    pub fn persistent(&self) -> &PersistentCache {
        &self.persistent
    }

    /// Cache a profile and, when the profile carries birth data, its chart
    pub fn cache_user_data(
        &self,
        profile: &UserProfile,
        chart: Option<&ChartData>,
    ) -> CacheResult<()> {
        self.user_profile.cache_user_profile(profile)?;

        if let (Some(chart), Some(birth)) = (chart, profile.birth_data.as_ref()) {
            self.chart_data.cache_chart_data(birth, chart)?;
        }
        Ok(())
    }

    /// Profile plus the chart for its birth data, whichever are cached
    pub fn get_user_data(&self, user_id: &str) -> UserData {
        let profile = self.user_profile.get_user_profile(user_id);
        let chart_data = profile
            .as_ref()
            .and_then(|p| p.birth_data.as_ref())
            .and_then(|birth| self.chart_data.get_chart_data(birth));

        UserData {
            profile,
            chart_data,
        }
    }

    /// Pull a user's data into the memory layers ahead of need
    pub fn preload_user_data(&self, user_id: &str) -> UserData {
        let data = self.get_user_data(user_id);
        info!(
            "Preloaded user {}: profile={} chart={}",
            user_id,
            data.profile.is_some(),
            data.chart_data.is_some()
        );
        data
    }

    /// Empty every memory layer and this namespace of the persistent store
    pub fn clear_all(&self) {
        self.chart_data.clear_memory();
        self.user_profile.clear_memory();
        self.api_response.clear_memory();
        let removed = self.persistent.clear();
        info!("Cleared all caches ({} persistent entries)", removed);
    }

    /// Sweep expired entries from the persistent layer
    ///
    /// Memory layers expire lazily on read and are left alone.
    pub fn clear_expired(&self) -> usize {
        let removed = self.persistent.clear_expired();
        debug!("Expired {} persistent entries", removed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            chart_data: self.chart_data.stats(),
            user_profile: self.user_profile.stats(),
            api_response: self.api_response.stats(),
            persistent_entries: self.persistent.len(),
            persistent: self.persistent.counters(),
            timestamp_ms: self.clock.now_ms(),
        }
    }
}
