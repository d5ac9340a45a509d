//! Backend connection settings

use eternal_cache::operation::{
    COMPARE_USERS, DEBUG_EPHE_FILES, GENERATE_REFLECTIONS, SCORE_NATAL, SCORE_TRANSIT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Backend used when `ETERNAL_API_URL` is unset
pub const DEFAULT_API_URL: &str = "http://localhost:10000";

/// Paths of the backend endpoints, relative to the base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub natal_chart: String,
    pub reflections: String,
    pub transit: String,
    pub compatibility: String,
    pub health: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            natal_chart: SCORE_NATAL.to_string(),
            reflections: GENERATE_REFLECTIONS.to_string(),
            transit: SCORE_TRANSIT.to_string(),
            compatibility: COMPARE_USERS.to_string(),
            health: DEBUG_EPHE_FILES.to_string(),
        }
    }
}

impl Endpoints {
    fn all(&self) -> [&str; 5] {
        [
            &self.natal_chart,
            &self.reflections,
            &self.transit,
            &self.compatibility,
            &self.health,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend base URL, without a trailing path
    pub base_url: String,

    pub endpoints: Endpoints,

    /// Whole-request timeout
    pub timeout: Duration,

    /// Connection establishment timeout
    pub connect_timeout: Duration,

    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            endpoints: Endpoints::default(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            user_agent: concat!("eternal-api/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ETERNAL_API_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("ETERNAL_API_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.timeout, Duration::from_millis),
            ..defaults
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| format!("base_url '{}' is not a URL: {e}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("base_url scheme '{}' is not http(s)", url.scheme()));
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if let Some(bad) = self.endpoints.all().into_iter().find(|e| !e.starts_with('/')) {
            return Err(format!("endpoint '{bad}' must start with '/'"));
        }
        Ok(())
    }

    /// Absolute URL for `endpoint`
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, "http://localhost:10000");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.endpoints.natal_chart, "/score-natal");
        assert_eq!(config.endpoints.health, "/debug-ephe-files");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(ApiConfig::new("not a url").validate().is_err());
        assert!(ApiConfig::new("ftp://example.com").validate().is_err());
        assert!(
            ApiConfig::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );

        let endpoints = Endpoints {
            transit: "score-transit".to_string(),
            ..Endpoints::default()
        };
        assert!(
            ApiConfig::default()
                .with_endpoints(endpoints)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_url_for_strips_trailing_slash() {
        let config = ApiConfig::new("https://api.example.com/");
        assert_eq!(
            config.url_for("/score-natal"),
            "https://api.example.com/score-natal"
        );
    }
}
