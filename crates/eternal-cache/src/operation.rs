//! Cached operations and their freshness tuning

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Endpoint for natal chart scoring
pub const SCORE_NATAL: &str = "/score-natal";
/// Endpoint for transit scoring
pub const SCORE_TRANSIT: &str = "/score-transit";
/// Endpoint for synastry comparison
pub const COMPARE_USERS: &str = "/compare-users";
/// Endpoint for generated reflections and AI insights
pub const GENERATE_REFLECTIONS: &str = "/generate-reflections";
/// Endpoint listing ephemeris files, used as a health probe
pub const DEBUG_EPHE_FILES: &str = "/debug-ephe-files";

/// How long a value lives in each cache layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Lifetime in the in-memory layer
    pub fast: Duration,
    /// Lifetime in the persistent layer, `None` when never persisted
    pub durable: Option<Duration>,
}

/// Everything the query layer caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    NatalChart,
    Transit,
    Compatibility,
    Reflections,
    AiInsights,
    UserProfile,
}

impl Operation {
    pub const ALL: [Self; 6] = [
        Self::NatalChart,
        Self::Transit,
        Self::Compatibility,
        Self::Reflections,
        Self::AiInsights,
        Self::UserProfile,
    ];

    /// Stable name used as the query key prefix
    pub const fn name(self) -> &'static str {
        match self {
            Self::NatalChart => "natal_chart",
            Self::Transit => "transit",
            Self::Compatibility => "compatibility",
            Self::Reflections => "reflections",
            Self::AiInsights => "ai_insights",
            Self::UserProfile => "user_profile",
        }
    }

    /// Backend endpoint, `None` for cache-only operations
    pub const fn endpoint(self) -> Option<&'static str> {
        match self {
            Self::NatalChart => Some(SCORE_NATAL),
            Self::Transit => Some(SCORE_TRANSIT),
            Self::Compatibility => Some(COMPARE_USERS),
            Self::Reflections | Self::AiInsights => Some(GENERATE_REFLECTIONS),
            Self::UserProfile => None,
        }
    }

    /// Per-layer lifetimes
    pub const fn ttl_policy(self) -> TtlPolicy {
        match self {
            Self::NatalChart => TtlPolicy {
                fast: Duration::from_secs(30 * MINUTE),
                durable: Some(Duration::from_secs(7 * DAY)),
            },
            Self::Transit => TtlPolicy {
                fast: Duration::from_secs(HOUR),
                durable: None,
            },
            Self::Compatibility => TtlPolicy {
                fast: Duration::from_secs(4 * HOUR),
                durable: None,
            },
            Self::Reflections | Self::AiInsights => TtlPolicy {
                fast: Duration::from_secs(2 * HOUR),
                durable: Some(Duration::from_secs(2 * HOUR)),
            },
            Self::UserProfile => TtlPolicy {
                fast: Duration::from_secs(HOUR),
                durable: Some(Duration::from_secs(30 * DAY)),
            },
        }
    }

    /// Window in which query data is served without a refetch
    pub const fn stale_time(self) -> Duration {
        match self {
            Self::NatalChart | Self::Reflections | Self::AiInsights => {
                Duration::from_secs(30 * MINUTE)
            }
            Self::Transit => Duration::from_secs(10 * MINUTE),
            Self::Compatibility | Self::UserProfile => Duration::from_secs(HOUR),
        }
    }

    /// Retention of an unused query entry
    pub const fn gc_time(self) -> Duration {
        match self {
            Self::NatalChart | Self::Compatibility | Self::UserProfile => {
                Duration::from_secs(DAY)
            }
            Self::Transit => Duration::from_secs(2 * HOUR),
            Self::Reflections | Self::AiInsights => Duration::from_secs(4 * HOUR),
        }
    }

    /// Retries after the first attempt
    pub const fn max_retries(self) -> u32 {
        match self {
            Self::Reflections | Self::AiInsights => 1,
            _ => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether responses from `endpoint` are worth persisting
pub fn is_expensive_endpoint(endpoint: &str) -> bool {
    let path = endpoint.trim_start_matches('/');
    [SCORE_NATAL, GENERATE_REFLECTIONS]
        .iter()
        .any(|expensive| path == expensive.trim_start_matches('/'))
}
