//! Command-line configuration.
//!
//! Global flags fall back to `ETERNAL_*` environment variables, then to
//! defaults. Cache tuning not exposed as a flag is read by
//! [`CacheConfig::from_env`].
//!
//! # Example
//!
//! ```no_run
//! use eternal_cli::CliConfig;
//!
//! let config = CliConfig::from_args();
//! config.validate().expect("Invalid configuration");
//! println!("Backend: {}", config.api_url);
//! ```

use clap::{Args, Parser, Subcommand};
use eternal_api::{ApiConfig, DEFAULT_API_URL};
use eternal_cache::{BirthData, CacheConfig, NetworkMode};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Time of day used for transit snapshots
pub const TRANSIT_TIME: &str = "12:00";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "eternal",
    about = "Query the Eternal Soul astrology backend through its cache",
    version
)]
pub struct CliConfig {
    /// Astrology backend base URL
    #[arg(long, global = true, env = "ETERNAL_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Directory for the persistent cache; memory only when unset
    #[arg(long, global = true, env = "ETERNAL_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(
        long,
        global = true,
        env = "ETERNAL_API_TIMEOUT_MS",
        default_value_t = 5000
    )]
    pub timeout_ms: u64,

    /// Serve from cache only and never call the backend
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Birth moment and place
#[derive(Debug, Clone, PartialEq, Args)]
pub struct BirthArgs {
    /// Birth date, YYYY-MM-DD
    #[arg(long)]
    pub date: String,

    /// Birth time, HH:MM or HH:MM:SS
    #[arg(long)]
    pub time: String,

    /// Latitude in degrees, south negative
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in degrees, west negative
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// UTC offset, +HH:MM or -HH:MM
    #[arg(long, default_value = "+00:00", allow_hyphen_values = true)]
    pub timezone: String,
}

impl BirthArgs {
    pub fn to_birth_data(&self) -> BirthData {
        BirthData::new(
            self.date.clone(),
            self.time.clone(),
            self.lat,
            self.lon,
            self.timezone.clone(),
        )
    }

    /// Same place and offset at noon on `date`
    pub fn transit_on(&self, date: &str) -> BirthData {
        BirthData::new(
            date.to_string(),
            TRANSIT_TIME.to_string(),
            self.lat,
            self.lon,
            self.timezone.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Natal chart for a birth moment
    Natal {
        #[command(flatten)]
        birth: BirthArgs,

        /// Record the birth data for this user
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Transit scores for a natal chart on a given day
    Transit {
        #[command(flatten)]
        birth: BirthArgs,

        /// Transit date, YYYY-MM-DD
        #[arg(long)]
        on: String,
    },

    /// Compatibility of two people, each given as birth data JSON
    Compare {
        #[arg(long, value_parser = parse_json)]
        user_a: Value,

        #[arg(long, value_parser = parse_json)]
        user_b: Value,
    },

    /// Reflections for life-area scores given as JSON
    Reflections {
        #[arg(long, value_parser = parse_json)]
        scores: Value,
    },

    /// Cache statistics
    Stats,

    /// Empty every cache layer
    Clear,

    /// Remove expired entries now
    Sweep,

    /// Probe the backend
    Health,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))
}

impl CliConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidArgument {
                flag: "timeout-ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if let Some(dir) = &self.store_dir
            && dir.is_file()
        {
            return Err(ConfigError::InvalidArgument {
                flag: "store-dir",
                reason: format!("{} is a file", dir.display()),
            });
        }
        Ok(())
    }

    pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
        let config = ApiConfig::new(self.api_url.clone()).with_timeout(self.timeout());
        config.validate().map_err(ConfigError::Api)?;
        Ok(config)
    }

    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let mode = if self.offline {
            NetworkMode::Offline
        } else {
            NetworkMode::Online
        };

        let mut config = CacheConfig::from_env();
        config.query = config
            .query
            .with_request_timeout(self.timeout())
            .with_network_mode(mode);
        config.validate().map_err(ConfigError::Cache)?;
        Ok(config)
    }
}
