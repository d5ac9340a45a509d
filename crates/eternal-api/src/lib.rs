//! Astrology backend client and cache-backed service
//!
//! [`AstrologyClient`] speaks JSON over HTTP to the scoring and reflection
//! backend. [`AstrologyService`] puts an [`eternal_cache::CacheContext`] in
//! front of any [`AstrologyBackend`], so charts, transits, compatibility
//! analyses and reflections are computed once and then served from cache.
//!
//! ```no_run
//! use eternal_api::{ApiConfig, AstrologyClient, AstrologyService};
//! use eternal_cache::{BirthData, CacheConfig, CacheContext, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AstrologyClient::new(ApiConfig::from_env())?;
//! let cache = CacheContext::new(CacheConfig::from_env(), Arc::new(MemoryStore::new()))?;
//! let service = AstrologyService::new(cache, Arc::new(client));
//!
//! let birth = BirthData::new("1990-01-01", "12:00", 22.5726, 88.3639, "+05:30");
//! let chart = service.natal_chart(&birth).await?;
//! println!("{} planets", chart.planets.len());
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod service;
pub mod transport;
pub mod types;

pub use backend::AstrologyBackend;
pub use client::AstrologyClient;
pub use config::{ApiConfig, DEFAULT_API_URL, Endpoints};
pub use error::{ApiError, ApiErrorKind};
pub use service::AstrologyService;
