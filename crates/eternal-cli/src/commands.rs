//! Subcommand execution

use anyhow::{Context, Result, anyhow};
use eternal_api::{AstrologyClient, AstrologyService};
use eternal_cache::{CacheContext, FileStore, KvStore, MemoryStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{CliConfig, Command};

/// Build the service described by `config`, run its command, and return
/// the output document
///
/// The cache sweeper runs for the duration of the command and is shut down
/// before returning, whether or not the command succeeded.
pub async fn run(config: CliConfig) -> Result<Value> {
    config.validate()?;

    let store: Arc<dyn KvStore> = match &config.store_dir {
        Some(dir) => {
            info!("Persistent cache at {}", dir.display());
            Arc::new(FileStore::new(dir).context("opening the cache directory")?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let cache = CacheContext::new(config.cache_config()?, store)?;
    let client = AstrologyClient::new(config.api_config()?)?;
    let service = AstrologyService::new(cache.clone(), Arc::new(client));

    let expired = cache.start();
    debug!("Startup sweep removed {} entries", expired);

    let output = execute(&service, &config.command).await;
    cache.shutdown().await;
    output
}

/// Run one command against an already built service
pub async fn execute(service: &AstrologyService, command: &Command) -> Result<Value> {
    match command {
        Command::Natal { birth, user_id } => {
            let birth = birth.to_birth_data();
            let chart = match user_id {
                Some(user_id) => service.submit_birth_data(user_id, &birth).await,
                None => service.natal_chart(&birth).await,
            }
            .context("natal chart")?;
            Ok(serde_json::to_value(chart)?)
        }
        Command::Transit { birth, on } => {
            let transit = birth.transit_on(on);
            transit
                .validate()
                .map_err(|e| anyhow!("invalid --on date: {e}"))?;

            let natal = serde_json::to_value(birth.to_birth_data())?;
            let transit = serde_json::to_value(transit)?;
            service
                .transit_scores(&natal, &transit)
                .await
                .context("transit scores")
        }
        Command::Compare { user_a, user_b } => service
            .compatibility(user_a, user_b)
            .await
            .context("compatibility"),
        Command::Reflections { scores } => service
            .reflections(scores)
            .await
            .context("reflections"),
        Command::Stats => Ok(serde_json::to_value(service.cache().stats())?),
        Command::Clear => {
            service.cache().clear_all();
            Ok(json!({"cleared": true}))
        }
        Command::Sweep => Ok(json!({"removed": service.cache().clear_expired()})),
        Command::Health => service
            .health()
            .await
            .map_err(|e| anyhow!("{} ({e})", e.user_message())),
    }
}
