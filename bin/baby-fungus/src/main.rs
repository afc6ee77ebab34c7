// SPDX-License-Identifier: AGPL-3.0-only
// Minimal bootstrap; the agent itself lives in the library crates.
use anyhow::{Context, Result};
use hyphae::{AgentConfig, Orchestrator};
use rhizome::{BreakerConfig, Guarded, MastodonFeed, SparqlStore};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = AgentConfig::from_env().context("loading configuration")?;
    info!(
        agent = %config.agent_name,
        instance = %config.feed_instance_url,
        store = %config.store_base_url,
        dataset = %config.store_dataset,
        model = ?config.model,
        "baby-fungus starting"
    );

    let feed = MastodonFeed::new(
        &config.feed_instance_url,
        config.feed_api_token.clone(),
        config.request_timeout,
    )
    .context("building feed client")?;
    let store = SparqlStore::new(&config.store_base_url, config.request_timeout)
        .context("building store client")?;

    let mut orchestrator = Orchestrator::from_config(
        &config,
        Guarded::new("feed", feed, BreakerConfig::default()),
        Guarded::new("store", store, BreakerConfig::default()),
    )
    .context("wiring agent")?;

    tokio::select! {
        result = orchestrator.run() => {
            if let Err(e) = &result {
                error!(error = %e, "agent stopped");
            }
            result.context("agent loop")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}
