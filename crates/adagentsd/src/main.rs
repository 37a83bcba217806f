//! Registry daemon: crawls the agent roster on a fixed interval.
//!
//! All knobs come from the environment (see [`RegistryConfig`]):
//! `ADAGENTS_ROSTER`, `ADAGENTS_INTERVAL_MINS`, `ADAGENTS_CONCURRENCY`,
//! `ADAGENTS_TIMEOUT_SECS`, `ADAGENTS_USER_AGENT`, plus `ADAGENTS_VERBOSE`
//! and `ADAGENTS_LOG_JSON` for log output. The roster file is re-read at
//! every cycle, so edits take effect without a restart.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, Level};

use adagents_core::{CrawlScheduler, FileRoster, HttpFetcher, RegistryConfig, METRICS};
use federated_index::{FederatedIndex, MemoryIndex};

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    let level = if env_flag("ADAGENTS_VERBOSE") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    adagents_core::init_tracing(env_flag("ADAGENTS_LOG_JSON"), level);

    let config = RegistryConfig::from_env();
    info!(
        roster = ?config.roster_path,
        interval_mins = config.interval_mins,
        max_concurrency = config.max_concurrency,
        "adagentsd starting"
    );

    let roster = Arc::new(FileRoster::new(&config.roster_path));
    let fetcher = Arc::new(
        HttpFetcher::new(config.fetch_timeout(), &config.user_agent)
            .context("failed to build HTTP client")?,
    );
    let index = Arc::new(MemoryIndex::new());
    let scheduler = Arc::new(CrawlScheduler::new(
        fetcher,
        index.clone(),
        config.crawl_config(),
    ));

    let handle = scheduler.start_periodic(roster);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    handle.stop();

    let stats = index.get_stats().await?;
    info!(
        agents = stats.agent_count,
        publishers = stats.publisher_count,
        properties = stats.property_count,
        "final index state"
    );
    METRICS.flush();

    Ok(())
}
