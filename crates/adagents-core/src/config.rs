//! Registry configuration.
//!
//! Environment variables:
//!
//! - `ADAGENTS_ROSTER` — path to the JSON roster file
//! - `ADAGENTS_INTERVAL_MINS` — minutes between periodic crawls
//! - `ADAGENTS_CONCURRENCY` — max in-flight publisher visits
//! - `ADAGENTS_TIMEOUT_SECS` — per-fetch timeout
//! - `ADAGENTS_USER_AGENT` — User-Agent header sent to publishers

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crawler::CrawlConfig;

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the JSON roster file.
    pub roster_path: PathBuf,
    /// Minutes between periodic crawl cycles.
    pub interval_mins: u64,
    /// Maximum in-flight publisher visits per crawl.
    pub max_concurrency: usize,
    /// Per-fetch timeout in seconds.
    pub timeout_secs: u64,
    /// User-Agent header sent with every fetch.
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            roster_path: std::env::var("ADAGENTS_ROSTER")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("roster.json")),
            interval_mins: env_number("ADAGENTS_INTERVAL_MINS", 60),
            max_concurrency: env_number("ADAGENTS_CONCURRENCY", 8),
            timeout_secs: env_number("ADAGENTS_TIMEOUT_SECS", 5),
            user_agent: std::env::var("ADAGENTS_USER_AGENT")
                .unwrap_or_else(|_| default_user_agent()),
        }
    }
}

impl RegistryConfig {
    /// Create a config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_roster(mut self, path: impl Into<PathBuf>) -> Self {
        self.roster_path = path.into();
        self
    }

    pub fn with_interval_mins(mut self, mins: u64) -> Self {
        self.interval_mins = mins;
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Scheduler knobs derived from this config.
    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            max_concurrency: self.max_concurrency,
            interval: Duration::from_secs(self.interval_mins * 60),
        }
    }

    /// Per-fetch timeout as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_user_agent() -> String {
    format!("adagents-registry/{}", env!("CARGO_PKG_VERSION"))
}

fn env_number<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_defaults() {
        let config = RegistryConfig::default()
            .with_roster("/etc/adagents/roster.json")
            .with_interval_mins(5)
            .with_concurrency(3)
            .with_timeout_secs(2);

        assert_eq!(config.roster_path, PathBuf::from("/etc/adagents/roster.json"));
        let crawl = config.crawl_config();
        assert_eq!(crawl.max_concurrency, 3);
        assert_eq!(crawl.interval, Duration::from_secs(300));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_default_user_agent_carries_version() {
        assert!(default_user_agent().starts_with("adagents-registry/"));
        assert!(default_user_agent().len() > "adagents-registry/".len());
    }
}
