//! Crawl target supply.
//!
//! The roster is owned by whoever administers membership — the registry
//! only asks "who should I crawl?". Ships with a JSON-file reader for
//! the daemon and a static roster for embedding and tests.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use federated_index::{Agent, AgentType};

use crate::error::RegistryResult;

/// Supplier of the agents a crawl should consider.
#[async_trait]
pub trait AgentRoster: Send + Sync {
    /// All known agents, optionally filtered by type.
    async fn list_agents(&self, agent_type: Option<AgentType>) -> RegistryResult<Vec<Agent>>;
}

/// One operator-authored roster line. Only the URL is required; entries
/// default to the sales surface.
#[derive(Debug, Clone, Deserialize)]
struct RosterEntry {
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "RosterEntry::default_agent_type")]
    agent_type: AgentType,
    #[serde(default)]
    protocol: Option<String>,
}

impl RosterEntry {
    fn default_agent_type() -> AgentType {
        AgentType::Sales
    }
}

/// Roster backed by a JSON array file, re-read on every call so edits
/// take effect at the next crawl cycle without a restart.
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AgentRoster for FileRoster {
    async fn list_agents(&self, agent_type: Option<AgentType>) -> RegistryResult<Vec<Agent>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let entries: Vec<RosterEntry> = serde_json::from_slice(&bytes)?;
        debug!(path = %self.path.display(), entries = entries.len(), "roster loaded");
        let mut agents: Vec<Agent> = entries
            .into_iter()
            .map(|entry| Agent::registered(entry.url, entry.name, entry.agent_type, entry.protocol))
            .collect();
        if let Some(wanted) = agent_type {
            agents.retain(|agent| agent.agent_type == wanted);
        }
        Ok(agents)
    }
}

/// Fixed in-memory roster.
pub struct StaticRoster {
    agents: Vec<Agent>,
}

impl StaticRoster {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl AgentRoster for StaticRoster {
    async fn list_agents(&self, agent_type: Option<AgentType>) -> RegistryResult<Vec<Agent>> {
        let mut agents = self.agents.clone();
        if let Some(wanted) = agent_type {
            agents.retain(|agent| agent.agent_type == wanted);
        }
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use federated_index::AgentSource;

    #[tokio::test]
    async fn test_file_roster_parses_minimal_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(
            &path,
            r#"[
                {"url": "https://sales.example.com", "name": "Example Sales"},
                {"url": "https://creative.example.com", "agent_type": "creative", "protocol": "mcp"}
            ]"#,
        )
        .unwrap();

        let roster = FileRoster::new(&path);
        let agents = roster.list_agents(None).await.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].agent_type, AgentType::Sales);
        assert_eq!(agents[0].name.as_deref(), Some("Example Sales"));
        assert_eq!(agents[0].source, AgentSource::Registered);
        assert!(agents[0].registered_at.is_some());
        assert_eq!(agents[1].agent_type, AgentType::Creative);
        assert_eq!(agents[1].protocol.as_deref(), Some("mcp"));

        let sales = roster.list_agents(Some(AgentType::Sales)).await.unwrap();
        assert_eq!(sales.len(), 1);
    }

    #[tokio::test]
    async fn test_file_roster_missing_file_is_io_error() {
        let roster = FileRoster::new("/nonexistent/roster.json");
        let err = roster.list_agents(None).await.unwrap_err();
        assert!(matches!(err, RegistryError::Io(_)));
    }

    #[tokio::test]
    async fn test_file_roster_malformed_json_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(&path, "{not json").unwrap();

        let roster = FileRoster::new(&path);
        let err = roster.list_agents(None).await.unwrap_err();
        assert!(matches!(err, RegistryError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_static_roster_filters() {
        let roster = StaticRoster::new(vec![
            Agent::registered("https://s.example.com", None, AgentType::Sales, None),
            Agent::registered("https://v.example.com", None, AgentType::Signals, None),
        ]);
        assert_eq!(roster.list_agents(None).await.unwrap().len(), 2);
        assert_eq!(
            roster
                .list_agents(Some(AgentType::Signals))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
