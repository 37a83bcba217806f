//! Direct agent capability discovery.
//!
//! Publishers say who may sell; agents say what they can do. This module
//! asks each agent for its `/.well-known/agent.json` card, caches the
//! answer per URL with a TTL, and feeds names and protocols of
//! document-discovered agents back into the index. Discovery only ever
//! fills gaps — it grants nothing and never overrides registered data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use federated_index::{AgentSource, FederatedIndex};

use crate::document::AgentCard;
use crate::error::RegistryResult;
use crate::fetch::{agent_card_url, DocumentFetcher};

/// How long a fetched profile stays fresh.
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(15 * 60);

/// What an agent says about itself, as of `fetched_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub agent_url: String,
    pub name: Option<String>,
    pub protocol: Option<String>,
    /// Capability and skill terms declared by the card.
    pub capabilities: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// TTL-cached agent card reader.
pub struct CapabilityDiscovery {
    fetcher: Arc<dyn DocumentFetcher>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CapabilityProfile>>,
}

impl CapabilityDiscovery {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Profile for one agent, served from cache within the TTL.
    ///
    /// `None` when the agent is unreachable, serves no card, or serves
    /// something unparseable — all soft failures.
    pub async fn profile(&self, agent_url: &str) -> Option<CapabilityProfile> {
        if let Some(cached) = self.cached(agent_url) {
            return Some(cached);
        }
        let profile = self.fetch_profile(agent_url).await?;
        self.cache
            .lock()
            .expect("profile cache poisoned")
            .insert(agent_url.to_string(), profile.clone());
        Some(profile)
    }

    /// Push card names and protocols into the index for discovered agents
    /// missing them. Returns the number of agents updated; unreachable
    /// agents are skipped.
    pub async fn enrich_index(&self, index: &dyn FederatedIndex) -> RegistryResult<usize> {
        let agents = index.list_all_agents(None).await?;
        let mut updated = 0usize;
        for agent in agents {
            // Registered data wins; cards only fill what a document-
            // discovered agent never had.
            if agent.source != AgentSource::Discovered {
                continue;
            }
            if agent.name.is_some() && agent.protocol.is_some() {
                continue;
            }
            let profile = match self.profile(&agent.url).await {
                Some(profile) => profile,
                None => continue,
            };
            match index
                .enrich_agent_metadata(&agent.url, profile.name.clone(), profile.protocol.clone())
                .await
            {
                Ok(true) => {
                    debug!(agent_url = %agent.url, "agent metadata enriched from card");
                    updated += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(agent_url = %agent.url, error = %e, "metadata enrichment failed"),
            }
        }
        Ok(updated)
    }

    fn cached(&self, agent_url: &str) -> Option<CapabilityProfile> {
        let cache = self.cache.lock().expect("profile cache poisoned");
        cache
            .get(agent_url)
            .filter(|profile| {
                (Utc::now() - profile.fetched_at)
                    .to_std()
                    .map_or(false, |age| age < self.ttl)
            })
            .cloned()
    }

    async fn fetch_profile(&self, agent_url: &str) -> Option<CapabilityProfile> {
        let url = agent_card_url(agent_url);
        let payload = match self.fetcher.fetch(&url).await {
            Ok(payload) if payload.status == 200 => payload,
            Ok(payload) => {
                debug!(agent_url = %agent_url, status = payload.status, "agent card not served");
                return None;
            }
            Err(e) => {
                debug!(agent_url = %agent_url, error = %e, "agent card unreachable");
                return None;
            }
        };
        let card: AgentCard = match serde_json::from_str(&payload.body) {
            Ok(card) => card,
            Err(e) => {
                debug!(agent_url = %agent_url, error = %e, "agent card unparseable");
                return None;
            }
        };
        // A card at the A2A well-known path implies the protocol when
        // the card itself does not state one.
        let protocol = card.protocol.clone().or_else(|| Some("a2a".to_string()));
        Some(CapabilityProfile {
            agent_url: agent_url.to_string(),
            name: card.name.clone(),
            protocol,
            capabilities: card.capability_terms(),
            fetched_at: Utc::now(),
        })
    }
}
