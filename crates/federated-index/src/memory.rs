//! In-memory implementation of [`FederatedIndex`]
//!
//! `MemoryIndex` keeps the whole index behind one `std::sync::RwLock`.
//! Every mutation assembles its replacement data before entering the write
//! section and the lock is never held across an await point, so readers
//! observe either the previous publisher state or the new one — never a
//! half-applied replace.
//!
//! Secondary structures keep lookups cheap:
//! - `properties_by_identifier`: `(type, normalized value)` → property ids
//! - `edges_by_agent`: agent URL → property id → authorization edge
//!
//! Snapshots (`snapshot` / `load_snapshot`) serialize the index to a
//! portable form so one-shot CLI invocations can persist state between
//! runs; secondary structures are rebuilt on load.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::IndexResult;
use crate::model::{
    normalize_agent_url, normalize_domain, Agent, AgentSource, AgentType, AuthorizationEdge,
    CrawlRun, IdentifierType, IndexStats, Property, PropertyId, Publisher, SourceBreakdown,
    ValidationStatus,
};
use crate::selector::SelectorExpression;
use crate::store::{
    AuthorizationCheck, FederatedIndex, ProductAuthorization, PropertyIdentifierExpansion,
    UpsertOutcome,
};
use crate::validation::ValidationResult;

/// Crawl runs retained in memory and in snapshots. Oldest drop first.
const CRAWL_RUN_RETENTION: usize = 100;

/// Lookup key for the identifier inverted index.
type IdentifierKey = (IdentifierType, String);

fn identifier_key(identifier_type: IdentifierType, value: &str) -> IdentifierKey {
    let normalized = match identifier_type {
        IdentifierType::Domain => normalize_domain(value),
        _ => value.trim().to_ascii_lowercase(),
    };
    (identifier_type, normalized)
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Per-publisher bookkeeping. Properties live in the shared table; the
/// record only holds their ids plus the document digest used for the
/// unchanged-content short-circuit.
#[derive(Debug, Clone)]
struct PublisherRecord {
    domain: String,
    validation_status: ValidationStatus,
    last_validated_at: Option<DateTime<Utc>>,
    last_changed_at: Option<DateTime<Utc>>,
    document_digest: Option<String>,
    /// Normalized agent URLs the current document authorizes, sorted.
    agent_urls: Vec<String>,
    property_ids: BTreeSet<PropertyId>,
}

impl PublisherRecord {
    fn never_crawled(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            validation_status: ValidationStatus::Unknown,
            last_validated_at: None,
            last_changed_at: None,
            document_digest: None,
            agent_urls: Vec::new(),
            property_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default)]
struct IndexState {
    /// Agents keyed by normalized URL.
    agents: HashMap<String, Agent>,
    /// Publishers keyed by normalized domain.
    publishers: HashMap<String, PublisherRecord>,
    /// All indexed properties. Property ids embed the publisher domain, so
    /// two publishers never collide here.
    properties: HashMap<PropertyId, Property>,
    /// Inverted index over property identifiers.
    properties_by_identifier: HashMap<IdentifierKey, BTreeSet<PropertyId>>,
    /// Authorization fact table, agent-major for the fast path.
    edges_by_agent: HashMap<String, BTreeMap<PropertyId, AuthorizationEdge>>,
    /// Finished crawl runs, oldest first, bounded.
    crawl_runs: VecDeque<CrawlRun>,
}

impl IndexState {
    fn unindex_property(&mut self, property: &Property) {
        for ident in &property.identifiers {
            let key = identifier_key(ident.identifier_type, &ident.value);
            if let Some(pids) = self.properties_by_identifier.get_mut(&key) {
                pids.remove(&property.property_id);
                if pids.is_empty() {
                    self.properties_by_identifier.remove(&key);
                }
            }
        }
    }

    fn index_property(&mut self, property: Property) {
        for ident in &property.identifiers {
            self.properties_by_identifier
                .entry(identifier_key(ident.identifier_type, &ident.value))
                .or_default()
                .insert(property.property_id.clone());
        }
        self.properties.insert(property.property_id.clone(), property);
    }

    /// Property ids matching a selector. Scans the property table; the
    /// selector itself defines the semantics.
    fn resolve_selector(&self, selector: &SelectorExpression) -> BTreeSet<PropertyId> {
        self.properties
            .values()
            .filter(|p| selector.matches(p))
            .map(|p| p.property_id.clone())
            .collect()
    }

    /// Per-selector intersection with the agent's authorized set. Returns
    /// the union of authorized matches and the selectors that matched
    /// nothing authorized.
    fn authorized_matches(
        &self,
        agent_url: &str,
        selectors: &[SelectorExpression],
    ) -> (BTreeSet<PropertyId>, Vec<SelectorExpression>) {
        let edges = self.edges_by_agent.get(agent_url);
        let mut matched = BTreeSet::new();
        let mut unmatched = Vec::new();
        for selector in selectors {
            let resolved = self.resolve_selector(selector);
            let mut hit = false;
            for pid in resolved {
                if edges.map_or(false, |e| e.contains_key(&pid)) {
                    matched.insert(pid);
                    hit = true;
                }
            }
            if !hit {
                unmatched.push(selector.clone());
            }
        }
        (matched, unmatched)
    }

    fn materialize_publisher(&self, record: &PublisherRecord) -> Publisher {
        Publisher {
            domain: record.domain.clone(),
            validation_status: record.validation_status,
            last_validated_at: record.last_validated_at,
            last_changed_at: record.last_changed_at,
            authorized_agents: record.agent_urls.clone(),
            properties: record
                .property_ids
                .iter()
                .filter_map(|pid| self.properties.get(pid).cloned())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Portable serialized form of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub saved_at: DateTime<Utc>,
    pub agents: Vec<Agent>,
    pub publishers: Vec<PublisherSnapshot>,
    pub edges: Vec<AuthorizationEdge>,
    pub crawl_runs: Vec<CrawlRun>,
}

/// One publisher in a snapshot: the materialized view plus the document
/// digest needed to keep the unchanged short-circuit working after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherSnapshot {
    pub publisher: Publisher,
    pub document_digest: Option<String>,
}

// ---------------------------------------------------------------------------
// MemoryIndex
// ---------------------------------------------------------------------------

/// The shipped [`FederatedIndex`] backend.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: RwLock<IndexState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning can only follow a panic inside a lock section, which the
    // sections below cannot reach without a bug; propagate it loudly.
    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().expect("index lock poisoned")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().expect("index lock poisoned")
    }

    /// Serialize the full index to a portable snapshot.
    pub fn snapshot(&self) -> IndexSnapshot {
        let state = self.read_state();
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.url.cmp(&b.url));

        let mut publishers: Vec<PublisherSnapshot> = state
            .publishers
            .values()
            .map(|record| PublisherSnapshot {
                publisher: state.materialize_publisher(record),
                document_digest: record.document_digest.clone(),
            })
            .collect();
        publishers.sort_by(|a, b| a.publisher.domain.cmp(&b.publisher.domain));

        let mut edges: Vec<AuthorizationEdge> = state
            .edges_by_agent
            .values()
            .flat_map(|per_agent| per_agent.values().cloned())
            .collect();
        edges.sort_by(|a, b| {
            (&a.agent_url, &a.property_id).cmp(&(&b.agent_url, &b.property_id))
        });

        IndexSnapshot {
            saved_at: Utc::now(),
            agents,
            publishers,
            edges,
            crawl_runs: state.crawl_runs.iter().cloned().collect(),
        }
    }

    /// Replace the index contents with a previously exported snapshot.
    /// Secondary structures are rebuilt from the portable form.
    pub fn load_snapshot(&self, snapshot: IndexSnapshot) -> IndexResult<()> {
        let mut state = IndexState::default();

        for agent in snapshot.agents {
            state.agents.insert(agent.url.clone(), agent);
        }

        for entry in snapshot.publishers {
            let publisher = entry.publisher;
            let mut property_ids = BTreeSet::new();
            for property in publisher.properties {
                property_ids.insert(property.property_id.clone());
                state.index_property(property);
            }
            state.publishers.insert(
                publisher.domain.clone(),
                PublisherRecord {
                    domain: publisher.domain,
                    validation_status: publisher.validation_status,
                    last_validated_at: publisher.last_validated_at,
                    last_changed_at: publisher.last_changed_at,
                    document_digest: entry.document_digest,
                    agent_urls: publisher.authorized_agents,
                    property_ids,
                },
            );
        }

        for edge in snapshot.edges {
            state
                .edges_by_agent
                .entry(edge.agent_url.clone())
                .or_default()
                .insert(edge.property_id.clone(), edge);
        }

        let mut runs: VecDeque<CrawlRun> = snapshot.crawl_runs.into();
        while runs.len() > CRAWL_RUN_RETENTION {
            runs.pop_front();
        }
        state.crawl_runs = runs;

        *self.write_state() = state;
        Ok(())
    }
}

#[async_trait]
impl FederatedIndex for MemoryIndex {
    async fn register_agent(&self, agent: Agent) -> IndexResult<()> {
        let url = normalize_agent_url(&agent.url)?;
        let mut registered = Agent {
            url: url.clone(),
            source: AgentSource::Registered,
            ..agent
        };

        let mut state = self.write_state();
        if let Some(existing) = state.agents.get(&url) {
            // Promotion keeps the discovery timestamp; registered data wins
            // everywhere else.
            if registered.first_discovered_at.is_none() {
                registered.first_discovered_at = existing.first_discovered_at;
            }
        }
        if registered.registered_at.is_none() {
            registered.registered_at = Some(Utc::now());
        }
        debug!(url = %url, "agent registered");
        state.agents.insert(url, registered);
        Ok(())
    }

    async fn upsert_publisher(
        &self,
        domain: &str,
        result: &ValidationResult,
    ) -> IndexResult<UpsertOutcome> {
        let domain = normalize_domain(domain);

        // Transient failures never reach the index; the scheduler records
        // them on the crawl run instead. Guard anyway.
        if result.is_network_failure() {
            debug!(domain = %domain, "network failure, index untouched");
            return Ok(UpsertOutcome::Skipped);
        }

        let doc = match (result.valid, result.document.as_ref()) {
            (true, Some(doc)) => doc,
            (true, None) => {
                warn!(domain = %domain, "valid result without document, marking invalid");
                let mut state = self.write_state();
                let record = state
                    .publishers
                    .entry(domain.clone())
                    .or_insert_with(|| PublisherRecord::never_crawled(&domain));
                record.validation_status = ValidationStatus::Invalid;
                return Ok(UpsertOutcome::MarkedInvalid);
            }
            (false, _) => {
                let mut state = self.write_state();
                let record = state
                    .publishers
                    .entry(domain.clone())
                    .or_insert_with(|| PublisherRecord::never_crawled(&domain));
                record.validation_status = ValidationStatus::Invalid;
                debug!(
                    domain = %domain,
                    errors = result.errors.len(),
                    "document rejected, prior data retained"
                );
                return Ok(UpsertOutcome::MarkedInvalid);
            }
        };

        // Assemble the replacement before entering the write section.
        let new_properties: Vec<Property> = doc.properties.clone();
        let new_agent_urls: Vec<String> =
            doc.authorized_agents.iter().map(|a| a.url.clone()).collect();
        let checked_at = result.checked_at;

        let mut state = self.write_state();

        // Unchanged content refreshes freshness only. Covers the recovery
        // case where a previously invalid publisher serves the old document
        // again: status flips back to valid without a rebuild.
        if let Some(record) = state.publishers.get_mut(&domain) {
            if record.document_digest.as_deref() == Some(doc.digest.as_str()) {
                record.validation_status = ValidationStatus::Valid;
                record.last_validated_at = Some(checked_at);
                debug!(domain = %domain, digest = %&doc.digest[..12], "document unchanged");
                return Ok(UpsertOutcome::Unchanged);
            }
        }

        let existed = state.publishers.contains_key(&domain);

        // First-seen edge times survive a content change.
        let mut prior_discovered: HashMap<(String, PropertyId), DateTime<Utc>> = HashMap::new();
        if let Some(old) = state.publishers.get(&domain) {
            for url in &old.agent_urls {
                if let Some(edges) = state.edges_by_agent.get(url) {
                    for pid in &old.property_ids {
                        if let Some(edge) = edges.get(pid) {
                            prior_discovered
                                .insert((url.clone(), pid.clone()), edge.discovered_at);
                        }
                    }
                }
            }
        }

        // Affirmative revocation: everything the previous document asserted
        // goes away before the new content lands.
        if let Some(old) = state.publishers.remove(&domain) {
            for pid in &old.property_ids {
                if let Some(property) = state.properties.remove(pid) {
                    state.unindex_property(&property);
                }
            }
            for url in &old.agent_urls {
                let now_empty = match state.edges_by_agent.get_mut(url) {
                    Some(edges) => {
                        for pid in &old.property_ids {
                            edges.remove(pid);
                        }
                        edges.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    state.edges_by_agent.remove(url);
                }
            }
        }

        let mut agents_discovered = 0usize;
        for url in &new_agent_urls {
            if !state.agents.contains_key(url) {
                state
                    .agents
                    .insert(url.clone(), Agent::discovered(url.clone(), checked_at));
                agents_discovered += 1;
            }
        }

        let mut property_ids = BTreeSet::new();
        for property in new_properties {
            property_ids.insert(property.property_id.clone());
            state.index_property(property);
        }

        // Authorization is the cartesian product: every listed agent may
        // transact on every asserted property.
        for url in &new_agent_urls {
            let per_agent = state.edges_by_agent.entry(url.clone()).or_default();
            for pid in &property_ids {
                let discovered_at = prior_discovered
                    .get(&(url.clone(), pid.clone()))
                    .copied()
                    .unwrap_or(checked_at);
                per_agent.insert(
                    pid.clone(),
                    AuthorizationEdge {
                        agent_url: url.clone(),
                        property_id: pid.clone(),
                        publisher_domain: domain.clone(),
                        discovered_at,
                        crawled_at: checked_at,
                    },
                );
            }
        }

        state.publishers.insert(
            domain.clone(),
            PublisherRecord {
                domain: domain.clone(),
                validation_status: ValidationStatus::Valid,
                last_validated_at: Some(checked_at),
                last_changed_at: Some(checked_at),
                document_digest: Some(doc.digest.clone()),
                agent_urls: new_agent_urls,
                property_ids,
            },
        );

        let outcome = if existed {
            UpsertOutcome::Updated { agents_discovered }
        } else {
            UpsertOutcome::Inserted { agents_discovered }
        };
        debug!(domain = %domain, outcome = outcome.as_str(), "publisher upsert");
        Ok(outcome)
    }

    async fn enrich_agent_metadata(
        &self,
        agent_url: &str,
        name: Option<String>,
        protocol: Option<String>,
    ) -> IndexResult<bool> {
        let url = normalize_agent_url(agent_url)?;
        let mut state = self.write_state();
        let Some(agent) = state.agents.get_mut(&url) else {
            return Ok(false);
        };
        if agent.source == AgentSource::Registered {
            return Ok(false);
        }
        let mut changed = false;
        if agent.name.is_none() {
            if let Some(name) = name {
                agent.name = Some(name);
                changed = true;
            }
        }
        if agent.protocol.is_none() {
            if let Some(protocol) = protocol {
                agent.protocol = Some(protocol);
                changed = true;
            }
        }
        Ok(changed)
    }

    async fn record_crawl_run(&self, run: CrawlRun) -> IndexResult<()> {
        let mut state = self.write_state();
        state.crawl_runs.push_back(run);
        while state.crawl_runs.len() > CRAWL_RUN_RETENTION {
            state.crawl_runs.pop_front();
        }
        Ok(())
    }

    async fn list_all_agents(&self, agent_type: Option<AgentType>) -> IndexResult<Vec<Agent>> {
        let state = self.read_state();
        let mut agents: Vec<Agent> = state
            .agents
            .values()
            .filter(|a| agent_type.map_or(true, |t| a.agent_type == t))
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(agents)
    }

    async fn get_agent(&self, agent_url: &str) -> IndexResult<Option<Agent>> {
        let Ok(url) = normalize_agent_url(agent_url) else {
            return Ok(None);
        };
        Ok(self.read_state().agents.get(&url).cloned())
    }

    async fn list_all_publishers(&self) -> IndexResult<Vec<Publisher>> {
        let state = self.read_state();
        let mut publishers: Vec<Publisher> = state
            .publishers
            .values()
            .map(|record| state.materialize_publisher(record))
            .collect();
        publishers.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(publishers)
    }

    async fn get_publisher(&self, domain: &str) -> IndexResult<Option<Publisher>> {
        let domain = normalize_domain(domain);
        let state = self.read_state();
        Ok(state
            .publishers
            .get(&domain)
            .map(|record| state.materialize_publisher(record)))
    }

    async fn get_properties_for_agent(&self, agent_url: &str) -> IndexResult<Vec<Property>> {
        let Ok(url) = normalize_agent_url(agent_url) else {
            return Ok(Vec::new());
        };
        let state = self.read_state();
        let Some(edges) = state.edges_by_agent.get(&url) else {
            return Ok(Vec::new());
        };
        Ok(edges
            .keys()
            .filter_map(|pid| state.properties.get(pid).cloned())
            .collect())
    }

    async fn get_publisher_domains_for_agent(&self, agent_url: &str) -> IndexResult<Vec<String>> {
        let Ok(url) = normalize_agent_url(agent_url) else {
            return Ok(Vec::new());
        };
        let state = self.read_state();
        let Some(edges) = state.edges_by_agent.get(&url) else {
            return Ok(Vec::new());
        };
        let domains: BTreeSet<String> =
            edges.values().map(|e| e.publisher_domain.clone()).collect();
        Ok(domains.into_iter().collect())
    }

    async fn get_domains_for_agent(&self, agent_url: &str) -> IndexResult<Vec<String>> {
        let Ok(url) = normalize_agent_url(agent_url) else {
            return Ok(Vec::new());
        };
        let state = self.read_state();
        let Some(edges) = state.edges_by_agent.get(&url) else {
            return Ok(Vec::new());
        };
        let mut domains = BTreeSet::new();
        for pid in edges.keys() {
            if let Some(property) = state.properties.get(pid) {
                for ident in &property.identifiers {
                    if ident.identifier_type == IdentifierType::Domain {
                        domains.insert(ident.normalized_value());
                    }
                }
            }
        }
        Ok(domains.into_iter().collect())
    }

    async fn find_agents_for_property_identifier(
        &self,
        identifier_type: IdentifierType,
        value: &str,
    ) -> IndexResult<Vec<Agent>> {
        let key = identifier_key(identifier_type, value);
        let state = self.read_state();
        let Some(pids) = state.properties_by_identifier.get(&key) else {
            return Ok(Vec::new());
        };
        let mut urls: BTreeSet<&String> = BTreeSet::new();
        for (url, edges) in &state.edges_by_agent {
            if pids.iter().any(|pid| edges.contains_key(pid)) {
                urls.insert(url);
            }
        }
        Ok(urls
            .into_iter()
            .filter_map(|url| state.agents.get(url).cloned())
            .collect())
    }

    async fn lookup_domain(&self, domain: &str) -> IndexResult<Vec<Agent>> {
        self.find_agents_for_property_identifier(IdentifierType::Domain, domain)
            .await
    }

    async fn validate_agent_for_product(
        &self,
        agent_url: &str,
        selectors: &[SelectorExpression],
    ) -> IndexResult<ProductAuthorization> {
        let Ok(url) = normalize_agent_url(agent_url) else {
            return Ok(ProductAuthorization {
                authorized: false,
                matched_properties: Vec::new(),
                unmatched_selectors: selectors.to_vec(),
            });
        };
        let state = self.read_state();
        let (matched, unmatched) = state.authorized_matches(&url, selectors);
        let matched_properties: Vec<Property> = matched
            .iter()
            .filter_map(|pid| state.properties.get(pid).cloned())
            .collect();
        Ok(ProductAuthorization {
            authorized: !matched_properties.is_empty(),
            matched_properties,
            unmatched_selectors: unmatched,
        })
    }

    async fn expand_properties_to_identifiers(
        &self,
        agent_url: &str,
        selectors: &[SelectorExpression],
    ) -> IndexResult<Vec<PropertyIdentifierExpansion>> {
        let Ok(url) = normalize_agent_url(agent_url) else {
            return Ok(Vec::new());
        };
        let state = self.read_state();
        let (matched, _) = state.authorized_matches(&url, selectors);
        Ok(matched
            .iter()
            .filter_map(|pid| state.properties.get(pid))
            .map(|property| PropertyIdentifierExpansion {
                property: property.clone(),
                identifiers: property.identifiers.clone(),
            })
            .collect())
    }

    async fn is_property_authorized_for_agent(
        &self,
        agent_url: &str,
        identifier_type: IdentifierType,
        value: &str,
    ) -> IndexResult<AuthorizationCheck> {
        let Ok(url) = normalize_agent_url(agent_url) else {
            return Ok(AuthorizationCheck::denied());
        };
        let key = identifier_key(identifier_type, value);
        let state = self.read_state();
        let (Some(pids), Some(edges)) = (
            state.properties_by_identifier.get(&key),
            state.edges_by_agent.get(&url),
        ) else {
            return Ok(AuthorizationCheck::denied());
        };
        for pid in pids {
            if edges.contains_key(pid) {
                if let Some(property) = state.properties.get(pid) {
                    return Ok(AuthorizationCheck::granted(property.clone()));
                }
            }
        }
        Ok(AuthorizationCheck::denied())
    }

    async fn get_stats(&self) -> IndexResult<IndexStats> {
        let state = self.read_state();
        let mut by_source = SourceBreakdown::default();
        for agent in state.agents.values() {
            match agent.source {
                AgentSource::Registered => by_source.registered += 1,
                AgentSource::Discovered => by_source.discovered += 1,
            }
        }
        Ok(IndexStats {
            agent_count: state.agents.len(),
            publisher_count: state.publishers.len(),
            property_count: state.properties.len(),
            edge_count: state.edges_by_agent.values().map(|e| e.len()).sum(),
            by_source,
            last_crawl_finished_at: state.crawl_runs.back().map(|r| r.finished_at),
        })
    }

    async fn recent_crawl_runs(&self, limit: usize) -> IndexResult<Vec<CrawlRun>> {
        let state = self.read_state();
        Ok(state.crawl_runs.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PropertyIdentifier, PropertyType};
    use crate::validation::{AuthorizedAgent, NormalizedDocument, ValidationResult};

    fn agent_ref(url: &str) -> AuthorizedAgent {
        AuthorizedAgent {
            url: url.to_string(),
            authorized_for: None,
        }
    }

    fn site(publisher: &str, id_domain: &str, tags: &[&str]) -> Property {
        Property::new(
            publisher,
            PropertyType::Website,
            Some(id_domain.to_string()),
            tags.iter().map(|t| t.to_string()),
            vec![PropertyIdentifier::new(IdentifierType::Domain, id_domain)],
        )
    }

    fn accepted(domain: &str, agents: Vec<AuthorizedAgent>, props: Vec<Property>) -> ValidationResult {
        let doc = NormalizedDocument::new(agents, props).unwrap();
        ValidationResult::accepted(domain, 200, doc, Vec::new(), None)
    }

    #[tokio::test]
    async fn test_insert_then_unchanged_short_circuit() {
        let index = MemoryIndex::new();
        let result = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &[])],
        );

        let first = index.upsert_publisher("example.com", &result).await.unwrap();
        assert_eq!(first, UpsertOutcome::Inserted { agents_discovered: 1 });

        // Same content, later crawl: only freshness moves.
        let again = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &[])],
        );
        let second = index.upsert_publisher("example.com", &again).await.unwrap();
        assert_eq!(second, UpsertOutcome::Unchanged);

        let publisher = index.get_publisher("example.com").await.unwrap().unwrap();
        assert_eq!(publisher.last_validated_at, Some(again.checked_at));
        assert_eq!(publisher.last_changed_at, Some(result.checked_at));
    }

    #[tokio::test]
    async fn test_replace_revokes_dropped_properties() {
        let index = MemoryIndex::new();
        let agent = "https://agent.example.net";
        let both = accepted(
            "example.com",
            vec![agent_ref(agent)],
            vec![site("example.com", "example.com", &[]), site("example.com", "blog.example.com", &[])],
        );
        index.upsert_publisher("example.com", &both).await.unwrap();

        let check = index
            .is_property_authorized_for_agent(agent, IdentifierType::Domain, "blog.example.com")
            .await
            .unwrap();
        assert!(check.authorized);

        // New document drops the blog property.
        let one = accepted(
            "example.com",
            vec![agent_ref(agent)],
            vec![site("example.com", "example.com", &[])],
        );
        let outcome = index.upsert_publisher("example.com", &one).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated { agents_discovered: 0 });

        let check = index
            .is_property_authorized_for_agent(agent, IdentifierType::Domain, "blog.example.com")
            .await
            .unwrap();
        assert!(!check.authorized, "dropped property is revoked");
        let still = index
            .is_property_authorized_for_agent(agent, IdentifierType::Domain, "example.com")
            .await
            .unwrap();
        assert!(still.authorized);
    }

    #[tokio::test]
    async fn test_network_failure_leaves_index_untouched() {
        let index = MemoryIndex::new();
        let ok = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &[])],
        );
        index.upsert_publisher("example.com", &ok).await.unwrap();

        let down = ValidationResult::unreachable("example.com", None, "connect timeout");
        let outcome = index.upsert_publisher("example.com", &down).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);

        let publisher = index.get_publisher("example.com").await.unwrap().unwrap();
        assert_eq!(publisher.validation_status, ValidationStatus::Valid);
        assert_eq!(publisher.properties.len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_marks_invalid_but_retains_data() {
        let index = MemoryIndex::new();
        let ok = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &[])],
        );
        index.upsert_publisher("example.com", &ok).await.unwrap();

        let gone = ValidationResult::rejected(
            "example.com",
            Some(404),
            vec![crate::validation::ValidationIssue::new(
                crate::validation::IssueKind::HttpStatus,
                "status 404",
            )],
            Vec::new(),
            None,
        );
        let outcome = index.upsert_publisher("example.com", &gone).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::MarkedInvalid);

        let publisher = index.get_publisher("example.com").await.unwrap().unwrap();
        assert_eq!(publisher.validation_status, ValidationStatus::Invalid);
        assert_eq!(publisher.properties.len(), 1, "prior data retained");

        // The old document reappearing flips the publisher back to valid.
        let back = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &[])],
        );
        let outcome = index.upsert_publisher("example.com", &back).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        let publisher = index.get_publisher("example.com").await.unwrap().unwrap();
        assert_eq!(publisher.validation_status, ValidationStatus::Valid);
    }

    #[tokio::test]
    async fn test_register_promotes_discovered_agent() {
        let index = MemoryIndex::new();
        let ok = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &[])],
        );
        index.upsert_publisher("example.com", &ok).await.unwrap();

        let discovered = index
            .get_agent("https://agent.example.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(discovered.source, AgentSource::Discovered);
        let first_seen = discovered.first_discovered_at;
        assert!(first_seen.is_some());

        index
            .register_agent(Agent::registered(
                "https://agent.example.net/",
                Some("Example Agent".to_string()),
                AgentType::Sales,
                Some("a2a".to_string()),
            ))
            .await
            .unwrap();

        let promoted = index
            .get_agent("https://agent.example.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(promoted.source, AgentSource::Registered);
        assert_eq!(promoted.name.as_deref(), Some("Example Agent"));
        assert_eq!(promoted.first_discovered_at, first_seen);
    }

    #[tokio::test]
    async fn test_enrich_fills_gaps_on_discovered_only() {
        let index = MemoryIndex::new();
        let ok = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &[])],
        );
        index.upsert_publisher("example.com", &ok).await.unwrap();

        let changed = index
            .enrich_agent_metadata(
                "https://agent.example.net",
                Some("Agent".to_string()),
                Some("mcp".to_string()),
            )
            .await
            .unwrap();
        assert!(changed);

        // Second enrichment has nothing to fill.
        let changed = index
            .enrich_agent_metadata(
                "https://agent.example.net",
                Some("Other".to_string()),
                None,
            )
            .await
            .unwrap();
        assert!(!changed);
        let agent = index
            .get_agent("https://agent.example.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agent.name.as_deref(), Some("Agent"));

        index
            .register_agent(Agent::registered(
                "https://sales.example.org",
                None,
                AgentType::Sales,
                None,
            ))
            .await
            .unwrap();
        let changed = index
            .enrich_agent_metadata("https://sales.example.org", Some("X".to_string()), None)
            .await
            .unwrap();
        assert!(!changed, "registered agents are never enriched");
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_preserves_answers() {
        let index = MemoryIndex::new();
        let ok = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &["news"])],
        );
        index.upsert_publisher("example.com", &ok).await.unwrap();

        let snapshot = index.snapshot();
        let restored = MemoryIndex::new();
        restored.load_snapshot(snapshot).unwrap();

        let check = restored
            .is_property_authorized_for_agent(
                "https://agent.example.net",
                IdentifierType::Domain,
                "EXAMPLE.COM",
            )
            .await
            .unwrap();
        assert!(check.authorized);

        // Digest survives, so the next identical crawl is still a no-op.
        let again = accepted(
            "example.com",
            vec![agent_ref("https://agent.example.net")],
            vec![site("example.com", "example.com", &["news"])],
        );
        let outcome = restored
            .upsert_publisher("example.com", &again)
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
    }
}
