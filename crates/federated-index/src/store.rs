//! The federated index contract
//!
//! `FederatedIndex` is the storage abstraction the crawler writes into and
//! every query surface reads from:
//! - writes: publisher upserts from validation results, operator agent
//!   registration, crawl run records
//! - reads: agent/publisher listings, authorization lookups, selector
//!   resolution, stats
//!
//! The trait is async and backend-agnostic. `MemoryIndex` in the `memory`
//! module is the shipped implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexResult;
use crate::model::{
    Agent, AgentType, CrawlRun, IdentifierType, IndexStats, Property, Publisher,
};
use crate::selector::SelectorExpression;
use crate::validation::ValidationResult;

// ---------------------------------------------------------------------------
// Query result shapes
// ---------------------------------------------------------------------------

/// What `upsert_publisher` did with a validation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// First valid document for this publisher.
    Inserted { agents_discovered: usize },
    /// Document content changed; properties and edges replaced.
    Updated { agents_discovered: usize },
    /// Digest matched the stored document; only freshness moved.
    Unchanged,
    /// Definitive rejection; publisher marked invalid, prior data retained.
    MarkedInvalid,
    /// Network-kind failure; the index was left untouched.
    Skipped,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted { .. } => "inserted",
            UpsertOutcome::Updated { .. } => "updated",
            UpsertOutcome::Unchanged => "unchanged",
            UpsertOutcome::MarkedInvalid => "marked_invalid",
            UpsertOutcome::Skipped => "skipped",
        }
    }
}

/// Answer to "may this agent transact on behalf of this product's
/// properties?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAuthorization {
    /// True when at least one selector resolved to at least one property
    /// the agent is authorized for.
    pub authorized: bool,
    /// Properties that matched a selector and are authorized for the agent.
    pub matched_properties: Vec<Property>,
    /// Selectors that resolved to nothing authorized. Informational.
    pub unmatched_selectors: Vec<SelectorExpression>,
}

/// One property with its identifiers fanned out for delivery matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyIdentifierExpansion {
    pub property: Property,
    /// All identifiers of the property, normalized order.
    pub identifiers: Vec<crate::model::PropertyIdentifier>,
}

/// Answer to the `(agent, identifier)` authorization fast path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCheck {
    pub authorized: bool,
    /// The authorized property, when one was found.
    pub property: Option<Property>,
}

impl AuthorizationCheck {
    pub fn denied() -> Self {
        Self {
            authorized: false,
            property: None,
        }
    }

    pub fn granted(property: Property) -> Self {
        Self {
            authorized: true,
            property: Some(property),
        }
    }
}

// ---------------------------------------------------------------------------
// FederatedIndex
// ---------------------------------------------------------------------------

/// Queryable index over publisher authorization documents.
///
/// Guarantees:
/// - `upsert_publisher` is atomic per publisher: readers see either the
///   previous state or the new one, never a partial replace.
/// - Reads never block on network I/O and may serve stale data; staleness
///   is observable only through `last_validated_at` / `crawled_at`.
/// - Absence is an empty answer (`None` / empty `Vec`), never an error.
/// - Agent URLs and identifier values are compared case-insensitively in
///   their normalized forms.
#[async_trait]
pub trait FederatedIndex: Send + Sync {
    // --- writes ---

    /// Upsert an operator-registered agent, keyed by normalized URL.
    ///
    /// Registered data wins: if the agent was previously auto-discovered,
    /// the record is promoted and its `first_discovered_at` preserved.
    async fn register_agent(&self, agent: Agent) -> IndexResult<()>;

    /// Apply one publisher's validation result.
    ///
    /// `domain` is the crawl target key; it is normalized before use.
    /// Valid results replace the publisher's properties and authorization
    /// edges wholesale (properties absent from the new document are
    /// revoked). Definitive rejections mark the publisher invalid but
    /// retain prior data. Network-kind failures are skipped entirely.
    async fn upsert_publisher(
        &self,
        domain: &str,
        result: &ValidationResult,
    ) -> IndexResult<UpsertOutcome>;

    /// Fill in `name` / `protocol` on a *discovered* agent when missing.
    ///
    /// Registered agents are never modified. Returns true when a field
    /// was actually filled.
    async fn enrich_agent_metadata(
        &self,
        agent_url: &str,
        name: Option<String>,
        protocol: Option<String>,
    ) -> IndexResult<bool>;

    /// Append a finished crawl run. Retention is bounded; oldest runs are
    /// dropped first.
    async fn record_crawl_run(&self, run: CrawlRun) -> IndexResult<()>;

    // --- reads: agents & publishers ---

    /// All known agents, optionally filtered by type, sorted by URL.
    async fn list_all_agents(&self, agent_type: Option<AgentType>) -> IndexResult<Vec<Agent>>;

    /// One agent by normalized URL.
    async fn get_agent(&self, agent_url: &str) -> IndexResult<Option<Agent>>;

    /// All crawled publishers, sorted by domain.
    async fn list_all_publishers(&self) -> IndexResult<Vec<Publisher>>;

    /// One publisher by normalized domain.
    async fn get_publisher(&self, domain: &str) -> IndexResult<Option<Publisher>>;

    // --- reads: authorization graph ---

    /// Every property the agent is currently authorized for.
    async fn get_properties_for_agent(&self, agent_url: &str) -> IndexResult<Vec<Property>>;

    /// Domains of publishers whose documents currently name the agent.
    async fn get_publisher_domains_for_agent(&self, agent_url: &str) -> IndexResult<Vec<String>>;

    /// Domain-type identifier values across the agent's authorized
    /// properties. The flat "which sites can this agent sell?" view.
    async fn get_domains_for_agent(&self, agent_url: &str) -> IndexResult<Vec<String>>;

    /// Agents authorized for any property carrying the given identifier.
    async fn find_agents_for_property_identifier(
        &self,
        identifier_type: IdentifierType,
        value: &str,
    ) -> IndexResult<Vec<Agent>>;

    /// Agents authorized for `domain` as a domain identifier. The
    /// publisher-level convenience wrapper over
    /// `find_agents_for_property_identifier`.
    async fn lookup_domain(&self, domain: &str) -> IndexResult<Vec<Agent>>;

    // --- reads: selector resolution ---

    /// Resolve product selectors and intersect with the agent's
    /// authorizations. A selector that resolves to nothing authorized is
    /// reported in `unmatched_selectors`, not an error.
    async fn validate_agent_for_product(
        &self,
        agent_url: &str,
        selectors: &[SelectorExpression],
    ) -> IndexResult<ProductAuthorization>;

    /// Same resolution as `validate_agent_for_product`, fanned out to the
    /// full identifier list per matched property.
    async fn expand_properties_to_identifiers(
        &self,
        agent_url: &str,
        selectors: &[SelectorExpression],
    ) -> IndexResult<Vec<PropertyIdentifierExpansion>>;

    /// Fast path: is the property carrying `(identifier_type, value)`
    /// authorized for the agent? One index lookup, no scan.
    async fn is_property_authorized_for_agent(
        &self,
        agent_url: &str,
        identifier_type: IdentifierType,
        value: &str,
    ) -> IndexResult<AuthorizationCheck>;

    // --- reads: operational ---

    /// Aggregate counts plus the last crawl finish time.
    async fn get_stats(&self) -> IndexResult<IndexStats>;

    /// Most recent crawl runs, newest first, at most `limit`.
    async fn recent_crawl_runs(&self, limit: usize) -> IndexResult<Vec<CrawlRun>>;
}
