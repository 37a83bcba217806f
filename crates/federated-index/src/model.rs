//! Core records of the federated index: properties and their identifiers,
//! publishers, agents, authorization edges, and crawl run summaries.
//!
//! All identifier comparisons in the read API are exact but case-insensitive,
//! so every type that participates in keying normalizes its value (trim +
//! ASCII lowercase) while preserving the original string for display.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Kind of a property identifier.
///
/// Closed set: authorization documents naming an unrecognized identifier
/// type produce a schema warning and the identifier is dropped, rather than
/// admitting untyped data into the index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    Domain,
    AppBundleId,
    AppStoreId,
    RokuStoreId,
    PodcastGuid,
}

impl IdentifierType {
    /// Wire name of this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Domain => "domain",
            IdentifierType::AppBundleId => "app_bundle_id",
            IdentifierType::AppStoreId => "app_store_id",
            IdentifierType::RokuStoreId => "roku_store_id",
            IdentifierType::PodcastGuid => "podcast_guid",
        }
    }

    /// Parse a wire name, tolerating surrounding whitespace and case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "domain" => Some(IdentifierType::Domain),
            "app_bundle_id" => Some(IdentifierType::AppBundleId),
            "app_store_id" => Some(IdentifierType::AppStoreId),
            "roku_store_id" => Some(IdentifierType::RokuStoreId),
            "podcast_guid" => Some(IdentifierType::PodcastGuid),
            _ => None,
        }
    }
}

impl std::fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single machine-readable identifier of an advertising surface
/// (a domain name, an app bundle id, ...).
///
/// Immutable value type. Equality, ordering and hashing are on the
/// normalized value so `EXAMPLE.com` and `example.com` are the same
/// identifier; the original string is preserved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyIdentifier {
    /// Identifier kind.
    #[serde(rename = "type")]
    pub identifier_type: IdentifierType,
    /// Identifier value as published (trimmed).
    pub value: String,
}

impl PropertyIdentifier {
    pub fn new(identifier_type: IdentifierType, value: impl Into<String>) -> Self {
        Self {
            identifier_type,
            value: value.into().trim().to_string(),
        }
    }

    /// Normalized form of the value used for keying and comparison.
    pub fn normalized_value(&self) -> String {
        self.value.trim().to_ascii_lowercase()
    }
}

impl PartialEq for PropertyIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.identifier_type == other.identifier_type
            && self.normalized_value() == other.normalized_value()
    }
}

impl Eq for PropertyIdentifier {}

impl std::hash::Hash for PropertyIdentifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identifier_type.hash(state);
        self.normalized_value().hash(state);
    }
}

impl PartialOrd for PropertyIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropertyIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.identifier_type, self.normalized_value())
            .cmp(&(other.identifier_type, other.normalized_value()))
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Kind of advertising surface a property represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Website,
    MobileApp,
    CtvApp,
    Dooh,
    Podcast,
    Radio,
    StreamingAudio,
    /// Unrecognized value in a document; recorded as a warning upstream.
    #[serde(other)]
    Unknown,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Website => "website",
            PropertyType::MobileApp => "mobile_app",
            PropertyType::CtvApp => "ctv_app",
            PropertyType::Dooh => "dooh",
            PropertyType::Podcast => "podcast",
            PropertyType::Radio => "radio",
            PropertyType::StreamingAudio => "streaming_audio",
            PropertyType::Unknown => "unknown",
        }
    }

    /// Parse a wire name; unrecognized values map to [`PropertyType::Unknown`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "website" => PropertyType::Website,
            "mobile_app" => PropertyType::MobileApp,
            "ctv_app" => PropertyType::CtvApp,
            "dooh" => PropertyType::Dooh,
            "podcast" => PropertyType::Podcast,
            "radio" => PropertyType::Radio,
            "streaming_audio" => PropertyType::StreamingAudio,
            _ => PropertyType::Unknown,
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable identifier of a property.
///
/// Derived deterministically from the owning publisher domain, the property
/// type, and the sorted normalized identifier set, so re-crawling an
/// unchanged document regenerates identical ids (the idempotency anchor).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PropertyId(String);

impl PropertyId {
    /// Derive the id for a property owned by `publisher_domain`.
    pub fn derive(
        publisher_domain: &str,
        property_type: PropertyType,
        identifiers: &[PropertyIdentifier],
    ) -> Self {
        let mut keys: Vec<String> = identifiers
            .iter()
            .map(|i| format!("{}={}", i.identifier_type, i.normalized_value()))
            .collect();
        keys.sort();
        keys.dedup();

        let mut hasher = Sha256::new();
        hasher.update(normalize_domain(publisher_domain).as_bytes());
        hasher.update(b"\n");
        hasher.update(property_type.as_str().as_bytes());
        for key in keys {
            hasher.update(b"\n");
            hasher.update(key.as_bytes());
        }
        PropertyId(hex::encode(hasher.finalize()))
    }

    /// Full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars) for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A concrete advertising surface belonging to exactly one publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Deterministic property id (see [`PropertyId::derive`]).
    pub property_id: PropertyId,
    /// Domain of the owning publisher (normalized).
    pub publisher_domain: String,
    /// Surface kind.
    pub property_type: PropertyType,
    /// Display name, when the document provides one.
    pub name: Option<String>,
    /// Normalized (lowercased, trimmed) tags.
    pub tags: BTreeSet<String>,
    /// Sorted, deduplicated identifiers. Never empty for indexed properties.
    pub identifiers: Vec<PropertyIdentifier>,
}

impl Property {
    /// Build a property, normalizing tags and sorting identifiers, and
    /// deriving the stable id.
    pub fn new(
        publisher_domain: &str,
        property_type: PropertyType,
        name: Option<String>,
        tags: impl IntoIterator<Item = String>,
        mut identifiers: Vec<PropertyIdentifier>,
    ) -> Self {
        identifiers.sort();
        identifiers.dedup();
        let tags = tags
            .into_iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let publisher_domain = normalize_domain(publisher_domain);
        let property_id = PropertyId::derive(&publisher_domain, property_type, &identifiers);
        Self {
            property_id,
            publisher_domain,
            property_type,
            name,
            tags,
            identifiers,
        }
    }

    /// True when any identifier matches `(identifier_type, value)`
    /// case-insensitively.
    pub fn has_identifier(&self, identifier_type: IdentifierType, value: &str) -> bool {
        let needle = value.trim().to_ascii_lowercase();
        self.identifiers
            .iter()
            .any(|i| i.identifier_type == identifier_type && i.normalized_value() == needle)
    }

    /// True when the normalized tag set contains `tag` (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.trim().to_ascii_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Capability surface of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Sales,
    Creative,
    Signals,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Sales => "sales",
            AgentType::Creative => "creative",
            AgentType::Signals => "signals",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the registry learned about an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSource {
    /// Operator-curated registration (explicit allow-list).
    Registered,
    /// Named by a publisher's validated authorization document.
    Discovered,
}

/// A sales/creative/signals agent known to the registry.
///
/// Agent URLs are globally unique regardless of source. An agent that is
/// both registered and discovered keeps `source = registered` and the
/// registered display metadata; discovery-derived authorization edges
/// still apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Normalized endpoint URL (see [`normalize_agent_url`]).
    pub url: String,
    /// Display name, if known.
    pub name: Option<String>,
    /// Capability surface.
    pub agent_type: AgentType,
    /// Transport protocol the agent speaks (e.g. "mcp", "a2a"), if known.
    pub protocol: Option<String>,
    /// Provenance of this record.
    pub source: AgentSource,
    /// When the operator registered the agent.
    pub registered_at: Option<DateTime<Utc>>,
    /// First crawl that saw the agent named in a validated document.
    pub first_discovered_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// Operator-registered agent record.
    pub fn registered(
        url: impl Into<String>,
        name: Option<String>,
        agent_type: AgentType,
        protocol: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            name,
            agent_type,
            protocol,
            source: AgentSource::Registered,
            registered_at: Some(Utc::now()),
            first_discovered_at: None,
        }
    }

    /// Agent learned purely from a publisher's document. Documents name
    /// sales endpoints, so discovered agents default to the sales surface.
    pub fn discovered(url: impl Into<String>, discovered_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            name: None,
            agent_type: AgentType::Sales,
            protocol: None,
            source: AgentSource::Discovered,
            registered_at: None,
            first_discovered_at: Some(discovered_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Publishers & edges
// ---------------------------------------------------------------------------

/// Validation state of a publisher's authorization document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Last crawl parsed and accepted the document.
    Valid,
    /// Last crawl fetched something unusable; prior data is retained.
    Invalid,
    /// Never successfully crawled.
    Unknown,
}

/// A publisher as served by the read API: document state plus the full
/// property set its latest accepted document asserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    /// Normalized publisher domain.
    pub domain: String,
    /// Document validation state.
    pub validation_status: ValidationStatus,
    /// Last successful validation (moves on every accepted crawl, including
    /// unchanged re-crawls).
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Last crawl whose document content actually differed.
    pub last_changed_at: Option<DateTime<Utc>>,
    /// Agent URLs the latest accepted document authorizes, sorted.
    pub authorized_agents: Vec<String>,
    /// Properties asserted by the latest accepted document.
    pub properties: Vec<Property>,
}

/// One row of the authorization fact table: `agent_url` may transact on
/// `property_id`, asserted by `publisher_domain`'s document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationEdge {
    pub agent_url: String,
    pub property_id: PropertyId,
    /// Publisher whose document asserted this edge.
    pub publisher_domain: String,
    /// First crawl that asserted the edge; preserved across re-crawls.
    pub discovered_at: DateTime<Utc>,
    /// Last crawl that (re)wrote the edge.
    pub crawled_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Crawl runs & stats
// ---------------------------------------------------------------------------

/// Terminal status of one crawl pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlRunStatus {
    /// Every attempted publisher succeeded.
    Success,
    /// At least one publisher failed; the rest were ingested normally.
    PartialSuccess,
    /// The run could not start (e.g. empty roster).
    Failed,
}

/// A single per-publisher failure captured during a crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlFailure {
    /// Publisher visit target the failure belongs to.
    pub agent_url: String,
    /// Human-readable cause.
    pub error: String,
}

/// Append-only summary of one scheduler invocation; the unit of
/// partial-failure isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRun {
    pub run_id: Uuid,
    pub status: CrawlRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Publisher visits dispatched (deduplicated sales-agent hosts).
    pub agents_attempted: usize,
    pub agents_succeeded: usize,
    pub agents_failed: usize,
    /// Successful visits whose document content was unchanged.
    pub publishers_unchanged: usize,
    /// Visits skipped because another crawl held the publisher lock.
    pub publishers_skipped: usize,
    pub errors: Vec<CrawlFailure>,
}

impl CrawlRun {
    /// Duration of the run in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Agent counts split by provenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub registered: usize,
    pub discovered: usize,
}

/// Aggregate counts for operational dashboards. The only place freshness
/// is observable besides crawl run records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub agent_count: usize,
    pub publisher_count: usize,
    pub property_count: usize,
    pub edge_count: usize,
    pub by_source: SourceBreakdown,
    /// When the most recent crawl run finished, if any ran.
    pub last_crawl_finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

/// Normalize a publisher domain for keying: trim, strip a trailing FQDN
/// dot, lowercase.
pub fn normalize_domain(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Normalize an agent endpoint URL for keying: parse, require http(s),
/// reject embedded credentials, drop fragments, strip a trailing slash.
///
/// The `url` parser already lowercases the scheme and host.
pub fn normalize_agent_url(raw: &str) -> IndexResult<String> {
    let trimmed = raw.trim();
    let mut parsed = url::Url::parse(trimmed).map_err(|e| IndexError::InvalidAgentUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(IndexError::InvalidAgentUrl {
                url: trimmed.to_string(),
                reason: format!("unsupported scheme: {other}"),
            });
        }
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(IndexError::InvalidAgentUrl {
            url: trimmed.to_string(),
            reason: "credentials are not allowed".to_string(),
        });
    }
    parsed.set_fragment(None);
    let mut out = parsed.to_string();
    while out.ends_with('/') {
        out.pop();
    }
    Ok(out)
}

/// Host of an agent URL, used to derive the publisher domain to visit.
/// Returns `None` for URLs without a DNS host.
pub fn agent_url_host(agent_url: &str) -> Option<String> {
    let parsed = url::Url::parse(agent_url.trim()).ok()?;
    parsed.host_str().map(normalize_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(t: IdentifierType, v: &str) -> PropertyIdentifier {
        PropertyIdentifier::new(t, v)
    }

    #[test]
    fn test_identifier_equality_is_case_insensitive() {
        let a = ident(IdentifierType::Domain, "Example.COM");
        let b = ident(IdentifierType::Domain, "  example.com ");
        assert_eq!(a, b);
        assert_ne!(a, ident(IdentifierType::AppBundleId, "example.com"));
    }

    #[test]
    fn test_identifier_hash_agrees_with_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ident(IdentifierType::Domain, "Example.com"));
        assert!(set.contains(&ident(IdentifierType::Domain, "example.COM")));
    }

    #[test]
    fn test_identifier_type_parse() {
        assert_eq!(IdentifierType::parse(" Domain "), Some(IdentifierType::Domain));
        assert_eq!(
            IdentifierType::parse("app_bundle_id"),
            Some(IdentifierType::AppBundleId)
        );
        assert_eq!(IdentifierType::parse("made_up"), None);
    }

    #[test]
    fn test_property_type_parse_unknown() {
        assert_eq!(PropertyType::parse("website"), PropertyType::Website);
        assert_eq!(PropertyType::parse("hologram"), PropertyType::Unknown);
    }

    #[test]
    fn test_property_id_is_deterministic_and_order_independent() {
        let a = vec![
            ident(IdentifierType::Domain, "example.com"),
            ident(IdentifierType::Domain, "news.example.com"),
        ];
        let mut b = a.clone();
        b.reverse();
        let id_a = PropertyId::derive("Example.com", PropertyType::Website, &a);
        let id_b = PropertyId::derive("example.com.", PropertyType::Website, &b);
        assert_eq!(id_a, id_b);
        assert_eq!(id_a.short().len(), 12);
    }

    #[test]
    fn test_property_id_changes_with_content() {
        let ids = vec![ident(IdentifierType::Domain, "example.com")];
        let website = PropertyId::derive("example.com", PropertyType::Website, &ids);
        let podcast = PropertyId::derive("example.com", PropertyType::Podcast, &ids);
        assert_ne!(website, podcast);
    }

    #[test]
    fn test_property_new_normalizes_tags_and_identifiers() {
        let p = Property::new(
            "Example.COM",
            PropertyType::Website,
            Some("Example".to_string()),
            vec!["  Sports ".to_string(), "news".to_string(), "".to_string()],
            vec![
                ident(IdentifierType::Domain, "example.com"),
                ident(IdentifierType::Domain, "EXAMPLE.com"),
            ],
        );
        assert_eq!(p.publisher_domain, "example.com");
        assert_eq!(p.identifiers.len(), 1, "duplicate identifiers collapse");
        assert!(p.has_tag("SPORTS"));
        assert!(p.has_tag("news"));
        assert!(!p.has_tag(""));
        assert!(p.has_identifier(IdentifierType::Domain, " EXAMPLE.COM "));
    }

    #[test]
    fn test_normalize_agent_url() {
        assert_eq!(
            normalize_agent_url("HTTPS://Sales.Example.com/").unwrap(),
            "https://sales.example.com"
        );
        assert_eq!(
            normalize_agent_url("https://sales.example.com/a2a/#frag").unwrap(),
            "https://sales.example.com/a2a"
        );
        assert!(normalize_agent_url("ftp://sales.example.com").is_err());
        assert!(normalize_agent_url("https://user:pw@sales.example.com").is_err());
        assert!(normalize_agent_url("not a url").is_err());
    }

    #[test]
    fn test_agent_url_host() {
        assert_eq!(
            agent_url_host("https://Sales.Example.com/path"),
            Some("sales.example.com".to_string())
        );
        assert_eq!(agent_url_host("nonsense"), None);
    }

    #[test]
    fn test_normalize_domain_strips_fqdn_dot() {
        assert_eq!(normalize_domain(" Example.COM. "), "example.com");
    }
}
