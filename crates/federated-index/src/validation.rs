//! Validation outcome records: what a crawl of one publisher produced.
//!
//! The fetcher/validator in `adagents-core` produces a [`ValidationResult`];
//! the index consumes it in `upsert_publisher`. Failures are data, not
//! errors — the issue kind tells the caller whether the publisher was
//! unreachable (leave data untouched) or served something unusable (mark
//! invalid, retain prior data).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IndexResult;
use crate::model::{normalize_domain, Property};

/// Classification of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Timeout, connection failure, or 5xx — the publisher may be fine.
    Network,
    /// A definitive non-success HTTP answer (404 and friends).
    HttpStatus,
    /// Payload was not parseable JSON.
    Parse,
    /// Payload parsed but violates the document schema.
    Schema,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Network => "network",
            IssueKind::HttpStatus => "http_status",
            IssueKind::Parse => "parse",
            IssueKind::Schema => "schema",
        }
    }

    /// True for transient, publisher-data-untouched failures.
    pub fn is_network(&self) -> bool {
        matches!(self, IssueKind::Network)
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One structured diagnostic from document validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// An agent named in a publisher's `authorized_agents` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedAgent {
    /// Normalized agent endpoint URL.
    pub url: String,
    /// The publisher's free-text scope description, if present.
    pub authorized_for: Option<String>,
}

/// The normalized, accepted content of an authorization document.
///
/// Agents and properties are sorted and deduplicated so serialization is
/// deterministic; `digest` is the SHA-256 of that canonical form and is
/// what makes unchanged re-crawls a cheap no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    /// SHA-256 hex of the canonical serialized content.
    pub digest: String,
    /// Agents the document authorizes, sorted by URL.
    pub authorized_agents: Vec<AuthorizedAgent>,
    /// Properties the document asserts, sorted by property id.
    pub properties: Vec<Property>,
}

impl NormalizedDocument {
    /// Build the canonical document: sort, dedupe, digest.
    pub fn new(
        mut authorized_agents: Vec<AuthorizedAgent>,
        mut properties: Vec<Property>,
    ) -> IndexResult<Self> {
        authorized_agents.sort_by(|a, b| a.url.cmp(&b.url));
        authorized_agents.dedup_by(|a, b| a.url == b.url);
        properties.sort_by(|a, b| a.property_id.cmp(&b.property_id));
        properties.dedup_by(|a, b| a.property_id == b.property_id);

        let canonical = serde_json::to_vec(&(&authorized_agents, &properties))?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        let digest = hex::encode(hasher.finalize());

        Ok(Self {
            digest,
            authorized_agents,
            properties,
        })
    }
}

/// Result of validating one publisher's authorization document.
///
/// Soft by construction: fetch failures, bad payloads, and schema
/// violations all come back as `valid = false` with populated `errors`
/// rather than as an `Err`. `document` is `Some` iff `valid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Normalized publisher domain the document was fetched for.
    pub domain: String,
    /// Whether the document was accepted.
    pub valid: bool,
    /// HTTP status of the fetch, when a response was received.
    pub status_code: Option<u16>,
    /// Fatal problems (empty when `valid`).
    pub errors: Vec<ValidationIssue>,
    /// Non-fatal anomalies (unknown fields, dropped entries, ...).
    pub warnings: Vec<ValidationIssue>,
    /// Accepted content, present iff `valid`.
    pub document: Option<NormalizedDocument>,
    /// Raw payload as parsed, for operator inspection.
    pub raw_document: Option<serde_json::Value>,
    /// When validation ran.
    pub checked_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Accepted document.
    pub fn accepted(
        domain: &str,
        status_code: u16,
        document: NormalizedDocument,
        warnings: Vec<ValidationIssue>,
        raw_document: Option<serde_json::Value>,
    ) -> Self {
        Self {
            domain: normalize_domain(domain),
            valid: true,
            status_code: Some(status_code),
            errors: Vec::new(),
            warnings,
            document: Some(document),
            raw_document,
            checked_at: Utc::now(),
        }
    }

    /// Rejected document (parse or schema failure, or a definitive HTTP
    /// answer like 404). The publisher will be marked invalid.
    pub fn rejected(
        domain: &str,
        status_code: Option<u16>,
        errors: Vec<ValidationIssue>,
        warnings: Vec<ValidationIssue>,
        raw_document: Option<serde_json::Value>,
    ) -> Self {
        Self {
            domain: normalize_domain(domain),
            valid: false,
            status_code,
            errors,
            warnings,
            document: None,
            raw_document,
            checked_at: Utc::now(),
        }
    }

    /// Unreachable publisher (timeout, connection failure, 5xx). The index
    /// leaves the publisher's data untouched.
    pub fn unreachable(domain: &str, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            domain: normalize_domain(domain),
            valid: false,
            status_code,
            errors: vec![ValidationIssue::new(IssueKind::Network, message)],
            warnings: Vec::new(),
            document: None,
            raw_document: None,
            checked_at: Utc::now(),
        }
    }

    /// True when every error is network-kind — a crawl failure that must
    /// never be interpreted as revocation.
    pub fn is_network_failure(&self) -> bool {
        !self.valid && !self.errors.is_empty() && self.errors.iter().all(|e| e.kind.is_network())
    }

    /// Joined error messages, for crawl run records and log lines.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "unknown error".to_string();
        }
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdentifierType, PropertyIdentifier, PropertyType};

    fn site_property(domain: &str) -> Property {
        Property::new(
            domain,
            PropertyType::Website,
            None,
            Vec::new(),
            vec![PropertyIdentifier::new(IdentifierType::Domain, domain)],
        )
    }

    #[test]
    fn test_normalized_document_digest_is_stable() {
        let agents = vec![
            AuthorizedAgent {
                url: "https://b.example.com".to_string(),
                authorized_for: None,
            },
            AuthorizedAgent {
                url: "https://a.example.com".to_string(),
                authorized_for: Some("everything".to_string()),
            },
        ];
        let props = vec![site_property("example.com")];

        let doc1 = NormalizedDocument::new(agents.clone(), props.clone()).unwrap();
        let mut reversed = agents;
        reversed.reverse();
        let doc2 = NormalizedDocument::new(reversed, props).unwrap();

        assert_eq!(doc1.digest, doc2.digest, "digest ignores input order");
        assert_eq!(doc1.authorized_agents[0].url, "https://a.example.com");
    }

    #[test]
    fn test_normalized_document_digest_tracks_content() {
        let props = vec![site_property("example.com")];
        let one = NormalizedDocument::new(
            vec![AuthorizedAgent {
                url: "https://a.example.com".to_string(),
                authorized_for: None,
            }],
            props.clone(),
        )
        .unwrap();
        let none = NormalizedDocument::new(Vec::new(), props).unwrap();
        assert_ne!(one.digest, none.digest);
    }

    #[test]
    fn test_network_failure_classification() {
        let down = ValidationResult::unreachable("example.com", None, "connect timeout");
        assert!(down.is_network_failure());
        assert!(!down.valid);

        let bad = ValidationResult::rejected(
            "example.com",
            Some(404),
            vec![ValidationIssue::new(IssueKind::HttpStatus, "status 404")],
            Vec::new(),
            None,
        );
        assert!(!bad.is_network_failure());
    }

    #[test]
    fn test_error_summary_joins_messages() {
        let res = ValidationResult::rejected(
            "example.com",
            Some(200),
            vec![
                ValidationIssue::new(IssueKind::Parse, "not json"),
                ValidationIssue::new(IssueKind::Schema, "authorized_agents missing"),
            ],
            Vec::new(),
            None,
        );
        let summary = res.error_summary();
        assert!(summary.contains("not json"));
        assert!(summary.contains("authorized_agents missing"));
    }

    #[test]
    fn test_accepted_normalizes_domain() {
        let doc = NormalizedDocument::new(Vec::new(), Vec::new()).unwrap();
        let res = ValidationResult::accepted("Example.COM.", 200, doc, Vec::new(), None);
        assert_eq!(res.domain, "example.com");
        assert!(res.valid);
        assert!(res.errors.is_empty());
    }
}
