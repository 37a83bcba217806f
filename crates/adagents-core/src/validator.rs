//! Publisher document validation and agent-card corroboration.
//!
//! [`validate_domain`] never returns `Err`: every failure mode is encoded
//! in the [`ValidationResult`] so the crawler can distinguish "publisher
//! down" (index untouched) from "publisher serving garbage" (marked
//! invalid). The trust rule is one-directional — only the publisher's
//! document grants authorization; agent cards corroborate or warn.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

use federated_index::{AgentType, IssueKind, ValidationIssue, ValidationResult};

use crate::document::{self, AgentCard, RawAuthorizationDocument};
use crate::fetch::{adagents_url, agent_card_url, DocumentFetcher};

/// Fetch and validate one publisher's authorization document.
#[instrument(skip(fetcher))]
pub async fn validate_domain(fetcher: &dyn DocumentFetcher, domain: &str) -> ValidationResult {
    let url = adagents_url(domain);
    let payload = match fetcher.fetch(&url).await {
        Ok(payload) => payload,
        Err(e) if e.is_transient() => {
            debug!(domain = %domain, error = %e, "publisher unreachable");
            return ValidationResult::unreachable(domain, None, e.to_string());
        }
        Err(e) => {
            return ValidationResult::rejected(
                domain,
                None,
                vec![ValidationIssue::new(IssueKind::Schema, e.to_string())],
                Vec::new(),
                None,
            );
        }
    };

    // A 5xx says nothing about the document; the publisher is just down.
    if payload.status >= 500 {
        return ValidationResult::unreachable(
            domain,
            Some(payload.status),
            format!("status {}", payload.status),
        );
    }
    if payload.status != 200 {
        return ValidationResult::rejected(
            domain,
            Some(payload.status),
            vec![ValidationIssue::new(
                IssueKind::HttpStatus,
                format!("status {}", payload.status),
            )],
            Vec::new(),
            None,
        );
    }

    let value: Value = match serde_json::from_str(&payload.body) {
        Ok(value) => value,
        Err(e) => {
            return ValidationResult::rejected(
                domain,
                Some(payload.status),
                vec![ValidationIssue::new(
                    IssueKind::Parse,
                    format!("invalid json: {e}"),
                )],
                Vec::new(),
                None,
            );
        }
    };
    let raw: RawAuthorizationDocument = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(_) => {
            return ValidationResult::rejected(
                domain,
                Some(payload.status),
                vec![ValidationIssue::new(
                    IssueKind::Schema,
                    "document is not a JSON object",
                )],
                Vec::new(),
                Some(value),
            );
        }
    };

    let outcome = document::normalize(&raw, domain);
    match outcome.document {
        Some(doc) => {
            debug!(
                domain = %domain,
                agents = doc.authorized_agents.len(),
                properties = doc.properties.len(),
                warnings = outcome.warnings.len(),
                "document accepted"
            );
            ValidationResult::accepted(domain, payload.status, doc, outcome.warnings, Some(value))
        }
        None => ValidationResult::rejected(
            domain,
            Some(payload.status),
            outcome.errors,
            outcome.warnings,
            Some(value),
        ),
    }
}

// ---------------------------------------------------------------------------
// Agent cards
// ---------------------------------------------------------------------------

/// One agent whose self-description should corroborate a capability
/// surface.
#[derive(Debug, Clone)]
pub struct AgentCardExpectation {
    pub agent_url: String,
    pub agent_type: AgentType,
}

/// Per-agent outcome of a card check. A batch never fails as a whole.
#[derive(Debug, Clone)]
pub struct AgentCardResult {
    pub agent_url: String,
    /// Parsed card, when one was served.
    pub card: Option<AgentCard>,
    /// Why the card could not be read, when it couldn't.
    pub error: Option<String>,
    /// Corroboration warnings (surface not advertised, odd shapes).
    pub warnings: Vec<ValidationIssue>,
    pub checked_at: DateTime<Utc>,
}

impl AgentCardResult {
    /// Card fetched, parsed, and advertising the expected surface.
    pub fn corroborated(&self) -> bool {
        self.card.is_some() && self.error.is_none() && self.warnings.is_empty()
    }
}

/// Fetch each agent's `/.well-known/agent.json` and check it advertises
/// the expected surface. Unreachable or malformed cards are per-item
/// failures; mismatches are warnings.
pub async fn validate_agent_cards(
    fetcher: &dyn DocumentFetcher,
    expectations: &[AgentCardExpectation],
) -> Vec<AgentCardResult> {
    let mut results = Vec::with_capacity(expectations.len());
    for expectation in expectations {
        results.push(check_card(fetcher, expectation).await);
    }
    results
}

async fn check_card(
    fetcher: &dyn DocumentFetcher,
    expectation: &AgentCardExpectation,
) -> AgentCardResult {
    let mut result = AgentCardResult {
        agent_url: expectation.agent_url.clone(),
        card: None,
        error: None,
        warnings: Vec::new(),
        checked_at: Utc::now(),
    };

    let url = agent_card_url(&expectation.agent_url);
    let payload = match fetcher.fetch(&url).await {
        Ok(payload) => payload,
        Err(e) => {
            result.error = Some(e.to_string());
            return result;
        }
    };
    if payload.status != 200 {
        result.error = Some(format!("status {}", payload.status));
        return result;
    }

    let card: AgentCard = match serde_json::from_str::<Value>(&payload.body)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
    {
        Some(card) => card,
        None => {
            result.error = Some("card is not a JSON object".to_string());
            return result;
        }
    };

    let surface = expectation.agent_type.as_str();
    if !card.advertises(surface) {
        result.warnings.push(ValidationIssue::new(
            IssueKind::Schema,
            format!("card does not advertise {surface} capability"),
        ));
    }
    result.card = Some(card);
    result
}
