//! Publisher deployment coverage.
//!
//! Operators onboarding a publisher want to know whether the agents they
//! expect are actually named by that publisher's live document, and
//! whether those agents are up. [`DeploymentTracker`] answers with a
//! per-domain report built from the index plus a card reachability
//! probe. Read-side only: an absent or invalid publisher is a reported
//! issue, never an error.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use federated_index::{normalize_agent_url, FederatedIndex, ValidationStatus};

use crate::discovery::CapabilityDiscovery;
use crate::error::RegistryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentIssueKind {
    /// The publisher has no currently-valid document in the index.
    MissingDocument,
    /// An expected agent is absent from the publisher's document.
    AgentNotListed,
    /// An expected agent served no card when probed.
    AgentUnreachable,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentIssue {
    pub kind: DeploymentIssueKind,
    /// Agent the issue concerns, when agent-scoped.
    pub agent_url: Option<String>,
    pub detail: String,
}

/// Coverage of one publisher's document against operator expectations.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub domain: String,
    /// Share of expected agents the document lists, 0–100.
    pub coverage_percent: f64,
    /// Agent URLs named by the publisher's latest valid document.
    pub listed: Vec<String>,
    pub issues: Vec<DeploymentIssue>,
    pub generated_at: DateTime<Utc>,
}

impl DeploymentReport {
    pub fn fully_covered(&self) -> bool {
        self.issues.is_empty()
    }
}

pub struct DeploymentTracker {
    index: Arc<dyn FederatedIndex>,
    discovery: Arc<CapabilityDiscovery>,
}

impl DeploymentTracker {
    pub fn new(index: Arc<dyn FederatedIndex>, discovery: Arc<CapabilityDiscovery>) -> Self {
        Self { index, discovery }
    }

    /// Compare `expected_agents` against what `domain`'s document lists
    /// and probe each expected agent's card.
    pub async fn report(
        &self,
        domain: &str,
        expected_agents: &[String],
    ) -> RegistryResult<DeploymentReport> {
        let publisher = self.index.get_publisher(domain).await?;
        let mut issues = Vec::new();

        let listed: Vec<String> = match &publisher {
            Some(p) if p.validation_status == ValidationStatus::Valid => {
                p.authorized_agents.clone()
            }
            Some(_) => {
                issues.push(DeploymentIssue {
                    kind: DeploymentIssueKind::MissingDocument,
                    agent_url: None,
                    detail: format!("the last crawled document for {domain} failed validation"),
                });
                Vec::new()
            }
            None => {
                issues.push(DeploymentIssue {
                    kind: DeploymentIssueKind::MissingDocument,
                    agent_url: None,
                    detail: format!("{domain} has never served a valid document"),
                });
                Vec::new()
            }
        };

        let listed_set: HashSet<&str> = listed.iter().map(String::as_str).collect();
        let mut listed_count = 0usize;
        for expected in expected_agents {
            let agent_url =
                normalize_agent_url(expected).unwrap_or_else(|_| expected.clone());
            if listed_set.contains(agent_url.as_str()) {
                listed_count += 1;
            } else {
                issues.push(DeploymentIssue {
                    kind: DeploymentIssueKind::AgentNotListed,
                    agent_url: Some(agent_url.clone()),
                    detail: format!("document does not list {agent_url}"),
                });
            }
            // A listed-but-down agent is still an operational problem.
            if self.discovery.profile(&agent_url).await.is_none() {
                issues.push(DeploymentIssue {
                    kind: DeploymentIssueKind::AgentUnreachable,
                    agent_url: Some(agent_url.clone()),
                    detail: format!("{agent_url} served no agent card"),
                });
            }
        }

        let coverage_percent = if expected_agents.is_empty() {
            100.0
        } else {
            listed_count as f64 * 100.0 / expected_agents.len() as f64
        };

        Ok(DeploymentReport {
            domain: federated_index::normalize_domain(domain),
            coverage_percent,
            listed,
            issues,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use federated_index::{AuthorizedAgent, MemoryIndex, NormalizedDocument, ValidationResult};

    use crate::fetch::{DocumentFetcher, FetchError, FetchedPayload};

    struct MockFetcher {
        responses: Mutex<HashMap<String, Result<FetchedPayload, FetchError>>>,
    }

    impl MockFetcher {
        fn with(entries: Vec<(String, Result<FetchedPayload, FetchError>)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(entries.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl DocumentFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
            self.responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Connect(format!("no route to {url}"))))
        }
    }

    fn card_entry(agent_url: &str) -> (String, Result<FetchedPayload, FetchError>) {
        (
            format!("{agent_url}/.well-known/agent.json"),
            Ok(FetchedPayload::ok(
                json!({"name": "Agent", "skills": ["sales"]}).to_string(),
            )),
        )
    }

    async fn index_with_listing(domain: &str, agents: &[&str]) -> Arc<MemoryIndex> {
        let index = Arc::new(MemoryIndex::new());
        let authorized = agents
            .iter()
            .map(|url| AuthorizedAgent {
                url: url.to_string(),
                authorized_for: None,
            })
            .collect();
        let doc = NormalizedDocument::new(authorized, Vec::new()).unwrap();
        let result = ValidationResult::accepted(domain, 200, doc, Vec::new(), None);
        index.upsert_publisher(domain, &result).await.unwrap();
        index
    }

    fn tracker(index: Arc<MemoryIndex>, fetcher: Arc<MockFetcher>) -> DeploymentTracker {
        let discovery = Arc::new(CapabilityDiscovery::new(fetcher, Duration::from_secs(600)));
        DeploymentTracker::new(index, discovery)
    }

    #[tokio::test]
    async fn test_unknown_publisher_reports_missing_document() {
        let index = Arc::new(MemoryIndex::new());
        let fetcher = MockFetcher::with(vec![card_entry("https://a.example.net")]);
        let tracker = tracker(index, fetcher);

        let report = tracker
            .report("example.com", &["https://a.example.net".to_string()])
            .await
            .unwrap();

        assert_eq!(report.coverage_percent, 0.0);
        assert!(report.listed.is_empty());
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == DeploymentIssueKind::MissingDocument));
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == DeploymentIssueKind::AgentNotListed));
    }

    #[tokio::test]
    async fn test_full_coverage_with_reachable_agents() {
        let index = index_with_listing(
            "example.com",
            &["https://a.example.net", "https://b.example.net"],
        )
        .await;
        let fetcher = MockFetcher::with(vec![
            card_entry("https://a.example.net"),
            card_entry("https://b.example.net"),
        ]);
        let tracker = tracker(index, fetcher);

        let report = tracker
            .report(
                "EXAMPLE.com",
                &[
                    "https://a.example.net".to_string(),
                    "https://b.example.net/".to_string(),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.domain, "example.com");
        assert_eq!(report.coverage_percent, 100.0);
        assert!(report.fully_covered(), "issues: {:?}", report.issues);
        assert_eq!(report.listed.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_coverage_and_unreachable_probe() {
        let index = index_with_listing("example.com", &["https://a.example.net"]).await;
        let fetcher = MockFetcher::with(vec![card_entry("https://a.example.net")]);
        let tracker = tracker(index, fetcher);

        let report = tracker
            .report(
                "example.com",
                &[
                    "https://a.example.net".to_string(),
                    "https://b.example.net".to_string(),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.coverage_percent, 50.0);
        let kinds: Vec<_> = report.issues.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&DeploymentIssueKind::AgentNotListed));
        assert!(kinds.contains(&DeploymentIssueKind::AgentUnreachable));
        assert!(!kinds.contains(&DeploymentIssueKind::MissingDocument));
    }
}
