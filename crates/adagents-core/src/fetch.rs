//! Document fetching.
//!
//! [`DocumentFetcher`] is the injectable seam between the validator and the
//! network: production uses [`HttpFetcher`] (reqwest), tests plug in stubs.
//! Transport failures are the only `Err` case — any HTTP response,
//! including 4xx/5xx, comes back as a payload so the validator can classify
//! it.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

/// Well-known path of a publisher's authorization document.
pub const ADAGENTS_WELL_KNOWN_PATH: &str = "/.well-known/adagents.json";

/// Well-known path of an agent's self-description card.
pub const AGENT_CARD_WELL_KNOWN_PATH: &str = "/.well-known/agent.json";

/// Hard cap on response bodies; documents are small, anything bigger is
/// hostile or broken.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Default per-request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// An HTTP response as seen by the validator.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub status: u16,
    pub body: String,
}

impl FetchedPayload {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Transport-level fetch failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response too large: {0} bytes")]
    TooLarge(usize),
}

impl FetchError {
    /// True for transient failures where the remote may simply be down.
    /// An unusable URL or an oversized body will not fix itself, so those
    /// classify as document failures instead.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Connect(_))
    }
}

/// Injectable GET-one-URL seam.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch `url`. Any HTTP response is `Ok`; only transport failures
    /// (timeout, connect, oversized body, unusable URL) are `Err`.
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError>;
}

/// Production fetcher over a shared `reqwest` client.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> RegistryResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Config(format!("http client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if let Some(len) = response.content_length() {
            if len > MAX_BODY_BYTES as u64 {
                return Err(FetchError::TooLarge(len as usize));
            }
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Connect(e.to_string())
            }
        })?;
        if body.len() > MAX_BODY_BYTES {
            return Err(FetchError::TooLarge(body.len()));
        }

        debug!(url = %url, status = status, bytes = body.len(), "fetched");
        Ok(FetchedPayload { status, body })
    }
}

/// The authorization document URL for a publisher domain.
pub fn adagents_url(domain: &str) -> String {
    format!(
        "https://{}{}",
        federated_index::normalize_domain(domain),
        ADAGENTS_WELL_KNOWN_PATH
    )
}

/// The agent-card URL for an agent endpoint.
pub fn agent_card_url(agent_url: &str) -> String {
    format!(
        "{}{}",
        agent_url.trim_end_matches('/'),
        AGENT_CARD_WELL_KNOWN_PATH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_urls() {
        assert_eq!(
            adagents_url("Example.COM"),
            "https://example.com/.well-known/adagents.json"
        );
        assert_eq!(
            agent_card_url("https://agent.example.net/"),
            "https://agent.example.net/.well-known/agent.json"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(FetchError::Connect("refused".to_string()).is_transient());
        assert!(!FetchError::TooLarge(1).is_transient());
        assert!(!FetchError::InvalidUrl("not a url".to_string()).is_transient());
    }
}
