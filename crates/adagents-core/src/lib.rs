//! Agent Authorization Registry Core
//!
//! Crawling, validation, and enrichment for the federated agent
//! authorization registry: fetches `/.well-known/adagents.json` from
//! publishers, validates and normalizes the declarations, and keeps the
//! queryable index in `federated-index` fresh.

pub mod config;
pub mod crawler;
pub mod deployment;
pub mod discovery;
pub mod document;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod roster;
pub mod telemetry;
pub mod validator;

pub use config::RegistryConfig;

pub use crawler::{CrawlConfig, CrawlScheduler, ScheduleHandle};

pub use deployment::{DeploymentIssue, DeploymentIssueKind, DeploymentReport, DeploymentTracker};

pub use discovery::{CapabilityDiscovery, CapabilityProfile, DEFAULT_PROFILE_TTL};

pub use document::{normalize, AgentCard, NormalizationOutcome, RawAuthorizationDocument};

pub use error::{RegistryError, RegistryResult};

pub use fetch::{
    adagents_url, agent_card_url, DocumentFetcher, FetchError, FetchedPayload, HttpFetcher,
    ADAGENTS_WELL_KNOWN_PATH, AGENT_CARD_WELL_KNOWN_PATH, DEFAULT_FETCH_TIMEOUT, MAX_BODY_BYTES,
};

pub use roster::{AgentRoster, FileRoster, StaticRoster};

pub use validator::{
    validate_agent_cards, validate_domain, AgentCardExpectation, AgentCardResult,
};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// Registry version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
