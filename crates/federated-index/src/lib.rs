//! Federated-Index: Queryable Authorization Graph
//!
//! This crate holds the data model and storage layer of the agent
//! authorization registry: publishers, their advertising properties, the
//! agents their documents authorize, and the fact table connecting them.
//!
//! ## Key Components
//!
//! - `FederatedIndex`: the async storage trait every query surface reads
//!   through and the crawler writes through
//! - `MemoryIndex`: the shipped in-memory implementation with snapshot
//!   export/load
//! - `ValidationResult` / `NormalizedDocument`: the write input produced
//!   by document validation
//! - `SelectorExpression`: how products and queries name property sets
//!
//! No I/O happens here; fetching and validation live in `adagents-core`.

mod error;
pub mod memory;
mod model;
mod selector;
pub mod store;
mod validation;

pub use error::{IndexError, IndexResult};
pub use memory::{IndexSnapshot, MemoryIndex, PublisherSnapshot};
pub use model::{
    agent_url_host, normalize_agent_url, normalize_domain, Agent, AgentSource, AgentType,
    AuthorizationEdge, CrawlFailure, CrawlRun, CrawlRunStatus, IdentifierType, IndexStats,
    Property, PropertyId, PropertyIdentifier, PropertyType, Publisher, SourceBreakdown,
    ValidationStatus,
};
pub use selector::{any_match, SelectorExpression};
pub use store::{
    AuthorizationCheck, FederatedIndex, ProductAuthorization, PropertyIdentifierExpansion,
    UpsertOutcome,
};
pub use validation::{
    AuthorizedAgent, IssueKind, NormalizedDocument, ValidationIssue, ValidationResult,
};
