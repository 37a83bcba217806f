//! Error taxonomy for registry operations.
//!
//! Per-publisher fetch and validation failures are data, not errors: they
//! travel inside `ValidationResult` and `CrawlRun` records so one bad
//! publisher never aborts a crawl. The variants here cover the failures
//! that do abort an operation.

/// Errors produced by registry core operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A crawl pass is already active; the unit of mutual exclusion is the
    /// whole scheduler, per-publisher overlap is handled by advisory locks.
    #[error("a crawl is already in progress")]
    CrawlInProgress,

    #[error("roster error: {0}")]
    Roster(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("index error: {0}")]
    Index(#[from] federated_index::IndexError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for registry core operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
