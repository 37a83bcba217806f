//! Error types for federated-index

use thiserror::Error;

/// Errors that can occur in the federated index layer.
///
/// Read-side queries never produce `NotFound`-style errors — an unknown
/// agent or domain is a valid, empty answer. Errors here are reserved for
/// malformed write inputs and serialization problems.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Agent URL could not be parsed or uses an unsupported scheme
    #[error("invalid agent url: {url}: {reason}")]
    InvalidAgentUrl { url: String, reason: String },

    /// Publisher domain is empty or unusable after normalization
    #[error("invalid publisher domain: {domain}")]
    InvalidDomain { domain: String },

    /// Serialization error (digest computation, snapshot export)
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;
