//! Error types for the PolicyGate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context (retrieval, ingestion, registry) has its own enum.

use thiserror::Error;

/// The top-level error type for all PolicyGate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Ingestion errors ---
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    // --- Registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No policy version in the registry is `active`; a case run cannot
    /// be grounded and is aborted.
    #[error("No active policy: approve at least one policy version before running a case")]
    NoActivePolicy,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the embedder or a vector collection.
///
/// Every variant is recoverable: the scoped retriever degrades to a broader
/// query instead of aborting the run.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl RetrievalError {
    /// Shorthand for the common "backend unreachable" case.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("Invalid scope field '{field}': {reason}")]
    InvalidScope { field: String, reason: String },

    #[error("Document '{0}' contains no text")]
    EmptyDocument(String),

    #[error("Invalid chunking: overlap {overlap} must be smaller than size {size}")]
    InvalidChunking { size: usize, overlap: usize },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry storage error: {0}")]
    Storage(String),

    #[error("Registry file is corrupted: {0}")]
    Corrupted(String),

    #[error("Policy not found in registry: {0}")]
    NotFound(String),
}
