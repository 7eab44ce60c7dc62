//! Memoria error types

use thiserror::Error;

/// Memoria error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The memory store could not be read or written
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The external curation agent could not be invoked or exited with failure
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    /// The agent answered, but nothing parseable could be recovered
    #[error("Malformed agent response: {0}")]
    MalformedAgentResponse(String),

    /// A single curated candidate failed validation
    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    /// Embedding backend error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The operation was cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Memoria operations
pub type Result<T> = std::result::Result<T, Error>;
