//! Error types for the seo-auditor crate

use thiserror::Error;

/// Result type for seo-auditor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for seo-auditor operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invocation is invalid before any work started
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Crawl session persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Audit context construction error
    #[error("Context error: {0}")]
    Context(String),

    /// Completion backend error that survived the retry policy
    #[error("Provider error: {0}")]
    Provider(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
