//! Error types for the crawler module

use super::storage::StorageError;
use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Connection, DNS or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// The fetch did not complete in time
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The server answered with a client or server error
    #[error("HTTP {0}")]
    HttpStatus(u16),

    /// The response is not an HTML document
    #[error("Not HTML: {0}")]
    NotHtml(String),

    #[error("Empty response body")]
    EmptyBody,

    /// The body is larger than the fetcher reads into memory
    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// HTML parsing error
    #[error("HTML parsing error: {0}")]
    HtmlParse(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The seed host could not be resolved
    #[error("Unresolvable host: {0}")]
    UnresolvableHost(String),

    /// Session persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl CrawlError {
    /// Per-URL failures are recorded and the crawl continues
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CrawlError::Network(_)
                | CrawlError::Timeout(_)
                | CrawlError::HttpStatus(_)
                | CrawlError::NotHtml(_)
                | CrawlError::EmptyBody
                | CrawlError::BodyTooLarge(_)
                | CrawlError::HtmlParse(_)
        )
    }

    /// Whether the fetch may be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Network(_) | CrawlError::Timeout(_))
    }

    /// HTTP status to record for a failed stub
    pub fn status(&self) -> u16 {
        match self {
            CrawlError::HttpStatus(status) => *status,
            _ => 0,
        }
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CrawlError::Timeout(0)
        } else {
            CrawlError::Network(err.to_string())
        }
    }
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Storage(e) => e.into(),
            CrawlError::InvalidUrl(e) => CrateError::Config(format!("invalid URL: {}", e)),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
