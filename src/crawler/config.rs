//! # Crawler Configuration Module
//!
//! Limits and politeness settings for a crawl session, built with a builder
//! pattern.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: The main configuration struct with crawler parameters
//! - `CrawlerConfigBuilder`: Builder pattern implementation for easier configuration
//!
//! ## Defaults
//!
//! The defaults describe a polite crawl: one request every 500 ms, a 30 second
//! fetch timeout, one retry for network failures and a summary flush every ten
//! pages.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the crawler
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlerConfig {
    /// Maximum number of successfully fetched pages
    pub max_pages: usize,

    /// Maximum discovery depth, `None` for unlimited
    pub max_depth: Option<u32>,

    /// Minimum delay in milliseconds between requests
    pub delay_ms: u64,

    /// Timeout for a single fetch in seconds
    pub timeout_secs: u64,

    /// Retries for network failures; HTTP status failures are never retried
    pub fetch_retries: u32,

    /// Rewrite `_summary.json` after this many fetches
    pub summary_interval: usize,

    /// User agent to use for requests
    pub user_agent: String,

    /// Root directory for crawl sessions
    pub output_dir: PathBuf,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: None,
            delay_ms: 500,
            timeout_secs: 30,
            fetch_retries: 1,
            summary_interval: 10,
            user_agent: format!("seo-auditor/{}", env!("CARGO_PKG_VERSION")),
            output_dir: PathBuf::from("crawl_data"),
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the maximum number of pages to crawl
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    /// Set the maximum discovery depth
    pub fn max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the minimum delay in milliseconds between requests
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.delay_ms = delay_ms;
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.config.timeout_secs = timeout_secs;
        self
    }

    pub fn fetch_retries(mut self, fetch_retries: u32) -> Self {
        self.config.fetch_retries = fetch_retries;
        self
    }

    /// Set how often the session summary is rewritten; zero is treated as one
    pub fn summary_interval(mut self, summary_interval: usize) -> Self {
        self.config.summary_interval = summary_interval.max(1);
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = output_dir.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Get the politeness delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
