//! # Context Configuration Module
//!
//! Tunable constants of the context builder.
//!
//! ## Key Components
//!
//! - `ContextConfig`: thresholds and caps used while shaping an audit context
//! - `ContextConfigBuilder`: Builder pattern implementation for easier configuration
//!
//! The chunk threshold bounds every chunk payload handed to a single completion
//! call. A chunked context keeps a quarter of it free for the chunk notes. The page detail cap bounds how many full page views a `pages` or
//! `full` context carries before the remainder is summarized.

/// Configuration for the context builder
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Maximum serialized size of one chunk payload in bytes
    pub chunk_threshold_bytes: usize,

    /// Maximum number of pages shown with full detail
    pub page_detail_cap: usize,

    /// Issues listed per summary
    pub top_issues: usize,

    /// Worst-page examples listed per summary
    pub examples: usize,

    /// Bytes kept free for the rollup summary while detail rows are added
    pub summary_reserve_bytes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: 6000,
            page_detail_cap: 5,
            top_issues: 5,
            examples: 3,
            summary_reserve_bytes: 1200,
        }
    }
}

/// Builder for ContextConfig
#[derive(Debug, Default)]
pub struct ContextConfigBuilder {
    config: ContextConfig,
}

impl ContextConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    /// Set the chunk threshold; values below 256 bytes are raised to 256
    pub fn chunk_threshold_bytes(mut self, bytes: usize) -> Self {
        self.config.chunk_threshold_bytes = bytes.max(256);
        self
    }

    pub fn page_detail_cap(mut self, cap: usize) -> Self {
        self.config.page_detail_cap = cap;
        self
    }

    pub fn top_issues(mut self, top_issues: usize) -> Self {
        self.config.top_issues = top_issues;
        self
    }

    pub fn examples(mut self, examples: usize) -> Self {
        self.config.examples = examples;
        self
    }

    pub fn summary_reserve_bytes(mut self, bytes: usize) -> Self {
        self.config.summary_reserve_bytes = bytes;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ContextConfig {
        self.config
    }
}

impl ContextConfig {
    /// Create a new builder
    pub fn builder() -> ContextConfigBuilder {
        ContextConfigBuilder::new()
    }

    /// Bytes a chunked context keeps free for the chunk notes of the synthesis call
    pub fn notes_reserve_bytes(&self) -> usize {
        self.chunk_threshold_bytes / 4
    }

    /// Largest primary payload of a chunked context
    pub fn chunked_payload_limit(&self) -> usize {
        self.chunk_threshold_bytes - self.notes_reserve_bytes()
    }
}
