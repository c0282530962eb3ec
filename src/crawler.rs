//! # Website Crawler Module
//!
//! This module discovers, fetches and classifies the pages of one website and
//! turns each of them into an immutable [`PageRecord`]. It is the first stage of
//! the audit pipeline: the records it persists feed the scoring engine and the
//! context builder.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: limits, politeness delay, timeouts and retry policy
//! - `Frontier`: normalized, deduplicated, breadth-first URL queue
//! - `Crawler`: the sequential fetch loop driving a [`Fetcher`]
//! - `CrawlSession`: the language-partitioned record set and its summary
//! - `storage`: the on-disk session layout and the loaders used by audits
//!
//! ## Politeness
//!
//! Requests are issued one at a time with a minimum delay between them and a
//! timeout on every fetch. A stop request is honored between fetches and still
//! flushes the session summary.

mod config;
mod content_extraction;
mod engine;
mod error;
mod fetcher;
pub mod frontier;
pub mod language;
mod session;
pub mod storage;

pub use config::{CrawlerConfig, CrawlerConfigBuilder};
pub use content_extraction::{extract_page, ExtractedPage};
pub use engine::{CrawlProgress, Crawler, ProgressCallback, StopSignal};
pub use error::CrawlError;
pub use fetcher::{FetchedPage, Fetcher, HttpFetcher};
pub use frontier::{normalize_url, Enqueue, Frontier, UrlRecord, UrlStatus};
pub use language::{detect_language, Language};
pub use session::{CrawlSession, LanguageStats, SessionSummary, THIN_CONTENT_WORDS};
pub use storage::StorageError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured SEO extraction result for one fetched page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    /// Normalized URL of the page
    pub url: String,

    /// HTTP status of the final response, 0 when no response was received
    pub status: u16,

    /// Time spent fetching the page in milliseconds
    pub load_time_ms: u64,

    /// Size of the response body in bytes
    #[serde(default)]
    pub page_size_bytes: u64,

    /// Detected language partition
    pub language: Language,

    /// Document title, `None` when the `<title>` element is absent
    pub title: Option<String>,

    /// Meta description content
    pub meta_description: Option<String>,

    /// Canonical link href as written in the document
    #[serde(default)]
    pub canonical: Option<String>,

    /// Meta robots content
    #[serde(default)]
    pub robots: Option<String>,

    /// Headings in document order
    #[serde(default)]
    pub headings: Vec<Heading>,

    /// Images found in the document
    #[serde(default)]
    pub images: Vec<ImageRef>,

    /// Anchors found in the document
    #[serde(default)]
    pub links: Vec<LinkRef>,

    #[serde(default)]
    pub schema: SchemaFlags,

    #[serde(default)]
    pub security: SecurityFlags,

    #[serde(default)]
    pub mobile: MobileFlags,

    #[serde(default)]
    pub accessibility: AccessibilityFlags,

    /// Visible words outside of navigation, header, footer and scripts
    #[serde(default)]
    pub word_count: usize,

    /// Position of the fetch within its crawl session
    #[serde(default)]
    pub sequence: usize,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,

    /// Failure description, only set on failed fetch stubs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A heading with its level (1-6)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// An image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub src: String,
    /// A non-empty `alt` attribute is present
    pub has_alt: bool,
    /// `loading="lazy"` or a deferred `data-src`
    pub lazy: bool,
}

/// An anchor found on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRef {
    /// Resolved absolute href, or the raw attribute when it cannot be resolved
    pub href: String,
    pub text: String,
    /// Same site as the crawl seed
    pub internal: bool,
    #[serde(default)]
    pub nofollow: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFlags {
    pub json_ld: bool,
    pub microdata: bool,
    pub open_graph: bool,
    pub twitter_card: bool,
}

impl SchemaFlags {
    /// Whether any structured data is present
    pub fn any(&self) -> bool {
        self.json_ld || self.microdata || self.open_graph || self.twitter_card
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFlags {
    pub https: bool,
    pub hsts: bool,
    pub content_security_policy: bool,
    pub x_frame_options: bool,
    pub x_content_type_options: bool,
    pub referrer_policy: bool,
    pub permissions_policy: bool,
}

impl SecurityFlags {
    /// Share of the tracked security headers present, 0-100
    pub fn header_score(&self) -> u8 {
        let present = [
            self.hsts,
            self.content_security_policy,
            self.x_frame_options,
            self.x_content_type_options,
            self.referrer_policy,
            self.permissions_policy,
        ]
        .iter()
        .filter(|flag| **flag)
        .count();
        (present * 100 / 6) as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileFlags {
    pub viewport: bool,
    pub device_width: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityFlags {
    pub html_lang: bool,
    pub aria_landmarks: bool,
    pub unlabeled_inputs: usize,
    pub low_contrast_hints: usize,
}

impl PageRecord {
    /// Build a stub for a fetch that did not produce a usable page
    pub fn failed(
        url: impl Into<String>,
        sequence: usize,
        status: u16,
        load_time_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            status,
            load_time_ms,
            page_size_bytes: 0,
            language: Language::Other,
            title: None,
            meta_description: None,
            canonical: None,
            robots: None,
            headings: Vec::new(),
            images: Vec::new(),
            links: Vec::new(),
            schema: SchemaFlags::default(),
            security: SecurityFlags::default(),
            mobile: MobileFlags::default(),
            accessibility: AccessibilityFlags::default(),
            word_count: 0,
            sequence,
            fetched_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    /// Whether this record is a failed fetch stub
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Trimmed title, empty when missing
    pub fn title_text(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or("")
    }

    /// Trimmed meta description, empty when missing
    pub fn description_text(&self) -> &str {
        self.meta_description.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn h1_count(&self) -> usize {
        self.headings.iter().filter(|h| h.level == 1).count()
    }

    pub fn internal_links(&self) -> impl Iterator<Item = &LinkRef> {
        self.links.iter().filter(|l| l.internal)
    }

    pub fn external_links(&self) -> impl Iterator<Item = &LinkRef> {
        self.links.iter().filter(|l| !l.internal)
    }

    pub fn images_without_alt(&self) -> usize {
        self.images.iter().filter(|i| !i.has_alt).count()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A well-formed page used as a baseline by tests across the crate
    pub fn sample_page(url: &str, sequence: usize) -> PageRecord {
        PageRecord {
            url: url.to_string(),
            status: 200,
            load_time_ms: 180,
            page_size_bytes: 24_000,
            language: Language::En,
            title: Some("Handmade ceramics from Crete".to_string()),
            meta_description: Some(
                "Browse handmade ceramic bowls, plates and vases thrown in our Heraklion studio."
                    .to_string(),
            ),
            canonical: Some(url.to_string()),
            robots: None,
            headings: vec![
                Heading { level: 1, text: "Handmade ceramics".to_string() },
                Heading { level: 2, text: "Bowls".to_string() },
                Heading { level: 2, text: "Vases".to_string() },
            ],
            images: vec![ImageRef {
                src: format!("{}/bowl.jpg", url.trim_end_matches('/')),
                has_alt: true,
                lazy: true,
            }],
            links: (0..4)
                .map(|i| LinkRef {
                    href: format!("https://example.com/shop/{}", i),
                    text: format!("Collection {}", i),
                    internal: true,
                    nofollow: false,
                })
                .collect(),
            schema: SchemaFlags { json_ld: true, ..Default::default() },
            security: SecurityFlags { https: true, hsts: true, ..Default::default() },
            mobile: MobileFlags { viewport: true, device_width: true },
            accessibility: AccessibilityFlags {
                html_lang: true,
                aria_landmarks: true,
                unlabeled_inputs: 0,
                low_contrast_hints: 0,
            },
            word_count: 650,
            sequence,
            fetched_at: DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
                .map(|d| d.with_timezone(&Utc))
                .unwrap(),
            error: None,
        }
    }

    /// A page with none of the basic on-page signals
    pub fn bare_page(url: &str, sequence: usize) -> PageRecord {
        PageRecord {
            title: Some(String::new()),
            meta_description: None,
            canonical: None,
            headings: Vec::new(),
            images: Vec::new(),
            links: Vec::new(),
            schema: SchemaFlags::default(),
            mobile: MobileFlags::default(),
            accessibility: AccessibilityFlags::default(),
            word_count: 0,
            ..sample_page(url, sequence)
        }
    }
}
