//! Crawl session state and its persisted summary

use super::{Language, PageRecord};
use crate::scoring::issues::SLOW_RESPONSE_MS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

/// Pages shorter than this many words count as thin content
pub const THIN_CONTENT_WORDS: usize = 300;

/// All records produced by one crawl run of one domain
///
/// Owned and mutated only by the crawl loop.
#[derive(Debug, Clone)]
pub struct CrawlSession {
    pub domain: String,
    pub seed: Url,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub max_pages: usize,
    /// Successful page records partitioned by language
    pub pages: BTreeMap<Language, Vec<PageRecord>>,
    /// Failed fetch stubs in crawl order
    pub failures: Vec<PageRecord>,
    /// Persisted file names per language
    pub files: BTreeMap<Language, Vec<String>>,
    /// Frontier URLs dropped at the page limit
    pub discarded: usize,
    /// False when the crawl was stopped early
    pub completed: bool,
    /// Session directory, once persisted
    pub output_dir: Option<PathBuf>,
}

impl CrawlSession {
    pub fn new(seed: Url, max_pages: usize) -> Self {
        Self {
            domain: seed.host_str().unwrap_or_default().to_ascii_lowercase(),
            seed,
            started_at: Utc::now(),
            finished_at: None,
            max_pages,
            pages: BTreeMap::new(),
            failures: Vec::new(),
            files: BTreeMap::new(),
            discarded: 0,
            completed: false,
            output_dir: None,
        }
    }

    /// Record a persisted page
    pub fn add_page(&mut self, record: PageRecord, file_name: impl Into<String>) {
        self.files
            .entry(record.language)
            .or_default()
            .push(file_name.into());
        self.pages.entry(record.language).or_default().push(record);
    }

    pub fn add_failure(&mut self, stub: PageRecord) {
        self.failures.push(stub);
    }

    pub fn page_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    /// Next crawl sequence number, counting failures
    pub fn next_sequence(&self) -> usize {
        self.page_count() + self.failures.len()
    }

    /// Successful records of every language in crawl order
    pub fn all_pages(&self) -> Vec<&PageRecord> {
        let mut pages: Vec<&PageRecord> = self.pages.values().flatten().collect();
        pages.sort_by_key(|p| p.sequence);
        pages
    }

    pub fn finish(&mut self, completed: bool, discarded: usize) {
        self.completed = completed;
        self.discarded = discarded;
        self.finished_at = Some(Utc::now());
    }

    /// Aggregate the session into its persisted summary form
    pub fn summary(&self) -> SessionSummary {
        let pages = self.all_pages();
        let total = pages.len();
        let mean = |sum: f64| if total == 0 { 0.0 } else { round1(sum / total as f64) };

        let languages = self
            .pages
            .iter()
            .map(|(lang, records)| {
                (
                    lang.code().to_string(),
                    LanguageStats {
                        pages: records.len(),
                        files: self.files.get(lang).cloned().unwrap_or_default(),
                    },
                )
            })
            .collect();

        let total_images: usize = pages.iter().map(|p| p.images.len()).sum();
        let images_without_alt: usize = pages.iter().map(|p| p.images_without_alt()).sum();
        let slow_pages = pages.iter().filter(|p| p.load_time_ms > SLOW_RESPONSE_MS).count();

        SessionSummary {
            domain: self.domain.clone(),
            seed_url: self.seed.to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            max_pages: self.max_pages,
            total_pages: total,
            error_count: self.failures.len(),
            average_load_time_ms: mean(pages.iter().map(|p| p.load_time_ms as f64).sum()),
            languages,
            seo_issues: SeoIssueTally {
                missing_title: pages.iter().filter(|p| p.title_text().is_empty()).count(),
                missing_description: pages
                    .iter()
                    .filter(|p| p.description_text().is_empty())
                    .count(),
                missing_h1: pages.iter().filter(|p| p.h1_count() == 0).count(),
                multiple_h1: pages.iter().filter(|p| p.h1_count() > 1).count(),
            },
            overview: OverviewTally {
                total_images,
                images_without_alt,
                alt_coverage_percent: if total_images == 0 {
                    100.0
                } else {
                    round1((total_images - images_without_alt) as f64 * 100.0 / total_images as f64)
                },
                internal_links: pages.iter().map(|p| p.internal_links().count()).sum(),
                external_links: pages.iter().map(|p| p.external_links().count()).sum(),
            },
            content: ContentTally {
                average_word_count: mean(pages.iter().map(|p| p.word_count as f64).sum()),
                thin_pages: pages
                    .iter()
                    .filter(|p| p.word_count < THIN_CONTENT_WORDS)
                    .count(),
            },
            performance: PerformanceTally {
                slow_pages_over_3s: slow_pages,
                performance_score: if total == 0 {
                    100.0
                } else {
                    round1(100.0 - slow_pages as f64 * 100.0 / total as f64)
                },
            },
            errors: self
                .failures
                .iter()
                .map(|stub| FailedFetch {
                    url: stub.url.clone(),
                    status: stub.status,
                    error: stub.error.clone().unwrap_or_default(),
                })
                .collect(),
            discarded_urls: self.discarded,
            completed: self.completed,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Page count and file names for one language partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageStats {
    pub pages: usize,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoIssueTally {
    pub missing_title: usize,
    pub missing_description: usize,
    pub missing_h1: usize,
    pub multiple_h1: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTally {
    pub total_images: usize,
    pub images_without_alt: usize,
    pub alt_coverage_percent: f64,
    pub internal_links: usize,
    pub external_links: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTally {
    pub average_word_count: f64,
    pub thin_pages: usize,
}

/// Response time tally; the score is the share of pages that are not slow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTally {
    pub slow_pages_over_3s: usize,
    pub performance_score: f64,
}

impl Default for PerformanceTally {
    fn default() -> Self {
        Self {
            slow_pages_over_3s: 0,
            performance_score: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFetch {
    pub url: String,
    pub status: u16,
    pub error: String,
}

/// Session aggregate persisted as `_summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub domain: String,
    pub seed_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub max_pages: usize,
    pub total_pages: usize,
    pub error_count: usize,
    pub average_load_time_ms: f64,
    /// Keyed by language code
    pub languages: BTreeMap<String, LanguageStats>,
    pub seo_issues: SeoIssueTally,
    pub overview: OverviewTally,
    pub content: ContentTally,
    #[serde(default)]
    pub performance: PerformanceTally,
    pub errors: Vec<FailedFetch>,
    pub discarded_urls: usize,
    pub completed: bool,
}

impl SessionSummary {
    /// Share of fetch attempts that failed, 0.0-1.0
    pub fn error_rate(&self) -> f64 {
        let attempts = self.total_pages + self.error_count;
        if attempts == 0 {
            0.0
        } else {
            self.error_count as f64 / attempts as f64
        }
    }
}
