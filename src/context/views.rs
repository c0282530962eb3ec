//! Mode specific projections of page records
//!
//! The context never owns page records. Every view here is a derived copy
//! carrying only the fields its mode needs.

use super::config::ContextConfig;
use crate::crawler::{Heading, Language, PageRecord, SchemaFlags, THIN_CONTENT_WORDS};
use crate::scoring::issues::common_strengths;
use crate::scoring::rubric::{is_broken_link, is_descriptive_anchor};
use crate::scoring::{
    Issue, IssueKind, ScoreBand, ScoreBreakdown, ScoringRubric, Severity, detect_issues,
    detect_strengths,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use url::Url;

/// Link samples carried by a page detail view
const DETAIL_LINK_SAMPLES: usize = 10;

/// A successfully fetched record with its derived scores
#[derive(Debug, Clone)]
pub struct PageRow<'a> {
    pub record: &'a PageRecord,
    pub score: ScoreBreakdown,
    pub issues: Vec<Issue>,
}

impl<'a> PageRow<'a> {
    pub fn new(record: &'a PageRecord, rubric: &ScoringRubric) -> Self {
        Self {
            record,
            score: rubric.score_page(record),
            issues: detect_issues(record),
        }
    }

    pub fn url(&self) -> &str {
        &self.record.url
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    fn messages(&self, max: Severity) -> Vec<String> {
        self.issues
            .iter()
            .filter(|i| i.severity <= max)
            .map(|i| i.message.clone())
            .collect()
    }
}

/// Lowest score first, then pages with critical issues, then crawl order
pub fn priority_cmp(a: &PageRow<'_>, b: &PageRow<'_>) -> Ordering {
    a.score
        .overall
        .total_cmp(&b.score.overall)
        .then_with(|| b.has_critical().cmp(&a.has_critical()))
        .then_with(|| a.record.sequence.cmp(&b.record.sequence))
}

/// Pages affected by one issue kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueCount {
    #[serde(skip)]
    pub kind: IssueKind,
    pub issue: &'static str,
    pub severity: Severity,
    pub pages: usize,
}

pub fn count_issues<'r, 'a: 'r>(rows: impl IntoIterator<Item = &'r PageRow<'a>>) -> BTreeMap<IssueKind, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        for issue in &row.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
    }
    counts
}

/// Most severe and most widespread issues first
pub fn rank_issues(counts: &BTreeMap<IssueKind, usize>, limit: usize) -> Vec<IssueCount> {
    let mut ranked: Vec<IssueCount> = counts
        .iter()
        .map(|(kind, pages)| IssueCount {
            kind: *kind,
            issue: kind.label(),
            severity: kind.severity(),
            pages: *pages,
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then(b.pages.cmp(&a.pages))
            .then(a.kind.cmp(&b.kind))
    });
    ranked.truncate(limit);
    ranked
}

pub fn dominant_language<'r, 'a: 'r>(rows: impl IntoIterator<Item = &'r PageRow<'a>>) -> Option<Language> {
    let mut counts: BTreeMap<Language, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.record.language).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(Language, usize)>, (lang, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((lang, n)),
        })
        .map(|(lang, _)| lang)
}

fn schema_kinds(schema: &SchemaFlags) -> Vec<&'static str> {
    [
        (schema.json_ld, "json-ld"),
        (schema.microdata, "microdata"),
        (schema.open_graph, "open-graph"),
        (schema.twitter_card, "twitter-card"),
    ]
    .into_iter()
    .filter_map(|(present, name)| present.then_some(name))
    .collect()
}

/// Technical, performance and security fields of one page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalRow {
    pub url: String,
    pub status: u16,
    pub load_time_ms: u64,
    pub page_size_bytes: u64,
    pub language: Language,
    pub score: f64,
    pub title_length: usize,
    pub description_length: usize,
    pub canonical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots: Option<String>,
    pub schema: Vec<&'static str>,
    pub https: bool,
    pub security_header_score: u8,
    pub viewport: bool,
    pub h1_count: usize,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub critical_issues: Vec<String>,
}

impl From<&PageRow<'_>> for TechnicalRow {
    fn from(row: &PageRow<'_>) -> Self {
        let page = row.record;
        Self {
            url: page.url.clone(),
            status: page.status,
            load_time_ms: page.load_time_ms,
            page_size_bytes: page.page_size_bytes,
            language: page.language,
            score: row.score.overall,
            title_length: page.title_text().chars().count(),
            description_length: page.description_text().chars().count(),
            canonical: page.canonical.is_some(),
            robots: page.robots.clone(),
            schema: schema_kinds(&page.schema),
            https: page.security.https,
            security_header_score: page.security.header_score(),
            viewport: page.mobile.viewport,
            h1_count: page.h1_count(),
            word_count: page.word_count,
            critical_issues: row.messages(Severity::Critical),
        }
    }
}

/// Full per-page view used by the `pages` mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDetail {
    pub url: String,
    pub language: Language,
    pub score: ScoreBreakdown,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,
    pub word_count: usize,
    pub images: usize,
    pub images_without_alt: usize,
    pub internal_links: usize,
    pub external_links: usize,
    pub broken_links: usize,
    pub generic_anchors: usize,
    pub link_samples: Vec<String>,
    pub issues: Vec<String>,
    pub strengths: Vec<&'static str>,
}

impl From<&PageRow<'_>> for PageDetail {
    fn from(row: &PageRow<'_>) -> Self {
        let page = row.record;
        Self {
            url: page.url.clone(),
            language: page.language,
            score: row.score,
            title: page.title.clone(),
            meta_description: page.meta_description.clone(),
            headings: page.headings.clone(),
            word_count: page.word_count,
            images: page.images.len(),
            images_without_alt: page.images_without_alt(),
            internal_links: page.internal_links().count(),
            external_links: page.external_links().count(),
            broken_links: page.links.iter().filter(|l| is_broken_link(l)).count(),
            generic_anchors: page.links.iter().filter(|l| !is_descriptive_anchor(l)).count(),
            link_samples: page
                .internal_links()
                .take(DETAIL_LINK_SAMPLES)
                .map(|l| format!("{} -> {}", l.text, l.href))
                .collect(),
            issues: row.messages(Severity::Notice),
            strengths: detect_strengths(page),
        }
    }
}

/// The complete record for single page audits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinglePage {
    pub score: ScoreBreakdown,
    pub issues: Vec<Issue>,
    pub strengths: Vec<&'static str>,
    pub record: PageRecord,
}

impl From<&PageRow<'_>> for SinglePage {
    fn from(row: &PageRow<'_>) -> Self {
        Self {
            score: row.score,
            issues: row.issues.clone(),
            strengths: detect_strengths(row.record),
            record: row.record.clone(),
        }
    }
}

/// Domain level aggregates without any per-page detail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDigest {
    pub domain: String,
    pub pages_analysed: usize,
    pub failed_fetches: usize,
    pub languages: BTreeMap<&'static str, usize>,
    pub score: ScoreBreakdown,
    pub band: ScoreBand,
    pub issues: Vec<IssueCount>,
    pub strengths: Vec<&'static str>,
    pub average_load_time_ms: f64,
    pub average_word_count: f64,
    pub thin_pages: usize,
    pub alt_coverage_percent: f64,
    pub https_pages: usize,
    pub pages_with_schema: usize,
    pub pages_with_viewport: usize,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

impl DomainDigest {
    pub fn build(rows: &[PageRow<'_>], failed_fetches: usize, rubric: &ScoringRubric, config: &ContextConfig) -> Self {
        let n = rows.len().max(1) as f64;
        let pages = || rows.iter().map(|r| r.record);

        let mut languages = BTreeMap::new();
        for page in pages() {
            *languages.entry(page.language.code()).or_insert(0) += 1;
        }
        let images: usize = pages().map(|p| p.images.len()).sum();
        let without_alt: usize = pages().map(|p| p.images_without_alt()).sum();

        let score = rubric.score_pages(pages());
        Self {
            domain: rows.first().map(|r| domain_of(r.url())).unwrap_or_default(),
            pages_analysed: rows.len(),
            failed_fetches,
            languages,
            band: score.band(),
            score,
            issues: rank_issues(&count_issues(rows), config.top_issues * 2),
            strengths: common_strengths(pages()),
            average_load_time_ms: round1(pages().map(|p| p.load_time_ms as f64).sum::<f64>() / n),
            average_word_count: round1(pages().map(|p| p.word_count as f64).sum::<f64>() / n),
            thin_pages: pages().filter(|p| p.word_count < THIN_CONTENT_WORDS).count(),
            alt_coverage_percent: if images == 0 {
                100.0
            } else {
                round1((images - without_alt) as f64 * 100.0 / images as f64)
            },
            https_pages: pages().filter(|p| p.security.https).count(),
            pages_with_schema: pages().filter(|p| p.schema.any()).count(),
            pages_with_viewport: pages().filter(|p| p.mobile.viewport).count(),
        }
    }

    /// Shrink the ranked lists to their minimum useful size
    pub fn compact(&mut self, config: &ContextConfig) {
        self.issues.truncate(config.top_issues.min(3));
        self.strengths.truncate(3);
    }
}

/// A failed fetch as shown in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedPage {
    pub url: String,
    pub status: u16,
    pub error: String,
}

/// Deterministic conclusions over every successful page of the input
///
/// Findings drive the fixed report sections and never depend on the budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Findings {
    pub domain: String,
    pub pages: usize,
    pub score: ScoreBreakdown,
    pub band: ScoreBand,
    pub strengths: Vec<&'static str>,
    pub issues: Vec<IssueCount>,
    pub failed: Vec<FailedPage>,
    pub language: Option<Language>,
}

impl Findings {
    pub fn build(rows: &[PageRow<'_>], failures: &[&PageRecord], rubric: &ScoringRubric) -> Self {
        let score = rubric.score_pages(rows.iter().map(|r| r.record));
        Self {
            domain: rows
                .first()
                .map(|r| domain_of(r.url()))
                .or_else(|| failures.first().map(|f| domain_of(&f.url)))
                .unwrap_or_default(),
            pages: rows.len(),
            band: score.band(),
            score,
            strengths: common_strengths(rows.iter().map(|r| r.record)),
            issues: rank_issues(&count_issues(rows), usize::MAX),
            failed: failures
                .iter()
                .map(|f| FailedPage {
                    url: f.url.clone(),
                    status: f.status,
                    error: f.error.clone().unwrap_or_default(),
                })
                .collect(),
            language: dominant_language(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::{bare_page, sample_page};

    #[test]
    fn test_priority_order() {
        let rubric = ScoringRubric::default();
        let good = sample_page("https://example.com/", 0);
        let bare_late = bare_page("https://example.com/late", 5);
        let bare_early = bare_page("https://example.com/early", 2);
        let mut rows: Vec<PageRow> = [&good, &bare_late, &bare_early]
            .into_iter()
            .map(|p| PageRow::new(p, &rubric))
            .collect();
        rows.sort_by(priority_cmp);

        let order: Vec<&str> = rows.iter().map(PageRow::url).collect();
        assert_eq!(
            order,
            vec!["https://example.com/early", "https://example.com/late", "https://example.com/"]
        );
    }

    #[test]
    fn test_critical_issues_break_score_ties() {
        let rubric = ScoringRubric::default();
        let plain = sample_page("https://example.com/a", 0);
        let mut critical = sample_page("https://example.com/b", 1);
        critical.canonical = Some(" ".to_string());

        let a = PageRow::new(&plain, &rubric);
        let mut b = PageRow::new(&critical, &rubric);
        b.score = a.score;
        assert!(b.has_critical());
        assert_eq!(priority_cmp(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_dominant_language() {
        let rubric = ScoringRubric::default();
        let mut greek = sample_page("https://example.com/el/", 0);
        greek.language = Language::El;
        let mut greek2 = greek.clone();
        greek2.sequence = 1;
        let english = sample_page("https://example.com/", 2);
        let rows: Vec<PageRow> = [&english, &greek, &greek2]
            .into_iter()
            .map(|p| PageRow::new(p, &rubric))
            .collect();
        assert_eq!(dominant_language(&rows), Some(Language::El));
        assert_eq!(dominant_language(&rows[..1]), Some(Language::En));
    }

    #[test]
    fn test_views_project_expected_fields() {
        let rubric = ScoringRubric::default();
        let bare = bare_page("https://example.com/empty", 3);
        let row = PageRow::new(&bare, &rubric);

        let technical = TechnicalRow::from(&row);
        assert_eq!(technical.title_length, 0);
        assert!(technical.critical_issues.contains(&"Missing title".to_string()));
        assert!(technical.critical_issues.contains(&"Missing meta description".to_string()));

        let detail = PageDetail::from(&row);
        assert_eq!(detail.images, 0);
        assert!(detail.issues.len() >= technical.critical_issues.len());

        let json = serde_json::to_value(&technical).unwrap();
        assert!(json.get("criticalIssues").is_some());
        assert!(json.get("robots").is_none());
    }

    #[test]
    fn test_findings_cover_failures() {
        let rubric = ScoringRubric::default();
        let page = sample_page("https://example.com/", 0);
        let stub = PageRecord::failed("https://example.com/x", 1, 404, 3, "HTTP 404");
        let rows = vec![PageRow::new(&page, &rubric)];

        let findings = Findings::build(&rows, &[&stub], &rubric);
        assert_eq!(findings.domain, "example.com");
        assert_eq!(findings.pages, 1);
        assert_eq!(findings.failed[0].status, 404);
        assert_eq!(findings.band, ScoreBand::Good);
    }
}
