//! Per-page issue and strength detection

use super::rubric::{heading_hierarchy_valid, is_broken_link, is_descriptive_anchor};
use crate::crawler::PageRecord;
use crate::crawler::THIN_CONTENT_WORDS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Responses slower than this are flagged
pub const SLOW_RESPONSE_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    FetchFailed,
    MissingTitle,
    MissingDescription,
    BrokenCanonical,
    NotHttps,
    TitleLength,
    DescriptionLength,
    MissingH1,
    MultipleH1,
    SkippedHeadingLevel,
    ThinContent,
    MissingAltText,
    BrokenLinks,
    FewInternalLinks,
    MissingViewport,
    MissingLanguage,
    UnlabeledInputs,
    Noindex,
    SlowResponse,
    GenericAnchors,
    NoLazyImages,
    NoStructuredData,
    MissingLandmarks,
    LowContrast,
    MissingSecurityHeaders,
}

impl IssueKind {
    pub fn severity(&self) -> Severity {
        use IssueKind::*;
        match self {
            FetchFailed | MissingTitle | MissingDescription | BrokenCanonical => Severity::Critical,
            NotHttps | TitleLength | DescriptionLength | MissingH1 | MultipleH1
            | SkippedHeadingLevel | ThinContent | MissingAltText | BrokenLinks
            | FewInternalLinks | MissingViewport | MissingLanguage | UnlabeledInputs | Noindex
            | SlowResponse => Severity::Warning,
            GenericAnchors | NoLazyImages | NoStructuredData | MissingLandmarks | LowContrast
            | MissingSecurityHeaders => Severity::Notice,
        }
    }

    /// Human readable name used in reports
    pub fn label(&self) -> &'static str {
        use IssueKind::*;
        match self {
            FetchFailed => "Page could not be fetched",
            MissingTitle => "Missing title",
            MissingDescription => "Missing meta description",
            BrokenCanonical => "Broken canonical URL",
            NotHttps => "Page not served over HTTPS",
            TitleLength => "Title length outside 10-60 characters",
            DescriptionLength => "Meta description length outside 50-160 characters",
            MissingH1 => "Missing H1 heading",
            MultipleH1 => "Multiple H1 headings",
            SkippedHeadingLevel => "Heading levels skipped",
            ThinContent => "Thin content",
            MissingAltText => "Images without alt text",
            BrokenLinks => "Broken links",
            FewInternalLinks => "Few internal links",
            MissingViewport => "Missing mobile viewport",
            MissingLanguage => "Missing html lang attribute",
            UnlabeledInputs => "Form inputs without labels",
            Noindex => "Page excluded from indexing",
            SlowResponse => "Slow response",
            GenericAnchors => "Generic link anchor text",
            NoLazyImages => "Images not lazy loaded",
            NoStructuredData => "No structured data",
            MissingLandmarks => "No ARIA landmarks",
            LowContrast => "Possible low contrast text",
            MissingSecurityHeaders => "Missing security headers",
        }
    }
}

/// A detected problem on one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: kind.label().to_string(),
        }
    }

    fn with_detail(kind: IssueKind, detail: impl std::fmt::Display) -> Self {
        Self {
            message: format!("{} ({})", kind.label(), detail),
            ..Self::new(kind)
        }
    }
}

fn canonical_is_broken(page: &PageRecord) -> bool {
    let Some(canonical) = page.canonical.as_deref() else {
        return false;
    };
    let canonical = canonical.trim();
    if canonical.is_empty() {
        return true;
    }
    let resolved = match Url::parse(&page.url) {
        Ok(base) => base.join(canonical),
        Err(_) => Url::parse(canonical),
    };
    !resolved.is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Issues for one page, most severe first
pub fn detect_issues(page: &PageRecord) -> Vec<Issue> {
    use IssueKind::*;

    if page.is_failed() {
        let detail = page.error.as_deref().unwrap_or("unknown error");
        return vec![Issue::with_detail(FetchFailed, detail)];
    }

    let mut issues = Vec::new();

    let title = page.title_text().chars().count();
    if title == 0 {
        issues.push(Issue::new(MissingTitle));
    } else if !(10..=60).contains(&title) {
        issues.push(Issue::with_detail(TitleLength, format!("{} characters", title)));
    }

    let description = page.description_text().chars().count();
    if description == 0 {
        issues.push(Issue::new(MissingDescription));
    } else if !(50..=160).contains(&description) {
        issues.push(Issue::with_detail(DescriptionLength, format!("{} characters", description)));
    }

    if canonical_is_broken(page) {
        issues.push(Issue::new(BrokenCanonical));
    }
    if !page.security.https {
        issues.push(Issue::new(NotHttps));
    }

    match page.h1_count() {
        0 => issues.push(Issue::new(MissingH1)),
        1 => {}
        n => issues.push(Issue::with_detail(MultipleH1, n)),
    }
    if !heading_hierarchy_valid(page) {
        issues.push(Issue::new(SkippedHeadingLevel));
    }
    if page.word_count < THIN_CONTENT_WORDS {
        issues.push(Issue::with_detail(ThinContent, format!("{} words", page.word_count)));
    }

    let missing_alt = page.images_without_alt();
    if missing_alt > 0 {
        issues.push(Issue::with_detail(MissingAltText, format!("{} of {}", missing_alt, page.images.len())));
    }
    let broken = page.links.iter().filter(|l| is_broken_link(l)).count();
    if broken > 0 {
        issues.push(Issue::with_detail(BrokenLinks, broken));
    }
    let internal = page.internal_links().count();
    if internal < 3 {
        issues.push(Issue::with_detail(FewInternalLinks, internal));
    }
    if !page.mobile.viewport {
        issues.push(Issue::new(MissingViewport));
    }
    if !page.accessibility.html_lang {
        issues.push(Issue::new(MissingLanguage));
    }
    if page.accessibility.unlabeled_inputs > 0 {
        issues.push(Issue::with_detail(UnlabeledInputs, page.accessibility.unlabeled_inputs));
    }
    if page
        .robots
        .as_deref()
        .is_some_and(|robots| robots.to_ascii_lowercase().contains("noindex"))
    {
        issues.push(Issue::new(Noindex));
    }
    if page.load_time_ms > SLOW_RESPONSE_MS {
        issues.push(Issue::with_detail(SlowResponse, format!("{} ms", page.load_time_ms)));
    }

    let generic = page.links.iter().filter(|l| !is_descriptive_anchor(l)).count();
    if generic > 0 {
        issues.push(Issue::with_detail(GenericAnchors, generic));
    }
    if !page.images.is_empty() && !page.images.iter().any(|i| i.lazy) {
        issues.push(Issue::new(NoLazyImages));
    }
    if !page.schema.any() {
        issues.push(Issue::new(NoStructuredData));
    }
    if !page.accessibility.aria_landmarks {
        issues.push(Issue::new(MissingLandmarks));
    }
    if page.accessibility.low_contrast_hints > 0 {
        issues.push(Issue::with_detail(LowContrast, page.accessibility.low_contrast_hints));
    }
    if page.security.header_score() < 50 {
        issues.push(Issue::new(MissingSecurityHeaders));
    }

    issues.sort_by_key(|issue| issue.severity);
    issues
}

pub fn has_critical_issue(page: &PageRecord) -> bool {
    detect_issues(page)
        .iter()
        .any(|issue| issue.severity == Severity::Critical)
}

/// Things the page does well
pub fn detect_strengths(page: &PageRecord) -> Vec<&'static str> {
    if page.is_failed() {
        return Vec::new();
    }
    let mut strengths = Vec::new();
    if (10..=60).contains(&page.title_text().chars().count()) {
        strengths.push("Title length within 10-60 characters");
    }
    if (50..=160).contains(&page.description_text().chars().count()) {
        strengths.push("Meta description within 50-160 characters");
    }
    if page.canonical.is_some() && !canonical_is_broken(page) {
        strengths.push("Canonical URL declared");
    }
    if page.schema.any() {
        strengths.push("Structured data present");
    }
    if page.h1_count() == 1 && heading_hierarchy_valid(page) {
        strengths.push("Single H1 with a clean heading hierarchy");
    }
    if page.word_count >= THIN_CONTENT_WORDS {
        strengths.push("Substantial content");
    }
    if !page.images.is_empty() && page.images_without_alt() == 0 {
        strengths.push("All images have alt text");
    }
    if page.mobile.viewport && page.mobile.device_width {
        strengths.push("Responsive viewport configured");
    }
    if page.accessibility.html_lang {
        strengths.push("Document language declared");
    }
    if page.security.https {
        strengths.push("Served over HTTPS");
    }
    strengths
}

/// Number of pages affected by each issue kind
pub fn tally_issues<'a>(pages: impl IntoIterator<Item = &'a PageRecord>) -> BTreeMap<IssueKind, usize> {
    let mut tally = BTreeMap::new();
    for page in pages {
        for issue in detect_issues(page) {
            *tally.entry(issue.kind).or_insert(0) += 1;
        }
    }
    tally
}

/// Strengths shared by at least half of the pages, most common first
pub fn common_strengths<'a>(pages: impl IntoIterator<Item = &'a PageRecord>) -> Vec<&'static str> {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut total = 0;
    for page in pages.into_iter().filter(|p| !p.is_failed()) {
        total += 1;
        for strength in detect_strengths(page) {
            *counts.entry(strength).or_insert(0) += 1;
        }
    }
    let mut shared: Vec<(&'static str, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count * 2 >= total && *count > 0)
        .collect();
    shared.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    shared.into_iter().map(|(s, _)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::{bare_page, sample_page};

    #[test]
    fn test_bare_page_issues() {
        let issues = detect_issues(&bare_page("https://example.com/", 0));
        let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();

        assert!(messages.contains(&"Missing title"));
        assert!(messages.contains(&"Missing meta description"));
        assert_eq!(issues[0].severity, Severity::Critical);
        assert!(issues.windows(2).all(|w| w[0].severity <= w[1].severity));
        assert!(has_critical_issue(&bare_page("https://example.com/", 0)));
    }

    #[test]
    fn test_sample_page_has_no_critical_issues() {
        let page = sample_page("https://example.com/", 0);
        assert!(!has_critical_issue(&page));
        assert!(detect_strengths(&page).contains(&"Structured data present"));
    }

    #[test]
    fn test_broken_canonical() {
        let mut page = sample_page("https://example.com/", 0);
        page.canonical = Some("  ".to_string());
        assert!(detect_issues(&page).iter().any(|i| i.kind == IssueKind::BrokenCanonical));

        page.canonical = Some("/relative-is-fine".to_string());
        assert!(!detect_issues(&page).iter().any(|i| i.kind == IssueKind::BrokenCanonical));
    }

    #[test]
    fn test_failed_stub_reports_fetch_failure() {
        let stub = PageRecord::failed("https://example.com/x", 1, 503, 20, "HTTP 503");
        let issues = detect_issues(&stub);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "Page could not be fetched (HTTP 503)");
        assert!(detect_strengths(&stub).is_empty());
    }

    #[test]
    fn test_tally_and_common_strengths() {
        let pages = vec![
            sample_page("https://example.com/", 0),
            sample_page("https://example.com/a", 1),
            bare_page("https://example.com/b", 2),
        ];
        let tally = tally_issues(&pages);
        assert_eq!(tally.get(&IssueKind::MissingTitle), Some(&1));
        assert_eq!(tally.get(&IssueKind::MissingViewport), Some(&1));

        let strengths = common_strengths(&pages);
        assert!(strengths.contains(&"Served over HTTPS"));
        assert!(strengths.contains(&"Canonical URL declared"));
    }
}
