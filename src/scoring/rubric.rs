//! Category weights and point tables

use crate::crawler::{LinkRef, PageRecord};
use serde::{Deserialize, Serialize};
use url::Url;

/// Anchor texts that say nothing about the target
pub const GENERIC_ANCHORS: &[&str] = &[
    "click here",
    "read more",
    "here",
    "more",
    "link",
    "learn more",
    "this",
    "details",
    "εδώ",
    "περισσότερα",
    "κλικ εδώ",
];

/// Category weights; they must sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringRubric {
    pub technical: f64,
    pub content: f64,
    pub images: f64,
    pub links: f64,
    pub mobile_accessibility: f64,
    pub performance: f64,
}

impl Default for ScoringRubric {
    fn default() -> Self {
        Self {
            technical: 0.25,
            content: 0.25,
            images: 0.10,
            links: 0.15,
            mobile_accessibility: 0.15,
            performance: 0.10,
        }
    }
}

impl ScoringRubric {
    pub fn total_weight(&self) -> f64 {
        self.technical
            + self.content
            + self.images
            + self.links
            + self.mobile_accessibility
            + self.performance
    }

    pub fn is_valid(&self) -> bool {
        let weights = [
            self.technical,
            self.content,
            self.images,
            self.links,
            self.mobile_accessibility,
            self.performance,
        ];
        weights.iter().all(|w| *w >= 0.0) && (self.total_weight() - 1.0).abs() < 1e-9
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}

/// Title, description, canonical and structured data
pub fn technical(page: &PageRecord) -> f64 {
    let title = page.title_text().chars().count();
    let description = page.description_text().chars().count();

    let title_points = match title {
        0 => 0.0,
        10..=60 => 30.0,
        _ => 10.0,
    };
    let description_points = match description {
        0 => 0.0,
        50..=160 => 30.0,
        _ => 10.0,
    };
    let canonical_points = if page.canonical.as_deref().is_some_and(|c| !c.trim().is_empty()) {
        20.0
    } else {
        0.0
    };
    let schema_points = if page.schema.any() { 20.0 } else { 0.0 };

    title_points + description_points + canonical_points + schema_points
}

/// Whether heading levels never skip on the way down
pub fn heading_hierarchy_valid(page: &PageRecord) -> bool {
    let mut previous = 0u8;
    for heading in &page.headings {
        if heading.level > previous + 1 {
            return false;
        }
        previous = heading.level;
    }
    true
}

/// Word count and heading structure
pub fn content(page: &PageRecord) -> f64 {
    let words = match page.word_count {
        n if n >= 300 => 50.0,
        n if n >= 100 => 25.0,
        0 => 0.0,
        _ => 10.0,
    };
    let single_h1 = if page.h1_count() == 1 { 25.0 } else { 0.0 };
    let hierarchy = if !page.headings.is_empty() && heading_hierarchy_valid(page) {
        25.0
    } else {
        0.0
    };
    words + single_h1 + hierarchy
}

/// Alt text coverage and lazy loading; pages without images are neutral
pub fn images(page: &PageRecord) -> f64 {
    let total = page.images.len();
    if total == 0 {
        return 50.0;
    }
    let with_alt = total - page.images_without_alt();
    let lazy = page.images.iter().filter(|i| i.lazy).count();
    ratio(with_alt, total) * 70.0 + ratio(lazy, total) * 30.0
}

/// Statically broken link: empty, bare fragment, `javascript:` or unparseable
pub fn is_broken_link(link: &LinkRef) -> bool {
    let href = link.href.trim();
    if href.is_empty() || href == "#" || href.to_ascii_lowercase().starts_with("javascript:") {
        return true;
    }
    if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("tel:") {
        return false;
    }
    Url::parse(href).is_err()
}

pub fn is_descriptive_anchor(link: &LinkRef) -> bool {
    let text = link.text.trim().to_lowercase();
    !text.is_empty() && !GENERIC_ANCHORS.contains(&text.as_str())
}

/// Internal link count, broken ratio and anchor quality
pub fn links(page: &PageRecord) -> f64 {
    let total = page.links.len();
    if total == 0 {
        return 0.0;
    }
    let internal = page.internal_links().count();
    let internal_points = match internal {
        n if n >= 3 => 40.0,
        0 => 0.0,
        _ => 20.0,
    };
    let healthy = page.links.iter().filter(|l| !is_broken_link(l)).count();
    let descriptive = page.links.iter().filter(|l| is_descriptive_anchor(l)).count();

    internal_points + ratio(healthy, total) * 30.0 + ratio(descriptive, total) * 30.0
}

/// Viewport and accessibility signals
pub fn mobile_accessibility(page: &PageRecord) -> f64 {
    let a11y = &page.accessibility;
    [
        (page.mobile.viewport, 25.0),
        (page.mobile.device_width, 10.0),
        (a11y.html_lang, 25.0),
        (a11y.aria_landmarks, 15.0),
        (a11y.unlabeled_inputs == 0, 15.0),
        (a11y.low_contrast_hints == 0, 10.0),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, points)| points)
    .sum()
}

/// Responses up to this time keep every speed point
pub const FAST_RESPONSE_MS: u64 = 500;
/// Pages heavier than this lose weight points
pub const PAGE_WEIGHT_BUDGET_BYTES: u64 = 1_000_000;

/// Response time and page weight
///
/// Speed loses one point per 50 ms above [`FAST_RESPONSE_MS`]; every 50 KB
/// above [`PAGE_WEIGHT_BUDGET_BYTES`] costs one more point, at most 30.
pub fn performance(page: &PageRecord) -> f64 {
    let slow_ms = page.load_time_ms.saturating_sub(FAST_RESPONSE_MS) as f64;
    let speed = (100.0 - slow_ms / 50.0).max(0.0);
    let excess_kb = page.page_size_bytes.saturating_sub(PAGE_WEIGHT_BUDGET_BYTES) as f64 / 1000.0;
    let weight_penalty = (excess_kb / 50.0).min(30.0);
    (speed - weight_penalty).max(0.0)
}
