//! # Scoring Engine
//!
//! Deterministic 0-100 scores for page records. Each page gets six category
//! scores which are combined with the fixed weights of a [`ScoringRubric`].
//! An aggregate over several pages is the mean of the per-page scores, so a
//! domain score can always be traced back to individual pages.
//!
//! Failed fetch stubs never contribute to an aggregate.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use seo_auditor::crawler::PageRecord;
//! # fn pages() -> Vec<PageRecord> { Vec::new() }
//! use seo_auditor::scoring::{score_pages, ScoreBand};
//!
//! let breakdown = score_pages(&pages());
//! if breakdown.band() == ScoreBand::Poor {
//!     println!("overall {:.1}", breakdown.overall);
//! }
//! ```

pub mod issues;
pub mod rubric;

pub use issues::{Issue, IssueKind, Severity, detect_issues, detect_strengths};
pub use rubric::ScoringRubric;

use crate::crawler::PageRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound (exclusive) of the poor band
pub const POOR_BELOW: f64 = 40.0;
/// Upper bound (exclusive) of the needs-work band
pub const NEEDS_WORK_BELOW: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Poor,
    NeedsWork,
    Good,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score < POOR_BELOW {
            ScoreBand::Poor
        } else if score < NEEDS_WORK_BELOW {
            ScoreBand::NeedsWork
        } else {
            ScoreBand::Good
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreBand::Poor => "Poor",
            ScoreBand::NeedsWork => "Needs work",
            ScoreBand::Good => "Good",
        }
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category and overall scores, each 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub technical: f64,
    pub content: f64,
    pub images: f64,
    pub links: f64,
    pub mobile_accessibility: f64,
    /// Response time and page weight
    #[serde(default)]
    pub performance: f64,
    pub overall: f64,
    /// Number of pages the scores were computed from
    pub pages: usize,
}

impl ScoreBreakdown {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.overall)
    }

    /// `(name, score)` pairs in report order
    pub fn categories(&self) -> [(&'static str, f64); 6] {
        [
            ("Technical", self.technical),
            ("Content", self.content),
            ("Images", self.images),
            ("Links", self.links),
            ("Mobile & accessibility", self.mobile_accessibility),
            ("Performance", self.performance),
        ]
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl ScoringRubric {
    /// Score a single page; failed stubs score zero across the board
    pub fn score_page(&self, page: &PageRecord) -> ScoreBreakdown {
        if page.is_failed() {
            return ScoreBreakdown::default();
        }
        let technical = rubric::technical(page);
        let content = rubric::content(page);
        let images = rubric::images(page);
        let links = rubric::links(page);
        let mobile_accessibility = rubric::mobile_accessibility(page);
        let performance = rubric::performance(page);
        let overall = technical * self.technical
            + content * self.content
            + images * self.images
            + links * self.links
            + mobile_accessibility * self.mobile_accessibility
            + performance * self.performance;

        ScoreBreakdown {
            technical: round1(technical),
            content: round1(content),
            images: round1(images),
            links: round1(links),
            mobile_accessibility: round1(mobile_accessibility),
            performance: round1(performance),
            overall: round1(overall),
            pages: 1,
        }
    }

    /// Mean of the per-page scores of every successfully fetched page
    pub fn score_pages<'a>(&self, pages: impl IntoIterator<Item = &'a PageRecord>) -> ScoreBreakdown {
        let scores: Vec<ScoreBreakdown> = pages
            .into_iter()
            .filter(|page| !page.is_failed())
            .map(|page| self.score_page(page))
            .collect();
        if scores.is_empty() {
            return ScoreBreakdown::default();
        }

        let n = scores.len() as f64;
        let mean = |field: fn(&ScoreBreakdown) -> f64| round1(scores.iter().map(field).sum::<f64>() / n);
        ScoreBreakdown {
            technical: mean(|s| s.technical),
            content: mean(|s| s.content),
            images: mean(|s| s.images),
            links: mean(|s| s.links),
            mobile_accessibility: mean(|s| s.mobile_accessibility),
            performance: mean(|s| s.performance),
            overall: mean(|s| s.overall),
            pages: scores.len(),
        }
    }
}

/// Score a page with the default rubric
pub fn score_page(page: &PageRecord) -> ScoreBreakdown {
    ScoringRubric::default().score_page(page)
}

/// Aggregate score with the default rubric
pub fn score_pages<'a>(pages: impl IntoIterator<Item = &'a PageRecord>) -> ScoreBreakdown {
    ScoringRubric::default().score_pages(pages)
}
