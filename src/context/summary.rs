//! Two-level summary fold
//!
//! Chunks are folded one at a time into a [`ChunkSummary`], then the ordered
//! chunk summaries are folded into a single [`RollupSummary`]. Neither level
//! ever looks at more than its direct inputs.

use super::config::ContextConfig;
use super::views::{IssueCount, PageRow, count_issues, rank_issues};
use crate::scoring::{IssueKind, ScoreBreakdown};
use serde::Serialize;
use std::collections::BTreeMap;

/// A worst-page example carried by a summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageExample {
    pub url: String,
    pub overall: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

/// Deterministic digest of one chunk of page rows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSummary {
    pub index: usize,
    pub pages: usize,
    pub score: ScoreBreakdown,
    pub critical_pages: usize,
    #[serde(skip)]
    pub issue_counts: BTreeMap<IssueKind, usize>,
    pub top_issues: Vec<IssueCount>,
    pub examples: Vec<PageExample>,
}

/// Digest of every chunk summary of a context
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupSummary {
    pub chunks: usize,
    pub pages: usize,
    pub score: ScoreBreakdown,
    pub critical_pages: usize,
    pub top_issues: Vec<IssueCount>,
    pub examples: Vec<PageExample>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Page-weighted mean of score breakdowns
fn weighted_mean(scores: impl IntoIterator<Item = ScoreBreakdown>) -> ScoreBreakdown {
    let scores: Vec<ScoreBreakdown> = scores.into_iter().filter(|s| s.pages > 0).collect();
    let pages: usize = scores.iter().map(|s| s.pages).sum();
    if pages == 0 {
        return ScoreBreakdown::default();
    }
    let n = pages as f64;
    let mean = |field: fn(&ScoreBreakdown) -> f64| {
        round1(scores.iter().map(|s| field(s) * s.pages as f64).sum::<f64>() / n)
    };
    ScoreBreakdown {
        technical: mean(|s| s.technical),
        content: mean(|s| s.content),
        images: mean(|s| s.images),
        links: mean(|s| s.links),
        mobile_accessibility: mean(|s| s.mobile_accessibility),
        performance: mean(|s| s.performance),
        overall: mean(|s| s.overall),
        pages,
    }
}

fn worst_examples(mut examples: Vec<PageExample>, limit: usize) -> Vec<PageExample> {
    examples.sort_by(|a, b| a.overall.total_cmp(&b.overall).then_with(|| a.url.cmp(&b.url)));
    examples.truncate(limit);
    examples
}

/// Fold one chunk of rows
pub fn summarize_chunk(index: usize, rows: &[PageRow<'_>], config: &ContextConfig) -> ChunkSummary {
    let issue_counts = count_issues(rows);
    let examples = rows
        .iter()
        .map(|row| PageExample {
            url: row.url().to_string(),
            overall: row.score.overall,
            issue: row.issues.first().map(|i| i.message.clone()),
        })
        .collect();

    ChunkSummary {
        index,
        pages: rows.len(),
        score: weighted_mean(rows.iter().map(|r| r.score)),
        critical_pages: rows.iter().filter(|r| r.has_critical()).count(),
        top_issues: rank_issues(&issue_counts, config.top_issues),
        issue_counts,
        examples: worst_examples(examples, config.examples),
    }
}

/// Fold the ordered chunk summaries; `None` when there are no chunks
pub fn roll_up<'s>(
    summaries: impl IntoIterator<Item = &'s ChunkSummary>,
    config: &ContextConfig,
) -> Option<RollupSummary> {
    let (chunks, scores, critical_pages, counts, examples) = summaries.into_iter().fold(
        (0, Vec::new(), 0, BTreeMap::new(), Vec::new()),
        |(chunks, mut scores, critical, mut counts, mut examples), summary| {
            scores.push(summary.score);
            for (kind, n) in &summary.issue_counts {
                *counts.entry(*kind).or_insert(0) += n;
            }
            examples.extend(summary.examples.iter().cloned());
            (chunks + 1, scores, critical + summary.critical_pages, counts, examples)
        },
    );
    if chunks == 0 {
        return None;
    }

    let score = weighted_mean(scores);
    Some(RollupSummary {
        chunks,
        pages: score.pages,
        score,
        critical_pages,
        top_issues: rank_issues(&counts, config.top_issues),
        examples: worst_examples(examples, config.examples),
    })
}

impl RollupSummary {
    /// Keep only the most important issue lines and the single worst page
    pub fn compact(&mut self) {
        self.top_issues.truncate(3);
        self.examples.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::{bare_page, sample_page};
    use crate::scoring::ScoringRubric;

    #[test]
    fn test_chunk_summary_counts_and_examples() {
        let rubric = ScoringRubric::default();
        let pages = vec![
            sample_page("https://example.com/", 0),
            bare_page("https://example.com/a", 1),
            bare_page("https://example.com/b", 2),
        ];
        let rows: Vec<PageRow> = pages.iter().map(|p| PageRow::new(p, &rubric)).collect();
        let config = ContextConfig::builder().examples(2).build();

        let summary = summarize_chunk(0, &rows, &config);
        assert_eq!(summary.pages, 3);
        assert_eq!(summary.score.pages, 3);
        assert_eq!(summary.critical_pages, 2);
        assert_eq!(summary.issue_counts.get(&IssueKind::MissingDescription), Some(&2));
        assert_eq!(summary.examples.len(), 2);
        assert!(summary.examples.iter().all(|e| e.url != "https://example.com/"));
        assert_eq!(summary.top_issues[0].severity, crate::scoring::Severity::Critical);
    }

    #[test]
    fn test_rollup_is_weighted_by_pages() {
        let rubric = ScoringRubric::default();
        let good = sample_page("https://example.com/", 0);
        let bare: Vec<_> = (1..4).map(|i| bare_page(&format!("https://example.com/{i}"), i)).collect();
        let config = ContextConfig::default();

        let first = summarize_chunk(0, &[PageRow::new(&good, &rubric)], &config);
        let rows: Vec<PageRow> = bare.iter().map(|p| PageRow::new(p, &rubric)).collect();
        let second = summarize_chunk(1, &rows, &config);

        let rollup = roll_up([&first, &second], &config).unwrap();
        assert_eq!(rollup.chunks, 2);
        assert_eq!(rollup.pages, 4);
        assert_eq!(rollup.critical_pages, 3);

        let expected = round1((first.score.overall + 3.0 * second.score.overall) / 4.0);
        assert_eq!(rollup.score.overall, expected);
        assert_eq!(rollup.examples[0].overall, second.score.overall);
    }

    #[test]
    fn test_rollup_of_nothing() {
        assert!(roll_up(Vec::<&ChunkSummary>::new(), &ContextConfig::default()).is_none());
    }
}
