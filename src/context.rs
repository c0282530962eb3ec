//! # Audit Context Builder
//!
//! Turns an unbounded set of page records into a bounded [`AuditContext`] for
//! one report generation.
//!
//! ## Key Components
//!
//! - `AuditMode`: how much per-page detail the context keeps
//! - `ContextBudget`: the byte budget of the primary payload
//! - `ContextBuilder`: prioritizes, shapes, chunks and summarizes records
//! - `AuditContext`: the primary payload, bounded chunks, findings and metadata
//!
//! ## Shaping
//!
//! Pages are ordered by priority (lowest overall score first, then pages with
//! critical issues, then crawl order) and added to the primary payload while it
//! fits the budget, which never exceeds `chunk_threshold_bytes`. Everything that
//! does not fit is split into sequential chunks of at most
//! `chunk_threshold_bytes`, and a chunked payload leaves a quarter of the
//! threshold free for the notes of the chunk calls. Every chunk is folded into a
//! [`ChunkSummary`] and the chunk summaries are folded into one
//! [`RollupSummary`] carried by the primary payload.
//!
//! Every page that is not part of the detailed payload is listed in
//! [`ContextMetadata::omitted`] together with the reason.

pub mod chunking;
pub mod config;
mod error;
pub mod summary;
pub mod views;

pub use chunking::{ContextChunk, RowView};
pub use config::{ContextConfig, ContextConfigBuilder};
pub use error::ContextError;
pub use summary::{ChunkSummary, RollupSummary};
pub use views::{DomainDigest, Findings, IssueCount, PageDetail, SinglePage, TechnicalRow};

use crate::crawler::{Language, PageRecord};
use crate::scoring::ScoringRubric;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};
use views::{PageRow, priority_cmp};

/// Audit scope selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// Domain level aggregates only
    Overview,
    /// Technical, performance and security fields per page
    Technical,
    /// Full page detail up to a cap, the rest summarized
    Pages,
    /// Union of overview, technical and pages
    Full,
    /// One complete record, never truncated
    Single,
}

impl AuditMode {
    pub const ALL: [AuditMode; 5] = [
        AuditMode::Overview,
        AuditMode::Technical,
        AuditMode::Pages,
        AuditMode::Full,
        AuditMode::Single,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditMode::Overview => "overview",
            AuditMode::Technical => "technical",
            AuditMode::Pages => "pages",
            AuditMode::Full => "full",
            AuditMode::Single => "single",
        }
    }

    fn keeps_details(&self) -> bool {
        matches!(self, AuditMode::Pages | AuditMode::Full)
    }

    fn keeps_technical(&self) -> bool {
        matches!(self, AuditMode::Technical | AuditMode::Full)
    }
}

impl fmt::Display for AuditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown audit mode '{s}' (expected overview, technical, pages, full or single)"))
    }
}

/// Byte budget of the primary payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContextBudget(usize);

impl ContextBudget {
    /// Approximate bytes per token used for conversions
    pub const BYTES_PER_TOKEN: usize = 4;

    pub fn from_bytes(bytes: usize) -> Self {
        Self(bytes)
    }

    pub fn from_tokens(tokens: usize) -> Self {
        Self(tokens.saturating_mul(Self::BYTES_PER_TOKEN))
    }

    pub fn bytes(&self) -> usize {
        self.0
    }
}

impl Default for ContextBudget {
    /// 1500 tokens, the default chunk threshold
    fn default() -> Self {
        Self::from_tokens(1500)
    }
}

/// Why a page is absent from the detailed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmissionReason {
    /// The fetch failed; only the failure is reported
    FailedFetch,
    /// The page qualified for detail but did not fit the budget
    OverBudget,
    /// The mode only keeps aggregates for this page
    Summarized,
    /// Dropped when the context was reduced after a provider failure
    ReducedForRetry,
}

impl OmissionReason {
    pub fn label(&self) -> &'static str {
        match self {
            OmissionReason::FailedFetch => "failed fetch",
            OmissionReason::OverBudget => "over budget",
            OmissionReason::Summarized => "summarized",
            OmissionReason::ReducedForRetry => "reduced for retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OmittedPage {
    pub url: String,
    pub reason: OmissionReason,
}

/// What went into a context and what was left out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetadata {
    pub mode: AuditMode,
    /// Every record handed to the builder, failed stubs included
    pub total_pages: usize,
    /// Pages present with per-page detail, in priority order
    pub included: Vec<String>,
    pub omitted: Vec<OmittedPage>,
    pub budget_bytes: usize,
    pub payload_bytes: usize,
    pub chunk_threshold_bytes: usize,
    /// Number of times the context was reduced for a retry
    pub reductions: usize,
}

impl ContextMetadata {
    /// Omitted pages that were fetched successfully
    pub fn omitted_for_brevity(&self) -> usize {
        self.omitted
            .iter()
            .filter(|o| o.reason != OmissionReason::FailedFetch)
            .count()
    }

    pub fn failed_fetches(&self) -> usize {
        self.omitted
            .iter()
            .filter(|o| o.reason == OmissionReason::FailedFetch)
            .count()
    }
}

/// Bounded payload for one report generation
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContext {
    pub mode: AuditMode,
    /// Dominant language of the audited pages
    pub language: Option<Language>,
    pub digest: DomainDigest,
    pub pages: Vec<PageDetail>,
    pub technical: Vec<TechnicalRow>,
    pub single: Option<SinglePage>,
    pub chunks: Vec<ContextChunk>,
    pub rollup: Option<RollupSummary>,
    /// Budget independent conclusions over every successful page
    pub findings: Findings,
    pub metadata: ContextMetadata,
    config: ContextConfig,
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

#[derive(Serialize)]
struct PrimaryPayload<'a> {
    mode: AuditMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<&'a DomainDigest>,
    #[serde(skip_serializing_if = "is_empty")]
    pages: &'a [PageDetail],
    #[serde(skip_serializing_if = "is_empty")]
    technical: &'a [TechnicalRow],
    #[serde(skip_serializing_if = "Option::is_none")]
    single: Option<&'a SinglePage>,
    #[serde(rename = "remainingPages", skip_serializing_if = "Option::is_none")]
    rollup: Option<&'a RollupSummary>,
}

impl AuditContext {
    /// Compact JSON handed to the synthesis call
    pub fn primary_payload(&self) -> Result<String, ContextError> {
        let payload = PrimaryPayload {
            mode: self.mode,
            digest: (self.mode != AuditMode::Single).then_some(&self.digest),
            pages: &self.pages,
            technical: &self.technical,
            single: self.single.as_ref(),
            rollup: self.rollup.as_ref(),
        };
        Ok(serde_json::to_string(&payload)?)
    }

    /// Size of the primary payload in bytes
    pub fn byte_size(&self) -> usize {
        self.primary_payload().map(|p| p.len()).unwrap_or(usize::MAX)
    }

    pub fn is_chunked(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Copy of this context with the lowest-priority half of the detailed pages dropped
    ///
    /// Without detailed pages left, the last chunk is dropped instead and the
    /// rollup recomputed. A single page context is returned unchanged.
    pub fn reduced(&self) -> Self {
        let mut next = self.clone();
        next.metadata.reductions += 1;
        if self.mode == AuditMode::Single {
            return next;
        }

        let included = next.metadata.included.len();
        if included > 0 {
            let drop = (included / 2).max(1);
            let dropped: Vec<String> = next.metadata.included.split_off(included - drop);
            let gone: HashSet<&str> = dropped.iter().map(String::as_str).collect();
            next.pages.retain(|p| !gone.contains(p.url.as_str()));
            next.technical.retain(|t| !gone.contains(t.url.as_str()));
            next.metadata.omitted.extend(dropped.iter().map(|url| OmittedPage {
                url: url.clone(),
                reason: OmissionReason::ReducedForRetry,
            }));
            debug!(dropped = drop, remaining = next.metadata.included.len(), "reduced detailed pages");
        } else if let Some(chunk) = next.chunks.pop() {
            let gone: HashSet<&str> = chunk.urls.iter().map(String::as_str).collect();
            for omitted in next.metadata.omitted.iter_mut() {
                if gone.contains(omitted.url.as_str()) {
                    omitted.reason = OmissionReason::ReducedForRetry;
                }
            }
            next.rollup = summary::roll_up(next.chunks.iter().map(|c| &c.summary), &next.config);
            debug!(chunk = chunk.index, remaining = next.chunks.len(), "dropped last chunk");
        } else {
            next.digest.compact(&next.config);
        }

        next.metadata.payload_bytes = next.byte_size();
        next
    }
}

/// Builds [`AuditContext`]s from page records
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
    rubric: ScoringRubric,
}

/// Rows in their working state during a build
struct Selection<'a> {
    rows: Vec<PageRow<'a>>,
    /// Number of leading rows shown with full detail
    details: usize,
    /// Rows after the detail rows shown as technical rows
    technical: usize,
    /// Rows that qualified for a detailed view
    candidates: usize,
}

impl<'a> Selection<'a> {
    fn included(&self) -> &[PageRow<'a>] {
        &self.rows[..self.details + self.technical]
    }

    fn overflow(&self) -> &[PageRow<'a>] {
        &self.rows[self.details + self.technical..]
    }

    /// Give back the lowest-priority included row
    fn pop(&mut self) -> bool {
        if self.technical > 0 {
            self.technical -= 1;
            true
        } else if self.details > 0 {
            self.details -= 1;
            true
        } else {
            false
        }
    }
}

impl ContextBuilder {
    pub fn new(config: ContextConfig, rubric: ScoringRubric) -> Self {
        Self { config, rubric }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Build a context for `records` under `budget`
    ///
    /// The budget is capped at the chunk threshold so the primary payload is
    /// never larger than one chunk. Fails with [`ContextError::NoPages`] when
    /// no record was fetched successfully and with
    /// [`ContextError::BudgetTooSmall`] when even the compacted summaries
    /// exceed the budget. Single mode ignores the budget.
    #[instrument(skip_all, fields(mode = %mode, records = records.len(), budget = budget.bytes()))]
    pub fn build(
        &self,
        records: &[PageRecord],
        mode: AuditMode,
        budget: ContextBudget,
    ) -> Result<AuditContext, ContextError> {
        let (failures, successes): (Vec<&PageRecord>, Vec<&PageRecord>) =
            records.iter().partition(|r| r.is_failed());
        let mut rows: Vec<PageRow> = successes
            .into_iter()
            .map(|record| PageRow::new(record, &self.rubric))
            .collect();
        if rows.is_empty() {
            return Err(ContextError::NoPages);
        }

        rows.sort_by_key(|row| row.record.sequence);
        let findings = Findings::build(&rows, &failures, &self.rubric);
        let mut omitted: Vec<OmittedPage> = failures
            .iter()
            .map(|f| OmittedPage {
                url: f.url.clone(),
                reason: OmissionReason::FailedFetch,
            })
            .collect();

        if mode == AuditMode::Single {
            return Ok(self.build_single(records.len(), rows, findings, omitted, budget));
        }

        let budget = self.capped_budget(budget);
        rows.sort_by(priority_cmp);
        let mut digest = DomainDigest::build(&rows, failures.len(), &self.rubric, &self.config);
        let mut selection = self.select(rows, mode, &digest, budget)?;

        let view = if mode == AuditMode::Pages {
            RowView::Detail
        } else {
            RowView::Technical
        };

        loop {
            let mut context = self.assemble(&selection, mode, &digest, &findings, view, budget)?;
            let limit = self.payload_limit(&context, budget);
            let size = context.byte_size();
            if size <= limit {
                self.finish(&mut context, &selection, records.len(), &mut omitted);
                info!(
                    included = context.metadata.included.len(),
                    omitted = context.metadata.omitted.len(),
                    chunks = context.chunks.len(),
                    bytes = size,
                    "built audit context"
                );
                return Ok(context);
            }
            if selection.pop() {
                continue;
            }

            // nothing left to give back, shrink the summaries themselves
            digest.compact(&self.config);
            if let Some(rollup) = context.rollup.as_mut() {
                rollup.compact();
            }
            context.digest = digest.clone();
            let size = context.byte_size();
            if size <= limit {
                self.finish(&mut context, &selection, records.len(), &mut omitted);
                return Ok(context);
            }
            warn!(needed = size, budget = limit, "audit context does not fit");
            return Err(ContextError::BudgetTooSmall {
                needed: size,
                budget: limit,
            });
        }
    }

    fn capped_budget(&self, budget: ContextBudget) -> ContextBudget {
        let threshold = self.config.chunk_threshold_bytes;
        if budget.bytes() > threshold {
            debug!(requested = budget.bytes(), threshold, "budget capped at the chunk threshold");
        }
        ContextBudget::from_bytes(budget.bytes().min(threshold))
    }

    /// Chunked contexts leave room for the chunk notes next to the payload
    fn payload_limit(&self, context: &AuditContext, budget: ContextBudget) -> usize {
        if context.is_chunked() {
            budget.bytes().min(self.config.chunked_payload_limit())
        } else {
            budget.bytes()
        }
    }

    fn build_single(
        &self,
        total: usize,
        rows: Vec<PageRow<'_>>,
        findings: Findings,
        mut omitted: Vec<OmittedPage>,
        budget: ContextBudget,
    ) -> AuditContext {
        let chosen = &rows[0];
        omitted.extend(rows[1..].iter().map(|row| OmittedPage {
            url: row.url().to_string(),
            reason: OmissionReason::OverBudget,
        }));

        let mut context = AuditContext {
            mode: AuditMode::Single,
            language: Some(chosen.record.language),
            digest: DomainDigest::build(&rows[..1], 0, &self.rubric, &self.config),
            pages: Vec::new(),
            technical: Vec::new(),
            single: Some(SinglePage::from(chosen)),
            chunks: Vec::new(),
            rollup: None,
            findings,
            metadata: ContextMetadata {
                mode: AuditMode::Single,
                total_pages: total,
                included: vec![chosen.url().to_string()],
                omitted,
                budget_bytes: budget.bytes(),
                payload_bytes: 0,
                chunk_threshold_bytes: self.config.chunk_threshold_bytes,
                reductions: 0,
            },
            config: self.config.clone(),
        };
        context.metadata.payload_bytes = context.byte_size();
        if context.metadata.payload_bytes > budget.bytes() {
            debug!(bytes = context.metadata.payload_bytes, "single page context exceeds budget");
        }
        context
    }

    /// Greedily pick the detailed rows that fit the budget minus the summary reserve
    fn select<'a>(
        &self,
        rows: Vec<PageRow<'a>>,
        mode: AuditMode,
        digest: &DomainDigest,
        budget: ContextBudget,
    ) -> Result<Selection<'a>, ContextError> {
        let available = budget.bytes().saturating_sub(self.config.summary_reserve_bytes);
        let base = PrimaryPayload {
            mode,
            digest: Some(digest),
            pages: &[],
            technical: &[],
            single: None,
            rollup: None,
        };
        // array brackets and keys of both lists
        let mut used = serde_json::to_string(&base)?.len() + 40;

        let detail_cap = if mode.keeps_details() {
            self.config.page_detail_cap.min(rows.len())
        } else {
            0
        };
        let mut details = 0;
        for row in &rows[..detail_cap] {
            let cost = serde_json::to_string(&PageDetail::from(row))?.len() + 1;
            if used + cost > available {
                break;
            }
            used += cost;
            details += 1;
        }

        let mut technical = 0;
        let mut candidates = detail_cap;
        if mode.keeps_technical() {
            // rows within the detail cap that did not fit are not retried as technical rows
            let start = if details < detail_cap { rows.len() } else { detail_cap };
            candidates = rows.len();
            for row in &rows[start..] {
                let cost = serde_json::to_string(&TechnicalRow::from(row))?.len() + 1;
                if used + cost > available {
                    break;
                }
                used += cost;
                technical += 1;
            }
        }

        Ok(Selection {
            rows,
            details,
            technical,
            candidates,
        })
    }

    fn assemble(
        &self,
        selection: &Selection<'_>,
        mode: AuditMode,
        digest: &DomainDigest,
        findings: &Findings,
        view: RowView,
        budget: ContextBudget,
    ) -> Result<AuditContext, ContextError> {
        let included = selection.included();
        let (detail_rows, technical_rows) = included.split_at(selection.details);

        let chunks = if mode == AuditMode::Overview {
            Vec::new()
        } else {
            chunking::chunk_rows(selection.overflow(), view, &self.config)?
        };
        let rollup = summary::roll_up(chunks.iter().map(|c| &c.summary), &self.config);

        Ok(AuditContext {
            mode,
            language: findings.language,
            digest: digest.clone(),
            pages: detail_rows.iter().map(PageDetail::from).collect(),
            technical: technical_rows.iter().map(TechnicalRow::from).collect(),
            single: None,
            chunks,
            rollup,
            findings: findings.clone(),
            metadata: ContextMetadata {
                mode,
                total_pages: 0,
                included: included.iter().map(|r| r.url().to_string()).collect(),
                omitted: Vec::new(),
                budget_bytes: budget.bytes(),
                payload_bytes: 0,
                chunk_threshold_bytes: self.config.chunk_threshold_bytes,
                reductions: 0,
            },
            config: self.config.clone(),
        })
    }

    fn finish(
        &self,
        context: &mut AuditContext,
        selection: &Selection<'_>,
        total: usize,
        omitted: &mut Vec<OmittedPage>,
    ) {
        let first_overflow = selection.details + selection.technical;
        for (offset, row) in selection.overflow().iter().enumerate() {
            let reason = if first_overflow + offset < selection.candidates {
                OmissionReason::OverBudget
            } else {
                OmissionReason::Summarized
            };
            omitted.push(OmittedPage {
                url: row.url().to_string(),
                reason,
            });
        }
        context.metadata.total_pages = total;
        context.metadata.omitted = std::mem::take(omitted);
        context.metadata.payload_bytes = context.byte_size();
    }
}
