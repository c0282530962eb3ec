//! # Audit Report Generation
//!
//! Turns an [`AuditContext`](crate::context::AuditContext) into a Markdown
//! report. The model is asked once per overflow chunk and once more for the
//! synthesis; the deterministic parts of the report (score table, issue
//! counts, next steps, metadata) are rendered locally from the findings so
//! they never depend on the model's answer.

mod error;
pub mod generator;
pub mod markdown;
pub mod prompts;

pub use error::ReportError;
pub use generator::{GeneratorConfig, GeneratorConfigBuilder, ReportGenerator};
pub use markdown::{ReportMeta, render_report};

use crate::context::ContextMetadata;
use crate::scoring::{ScoreBand, ScoreBreakdown};

/// A generated audit report
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub markdown: String,
    /// 1, or 2 when the first attempt failed and the reduced context succeeded
    pub attempts: usize,
    /// Completion calls of the successful attempt
    pub calls: usize,
    pub score: ScoreBreakdown,
    pub band: ScoreBand,
    /// Metadata of the context the report was written from
    pub metadata: ContextMetadata,
}
