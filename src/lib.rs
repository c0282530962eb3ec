//! # seo-auditor - Website SEO crawling and LLM-assisted audits
//!
//! This crate crawls a website, turns every fetched page into a structured
//! [`crawler::PageRecord`], scores those records deterministically and finally
//! asks a completion model (a local model server or a cloud API) to write a
//! Markdown audit from a bounded context built out of the records.
//!
//! ## Pipeline
//!
//! - `crawler`: frontier management, polite sequential fetching, language
//!   classification and per-language persistence of page records
//! - `scoring`: fixed-weight category scores and issue detection
//! - `context`: priority ordering, chunking and two-level summarization so an
//!   unbounded crawl fits a bounded prompt
//! - `model`: rate-limited completion models for the supported providers
//! - `report`: prompt templates, one-retry generation policy and the final
//!   report skeleton
//!
//! ## Example
//!
//! ```rust,no_run
//! use seo_auditor::context::{AuditMode, ContextBudget, ContextBuilder};
//! use seo_auditor::crawler::storage::load_session_dir;
//! use seo_auditor::model::AuditClient;
//! use seo_auditor::report::{GeneratorConfig, ReportGenerator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = load_session_dir("crawl_data/example.com/2026-01-01_10-00-00".as_ref(), None).await?;
//!     let context = ContextBuilder::default().build(
//!         &session.pages,
//!         AuditMode::Full,
//!         ContextBudget::from_tokens(3000),
//!     )?;
//!
//!     let client = AuditClient::local("http://localhost:11434", "llama3.1");
//!     let generator = ReportGenerator::new(client, GeneratorConfig::default());
//!     let report = generator.generate(context).await?;
//!     println!("{}", report.markdown);
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;
pub mod model;

pub mod context;
pub mod crawler;
pub mod report;
pub mod scoring;

pub use error::Error;

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}
