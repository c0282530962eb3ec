use std::time::Duration;

use chrono::Utc;
use rig::completion::CompletionModel;
use tracing::{debug, info, instrument, warn};

use super::error::ReportError;
use super::markdown::{ReportMeta, render_report};
use super::prompts;
use super::Report;
use crate::context::AuditContext;
use crate::model::AuditClient;

/// Configuration for report generation
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Timeout of every completion call
    pub timeout: Duration,

    /// Maximum bytes of one chunk answer carried into the synthesis prompt
    pub note_bytes: usize,

    /// Session directory or page file shown in the report metadata
    pub source: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            note_bytes: 1500,
            source: None,
        }
    }
}

/// Builder for GeneratorConfig
#[derive(Debug, Default)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = Some(source.into());
        self
    }

    pub fn build(self) -> GeneratorConfig {
        self.config
    }
}

impl GeneratorConfig {
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder::new()
    }
}

/// Writes reports from audit contexts with one completion backend
pub struct ReportGenerator<M: CompletionModel> {
    client: AuditClient<M>,
    config: GeneratorConfig,
}

impl<M: CompletionModel> ReportGenerator<M> {
    pub fn new(client: AuditClient<M>, config: GeneratorConfig) -> Self {
        Self { client, config }
    }

    /// Generate the report for `context`
    ///
    /// A recoverable failure of any completion call restarts the generation
    /// once with [`AuditContext::reduced`]; a second failure is terminal.
    #[instrument(skip_all, fields(mode = %context.mode, chunks = context.chunks.len()))]
    pub async fn generate(&self, context: AuditContext) -> Result<Report, ReportError> {
        match self.attempt(&context).await {
            Ok((analysis, calls)) => Ok(self.finish(context, &analysis, 1, calls)),
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "completion failed, retrying once with a reduced context");
                let reduced = context.reduced();
                info!(
                    included = reduced.metadata.included.len(),
                    chunks = reduced.chunks.len(),
                    bytes = reduced.metadata.payload_bytes,
                    "reduced audit context"
                );
                match self.attempt(&reduced).await {
                    Ok((analysis, calls)) => Ok(self.finish(reduced, &analysis, 2, calls)),
                    Err(err) => Err(err.into_terminal()),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// One pass over the chunks followed by the synthesis call
    ///
    /// The synthesis call sees the primary payload plus notes that together
    /// stay within the chunk threshold.
    async fn attempt(&self, context: &AuditContext) -> Result<(String, usize), ReportError> {
        let preamble = prompts::preamble(context.language);
        let threshold = context.metadata.chunk_threshold_bytes;
        let space = threshold.saturating_sub(context.byte_size());
        let note_cap = self.config.note_bytes.min(space).min(threshold / 2);

        let mut calls = 0;
        let mut notes = Vec::with_capacity(context.chunks.len());
        for chunk in &context.chunks {
            let prompt = prompts::chunk_prompt(context, chunk)?;
            let note = self.call(&preamble, &prompt).await?;
            calls += 1;
            debug!(chunk = chunk.index, bytes = note.len(), "chunk analysed");
            notes.push(prompts::truncate_note(&note, note_cap));
        }

        let notes = self
            .fold_notes(&preamble, context, notes, space, note_cap, &mut calls)
            .await?;
        let prompt = prompts::synthesis_prompt(context, &notes)?;
        let analysis = self.call(&preamble, &prompt).await?;
        Ok((analysis, calls + 1))
    }

    /// Merge neighbouring notes until they fit into `space`
    ///
    /// Every merge call carries at most one threshold of notes. Notes are
    /// capped at half the threshold, so each round at least halves their count.
    async fn fold_notes(
        &self,
        preamble: &str,
        context: &AuditContext,
        mut notes: Vec<String>,
        space: usize,
        note_cap: usize,
        calls: &mut usize,
    ) -> Result<Vec<String>, ReportError> {
        let threshold = context.metadata.chunk_threshold_bytes;
        let mut round = 0;
        while notes.len() > 1 && prompts::notes_bytes(&notes) > space {
            round += 1;
            let mut merged = Vec::new();
            for group in group_notes(notes, threshold) {
                if group.len() == 1 {
                    merged.extend(group);
                    continue;
                }
                let prompt = prompts::merge_prompt(context, &group);
                let note = self.call(preamble, &prompt).await?;
                *calls += 1;
                merged.push(prompts::truncate_note(&note, note_cap));
            }
            debug!(round, notes = merged.len(), bytes = prompts::notes_bytes(&merged), "merged chunk notes");
            notes = merged;
        }
        Ok(notes)
    }

    async fn call(&self, preamble: &str, prompt: &str) -> Result<String, ReportError> {
        let text = tokio::time::timeout(self.config.timeout, self.client.complete(preamble, prompt))
            .await
            .map_err(|_| ReportError::Timeout(self.config.timeout.as_secs()))??;
        if text.trim().is_empty() {
            return Err(ReportError::Provider {
                message: "empty completion".to_string(),
                recoverable: true,
            });
        }
        Ok(text)
    }

    fn finish(&self, context: AuditContext, analysis: &str, attempts: usize, calls: usize) -> Report {
        let meta = ReportMeta {
            model: self.client.info(),
            attempts,
            generated_at: Utc::now(),
            source: self.config.source.as_deref(),
        };
        let markdown = render_report(&context, analysis, &meta);
        info!(attempts, calls, bytes = markdown.len(), "report generated");
        Report {
            markdown,
            attempts,
            calls,
            score: context.findings.score,
            band: context.findings.band,
            metadata: context.metadata,
        }
    }
}

/// Split notes into consecutive runs of at most `limit` bytes
fn group_notes(notes: Vec<String>, limit: usize) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut size = 0;
    for note in notes {
        match groups.last_mut() {
            Some(group) if size + note.len() <= limit => {
                size += note.len();
                group.push(note);
            }
            _ => {
                size = note.len();
                groups.push(vec![note]);
            }
        }
    }
    groups
}
