//! Sequential chunking of overflow rows

use super::config::ContextConfig;
use super::error::ContextError;
use super::summary::{ChunkSummary, summarize_chunk};
use super::views::{PageDetail, PageRow, TechnicalRow};
use serde::Serialize;
use tracing::debug;

/// Which per-page view a chunk payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowView {
    Technical,
    Detail,
}

impl RowView {
    fn render(self, row: &PageRow<'_>) -> Result<String, ContextError> {
        Ok(match self {
            RowView::Technical => serde_json::to_string(&TechnicalRow::from(row))?,
            RowView::Detail => serde_json::to_string(&PageDetail::from(row))?,
        })
    }
}

/// One bounded slice of the overflow rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextChunk {
    pub index: usize,
    /// Pages whose rows are in `payload`
    pub urls: Vec<String>,
    /// JSON array of rows, never longer than the chunk threshold
    pub payload: String,
    /// Covers every row assigned to the chunk, including rows too large for the payload
    pub summary: ChunkSummary,
}

impl ContextChunk {
    pub fn byte_size(&self) -> usize {
        self.payload.len()
    }
}

struct Pending<'a> {
    rows: Vec<PageRow<'a>>,
    urls: Vec<String>,
    items: Vec<String>,
    bytes: usize,
}

impl<'a> Pending<'a> {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            urls: Vec::new(),
            items: Vec::new(),
            // brackets of the JSON array
            bytes: 2,
        }
    }

    fn cost(&self, item: &str) -> usize {
        item.len() + usize::from(!self.items.is_empty())
    }

    fn flush(self, chunks: &mut Vec<ContextChunk>, config: &ContextConfig) {
        if self.rows.is_empty() {
            return;
        }
        let index = chunks.len();
        chunks.push(ContextChunk {
            index,
            summary: summarize_chunk(index, &self.rows, config),
            urls: self.urls,
            payload: format!("[{}]", self.items.join(",")),
        });
    }
}

/// Split rows into consecutive chunks whose payloads fit `chunk_threshold_bytes`
///
/// Row order is preserved. A row whose own serialization exceeds the threshold is
/// summarized with the chunk it falls into but left out of the payload.
pub fn chunk_rows(
    rows: &[PageRow<'_>],
    view: RowView,
    config: &ContextConfig,
) -> Result<Vec<ContextChunk>, ContextError> {
    let threshold = config.chunk_threshold_bytes;
    let mut chunks = Vec::new();
    let mut pending = Pending::new();

    for row in rows {
        let item = view.render(row)?;
        if item.len() + 2 > threshold {
            debug!(url = row.url(), bytes = item.len(), "row exceeds chunk threshold");
            pending.rows.push(row.clone());
            continue;
        }
        if pending.bytes + pending.cost(&item) > threshold {
            std::mem::replace(&mut pending, Pending::new()).flush(&mut chunks, config);
        }
        let cost = pending.cost(&item);
        pending.bytes += cost;
        pending.urls.push(row.url().to_string());
        pending.items.push(item);
        pending.rows.push(row.clone());
    }
    pending.flush(&mut chunks, config);

    Ok(chunks)
}
