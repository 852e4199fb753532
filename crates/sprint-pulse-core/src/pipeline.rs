//! End-to-end refresh: fetch → normalize → metrics, and corpus → index.
//!
//! Runs sequentially. Any failure while fetching or normalizing sprint data
//! aborts the whole run; there are no partial metrics. Corpus loading is
//! optional and degrades to `None` (ungrounded summaries) on failure.

use crate::bm25::Bm25Index;
use crate::error::Result;
use crate::metrics;
use crate::models::{MetricsWindow, NormalizedWindow};
use crate::normalize::{self, FieldMapping};
use crate::traits::{DocumentSource, IssueSource};

/// What to fetch and how to read it.
#[derive(Debug, Clone)]
pub struct RefreshParams {
    pub board_id: u64,
    pub lookback: usize,
    pub mapping: FieldMapping,
}

/// Normalized input and computed metrics for one refresh.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    pub window: NormalizedWindow,
    pub metrics: MetricsWindow,
}

/// Fetch the lookback window from `source` and normalize it.
pub async fn collect_window(
    source: &dyn IssueSource,
    params: &RefreshParams,
) -> Result<NormalizedWindow> {
    let sprints = source
        .fetch_closed_sprints(params.board_id, params.lookback)
        .await?;
    let selected = normalize::select_closed_sprints(&sprints, params.lookback);
    tracing::debug!(
        board_id = params.board_id,
        available = sprints.len(),
        selected = selected.len(),
        "selected closed sprints"
    );

    let mut payloads = Vec::with_capacity(selected.len());
    for sprint in &selected {
        payloads.push(source.fetch_issues(sprint.id, &params.mapping).await?);
    }

    normalize::normalize_window(selected, &payloads, &params.mapping)
}

/// Fetch, normalize, and compute metrics.
pub async fn refresh_metrics(
    source: &dyn IssueSource,
    params: &RefreshParams,
) -> Result<RefreshResult> {
    let window = collect_window(source, params).await?;
    let metrics = metrics::compute_window(&window)?;
    Ok(RefreshResult { window, metrics })
}

/// Build a BM25 index from the corpus, if there is one.
///
/// Returns `None` when no source is configured, the source fails, or it has
/// no documents.
pub async fn load_index(source: Option<&dyn DocumentSource>) -> Option<Bm25Index> {
    let source = source?;
    match source.list_documents().await {
        Ok(docs) if docs.is_empty() => {
            tracing::warn!(source = source.name(), "corpus is empty; summarizing ungrounded");
            None
        }
        Ok(docs) => {
            tracing::debug!(source = source.name(), documents = docs.len(), "indexed corpus");
            Some(Bm25Index::build(docs))
        }
        Err(e) => {
            tracing::warn!(
                source = source.name(),
                error = %e,
                "corpus unavailable; summarizing ungrounded"
            );
            None
        }
    }
}
