//! Retrieval-grounded, cached retrospective summarizer.
//!
//! # Flow
//!
//! 1. Render the metrics window to Markdown.
//! 2. If an index is available, query it with the focus question (or the
//!    metrics text) and keep the top `top_k` documents.
//! 3. Assemble the prompt and fingerprint it with the generation parameters.
//! 4. Cache hit: return the stored text without calling the generator.
//! 5. Cache miss: call the generator once, store the response, return it.
//!
//! Cache failures fail open: a read error is treated as a miss and a write
//! error is logged; neither blocks the summary. Generation failures are
//! returned as [`PulseError::GenerationUnavailable`], are not cached, and are
//! not retried here.

use chrono::Utc;
use serde::Serialize;

use crate::bm25::Bm25Index;
use crate::error::{PulseError, Result};
use crate::models::{CacheEntry, GenerationParams, MetricsWindow};
use crate::prompt;
use crate::report;
use crate::traits::{Generator, ResponseCache};

/// Default number of context documents.
pub const DEFAULT_TOP_K: usize = 4;
/// Default per-document snippet length, in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct SummarizerOptions {
    pub top_k: usize,
    pub snippet_chars: usize,
    pub params: GenerationParams,
    /// When false, skip the cache lookup; fresh results are still stored.
    pub read_cache: bool,
}

impl SummarizerOptions {
    pub fn new(params: GenerationParams) -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
            params,
            read_cache: true,
        }
    }
}

/// Inputs for one summary.
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    pub metrics: &'a MetricsWindow,
    pub focus: Option<&'a str>,
    /// `None` when no corpus is configured or it could not be loaded.
    pub index: Option<&'a Bm25Index>,
}

/// A fully assembled prompt, before any cache or generator call.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedPrompt {
    pub prompt: String,
    pub fingerprint: String,
    pub grounded: bool,
    /// Ids of the context documents, in ranked order.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    pub text: String,
    pub fingerprint: String,
    pub cache_hit: bool,
    pub grounded: bool,
    pub sources: Vec<String>,
}

pub struct Summarizer<'a> {
    generator: &'a dyn Generator,
    cache: &'a dyn ResponseCache,
    options: SummarizerOptions,
}

impl<'a> Summarizer<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        cache: &'a dyn ResponseCache,
        options: SummarizerOptions,
    ) -> Self {
        Self {
            generator,
            cache,
            options,
        }
    }

    pub fn options(&self) -> &SummarizerOptions {
        &self.options
    }

    /// Build the prompt and fingerprint without touching any collaborator.
    pub fn prepare(&self, req: &SummaryRequest<'_>) -> PreparedPrompt {
        let metrics_markdown = report::summary_markdown(req.metrics);

        let (context, sources) = match req.index {
            Some(index) if !index.is_empty() => {
                let query = prompt::retrieval_query(req.focus, &metrics_markdown);
                let hits = index.query(query, self.options.top_k);
                let sources = hits.iter().map(|h| h.document.id().to_string()).collect();
                (
                    prompt::render_context(&hits, self.options.snippet_chars),
                    sources,
                )
            }
            _ => (None, Vec::new()),
        };

        let text = prompt::build_prompt(&metrics_markdown, req.focus, context.as_deref());
        let fingerprint = prompt::fingerprint(&text, &self.options.params);
        PreparedPrompt {
            prompt: text,
            fingerprint,
            grounded: context.is_some(),
            sources,
        }
    }

    /// Produce a summary, from the cache when possible.
    pub async fn summarize(&self, req: &SummaryRequest<'_>) -> Result<SummaryOutcome> {
        let prepared = self.prepare(req);
        self.complete(prepared).await
    }

    /// Resolve an already prepared prompt through the cache and generator.
    pub async fn complete(&self, prepared: PreparedPrompt) -> Result<SummaryOutcome> {
        if self.options.read_cache {
            match self.cache.get(&prepared.fingerprint).await {
                Ok(Some(entry)) => {
                    tracing::debug!(fingerprint = %prepared.fingerprint, "summary cache hit");
                    return Ok(SummaryOutcome {
                        text: entry.response_text,
                        fingerprint: prepared.fingerprint,
                        cache_hit: true,
                        grounded: prepared.grounded,
                        sources: prepared.sources,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "cache read failed; regenerating");
                }
            }
        }

        let text = self
            .generator
            .generate(&prepared.prompt, &self.options.params)
            .await
            .map_err(|e| match e {
                PulseError::GenerationUnavailable(_) => e,
                other => PulseError::GenerationUnavailable(other.to_string()),
            })?;

        let entry = CacheEntry {
            fingerprint: prepared.fingerprint.clone(),
            response_text: text.clone(),
            model: self.options.params.model.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.cache.put(&entry).await {
            tracing::warn!(error = %e, fingerprint = %entry.fingerprint, "cache write failed");
        }

        Ok(SummaryOutcome {
            text,
            fingerprint: prepared.fingerprint,
            cache_hit: false,
            grounded: prepared.grounded,
            sources: prepared.sources,
        })
    }
}
