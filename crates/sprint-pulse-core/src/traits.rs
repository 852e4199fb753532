//! Collaborator contracts.
//!
//! The core never talks to a network, disk, or database directly. Each
//! external system is one trait here; the application crate supplies the
//! real implementations and tests supply in-memory ones.
//!
//! | Trait | External system |
//! |-------|-----------------|
//! | [`IssueSource`] | issue tracker (sprints and issues) |
//! | [`DocumentSource`] | context document corpus |
//! | [`Generator`] | text generation service |
//! | [`ResponseCache`] | durable fingerprint → response store |
//! | [`PublishSink`] | destination for finished summaries |
//!
//! Implementations report failures with the matching [`PulseError`]
//! variant: `SourceUnavailable` for trackers and corpora,
//! `GenerationUnavailable` for generation, `Cache` for the cache, and
//! `Publish` for sinks. Transport fallbacks (for example an alternate API
//! when the preferred one is missing) stay inside the implementation.
//!
//! [`PulseError`]: crate::error::PulseError

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CacheEntry, CorpusDocument, GenerationParams, SprintRecord};
use crate::normalize::{FieldMapping, RawSprintIssues};

/// Source of sprint and issue data for a board.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Closed sprints of the board, at least the most recent `count` when
    /// that many exist. Ordering is not significant.
    async fn fetch_closed_sprints(&self, board_id: u64, count: usize)
        -> Result<Vec<SprintRecord>>;

    /// Raw issue payloads for one sprint. `mapping` names the fields the
    /// normalizer will read, so sources that select fields can request them.
    async fn fetch_issues(&self, sprint_id: u64, mapping: &FieldMapping)
        -> Result<RawSprintIssues>;
}

/// A corpus of context documents, scoped at construction (space, directory).
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label for logs and output (e.g. `"confluence:TEAM"`).
    fn name(&self) -> &str;

    async fn list_documents(&self) -> Result<Vec<CorpusDocument>>;
}

/// Text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Append-only store of generated responses keyed by fingerprint.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>>;

    /// Store `entry` unless its fingerprint is already present. Existing
    /// entries are never overwritten.
    async fn put(&self, entry: &CacheEntry) -> Result<()>;
}

/// Destination for a finished summary. Returns a locator for the published
/// page (URL or id).
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, space: &str, title: &str, body: &str) -> Result<String>;
}
