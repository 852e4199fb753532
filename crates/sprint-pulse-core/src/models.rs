//! Core data models used throughout Sprint Pulse.
//!
//! Sprint and issue records are produced by [`normalize`](crate::normalize)
//! and read by [`metrics`](crate::metrics); the metric types are rebuilt on
//! every refresh and never mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a sprint on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
    Future,
    Active,
    Closed,
}

impl SprintState {
    /// Parse a tracker state label (`"closed"`, `"ACTIVE"`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "future" => Some(Self::Future),
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A time-boxed iteration. Immutable once closed; identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub id: u64,
    pub name: String,
    pub state: SprintState,
    pub start_date: Option<DateTime<Utc>>,
    /// `None` until the sprint closes.
    pub end_date: Option<DateTime<Utc>>,
}

/// Coarse workflow position of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Todo,
    InProgress,
    Done,
}

/// One status change from the issue changelog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub at: DateTime<Utc>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// `to` is one of the mapping's done statuses.
    pub to_done: bool,
}

/// Canonical issue record produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub key: String,
    pub summary: Option<String>,
    pub issue_type: Option<String>,
    pub assignee: Option<String>,
    /// Sprint this record was partitioned under, or the most recent sprint
    /// the issue lists when the partition sprint is absent from its history.
    pub sprint_id: Option<u64>,
    /// Every sprint id found in the issue's sprint field.
    pub sprint_ids: Vec<u64>,
    /// `None` when unestimated or unmappable. Never coerced to zero.
    pub story_points: Option<f64>,
    pub status_category: StatusCategory,
    pub created: Option<DateTime<Utc>>,
    pub resolution_date: Option<DateTime<Utc>>,
    pub added_during_sprint: bool,
    /// Status transitions ordered by time; empty when the payload carries
    /// no changelog.
    #[serde(default)]
    pub status_history: Vec<StatusTransition>,
}

/// One closed sprint with the issues it ended with and the committed issues
/// that left it before close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintIssues {
    pub sprint: SprintRecord,
    pub issues: Vec<IssueRecord>,
    pub removed: Vec<IssueRecord>,
}

/// The lookback window, ordered oldest to newest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedWindow {
    pub sprints: Vec<SprintIssues>,
}

impl NormalizedWindow {
    pub fn issue_count(&self) -> usize {
        self.sprints.iter().map(|s| s.issues.len()).sum()
    }
}

/// Summary statistics over a set of durations, in days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` with fewer than two samples.
    pub std_dev: Option<f64>,
}

/// Delivery metrics for a single sprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintMetrics {
    pub sprint_id: u64,
    pub sprint_name: String,
    pub committed_points: f64,
    pub completed_points: f64,
    pub added_points: f64,
    pub removed_points: f64,
    pub velocity: f64,
    pub completion_rate: f64,
    /// Number of issues done at sprint close.
    pub throughput: usize,
    /// Done issues that left a done status at some point in their history.
    pub reopened: usize,
    /// `reopened / throughput`, `0` when nothing was done.
    pub reopen_rate: f64,
    /// Mean days spent in a blocked status, over issues that were blocked.
    pub blocked_days_avg: Option<f64>,
    pub cycle_time_stats: Option<DurationStats>,
    pub lead_time_stats: Option<DurationStats>,
}

/// An issue ranked by time spent blocked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedIssue {
    pub key: String,
    pub sprint_id: u64,
    pub blocked_days: f64,
}

/// Aggregates across the whole lookback window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub sprint_count: usize,
    pub avg_velocity: f64,
    pub avg_completion_rate: f64,
    pub total_throughput: usize,
    pub total_committed: f64,
    pub total_added: f64,
    pub total_removed: f64,
    /// Reopened over done issues across the whole window.
    pub reopen_rate: f64,
    pub avg_blocked_days: Option<f64>,
    /// Most-blocked issues, longest first.
    pub top_blocked: Vec<BlockedIssue>,
    pub cycle_time: Option<DurationStats>,
    pub lead_time: Option<DurationStats>,
}

/// Per-sprint metrics plus trend series, ready for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsWindow {
    pub sprints: Vec<SprintMetrics>,
    /// Trailing moving average of velocity, one point per sprint.
    pub velocity_trend: Vec<f64>,
    /// Trailing moving average of completion rate, one point per sprint.
    pub completion_trend: Vec<f64>,
    pub summary: WindowSummary,
}

/// A document as delivered by a corpus collaborator, before indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub title: Option<String>,
    pub text: String,
}

/// Parameters that influence generation output; part of the cache key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// A cached generation result. Created once on a miss, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub response_text: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}
