//! # Sprint Pulse Core
//!
//! Pure logic for Sprint Pulse: sprint data normalization, delivery metrics,
//! BM25 retrieval, prompt assembly, and the cached retrospective summarizer.
//!
//! This crate contains no network, database, or filesystem access. Every
//! external system (issue tracker, document corpus, generation service,
//! response cache, publish sink) is reached through the traits in
//! [`traits`], so the whole pipeline can run against in-memory fakes.
//!
//! ```text
//! IssueSource ──▶ normalize ──▶ metrics ──┐
//!                                         ├──▶ summarize ──▶ Generator
//! DocumentSource ──▶ bm25 ────────────────┘        │
//!                                             ResponseCache
//! ```

pub mod bm25;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod summarize;
pub mod traits;

pub use error::{PulseError, Result};
