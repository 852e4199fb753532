//! # Sprint Pulse
//!
//! Sprint delivery metrics and retrieval-grounded retrospectives.
//!
//! This crate is the application shell around
//! [`sprint_pulse_core`]: it reads configuration, talks to Jira and
//! Confluence, stores generated summaries in SQLite, and exposes all of it
//! through the `pulse` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ Issue source │──▶│ normalize+metrics │──▶│ Markdown report│
//! │ Jira/snapshot│   └──────────────────┘   └───────┬───────┘
//! └──────────────┘                                  ▼
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ Corpus       │──▶│    BM25 index    │──▶│  Summarizer   │──▶ Confluence
//! │ FS/Confluence│   └──────────────────┘   │ cache+generate│
//! └──────────────┘                          └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pulse init                              # create the response cache
//! pulse metrics --snapshot sprints.json   # offline metrics
//! pulse search "carry-over"               # query the corpus
//! pulse retro --focus "scope churn"       # grounded retrospective
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`cache`] | SQLite response cache |
//! | [`connector_jira`] | Jira issue source |
//! | [`connector_snapshot`] | JSON snapshot issue source |
//! | [`connector_fs`] | Filesystem corpus |
//! | [`connector_confluence`] | Confluence corpus and publishing |
//! | [`corpus`] | Corpus selection |
//! | [`generation`] | Generation providers |
//! | [`refresh`] | CLI command runners |

pub mod cache;
pub mod config;
pub mod connector_confluence;
pub mod connector_fs;
pub mod connector_jira;
pub mod connector_snapshot;
pub mod corpus;
pub mod db;
pub mod generation;
pub mod migrate;
pub mod refresh;
