//! Configuration parsing and validation.
//!
//! The `pulse` binary reads a single TOML file (default
//! `./config/pulse.toml`). Every section except `[cache]` is optional and
//! falls back to the defaults below. Credentials are never read from the
//! file; connectors pull them from the environment when they are built.
//!
//! ```toml
//! [cache]
//! path = "./data/pulse.sqlite"
//!
//! [jira]
//! server = "https://example.atlassian.net"
//! board_id = 42
//! lookback = 5
//!
//! [generation]
//! provider = "openai"
//!
//! [corpus.filesystem]
//! root = "./docs/retros"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use sprint_pulse_core::models::GenerationParams;
use sprint_pulse_core::normalize::FieldMapping;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub publish: Option<PublishConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JiraConfig {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub board_id: Option<u64>,
    /// Only used to label output; sprints are always read from the board.
    #[serde(default)]
    pub project_key: Option<String>,
    #[serde(default = "default_lookback")]
    pub lookback: usize,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            server: None,
            board_id: None,
            project_key: None,
            lookback: default_lookback(),
        }
    }
}

fn default_lookback() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldsConfig {
    #[serde(default = "default_story_points")]
    pub story_points: String,
    #[serde(default = "default_story_points_fallbacks")]
    pub story_points_fallbacks: Vec<String>,
    #[serde(default = "default_sprint")]
    pub sprint: String,
    #[serde(default = "default_sprint_fallbacks")]
    pub sprint_fallbacks: Vec<String>,
    #[serde(default = "default_done_statuses")]
    pub done_statuses: Vec<String>,
    #[serde(default = "default_in_progress_statuses")]
    pub in_progress_statuses: Vec<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            story_points: default_story_points(),
            story_points_fallbacks: default_story_points_fallbacks(),
            sprint: default_sprint(),
            sprint_fallbacks: default_sprint_fallbacks(),
            done_statuses: default_done_statuses(),
            in_progress_statuses: default_in_progress_statuses(),
        }
    }
}

fn default_story_points() -> String {
    "customfield_10016".to_string()
}
fn default_story_points_fallbacks() -> Vec<String> {
    vec!["story_points".to_string(), "customfield_10002".to_string()]
}
fn default_sprint() -> String {
    "customfield_10007".to_string()
}
fn default_sprint_fallbacks() -> Vec<String> {
    vec!["customfield_10020".to_string(), "sprint".to_string()]
}
fn default_done_statuses() -> Vec<String> {
    vec![
        "Done".to_string(),
        "Closed".to_string(),
        "Resolved".to_string(),
    ]
}
fn default_in_progress_statuses() -> Vec<String> {
    vec!["In Progress".to_string()]
}

impl FieldsConfig {
    /// Primary field id first, then the fallbacks, in the order configured.
    pub fn mapping(&self) -> FieldMapping {
        let mut story_points = vec![self.story_points.clone()];
        story_points.extend(self.story_points_fallbacks.iter().cloned());
        let mut sprint = vec![self.sprint.clone()];
        sprint.extend(self.sprint_fallbacks.iter().cloned());
        FieldMapping {
            story_points,
            sprint,
            done_statuses: self.done_statuses.clone(),
            in_progress_statuses: self.in_progress_statuses.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Upper bound on pages pulled from a Confluence space.
    #[serde(default = "default_limit_pages")]
    pub limit_pages: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            limit_pages: default_limit_pages(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_limit_pages() -> usize {
    200
}
fn default_snippet_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    800
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CorpusConfig {
    pub filesystem: Option<FilesystemCorpusConfig>,
    pub confluence: Option<ConfluenceCorpusConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemCorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfluenceCorpusConfig {
    /// Defaults to `<jira.server>/wiki` when omitted.
    #[serde(default)]
    pub server: Option<String>,
    pub space: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    /// Defaults to `<jira.server>/wiki` when omitted.
    #[serde(default)]
    pub server: Option<String>,
    pub space: String,
    #[serde(default)]
    pub parent_page_id: Option<String>,
    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,
}

fn default_title_prefix() -> String {
    "Sprint Retrospective".to_string()
}

impl Config {
    /// Confluence base URL: the explicit one, else the Jira site's `/wiki`.
    pub fn confluence_base(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(|s| s.trim_end_matches('/').to_string())
            .or_else(|| {
                self.jira
                    .server
                    .as_deref()
                    .map(|s| format!("{}/wiki", s.trim_end_matches('/')))
            })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.jira.lookback == 0 {
        anyhow::bail!("jira.lookback must be >= 1");
    }

    if !(1..=50).contains(&config.retrieval.top_k) {
        anyhow::bail!("retrieval.top_k must be in [1, 50]");
    }
    if config.retrieval.snippet_chars == 0 {
        anyhow::bail!("retrieval.snippet_chars must be > 0");
    }
    if config.retrieval.limit_pages == 0 {
        anyhow::bail!("retrieval.limit_pages must be > 0");
    }

    if config.fields.story_points.trim().is_empty() {
        anyhow::bail!("fields.story_points must not be empty");
    }
    if config.fields.sprint.trim().is_empty() {
        anyhow::bail!("fields.sprint must not be empty");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.max_tokens == 0 {
        anyhow::bail!("generation.max_tokens must be > 0");
    }
    if config.generation.timeout_secs == 0 {
        anyhow::bail!("generation.timeout_secs must be > 0");
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if let Some(confluence) = &config.corpus.confluence {
        if confluence.space.trim().is_empty() {
            anyhow::bail!("corpus.confluence.space must not be empty");
        }
        if config.confluence_base(confluence.server.as_deref()).is_none() {
            anyhow::bail!("corpus.confluence.server must be set when jira.server is not");
        }
    }

    if let Some(publish) = &config.publish {
        if publish.space.trim().is_empty() {
            anyhow::bail!("publish.space must not be empty");
        }
    }

    Ok(config)
}
