//! Command runners behind the `pulse` subcommands.
//!
//! Each runner wires configured collaborators into the core pipeline and
//! prints human-facing results to stdout. Fail-open paths (cache, corpus,
//! publish) log through `tracing` and never change the exit status.

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use std::path::Path;

use sprint_pulse_core::bm25::Bm25Index;
use sprint_pulse_core::cache::MemoryResponseCache;
use sprint_pulse_core::pipeline::{self, RefreshParams, RefreshResult};
use sprint_pulse_core::prompt::truncate_chars;
use sprint_pulse_core::report;
use sprint_pulse_core::summarize::{Summarizer, SummarizerOptions, SummaryRequest};
use sprint_pulse_core::traits::{IssueSource, PublishSink, ResponseCache};

use crate::cache::SqliteResponseCache;
use crate::config::Config;
use crate::connector_confluence::ConfluencePublisher;
use crate::connector_jira::JiraSource;
use crate::connector_snapshot::SnapshotSource;
use crate::corpus;
use crate::generation::{self, DisabledGenerator};

const SEARCH_SNIPPET_CHARS: usize = 200;

/// Flags for `pulse retro`.
#[derive(Debug, Clone, Default)]
pub struct RetroOptions<'a> {
    pub snapshot: Option<&'a Path>,
    pub focus: Option<&'a str>,
    pub no_cache: bool,
    pub publish: bool,
    pub dry_run: bool,
}

fn issue_source(config: &Config, snapshot: Option<&Path>) -> Result<Box<dyn IssueSource>> {
    match snapshot {
        Some(path) => Ok(Box::new(SnapshotSource::load(path)?)),
        None => Ok(Box::new(JiraSource::from_config(config)?)),
    }
}

fn refresh_params(config: &Config) -> RefreshParams {
    RefreshParams {
        board_id: config.jira.board_id.unwrap_or_default(),
        lookback: config.jira.lookback,
        mapping: config.fields.mapping(),
    }
}

async fn refresh(config: &Config, snapshot: Option<&Path>) -> Result<RefreshResult> {
    let source = issue_source(config, snapshot)?;
    let result = pipeline::refresh_metrics(source.as_ref(), &refresh_params(config)).await?;
    if result.metrics.sprints.is_empty() {
        eprintln!("Warning: no closed sprints found; metrics are empty.");
    }
    Ok(result)
}

pub async fn run_metrics(config: &Config, snapshot: Option<&Path>, json: bool) -> Result<()> {
    let result = refresh(config, snapshot).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.metrics)?);
        return Ok(());
    }

    if let Some(key) = &config.jira.project_key {
        println!("Project {}", key);
        println!();
    }
    println!("{}", report::summary_markdown(&result.metrics));
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let Some(source) = corpus::build_corpus(config)? else {
        bail!("No corpus configured. Add [corpus.filesystem] or [corpus.confluence] to the config.");
    };
    let docs = source.list_documents().await?;
    let index = Bm25Index::build(docs);
    let k = k.unwrap_or(config.retrieval.top_k);
    let hits = index.query(query, k);

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let doc = hit.document;
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            hit.score,
            doc.title().unwrap_or(doc.id())
        );
        println!("    id: {}", doc.id());
        let snippet = truncate_chars(doc.text(), SEARCH_SNIPPET_CHARS)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        println!("    > {}", snippet);
        println!();
    }
    Ok(())
}

/// Unlike `search`, a retro degrades to an ungrounded summary when the
/// corpus cannot be built.
async fn load_index(config: &Config) -> Option<Bm25Index> {
    let source = match corpus::build_corpus(config) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(error = %e, "corpus unavailable; summarizing without grounding");
            eprintln!("Warning: corpus unavailable: {:#}", e);
            return None;
        }
    };
    pipeline::load_index(source.as_deref()).await
}

pub async fn run_retro(config: &Config, opts: &RetroOptions<'_>) -> Result<()> {
    if opts.publish && !opts.dry_run && config.publish.is_none() {
        bail!("--publish requires a [publish] section in the config");
    }

    let result = refresh(config, opts.snapshot).await?;
    let index = load_index(config).await;

    let options = SummarizerOptions {
        top_k: config.retrieval.top_k,
        snippet_chars: config.retrieval.snippet_chars,
        params: config.generation.params(),
        read_cache: !opts.no_cache,
    };
    let request = SummaryRequest {
        metrics: &result.metrics,
        focus: opts.focus,
        index: index.as_ref(),
    };

    if opts.dry_run {
        let cache = MemoryResponseCache::new();
        let prepared = Summarizer::new(&DisabledGenerator, &cache, options).prepare(&request);
        println!("retro (dry-run)");
        println!("  fingerprint: {}", prepared.fingerprint);
        println!("  grounded: {}", prepared.grounded);
        if config.generation.is_enabled() {
            println!("  generation: {}", config.generation.model);
        } else {
            println!("  generation: disabled");
        }
        if !prepared.sources.is_empty() {
            println!("  sources: {}", prepared.sources.join(", "));
        }
        println!();
        println!("{}", prepared.prompt);
        return Ok(());
    }

    let metrics_markdown = report::summary_markdown(&result.metrics);
    println!("{}", metrics_markdown);
    println!();

    let generator = generation::create_generator(&config.generation)?;
    let sqlite = match SqliteResponseCache::open(config).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config.cache.path.display(),
                "response cache unavailable; continuing without cache"
            );
            eprintln!("Warning: response cache unavailable: {:#}", e);
            None
        }
    };
    let memory = MemoryResponseCache::new();
    let cache: &dyn ResponseCache = match &sqlite {
        Some(cache) => cache,
        None => &memory,
    };
    let outcome = Summarizer::new(generator.as_ref(), cache, options)
        .summarize(&request)
        .await;
    if let Some(cache) = sqlite {
        cache.close().await;
    }
    let outcome = outcome?;

    println!("{}", outcome.text);
    println!();
    println!(
        "fingerprint: {} ({})",
        outcome.fingerprint,
        if outcome.cache_hit { "cached" } else { "generated" }
    );
    if !outcome.grounded {
        println!("grounding: none");
    } else {
        println!("grounding: {}", outcome.sources.join(", "));
    }

    if opts.publish {
        publish(config, &result, &metrics_markdown, &outcome.text).await;
    }
    Ok(())
}

/// Publish failures are reported but never fail the command.
async fn publish(config: &Config, result: &RefreshResult, metrics_markdown: &str, summary: &str) {
    let Some(publish_cfg) = &config.publish else {
        return;
    };
    let sprint_label = result
        .metrics
        .sprints
        .last()
        .map(|s| s.sprint_name.clone())
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    let title = format!("{} - {}", publish_cfg.title_prefix, sprint_label);
    let body = format!("{}\n\n{}", metrics_markdown, summary);

    let outcome = match config.confluence_base(publish_cfg.server.as_deref()) {
        Some(base) => match ConfluencePublisher::new(&base, publish_cfg.parent_page_id.clone()) {
            Ok(sink) => sink
                .publish(&publish_cfg.space, &title, &body)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        },
        None => Err(anyhow::anyhow!("publish.server must be set when jira.server is not")),
    };

    match outcome {
        Ok(location) => println!("published: {}", location),
        Err(e) => {
            tracing::warn!(error = %e, title = %title, "publish failed");
            eprintln!("Warning: publish failed: {:#}", e);
        }
    }
}

pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let cache = SqliteResponseCache::open(config).await?;
    let stats = cache.stats().await?;
    cache.close().await;

    let fmt_ts = |ts: Option<i64>| {
        ts.and_then(|t| Utc.timestamp_opt(t, 0).single())
            .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("cache: {}", config.cache.path.display());
    println!("  entries: {}", stats.entries);
    for (model, n) in &stats.by_model {
        println!("    {}: {}", model, n);
    }
    println!("  oldest: {}", fmt_ts(stats.oldest));
    println!("  newest: {}", fmt_ts(stats.newest));
    Ok(())
}

pub async fn run_cache_clear(config: &Config) -> Result<()> {
    let cache = SqliteResponseCache::open(config).await?;
    let removed = cache.clear().await?;
    cache.close().await;
    println!("cache cleared: {} entries removed", removed);
    Ok(())
}
