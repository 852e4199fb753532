//! Library-level tests: snapshot source → metrics → summarizer with the
//! SQLite response cache, without going through the CLI.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use sprint_pulse::cache::SqliteResponseCache;
use sprint_pulse::config::{Config, FilesystemCorpusConfig};
use sprint_pulse::connector_fs::FilesystemCorpus;
use sprint_pulse::connector_snapshot::{SnapshotFile, SnapshotSource};
use sprint_pulse_core::models::{CacheEntry, GenerationParams};
use sprint_pulse_core::pipeline::{self, RefreshParams};
use sprint_pulse_core::summarize::{Summarizer, SummarizerOptions, SummaryRequest};
use sprint_pulse_core::traits::{DocumentSource, Generator, ResponseCache};
use sprint_pulse_core::PulseError;

struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        params: &GenerationParams,
    ) -> sprint_pulse_core::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("## Retro {} from {}", n, params.model))
    }
}

fn test_config(tmp: &TempDir) -> Config {
    let toml_text = format!(
        "[cache]\npath = \"{}\"\n",
        tmp.path().join("cache/pulse.sqlite").display()
    );
    toml::from_str(&toml_text).unwrap()
}

fn snapshot() -> SnapshotSource {
    let data: SnapshotFile = serde_json::from_value(json!({
        "sprints": [
            {"id": 1, "name": "S1", "state": "closed", "startDate": "2024-01-01", "endDate": "2024-01-14"},
            {"id": 2, "name": "S2", "state": "closed", "startDate": "2024-01-15", "endDate": "2024-01-28"},
            {"id": 3, "name": "S3", "state": "active", "startDate": "2024-01-29"}
        ],
        "issues": {
            "1": [
                {"key": "P-1", "fields": {"customfield_10016": 3, "customfield_10007": [{"id": 1}],
                  "status": {"statusCategory": {"key": "done"}}, "resolutiondate": "2024-01-04"}},
                {"key": "P-2", "fields": {"customfield_10016": null, "customfield_10007": [{"id": 1}],
                  "status": {"statusCategory": {"key": "done"}}, "resolutiondate": "2024-01-06"}}
            ],
            "2": [
                {"key": "P-3", "fields": {"customfield_10016": 5, "customfield_10007": [{"id": 1}, {"id": 2}],
                  "status": {"statusCategory": {"key": "new"}}}}
            ]
        }
    }))
    .unwrap();
    SnapshotSource::from_file(data)
}

fn params() -> RefreshParams {
    RefreshParams {
        board_id: 0,
        lookback: 5,
        mapping: sprint_pulse::config::FieldsConfig::default().mapping(),
    }
}

#[tokio::test]
async fn test_snapshot_refresh_computes_window() {
    let result = pipeline::refresh_metrics(&snapshot(), &params()).await.unwrap();
    let m = &result.metrics;

    assert_eq!(m.sprints.len(), 2, "active sprint excluded");
    assert_eq!(m.sprints[0].sprint_id, 1);
    // Null story points count toward throughput but not velocity.
    assert_eq!(m.sprints[0].velocity, 3.0);
    assert_eq!(m.sprints[0].throughput, 2);
    assert_eq!(m.sprints[0].completion_rate, 1.0);
    // Carried-over issue: listed in both sprints, belongs to S2 here.
    assert_eq!(result.window.sprints[1].issues[0].sprint_id, Some(2));
    assert_eq!(m.sprints[1].completion_rate, 0.0);
    assert_eq!(m.velocity_trend, vec![3.0, 1.5]);
}

#[tokio::test]
async fn test_sqlite_cache_round_trip_and_first_write_wins() {
    let tmp = TempDir::new().unwrap();
    let cache = SqliteResponseCache::open(&test_config(&tmp)).await.unwrap();

    assert!(cache.get("abc").await.unwrap().is_none());

    let entry = |text: &str| CacheEntry {
        fingerprint: "abc".to_string(),
        response_text: text.to_string(),
        model: "m".to_string(),
        created_at: chrono::Utc::now(),
    };
    cache.put(&entry("first")).await.unwrap();
    cache.put(&entry("second")).await.unwrap();

    let got = cache.get("abc").await.unwrap().unwrap();
    assert_eq!(got.response_text, "first");
    assert_eq!(got.model, "m");

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.by_model, vec![("m".to_string(), 1)]);

    assert_eq!(cache.clear().await.unwrap(), 1);
    assert!(cache.get("abc").await.unwrap().is_none());
}

#[tokio::test]
async fn test_summary_cached_across_cache_instances() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let generator = CountingGenerator {
        calls: AtomicUsize::new(0),
    };

    let notes = tmp.path().join("notes");
    std::fs::create_dir_all(&notes).unwrap();
    std::fs::write(notes.join("retro.md"), "# Past retro\nCarry-over hurt velocity").unwrap();
    let corpus = FilesystemCorpus::new(&FilesystemCorpusConfig {
        root: notes,
        include_globs: vec!["**/*.md".to_string()],
        exclude_globs: Vec::new(),
    })
    .unwrap();

    let result = pipeline::refresh_metrics(&snapshot(), &params()).await.unwrap();
    let index = pipeline::load_index(Some(&corpus as &dyn DocumentSource)).await;
    assert!(index.is_some());

    let request = SummaryRequest {
        metrics: &result.metrics,
        focus: Some("carry-over"),
        index: index.as_ref(),
    };
    let options = SummarizerOptions::new(GenerationParams {
        model: "gpt-4o-mini".into(),
        temperature: Some(0.3),
        max_tokens: Some(800),
    });

    let first = {
        let cache = SqliteResponseCache::open(&config).await.unwrap();
        let out = Summarizer::new(&generator, &cache, options.clone())
            .summarize(&request)
            .await
            .unwrap();
        cache.close().await;
        out
    };
    assert!(!first.cache_hit);
    assert!(first.grounded);
    assert_eq!(first.sources, vec!["retro.md"]);

    let cache = SqliteResponseCache::open(&config).await.unwrap();
    let second = Summarizer::new(&generator, &cache, options)
        .summarize(&request)
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.text, first.text);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_mapping_field_aborts_refresh() {
    let data: SnapshotFile = serde_json::from_value(json!({
        "sprints": [{"id": 1, "name": "S1", "state": "closed", "endDate": "2024-01-14"}],
        "issues": {"1": [{"key": "P-1", "fields": {"points": 3, "customfield_10007": [{"id": 1}]}}]}
    }))
    .unwrap();
    let err = pipeline::refresh_metrics(&SnapshotSource::from_file(data), &params())
        .await
        .unwrap_err();
    assert!(matches!(err, PulseError::DataMapping(_)));
}

#[tokio::test]
async fn test_snapshot_changelog_drives_reopen_and_blocked_metrics() {
    let history = |at: &str, from: &str, to: &str| {
        json!({"created": at, "items": [{"field": "status", "fromString": from, "toString": to}]})
    };
    let data: SnapshotFile = serde_json::from_value(json!({
        "sprints": [{"id": 1, "name": "S1", "state": "closed",
                     "startDate": "2024-01-01", "endDate": "2024-01-14"}],
        "issues": {"1": [
            {"key": "P-1",
             "fields": {"customfield_10016": 3, "customfield_10007": [{"id": 1}],
                        "status": {"name": "Done"}, "resolutiondate": "2024-01-10"},
             "changelog": {"histories": [
                 history("2024-01-02T00:00:00.000+0000", "To Do", "Blocked"),
                 history("2024-01-04T00:00:00.000+0000", "Blocked", "Done"),
                 history("2024-01-05T00:00:00.000+0000", "Done", "In Progress"),
                 history("2024-01-09T00:00:00.000+0000", "In Progress", "Done")
             ]}},
            {"key": "P-2",
             "fields": {"customfield_10016": 2, "customfield_10007": [{"id": 1}],
                        "status": {"name": "Done"}, "resolutiondate": "2024-01-06"}}
        ]}
    }))
    .unwrap();

    let result = pipeline::refresh_metrics(&SnapshotSource::from_file(data), &params())
        .await
        .unwrap();
    let sprint = &result.metrics.sprints[0];
    assert_eq!(sprint.throughput, 2);
    assert_eq!(sprint.reopened, 1);
    assert_eq!(sprint.reopen_rate, 0.5);
    assert_eq!(sprint.blocked_days_avg, Some(2.0));

    let summary = &result.metrics.summary;
    assert_eq!(summary.top_blocked.len(), 1);
    assert_eq!(summary.top_blocked[0].key, "P-1");
    let text = sprint_pulse_core::report::summary_markdown(&result.metrics);
    assert!(text.contains("- **Reopen rate**: 50.0%"), "{}", text);
    assert!(text.contains("reopen churn"), "{}", text);
    assert!(text.contains("blockers"), "{}", text);
}
