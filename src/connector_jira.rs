//! Jira issue source.
//!
//! Reads closed sprints from the agile board API and the issues of each
//! sprint from the agile sprint-issue API, falling back to a JQL search
//! when the agile endpoint is not available (older servers, boards without
//! agile permissions). The greenhopper sprint report, when the server
//! exposes it, supplies the commit snapshot: which issues were added after
//! the sprint started and which were removed before it closed.
//!
//! Credentials come from `JIRA_EMAIL` / `JIRA_API_TOKEN`. Every transport
//! or HTTP failure maps to [`PulseError::SourceUnavailable`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

use sprint_pulse_core::models::SprintRecord;
use sprint_pulse_core::normalize::{parse_sprint, FieldMapping, RawSprintIssues};
use sprint_pulse_core::traits::IssueSource;
use sprint_pulse_core::PulseError;

use crate::config::Config;

const PAGE_SIZE: usize = 50;
const ISSUE_PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Status transitions feed reopen and blocked-time metrics.
const ISSUE_EXPAND: &str = "changelog";

/// Fields always requested alongside the mapped story-point and sprint ids.
const BASE_FIELDS: &[&str] = &[
    "summary",
    "status",
    "issuetype",
    "assignee",
    "created",
    "resolutiondate",
];

pub struct JiraSource {
    base_url: String,
    email: String,
    token: String,
    board_id: u64,
    project_key: Option<String>,
    client: reqwest::Client,
}

fn unavailable(e: impl std::fmt::Display) -> PulseError {
    PulseError::SourceUnavailable(e.to_string())
}

impl JiraSource {
    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(server) = config.jira.server.as_deref() else {
            bail!("jira.server must be set (or pass --snapshot)");
        };
        let Some(board_id) = config.jira.board_id else {
            bail!("jira.board_id must be set (or pass --snapshot)");
        };
        let email = std::env::var("JIRA_EMAIL")
            .map_err(|_| anyhow::anyhow!("JIRA_EMAIL environment variable not set"))?;
        let token = std::env::var("JIRA_API_TOKEN")
            .map_err(|_| anyhow::anyhow!("JIRA_API_TOKEN environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url: server.trim_end_matches('/').to_string(),
            email,
            token,
            board_id,
            project_key: config.jira.project_key.clone(),
            client,
        })
    }

    /// GET a JSON document. `Ok(None)` means the endpoint does not exist on
    /// this server (404), which callers treat as "fall back".
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> sprint_pulse_core::Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(&self.token))
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PulseError::SourceUnavailable(format!(
                "GET {} returned {}: {}",
                path,
                status,
                truncate(&body, 200)
            )));
        }
        resp.json::<Value>().await.map(Some).map_err(unavailable)
    }

    async fn agile_sprint_issues(
        &self,
        sprint_id: u64,
        fields: &str,
    ) -> sprint_pulse_core::Result<Option<Vec<Value>>> {
        let path = format!("/rest/agile/1.0/sprint/{}/issue", sprint_id);
        self.paged_issues(&path, &[("fields", fields.to_string())])
            .await
    }

    async fn search_sprint_issues(
        &self,
        sprint_id: u64,
        fields: &str,
    ) -> sprint_pulse_core::Result<Vec<Value>> {
        let jql = match &self.project_key {
            Some(key) => format!("project = \"{}\" AND sprint = {}", key, sprint_id),
            None => format!("sprint = {}", sprint_id),
        };
        let issues = self
            .paged_issues(
                "/rest/api/2/search",
                &[("jql", jql), ("fields", fields.to_string())],
            )
            .await?;
        issues.ok_or_else(|| {
            PulseError::SourceUnavailable(format!(
                "no issue endpoint available for sprint {}",
                sprint_id
            ))
        })
    }

    /// Walk a `startAt`/`maxResults`/`total` paged issue listing.
    async fn paged_issues(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> sprint_pulse_core::Result<Option<Vec<Value>>> {
        let mut issues = Vec::new();
        let mut start_at = 0usize;
        loop {
            let query = issue_page_query(extra, start_at);
            let Some(page) = self.get_json(path, &query).await? else {
                return Ok(None);
            };
            let batch = page
                .get("issues")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let total = page.get("total").and_then(Value::as_u64).unwrap_or(0) as usize;
            let fetched = batch.len();
            issues.extend(batch);
            start_at += fetched;
            if fetched == 0 || start_at >= total {
                break;
            }
        }
        Ok(Some(issues))
    }

    /// Build the commit snapshot from the sprint report.
    ///
    /// Issues at close minus those added mid-sprint, plus the issues punted
    /// out of the sprint. Returns `None` when the report is unavailable.
    async fn commit_snapshot(
        &self,
        sprint_id: u64,
        issues: &[Value],
        mapping: &FieldMapping,
    ) -> Option<Vec<Value>> {
        let query = [
            ("rapidViewId", self.board_id.to_string()),
            ("sprintId", sprint_id.to_string()),
        ];
        let report = match self
            .get_json("/rest/greenhopper/1.0/rapid/charts/sprintreport", &query)
            .await
        {
            Ok(Some(report)) => report,
            Ok(None) => {
                tracing::debug!(sprint_id, "sprint report not available; no scope change data");
                return None;
            }
            Err(e) => {
                tracing::warn!(sprint_id, error = %e, "sprint report failed; no scope change data");
                return None;
            }
        };
        let contents = report.get("contents")?;
        Some(snapshot_from_report(contents, sprint_id, issues, mapping))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Query for one page of an issue listing, with the changelog expanded.
fn issue_page_query<'a>(extra: &[(&'a str, String)], start_at: usize) -> Vec<(&'a str, String)> {
    let mut query = extra.to_vec();
    query.push(("expand", ISSUE_EXPAND.to_string()));
    query.push(("startAt", start_at.to_string()));
    query.push(("maxResults", ISSUE_PAGE_SIZE.to_string()));
    query
}

/// Derive the sprint-start issue set from a sprint report's `contents`.
pub fn snapshot_from_report(
    contents: &Value,
    sprint_id: u64,
    issues: &[Value],
    mapping: &FieldMapping,
) -> Vec<Value> {
    let added: HashSet<&str> = contents
        .get("issueKeysAddedDuringSprint")
        .and_then(Value::as_object)
        .map(|m| m.keys().map(String::as_str).collect())
        .unwrap_or_default();

    let mut snapshot: Vec<Value> = issues
        .iter()
        .filter(|i| {
            i.get("key")
                .and_then(Value::as_str)
                .is_some_and(|k| !added.contains(k))
        })
        .cloned()
        .collect();

    let punted = contents
        .get("puntedIssues")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    for entry in punted {
        let Some(key) = entry.get("key").and_then(Value::as_str) else {
            continue;
        };
        // Issues added and removed within the sprint were never committed.
        if added.contains(key) {
            continue;
        }
        snapshot.push(report_entry_to_issue(entry, key, sprint_id, mapping));
    }
    snapshot
}

/// Reshape a sprint-report entry into the issue shape the normalizer reads.
fn report_entry_to_issue(
    entry: &Value,
    key: &str,
    sprint_id: u64,
    mapping: &FieldMapping,
) -> Value {
    let estimate = entry
        .pointer("/estimateStatistic/statFieldValue/value")
        .cloned()
        .unwrap_or(Value::Null);
    let status = entry
        .pointer("/status/name")
        .or_else(|| entry.get("statusName"))
        .cloned()
        .unwrap_or(Value::Null);

    let mut fields = serde_json::Map::new();
    fields.insert("summary".into(), entry.get("summary").cloned().unwrap_or(Value::Null));
    fields.insert("status".into(), json!({ "name": status }));
    if let Some(id) = mapping.story_points.first() {
        fields.insert(id.clone(), estimate);
    }
    if let Some(id) = mapping.sprint.first() {
        fields.insert(id.clone(), json!([{ "id": sprint_id }]));
    }
    json!({ "key": key, "fields": Value::Object(fields) })
}

#[async_trait]
impl IssueSource for JiraSource {
    async fn fetch_closed_sprints(
        &self,
        board_id: u64,
        count: usize,
    ) -> sprint_pulse_core::Result<Vec<SprintRecord>> {
        let path = format!("/rest/agile/1.0/board/{}/sprint", board_id);
        let mut sprints = Vec::new();
        let mut start_at = 0usize;
        loop {
            let query = [
                ("state", "closed".to_string()),
                ("startAt", start_at.to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            let page = self.get_json(&path, &query).await?.ok_or_else(|| {
                PulseError::SourceUnavailable(format!("board {} not found", board_id))
            })?;
            let values = page
                .get("values")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            sprints.extend(values.iter().filter_map(parse_sprint));
            start_at += values.len();
            let is_last = page.get("isLast").and_then(Value::as_bool).unwrap_or(true);
            if is_last || values.is_empty() {
                break;
            }
        }
        tracing::debug!(board_id, closed = sprints.len(), wanted = count, "listed closed sprints");
        Ok(sprints)
    }

    async fn fetch_issues(
        &self,
        sprint_id: u64,
        mapping: &FieldMapping,
    ) -> sprint_pulse_core::Result<RawSprintIssues> {
        let mut fields: Vec<&str> = BASE_FIELDS.to_vec();
        fields.extend(mapping.field_ids());
        let fields = fields.join(",");

        let issues = match self.agile_sprint_issues(sprint_id, &fields).await? {
            Some(issues) => issues,
            None => {
                tracing::debug!(sprint_id, "agile issue endpoint unavailable; using JQL search");
                self.search_sprint_issues(sprint_id, &fields).await?
            }
        };
        let commit_snapshot = self.commit_snapshot(sprint_id, &issues, mapping).await;

        Ok(RawSprintIssues {
            sprint_id,
            issues,
            commit_snapshot,
        })
    }
}
