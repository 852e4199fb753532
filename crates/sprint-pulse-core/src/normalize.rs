//! Sprint data normalizer.
//!
//! Converts raw tracker payloads (JSON objects whose field ids depend on the
//! tracker configuration) into canonical [`SprintRecord`]s and
//! [`IssueRecord`]s partitioned by sprint.
//!
//! Field lookups go through a [`FieldMapping`] resolved once per run: each
//! logical field has a primary id followed by fallbacks, tried in that fixed
//! order for every issue. If a logical field matches no issue at all the
//! mapping is wrong, and the run fails with [`PulseError::DataMapping`]
//! instead of silently producing empty metrics.
//!
//! Missing or unparseable story points become `None`, never `0.0`.
//!
//! When the payload carries an expanded changelog, its status items become
//! the issue's [`StatusTransition`] history, ordered by time.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{PulseError, Result};
use crate::models::{
    IssueRecord, NormalizedWindow, SprintIssues, SprintRecord, SprintState, StatusCategory,
    StatusTransition,
};

/// Field ids for the tracker-specific parts of an issue payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    /// Story point field ids in priority order.
    pub story_points: Vec<String>,
    /// Sprint field ids in priority order.
    pub sprint: Vec<String>,
    /// Status names treated as done when no status category is present.
    pub done_statuses: Vec<String>,
    /// Status names treated as in progress when no status category is present.
    pub in_progress_statuses: Vec<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            story_points: vec!["customfield_10016".to_string()],
            sprint: vec!["customfield_10007".to_string()],
            done_statuses: vec![
                "Done".to_string(),
                "Closed".to_string(),
                "Resolved".to_string(),
            ],
            in_progress_statuses: vec!["In Progress".to_string()],
        }
    }
}

impl FieldMapping {
    /// Every field id the mapping may read, for collaborators that must
    /// request fields explicitly.
    pub fn field_ids(&self) -> Vec<&str> {
        self.story_points
            .iter()
            .chain(self.sprint.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Raw issue payloads for one sprint, as returned by an issue source.
#[derive(Debug, Clone, Default)]
pub struct RawSprintIssues {
    pub sprint_id: u64,
    /// Issues in the sprint at close.
    pub issues: Vec<Value>,
    /// Issues in the sprint at its start, when the source can provide them.
    pub commit_snapshot: Option<Vec<Value>>,
}

/// Parse a raw sprint object (`id`, `name`, `state`, `startDate`,
/// `endDate`/`completeDate`). Returns `None` without a usable id or state.
pub fn parse_sprint(raw: &Value) -> Option<SprintRecord> {
    let id = value_as_u64(raw.get("id")?)?;
    let state = raw
        .get("state")
        .and_then(Value::as_str)
        .and_then(SprintState::parse)?;
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Sprint {}", id));
    let start_date = first_timestamp(raw, &["startDate", "start_date"]);
    let end_date = first_timestamp(raw, &["completeDate", "endDate", "end_date"]);
    Some(SprintRecord {
        id,
        name,
        state,
        start_date,
        end_date,
    })
}

/// Select the most recent `lookback` closed sprints.
///
/// Sprints are ordered by end date descending, truncated to `lookback`, and
/// returned oldest first. Closed sprints without an end date cannot be
/// placed on the timeline and are skipped.
pub fn select_closed_sprints(sprints: &[SprintRecord], lookback: usize) -> Vec<SprintRecord> {
    let mut closed: Vec<&SprintRecord> = sprints
        .iter()
        .filter(|s| s.state == SprintState::Closed && s.end_date.is_some())
        .collect();
    closed.sort_by(|a, b| b.end_date.cmp(&a.end_date).then(b.id.cmp(&a.id)));
    closed.truncate(lookback);
    closed.into_iter().rev().cloned().collect()
}

/// Normalize an already selected window of sprints.
///
/// `payloads` are matched to sprints by id; a sprint without a payload has
/// zero issues.
pub fn normalize_window(
    sprints: Vec<SprintRecord>,
    payloads: &[RawSprintIssues],
    mapping: &FieldMapping,
) -> Result<NormalizedWindow> {
    let mut resolution = FieldResolution::default();
    let mut window = NormalizedWindow::default();

    for sprint in sprints {
        let payload = payloads.iter().find(|p| p.sprint_id == sprint.id);
        let (issues, removed) = match payload {
            Some(p) => normalize_sprint(&sprint, p, mapping, &mut resolution),
            None => (Vec::new(), Vec::new()),
        };
        tracing::debug!(
            sprint_id = sprint.id,
            issues = issues.len(),
            removed = removed.len(),
            "normalized sprint"
        );
        window.sprints.push(SprintIssues {
            sprint,
            issues,
            removed,
        });
    }

    resolution.check(mapping)?;
    Ok(window)
}

/// Select the lookback window and normalize it in one step.
pub fn normalize(
    sprints: &[SprintRecord],
    payloads: &[RawSprintIssues],
    mapping: &FieldMapping,
    lookback: usize,
) -> Result<NormalizedWindow> {
    normalize_window(select_closed_sprints(sprints, lookback), payloads, mapping)
}

/// Tracks whether each mapped field matched at least one issue.
#[derive(Debug, Default)]
struct FieldResolution {
    issues_seen: usize,
    story_points: bool,
    sprint: bool,
}

impl FieldResolution {
    fn check(&self, mapping: &FieldMapping) -> Result<()> {
        if self.issues_seen == 0 {
            return Ok(());
        }
        if !self.story_points {
            return Err(PulseError::DataMapping(format!(
                "story points field [{}] not present on any of {} issues",
                mapping.story_points.join(", "),
                self.issues_seen
            )));
        }
        if !self.sprint {
            return Err(PulseError::DataMapping(format!(
                "sprint field [{}] not present on any of {} issues",
                mapping.sprint.join(", "),
                self.issues_seen
            )));
        }
        Ok(())
    }
}

fn normalize_sprint(
    sprint: &SprintRecord,
    payload: &RawSprintIssues,
    mapping: &FieldMapping,
    resolution: &mut FieldResolution,
) -> (Vec<IssueRecord>, Vec<IssueRecord>) {
    let snapshot: Option<Vec<IssueRecord>> = payload.commit_snapshot.as_ref().map(|raw| {
        raw.iter()
            .filter_map(|v| parse_issue(v, sprint.id, mapping, resolution))
            .collect()
    });
    let snapshot_keys: Option<HashSet<&str>> = snapshot
        .as_ref()
        .map(|s| s.iter().map(|i| i.key.as_str()).collect());

    let mut issues: Vec<IssueRecord> = payload
        .issues
        .iter()
        .filter_map(|v| parse_issue(v, sprint.id, mapping, resolution))
        .collect();

    if let Some(keys) = &snapshot_keys {
        for issue in &mut issues {
            issue.added_during_sprint = !keys.contains(issue.key.as_str());
        }
    }

    let final_keys: HashSet<&str> = issues.iter().map(|i| i.key.as_str()).collect();
    let removed = snapshot
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|i| !final_keys.contains(i.key.as_str()))
        .collect();

    (issues, removed)
}

fn parse_issue(
    raw: &Value,
    partition_sprint: u64,
    mapping: &FieldMapping,
    resolution: &mut FieldResolution,
) -> Option<IssueRecord> {
    let key = match raw.get("key").and_then(Value::as_str) {
        Some(k) if !k.trim().is_empty() => k.trim().to_string(),
        _ => {
            tracing::debug!("skipping issue without key");
            return None;
        }
    };
    resolution.issues_seen += 1;

    // Tracker payloads nest fields under `fields`; flat objects are accepted too.
    let empty = Map::new();
    let fields = raw
        .get("fields")
        .and_then(Value::as_object)
        .or_else(|| raw.as_object())
        .unwrap_or(&empty);

    let (sp_present, story_points) = resolve_story_points(fields, &mapping.story_points);
    resolution.story_points |= sp_present;

    let (sprint_present, sprint_ids) = resolve_sprint_ids(fields, &mapping.sprint);
    resolution.sprint |= sprint_present;

    let sprint_id = if sprint_ids.contains(&partition_sprint) || sprint_ids.is_empty() {
        Some(partition_sprint)
    } else {
        sprint_ids.iter().max().copied()
    };

    Some(IssueRecord {
        key,
        summary: string_field(fields, "summary"),
        issue_type: fields
            .get("issuetype")
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| string_field(fields, "issue_type")),
        assignee: fields
            .get("assignee")
            .and_then(|a| a.get("displayName"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| string_field(fields, "assignee")),
        sprint_id,
        sprint_ids,
        story_points,
        status_category: resolve_status(fields, mapping),
        created: first_field_timestamp(fields, &["created"]),
        resolution_date: first_field_timestamp(fields, &["resolutiondate", "resolution_date"]),
        added_during_sprint: false,
        status_history: status_history(raw, mapping),
    })
}

/// Status items of `changelog.histories`, sorted by time. Histories
/// without a parseable `created` timestamp are skipped.
fn status_history(raw: &Value, mapping: &FieldMapping) -> Vec<StatusTransition> {
    let Some(histories) = raw
        .get("changelog")
        .and_then(|c| c.get("histories"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut transitions = Vec::new();
    for history in histories {
        let Some(at) = history
            .get("created")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
        else {
            continue;
        };
        let items = history.get("items").and_then(Value::as_array);
        for item in items.into_iter().flatten() {
            if item.get("field").and_then(Value::as_str) != Some("status") {
                continue;
            }
            let to = string_field_opt(item, "toString");
            transitions.push(StatusTransition {
                at,
                from: string_field_opt(item, "fromString"),
                to_done: to
                    .as_deref()
                    .is_some_and(|t| contains_ignore_case(&mapping.done_statuses, t)),
                to,
            });
        }
    }
    transitions.sort_by_key(|t| t.at);
    transitions
}

fn string_field_opt(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Returns `(any mapped id present, first parseable value)`.
fn resolve_story_points(fields: &Map<String, Value>, ids: &[String]) -> (bool, Option<f64>) {
    let mut present = false;
    for id in ids {
        if let Some(value) = fields.get(id) {
            present = true;
            if let Some(points) = parse_points(value) {
                return (true, Some(points));
            }
        }
    }
    (present, None)
}

fn parse_points(value: &Value) -> Option<f64> {
    let points = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    points.is_finite().then_some(points)
}

fn resolve_sprint_ids(fields: &Map<String, Value>, ids: &[String]) -> (bool, Vec<u64>) {
    let mut present = false;
    for id in ids {
        if let Some(value) = fields.get(id) {
            present = true;
            let mut out = Vec::new();
            collect_sprint_ids(value, &mut out);
            if !out.is_empty() {
                out.sort_unstable();
                out.dedup();
                return (true, out);
            }
        }
    }
    (present, Vec::new())
}

fn collect_sprint_ids(value: &Value, out: &mut Vec<u64>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_sprint_ids(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(id) = obj.get("id").and_then(value_as_u64) {
                out.push(id);
            }
        }
        Value::Number(_) => {
            if let Some(id) = value_as_u64(value) {
                out.push(id);
            }
        }
        Value::String(s) => {
            if let Some(id) = legacy_sprint_id(s).or_else(|| s.trim().parse().ok()) {
                out.push(id);
            }
        }
        _ => {}
    }
}

/// Older trackers serialize sprints as
/// `com.atlassian.greenhopper.service.sprint.Sprint@1a2b[id=42,state=CLOSED,...]`.
fn legacy_sprint_id(s: &str) -> Option<u64> {
    let start = s.find("id=")? + 3;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn resolve_status(fields: &Map<String, Value>, mapping: &FieldMapping) -> StatusCategory {
    let status = fields.get("status");

    let category_key = status
        .and_then(|s| s.get("statusCategory"))
        .and_then(|c| c.get("key"))
        .and_then(Value::as_str)
        .or_else(|| fields.get("status_category").and_then(Value::as_str));
    if let Some(key) = category_key {
        match key.to_ascii_lowercase().as_str() {
            "done" => return StatusCategory::Done,
            "indeterminate" | "in_progress" => return StatusCategory::InProgress,
            "new" | "todo" | "to_do" => return StatusCategory::Todo,
            _ => {}
        }
    }

    let name = status
        .and_then(|s| s.get("name").and_then(Value::as_str).or_else(|| s.as_str()));
    match name {
        Some(n) if contains_ignore_case(&mapping.done_statuses, n) => StatusCategory::Done,
        Some(n) if contains_ignore_case(&mapping.in_progress_statuses, n) => {
            StatusCategory::InProgress
        }
        _ => StatusCategory::Todo,
    }
}

fn contains_ignore_case(names: &[String], needle: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(needle.trim()))
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(str::to_string)
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_timestamp(raw: &Value, names: &[&str]) -> Option<DateTime<Utc>> {
    raw.as_object()
        .and_then(|obj| first_field_timestamp(obj, names))
}

fn first_field_timestamp(fields: &Map<String, Value>, names: &[&str]) -> Option<DateTime<Utc>> {
    names
        .iter()
        .filter_map(|n| fields.get(*n).and_then(Value::as_str))
        .find_map(parse_timestamp)
}

/// Parse the timestamp shapes trackers emit: RFC 3339, Jira's
/// `2024-03-01T09:30:00.000+0000`, naive date-times, and plain dates.
/// Naive values are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sprint(id: u64, state: SprintState, end: Option<&str>) -> SprintRecord {
        SprintRecord {
            id,
            name: format!("S{}", id),
            state,
            start_date: parse_timestamp("2024-01-01"),
            end_date: end.and_then(parse_timestamp),
        }
    }

    fn issue(key: &str, points: Value, sprint: Value, status: &str) -> Value {
        let resolved = if status == "Done" {
            json!("2024-01-08T12:00:00.000+0000")
        } else {
            Value::Null
        };
        json!({
            "key": key,
            "fields": {
                "customfield_10016": points,
                "customfield_10007": sprint,
                "status": { "name": status, "statusCategory": { "key": status_key(status) } },
                "resolutiondate": resolved,
                "created": "2023-12-28T09:00:00.000+0000"
            }
        })
    }

    fn status_key(status: &str) -> &'static str {
        match status {
            "Done" => "done",
            "In Progress" => "indeterminate",
            _ => "new",
        }
    }

    #[test]
    fn test_select_closed_sprints_orders_and_truncates() {
        let sprints = vec![
            sprint(1, SprintState::Closed, Some("2024-01-14")),
            sprint(2, SprintState::Closed, Some("2024-01-28")),
            sprint(3, SprintState::Closed, Some("2024-02-11")),
            sprint(4, SprintState::Active, None),
            sprint(5, SprintState::Closed, None),
        ];
        let selected = select_closed_sprints(&sprints, 2);
        let ids: Vec<u64> = selected.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3], "most recent two, oldest first");
    }

    #[test]
    fn test_lookback_larger_than_history() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        assert_eq!(select_closed_sprints(&sprints, 10).len(), 1);
        assert!(select_closed_sprints(&sprints, 0).is_empty());
    }

    #[test]
    fn test_parse_sprint_prefers_complete_date() {
        let raw = json!({
            "id": 7,
            "name": "Sprint 7",
            "state": "CLOSED",
            "startDate": "2024-01-01T09:00:00.000Z",
            "endDate": "2024-01-14T17:00:00.000Z",
            "completeDate": "2024-01-15T10:00:00.000Z"
        });
        let s = parse_sprint(&raw).unwrap();
        assert_eq!(s.id, 7);
        assert_eq!(s.state, SprintState::Closed);
        assert_eq!(s.end_date, parse_timestamp("2024-01-15T10:00:00.000Z"));
    }

    #[test]
    fn test_parse_sprint_rejects_unknown_state() {
        assert!(parse_sprint(&json!({"id": 1, "state": "archived"})).is_none());
        assert!(parse_sprint(&json!({"state": "closed"})).is_none());
    }

    #[test]
    fn test_missing_story_points_are_null_not_zero() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![
                issue("A-1", json!(3), json!([{"id": 1}]), "Done"),
                issue("A-2", Value::Null, json!([{"id": 1}]), "To Do"),
                issue("A-3", json!("n/a"), json!([{"id": 1}]), "To Do"),
            ],
            commit_snapshot: None,
        };
        let window = normalize(&sprints, &[payload], &FieldMapping::default(), 5).unwrap();
        let points: Vec<Option<f64>> = window.sprints[0]
            .issues
            .iter()
            .map(|i| i.story_points)
            .collect();
        assert_eq!(points, vec![Some(3.0), None, None]);
    }

    #[test]
    fn test_unresolved_story_points_field_is_mapping_error() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![json!({
                "key": "A-1",
                "fields": { "customfield_10007": [{"id": 1}], "customfield_99999": 5 }
            })],
            commit_snapshot: None,
        };
        let err = normalize(&sprints, &[payload], &FieldMapping::default(), 5).unwrap_err();
        assert!(matches!(err, PulseError::DataMapping(ref m) if m.contains("customfield_10016")));
    }

    #[test]
    fn test_unresolved_sprint_field_is_mapping_error() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![json!({"key": "A-1", "fields": { "customfield_10016": 2 }})],
            commit_snapshot: None,
        };
        let err = normalize(&sprints, &[payload], &FieldMapping::default(), 5).unwrap_err();
        assert!(matches!(err, PulseError::DataMapping(ref m) if m.contains("sprint field")));
    }

    #[test]
    fn test_empty_issue_set_is_not_mapping_error() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let window = normalize(&sprints, &[], &FieldMapping::default(), 5).unwrap();
        assert_eq!(window.sprints.len(), 1);
        assert!(window.sprints[0].issues.is_empty());
    }

    #[test]
    fn test_fallback_field_used_in_priority_order() {
        let mapping = FieldMapping {
            story_points: vec!["customfield_10016".into(), "story_points".into()],
            ..FieldMapping::default()
        };
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![
                json!({"key": "A-1", "fields": {"customfield_10016": null, "story_points": 5, "customfield_10007": 1}}),
                json!({"key": "A-2", "fields": {"customfield_10016": 2, "story_points": 8, "customfield_10007": 1}}),
            ],
            commit_snapshot: None,
        };
        let window = normalize(&sprints, &[payload], &mapping, 5).unwrap();
        let issues = &window.sprints[0].issues;
        assert_eq!(issues[0].story_points, Some(5.0));
        assert_eq!(issues[1].story_points, Some(2.0));
    }

    #[test]
    fn test_sprint_field_shapes() {
        let mut out = Vec::new();
        collect_sprint_ids(
            &json!([
                {"id": 12, "name": "S12"},
                "com.atlassian.greenhopper.service.sprint.Sprint@5f[id=14,rapidViewId=3,state=CLOSED]",
                15,
                "16"
            ]),
            &mut out,
        );
        assert_eq!(out, vec![12, 14, 15, 16]);
    }

    #[test]
    fn test_sprint_id_falls_back_to_most_recent() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![
                issue("A-1", json!(1), json!([{"id": 1}, {"id": 2}]), "Done"),
                issue("A-2", json!(1), json!([{"id": 3}, {"id": 9}]), "Done"),
            ],
            commit_snapshot: None,
        };
        let window = normalize(&sprints, &[payload], &FieldMapping::default(), 5).unwrap();
        assert_eq!(window.sprints[0].issues[0].sprint_id, Some(1));
        assert_eq!(window.sprints[0].issues[1].sprint_id, Some(9));
    }

    #[test]
    fn test_commit_snapshot_flags_added_and_removed() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![
                issue("A-1", json!(3), json!(1), "Done"),
                issue("A-2", json!(5), json!(1), "Done"),
            ],
            commit_snapshot: Some(vec![
                issue("A-1", json!(3), json!(1), "To Do"),
                issue("A-9", json!(8), json!(1), "To Do"),
            ]),
        };
        let window = normalize(&sprints, &[payload], &FieldMapping::default(), 5).unwrap();
        let part = &window.sprints[0];
        assert!(!part.issues[0].added_during_sprint);
        assert!(part.issues[1].added_during_sprint);
        assert_eq!(part.removed.len(), 1);
        assert_eq!(part.removed[0].key, "A-9");
    }

    #[test]
    fn test_status_name_fallback() {
        let mapping = FieldMapping::default();
        let fields = json!({"status": {"name": "closed"}});
        assert_eq!(
            resolve_status(fields.as_object().unwrap(), &mapping),
            StatusCategory::Done
        );
        let fields = json!({"status": "In Progress"});
        assert_eq!(
            resolve_status(fields.as_object().unwrap(), &mapping),
            StatusCategory::InProgress
        );
        let fields = json!({"status": {"name": "Blocked"}});
        assert_eq!(
            resolve_status(fields.as_object().unwrap(), &mapping),
            StatusCategory::Todo
        );
    }

    #[test]
    fn test_issue_without_key_skipped() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![
                json!({"fields": {"customfield_10016": 1, "customfield_10007": 1}}),
                issue("A-1", json!(2), json!(1), "Done"),
            ],
            commit_snapshot: None,
        };
        let window = normalize(&sprints, &[payload], &FieldMapping::default(), 5).unwrap();
        assert_eq!(window.issue_count(), 1);
    }

    #[test]
    fn test_changelog_becomes_sorted_status_history() {
        let sprints = vec![sprint(1, SprintState::Closed, Some("2024-01-14"))];
        let mut raw = issue("A-1", json!(3), json!(1), "Done");
        raw["changelog"] = json!({"histories": [
            {"created": "2024-01-05T09:00:00.000+0000", "items": [
                {"field": "status", "fromString": "Blocked", "toString": "Done"}
            ]},
            {"created": "2024-01-02T09:00:00.000+0000", "items": [
                {"field": "assignee", "fromString": null, "toString": "Ana"},
                {"field": "status", "fromString": "To Do", "toString": "Blocked"}
            ]},
            {"created": "not a date", "items": [
                {"field": "status", "fromString": "Done", "toString": "To Do"}
            ]}
        ]});
        let payload = RawSprintIssues {
            sprint_id: 1,
            issues: vec![raw, issue("A-2", json!(1), json!(1), "To Do")],
            commit_snapshot: None,
        };
        let window = normalize(&sprints, &[payload], &FieldMapping::default(), 5).unwrap();
        let history = &window.sprints[0].issues[0].status_history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].to.as_deref(), Some("Blocked"));
        assert_eq!(history[0].from.as_deref(), Some("To Do"));
        assert!(!history[0].to_done);
        assert_eq!(history[1].to.as_deref(), Some("Done"));
        assert!(history[1].to_done);
        assert!(window.sprints[0].issues[1].status_history.is_empty());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01T09:30:00.000+0000").is_some());
        assert!(parse_timestamp("2024-03-01T09:30:00Z").is_some());
        assert!(parse_timestamp("2024-03-01T09:30:00").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
