//! Offline issue source backed by a JSON snapshot file.
//!
//! Lets `pulse metrics --snapshot F` and `pulse retro --snapshot F` run
//! without a tracker, and gives the integration tests a fixed input.
//!
//! ```json
//! {
//!   "sprints": [{"id": 7, "name": "Sprint 7", "state": "closed",
//!                "startDate": "2024-03-01", "endDate": "2024-03-14"}],
//!   "issues": {"7": [{"key": "A-1", "fields": {"customfield_10016": 3}}]},
//!   "commit_snapshots": {"7": [{"key": "A-1", "fields": {}}]}
//! }
//! ```
//!
//! Raw issue and sprint objects use the tracker's own shape, so a snapshot
//! can be captured straight from API responses.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use sprint_pulse_core::models::SprintRecord;
use sprint_pulse_core::normalize::{parse_sprint, FieldMapping, RawSprintIssues};
use sprint_pulse_core::traits::IssueSource;

#[derive(Debug, Deserialize, Default)]
pub struct SnapshotFile {
    #[serde(default)]
    pub sprints: Vec<Value>,
    #[serde(default)]
    pub issues: HashMap<String, Vec<Value>>,
    #[serde(default)]
    pub commit_snapshots: HashMap<String, Vec<Value>>,
}

pub struct SnapshotSource {
    data: SnapshotFile,
}

impl SnapshotSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot file: {}", path.display()))?;
        let data: SnapshotFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot file: {}", path.display()))?;
        Ok(Self::from_file(data))
    }

    pub fn from_file(data: SnapshotFile) -> Self {
        Self { data }
    }
}

#[async_trait]
impl IssueSource for SnapshotSource {
    async fn fetch_closed_sprints(
        &self,
        _board_id: u64,
        _count: usize,
    ) -> sprint_pulse_core::Result<Vec<SprintRecord>> {
        let sprints: Vec<SprintRecord> = self
            .data
            .sprints
            .iter()
            .filter_map(parse_sprint)
            .collect();
        if sprints.len() < self.data.sprints.len() {
            tracing::warn!(
                skipped = self.data.sprints.len() - sprints.len(),
                "snapshot sprints without a usable id or state were skipped"
            );
        }
        Ok(sprints)
    }

    async fn fetch_issues(
        &self,
        sprint_id: u64,
        _mapping: &FieldMapping,
    ) -> sprint_pulse_core::Result<RawSprintIssues> {
        let key = sprint_id.to_string();
        Ok(RawSprintIssues {
            sprint_id,
            issues: self.data.issues.get(&key).cloned().unwrap_or_default(),
            commit_snapshot: self.data.commit_snapshots.get(&key).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_source_serves_by_sprint_id() {
        let data: SnapshotFile = serde_json::from_value(json!({
            "sprints": [
                {"id": 7, "name": "Sprint 7", "state": "closed", "endDate": "2024-03-14"},
                {"name": "no id", "state": "closed"}
            ],
            "issues": {"7": [{"key": "A-1"}]},
            "commit_snapshots": {"7": []}
        }))
        .unwrap();
        let source = SnapshotSource::from_file(data);

        let sprints = source.fetch_closed_sprints(0, 5).await.unwrap();
        assert_eq!(sprints.len(), 1);
        assert_eq!(sprints[0].id, 7);

        let raw = source.fetch_issues(7, &FieldMapping::default()).await.unwrap();
        assert_eq!(raw.issues.len(), 1);
        assert_eq!(raw.commit_snapshot.map(|s| s.len()), Some(0));

        let missing = source.fetch_issues(8, &FieldMapping::default()).await.unwrap();
        assert!(missing.issues.is_empty());
        assert!(missing.commit_snapshot.is_none());
    }
}
