//! Delivery metrics engine.
//!
//! Computes per-sprint metrics from a [`NormalizedWindow`] and rolls them up
//! into trend series and a window summary.
//!
//! # Per-sprint definitions
//!
//! | Metric | Definition |
//! |--------|------------|
//! | committed | points of issues present at sprint start (not added), including those later removed |
//! | added | points of issues added after the sprint started |
//! | removed | points of committed issues absent from the sprint at close |
//! | completed | points of issues done at sprint close |
//! | velocity | `completed` |
//! | completion rate | `completed / (committed + added)`, `0` when the denominator is `0` |
//! | throughput | number of issues done at sprint close |
//! | cycle time | `resolution − sprint start`, in days, over done issues |
//! | lead time | `resolution − created`, in days, over done issues |
//! | reopen rate | done issues that moved out of a done status after reaching it, over throughput |
//! | blocked days | time between entering a status named `*blocked*` and the next transition |
//!
//! Issues without story points contribute to counts and durations but not to
//! point sums. An issue is done at close when its status category is done
//! and it was not resolved after the sprint ended.
//!
//! Status-derived metrics need a changelog; issues without one are never
//! reopened or blocked. The final status of an issue has no end, so time in
//! it is not counted.
//!
//! Trends are trailing simple moving averages over [`TREND_WINDOW`] sprints
//! (fewer at the start of the window).

use std::collections::HashSet;

use crate::error::{PulseError, Result};
use crate::models::{
    BlockedIssue, DurationStats, IssueRecord, MetricsWindow, NormalizedWindow, SprintIssues,
    SprintMetrics, StatusCategory, WindowSummary,
};

/// Number of sprints in the trailing moving average.
pub const TREND_WINDOW: usize = 3;

/// Length of the most-blocked issue ranking.
pub const TOP_BLOCKED: usize = 10;

const SECONDS_PER_DAY: f64 = 86_400.0;
const POINT_TOLERANCE: f64 = 1e-9;

/// Compute metrics for every sprint in the window, plus trends and summary.
pub fn compute_window(window: &NormalizedWindow) -> Result<MetricsWindow> {
    let sprints = window
        .sprints
        .iter()
        .map(compute_sprint_metrics)
        .collect::<Result<Vec<_>>>()?;

    let velocities: Vec<f64> = sprints.iter().map(|m| m.velocity).collect();
    let rates: Vec<f64> = sprints.iter().map(|m| m.completion_rate).collect();

    let mut cycle_samples = Vec::new();
    let mut lead_samples = Vec::new();
    let mut blocked = Vec::new();
    for part in &window.sprints {
        cycle_samples.extend(cycle_times(part));
        lead_samples.extend(lead_times(part));
        blocked.extend(part.issues.iter().filter_map(|i| {
            blocked_days(i).map(|days| BlockedIssue {
                key: i.key.clone(),
                sprint_id: part.sprint.id,
                blocked_days: days,
            })
        }));
    }
    let blocked_samples: Vec<f64> = blocked.iter().map(|b| b.blocked_days).collect();
    // Stable sort: ties keep window order.
    blocked.sort_by(|a, b| {
        b.blocked_days
            .partial_cmp(&a.blocked_days)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    blocked.truncate(TOP_BLOCKED);

    let total_throughput: usize = sprints.iter().map(|m| m.throughput).sum();
    let total_reopened: usize = sprints.iter().map(|m| m.reopened).sum();

    let summary = WindowSummary {
        sprint_count: sprints.len(),
        avg_velocity: mean(&velocities).unwrap_or(0.0),
        avg_completion_rate: mean(&rates).unwrap_or(0.0),
        total_throughput,
        total_committed: sprints.iter().map(|m| m.committed_points).sum(),
        total_added: sprints.iter().map(|m| m.added_points).sum(),
        total_removed: sprints.iter().map(|m| m.removed_points).sum(),
        reopen_rate: ratio(total_reopened, total_throughput),
        avg_blocked_days: mean(&blocked_samples),
        top_blocked: blocked,
        cycle_time: duration_stats(&cycle_samples),
        lead_time: duration_stats(&lead_samples),
    };

    Ok(MetricsWindow {
        velocity_trend: moving_average(&velocities, TREND_WINDOW),
        completion_trend: moving_average(&rates, TREND_WINDOW),
        sprints,
        summary,
    })
}

/// Compute metrics for a single sprint partition.
///
/// A sprint with no issues yields zero points, a zero completion rate, and
/// no duration statistics.
pub fn compute_sprint_metrics(part: &SprintIssues) -> Result<SprintMetrics> {
    validate(part)?;

    let committed_points = sum_points(part.issues.iter().filter(|i| !i.added_during_sprint))
        + sum_points(part.removed.iter());
    let added_points = sum_points(part.issues.iter().filter(|i| i.added_during_sprint));
    let removed_points = sum_points(part.removed.iter());
    let done: Vec<&IssueRecord> = done_at_close(part).collect();
    let completed_points = sum_points(done.iter().copied());

    let denominator = committed_points + added_points;
    if completed_points > denominator + POINT_TOLERANCE {
        return Err(PulseError::MetricsComputation(format!(
            "sprint {}: completed points {} exceed committed + added {}",
            part.sprint.id, completed_points, denominator
        )));
    }
    let completion_rate = if denominator > 0.0 {
        completed_points / denominator
    } else {
        0.0
    };

    let reopened = done.iter().filter(|i| was_reopened(i)).count();
    let blocked: Vec<f64> = part.issues.iter().filter_map(blocked_days).collect();

    Ok(SprintMetrics {
        sprint_id: part.sprint.id,
        sprint_name: part.sprint.name.clone(),
        committed_points,
        completed_points,
        added_points,
        removed_points,
        velocity: completed_points,
        completion_rate,
        throughput: done.len(),
        reopened,
        reopen_rate: ratio(reopened, done.len()),
        blocked_days_avg: mean(&blocked),
        cycle_time_stats: duration_stats(&cycle_times(part)),
        lead_time_stats: duration_stats(&lead_times(part)),
    })
}

fn validate(part: &SprintIssues) -> Result<()> {
    let mut seen = HashSet::new();
    for issue in &part.issues {
        if !seen.insert(issue.key.as_str()) {
            return Err(PulseError::MetricsComputation(format!(
                "sprint {}: issue {} appears twice",
                part.sprint.id, issue.key
            )));
        }
    }
    for issue in part.issues.iter().chain(part.removed.iter()) {
        if let Some(points) = issue.story_points {
            if points < 0.0 || !points.is_finite() {
                return Err(PulseError::MetricsComputation(format!(
                    "sprint {}: issue {} has invalid story points {}",
                    part.sprint.id, issue.key, points
                )));
            }
        }
    }
    if let Some(removed) = part.removed.iter().find(|r| seen.contains(r.key.as_str())) {
        return Err(PulseError::MetricsComputation(format!(
            "sprint {}: issue {} is both present and removed",
            part.sprint.id, removed.key
        )));
    }
    Ok(())
}

fn sum_points<'a>(issues: impl Iterator<Item = &'a IssueRecord>) -> f64 {
    issues.filter_map(|i| i.story_points).sum()
}

fn done_at_close(part: &SprintIssues) -> impl Iterator<Item = &IssueRecord> {
    let end = part.sprint.end_date;
    part.issues.iter().filter(move |i| {
        i.status_category == StatusCategory::Done
            && match (i.resolution_date, end) {
                (Some(resolved), Some(end)) => resolved <= end,
                _ => true,
            }
    })
}

/// Days from sprint start to resolution for each done issue. Work resolved
/// before the sprint started counts as zero days.
fn cycle_times(part: &SprintIssues) -> Vec<f64> {
    let Some(start) = part.sprint.start_date else {
        return Vec::new();
    };
    done_at_close(part)
        .filter_map(|i| i.resolution_date)
        .map(|resolved| days_between(start, resolved).max(0.0))
        .collect()
}

fn lead_times(part: &SprintIssues) -> Vec<f64> {
    done_at_close(part)
        .filter_map(|i| match (i.created, i.resolution_date) {
            (Some(created), Some(resolved)) => Some(days_between(created, resolved).max(0.0)),
            _ => None,
        })
        .collect()
}

/// Reached a done status and later moved to a status that is not done.
pub fn was_reopened(issue: &IssueRecord) -> bool {
    let mut reached_done = false;
    for transition in &issue.status_history {
        if transition.to_done {
            reached_done = true;
        } else if reached_done {
            return true;
        }
    }
    false
}

/// Days spent in statuses whose name contains "blocked", summed over each
/// stay that ended with a later transition. `None` when never blocked.
pub fn blocked_days(issue: &IssueRecord) -> Option<f64> {
    let total: f64 = issue
        .status_history
        .windows(2)
        .filter(|pair| {
            pair[0]
                .to
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains("blocked"))
        })
        .map(|pair| days_between(pair[0].at, pair[1].at))
        .sum();
    (total > 0.0).then_some(total)
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn days_between(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> f64 {
    (to - from).num_seconds() as f64 / SECONDS_PER_DAY
}

/// Trailing simple moving average; each point averages up to `window`
/// values ending at that position.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Mean, median, and sample standard deviation; `None` for no samples.
pub fn duration_stats(samples: &[f64]) -> Option<DurationStats> {
    let mean = mean(samples)?;
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    let std_dev = (samples.len() > 1).then(|| {
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>()
            / (samples.len() - 1) as f64;
        var.sqrt()
    });
    Some(DurationStats {
        count: samples.len(),
        mean,
        median,
        std_dev,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
