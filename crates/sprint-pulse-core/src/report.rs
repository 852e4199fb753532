//! Markdown rendering of a [`MetricsWindow`].
//!
//! The output is deterministic: fields appear in a fixed order and numbers
//! use fixed precision, so identical metrics always render to identical
//! text. The summarizer relies on this for stable cache fingerprints.

use crate::models::{DurationStats, MetricsWindow};

/// Maximum number of recommendations rendered.
pub const MAX_RECOMMENDATIONS: usize = 3;

fn fmt_days(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}d", v),
        None => "n/a".to_string(),
    }
}

fn fmt_stats(stats: Option<&DurationStats>) -> String {
    match stats {
        Some(s) => format!(
            "mean {}, median {}, stdev {} (n={})",
            fmt_days(Some(s.mean)),
            fmt_days(Some(s.median)),
            fmt_days(s.std_dev),
            s.count
        ),
        None => "n/a".to_string(),
    }
}

fn fmt_series(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:.2}", v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the metrics table, window summary, trends, and recommendations.
pub fn summary_markdown(window: &MetricsWindow) -> String {
    let mut lines: Vec<String> = Vec::new();
    let s = &window.summary;

    lines.push(format!(
        "**Summary of Metrics (last {} sprints):**",
        s.sprint_count
    ));
    lines.push(format!(
        "- **Average velocity**: {:.1} SP; **average completion rate**: {:.0}%",
        s.avg_velocity,
        s.avg_completion_rate * 100.0
    ));
    lines.push(format!(
        "- **Scope**: committed {:.1} SP, added {:.1} SP, removed {:.1} SP",
        s.total_committed, s.total_added, s.total_removed
    ));
    lines.push(format!("- **Throughput**: {} issues", s.total_throughput));
    lines.push(format!(
        "- **Cycle time**: {}",
        fmt_stats(s.cycle_time.as_ref())
    ));
    lines.push(format!("- **Lead time**: {}", fmt_stats(s.lead_time.as_ref())));
    lines.push(format!("- **Reopen rate**: {:.1}%", s.reopen_rate * 100.0));
    if let Some(days) = s.avg_blocked_days {
        lines.push(format!(
            "- **Blocked time**: {} on average per blocked issue",
            fmt_days(Some(days))
        ));
    }

    if !window.sprints.is_empty() {
        lines.push(String::new());
        lines.push(
            "| Sprint | Committed | Added | Removed | Completed | Completion | Throughput | Cycle (mean/median) |"
                .to_string(),
        );
        lines.push("|---|---|---|---|---|---|---|---|".to_string());
        for m in &window.sprints {
            let cycle = match &m.cycle_time_stats {
                Some(c) => format!("{} / {}", fmt_days(Some(c.mean)), fmt_days(Some(c.median))),
                None => "n/a".to_string(),
            };
            lines.push(format!(
                "| {} ({}) | {:.1} | {:.1} | {:.1} | {:.1} | {:.0}% | {} | {} |",
                m.sprint_name,
                m.sprint_id,
                m.committed_points,
                m.added_points,
                m.removed_points,
                m.completed_points,
                m.completion_rate * 100.0,
                m.throughput,
                cycle
            ));
        }
        lines.push(String::new());
        lines.push(format!(
            "- **Velocity trend** (3-sprint avg): {}",
            fmt_series(&window.velocity_trend)
        ));
        lines.push(format!(
            "- **Completion trend** (3-sprint avg): {}",
            fmt_series(&window.completion_trend)
        ));
    }

    if !s.top_blocked.is_empty() {
        lines.push(String::new());
        lines.push("**Top issues by blocked time:**".to_string());
        lines.push("| Issue | Sprint | Blocked |".to_string());
        lines.push("|---|---|---|".to_string());
        for b in &s.top_blocked {
            lines.push(format!(
                "| {} | {} | {} |",
                b.key,
                b.sprint_id,
                fmt_days(Some(b.blocked_days))
            ));
        }
    }

    let recs = recommendations(window);
    if !recs.is_empty() {
        lines.push(String::new());
        lines.push("**Recommendations:**".to_string());
        for r in recs {
            lines.push(format!("- {}", r));
        }
    }

    lines.join("\n")
}

/// Heuristic, metric-driven recommendations, at most [`MAX_RECOMMENDATIONS`].
pub fn recommendations(window: &MetricsWindow) -> Vec<&'static str> {
    let s = &window.summary;
    let mut recs = Vec::new();

    if s.sprint_count > 0 && s.avg_completion_rate < 0.7 {
        recs.push(
            "Commitment reliability is low; plan to recent velocity and protect sprint scope.",
        );
    }
    if s.total_committed > 0.0 && (s.total_added + s.total_removed) > 0.2 * s.total_committed {
        recs.push(
            "Scope churn is high; agree on a change policy for work entering or leaving the sprint.",
        );
    }
    if s.avg_blocked_days.is_some_and(|days| days > 0.5) {
        recs.push(
            "Investigate frequent blockers; define escalation paths and remove systemic impediments.",
        );
    }
    if s.reopen_rate > 0.1 {
        recs.push("Tighten acceptance criteria and improve QA to reduce reopen churn.");
    }
    if let (Some(cycle), Some(lead)) = (&s.cycle_time, &s.lead_time) {
        if lead.mean - cycle.mean > 2.0 {
            recs.push(
                "Reduce waiting time before work starts; clarify backlog refinement and prioritization.",
            );
        }
    }
    if let Some(std_dev) = s.cycle_time.as_ref().and_then(|c| c.std_dev) {
        if std_dev > 3.0 {
            recs.push(
                "High variance in cycle time; slice work smaller and limit WIP for predictability.",
            );
        }
    }

    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}
