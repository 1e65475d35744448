use std::fmt::Write;

use crate::config::RecencyFilter;
use crate::filters;
use crate::models::{Category, ColumnIndex, HeaderReport, OutputRow, TierSummary};
use crate::pipeline::RunOutcome;

pub fn summarize_by_tier(rows: &[OutputRow]) -> Vec<TierSummary> {
    let mut map: std::collections::BTreeMap<u32, usize> = std::collections::BTreeMap::new();

    for row in rows {
        *map.entry(row.highest_tier).or_insert(0) += 1;
    }

    let mut summaries: Vec<TierSummary> = map
        .into_iter()
        .map(|(tier, count)| TierSummary { tier, count })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then(a.tier.cmp(&b.tier)));
    summaries
}

fn write_headers(output: &mut String, reports: &[&HeaderReport]) {
    let _ = writeln!(output, "## Input Headers");
    for report in reports {
        if report.missing.is_empty() {
            let _ = writeln!(output, "- {}: all required columns present", report.table);
        } else {
            let _ = writeln!(
                output,
                "- {}: missing {} (present: {})",
                report.table,
                report.missing.join(", "),
                report.present.join(", ")
            );
        }
    }
}

fn write_columns(output: &mut String, index: &ColumnIndex) {
    let _ = writeln!(output, "## Assessment Columns");
    let groups = [
        (Category::PreAssessment, &index.pre),
        (Category::Milestone, &index.milestone),
        (Category::Summative, &index.summative),
    ];
    for (label, columns) in groups {
        if columns.is_empty() {
            let _ = writeln!(output, "- {label}: none");
            continue;
        }
        let names: Vec<String> = columns
            .iter()
            .map(|column| format!("{} (tier {})", column.name, column.tier))
            .collect();
        let _ = writeln!(output, "- {label}: {}", names.join("; "));
    }
}

fn describe_recency(filter: &RecencyFilter) -> String {
    if filter.enabled {
        format!("last {} days", filter.days)
    } else {
        "off".to_string()
    }
}

/// Header presence and column discovery, without running any filter.
pub fn build_inspection(reports: &[&HeaderReport], index: &ColumnIndex) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Input Inspection");
    let _ = writeln!(output);
    write_headers(&mut output, reports);
    let _ = writeln!(output);
    write_columns(&mut output, index);
    if index.pre.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No pre-assessment columns found; a run would halt.");
    }
    output
}

pub fn build_report(outcome: &RunOutcome) -> String {
    let mut output = String::new();
    let config = &outcome.config;

    let _ = writeln!(output, "# Welcome Email Run Report");
    let _ = writeln!(
        output,
        "Generated {} (run {})",
        outcome.now.format("%Y-%m-%d %H:%M:%S"),
        outcome.run_id
    );
    let _ = writeln!(output);

    write_headers(
        &mut output,
        &[
            &outcome.student_headers,
            &outcome.gradebook_headers,
            &outcome.email_log_headers,
        ],
    );
    let _ = writeln!(output);
    write_columns(&mut output, &outcome.index);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Filters");
    let _ = writeln!(output, "- Enrollment: {}", describe_recency(&config.enrollment));
    let _ = writeln!(output, "- LMS activity: {}", describe_recency(&config.lms_activity));
    let _ = writeln!(output, "- SAA activity: {}", describe_recency(&config.saa_activity));
    if config.enrollment.enabled {
        let _ = writeln!(
            output,
            "- Enrollment cutoff: {}",
            filters::cutoff(outcome.now, config.enrollment.days).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if config.tier.enabled {
        let _ = writeln!(output, "- Highest completed tier: exactly {}", config.tier.target);
    } else {
        let _ = writeln!(output, "- Highest completed tier: off");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Stage Counts");
    for count in &outcome.stages {
        let _ = writeln!(output, "- {}: {} students", count.stage, count.remaining);
    }
    let _ = writeln!(
        output,
        "- matched in gradebook: {} of {}",
        outcome.gradebook_matches,
        outcome.rows.len()
    );
    if outcome.unparseable_dates > 0 {
        let _ = writeln!(
            output,
            "- unparseable dates treated as missing: {}",
            outcome.unparseable_dates
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tier Mix");
    let summaries = summarize_by_tier(&outcome.rows);
    if summaries.is_empty() {
        let _ = writeln!(output, "No students to welcome for this run.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(output, "- tier {}: {} students", summary.tier, summary.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students to Welcome");
    if outcome.rows.is_empty() {
        let _ = writeln!(output, "No students to welcome for this run.");
    } else {
        for row in outcome.rows.iter().take(10) {
            let student = &row.student;
            let status = row
                .activity
                .map(|activity| activity.to_string())
                .unwrap_or_else(|| "activity not tracked".to_string());
            let _ = writeln!(
                output,
                "- {} {} ({}, {}) {}",
                student.first_name, student.last_name, student.id, student.calbright_email, status
            );
        }
        if outcome.rows.len() > 10 {
            let _ = writeln!(output, "- ... and {} more", outcome.rows.len() - 10);
        }
    }

    output
}
