use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::filters::highest_completed_tier;
use crate::models::{
    ActivityStatus, AssessmentColumn, ColumnIndex, EmailLog, GradebookRow, OutputRow,
    StudentRecord,
};

/// Drops every student already present in the email log.
pub fn exclude_emailed(students: Vec<StudentRecord>, log: &EmailLog) -> Vec<StudentRecord> {
    let before = students.len();
    let kept: Vec<StudentRecord> = students
        .into_iter()
        .filter(|student| !log.ids.contains(&student.id))
        .collect();

    info!(
        excluded = before - kept.len(),
        remaining = kept.len(),
        "already-emailed students removed"
    );
    kept
}

/// Keeps the first record for each identifier, in export order.
pub fn dedupe(students: Vec<StudentRecord>) -> Vec<StudentRecord> {
    let mut seen = HashSet::new();
    students
        .into_iter()
        .filter(|student| {
            let first = seen.insert(student.id.clone());
            if !first {
                warn!(id = %student.id, "duplicate student identifier dropped");
            }
            first
        })
        .collect()
}

/// Number of remaining students that have a gradebook row.
pub fn gradebook_matches(
    students: &[StudentRecord],
    lookup: &HashMap<&str, &GradebookRow>,
) -> usize {
    students
        .iter()
        .filter(|student| lookup.contains_key(student.id.as_str()))
        .count()
}

pub fn activity_status(row: Option<&GradebookRow>, index: &ColumnIndex) -> ActivityStatus {
    let Some(row) = row else {
        return ActivityStatus::NotInGradebook;
    };

    let submitted = |columns: &[AssessmentColumn]| {
        columns
            .iter()
            .any(|column| row.value(column.position).is_some())
    };

    match (submitted(index.pre.as_slice()), submitted(index.milestone.as_slice())) {
        (true, true) => ActivityStatus::PreAndMilestone,
        (true, false) => ActivityStatus::PreOnly,
        _ => ActivityStatus::NoActivity,
    }
}

/// Left-joins students with their gradebook assessment cells, preserving
/// student order. Students absent from the gradebook keep `None` assessments.
pub fn left_join(
    students: Vec<StudentRecord>,
    lookup: &HashMap<&str, &GradebookRow>,
    index: &ColumnIndex,
) -> Vec<OutputRow> {
    let columns = index.output_columns();
    let tracks_activity = index.tracks_activity();

    students
        .into_iter()
        .map(|student| {
            let row = lookup.get(student.id.as_str()).copied();
            let assessments = row.map(|row| {
                columns
                    .iter()
                    .map(|column| row.value(column.position).unwrap_or("").to_string())
                    .collect()
            });

            OutputRow {
                highest_tier: highest_completed_tier(row, index),
                activity: tracks_activity.then(|| activity_status(row, index)),
                assessments,
                student,
            }
        })
        .collect()
}
