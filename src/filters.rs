use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use tracing::info;

use crate::config::{RecencyFilter, TierFilter};
use crate::error::Result;
use crate::models::{
    ColumnIndex, GradebookRow, HeaderReport, Stage, StudentRecord, ENROLLMENT_DATE,
    LAST_LMS_ACTIVITY, LAST_SAA_ACTIVITY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecencyField {
    Enrollment,
    LmsActivity,
    SaaActivity,
}

impl RecencyField {
    pub fn column(self) -> &'static str {
        match self {
            RecencyField::Enrollment => ENROLLMENT_DATE,
            RecencyField::LmsActivity => LAST_LMS_ACTIVITY,
            RecencyField::SaaActivity => LAST_SAA_ACTIVITY,
        }
    }

    pub fn stage(self) -> Stage {
        match self {
            RecencyField::Enrollment => Stage::EnrollmentRecency,
            RecencyField::LmsActivity => Stage::LmsActivityRecency,
            RecencyField::SaaActivity => Stage::SaaActivityRecency,
        }
    }

    pub fn value(self, student: &StudentRecord) -> Option<NaiveDateTime> {
        match self {
            RecencyField::Enrollment => student.enrolled_at,
            RecencyField::LmsActivity => student.last_lms_activity,
            RecencyField::SaaActivity => student.last_saa_activity,
        }
    }
}

/// Start of the recency window. A window reaching past the calendar's range
/// starts at `NaiveDateTime::MIN`, so every present timestamp is recent.
pub fn cutoff(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(NaiveDateTime::MIN)
}

/// A missing timestamp never counts as recent.
pub fn is_recent(timestamp: Option<NaiveDateTime>, cutoff: NaiveDateTime) -> bool {
    matches!(timestamp, Some(value) if value >= cutoff)
}

/// Applies one recency stage. A disabled filter passes everything through;
/// an enabled one needs its column in the student export.
pub fn apply_recency(
    students: Vec<StudentRecord>,
    field: RecencyField,
    filter: &RecencyFilter,
    headers: &HeaderReport,
    now: NaiveDateTime,
) -> Result<Vec<StudentRecord>> {
    if !filter.enabled {
        return Ok(students);
    }
    headers.require(field.column())?;

    let cutoff = cutoff(now, filter.days);
    let kept: Vec<StudentRecord> = students
        .into_iter()
        .filter(|student| is_recent(field.value(student), cutoff))
        .collect();

    info!(
        stage = %field.stage(),
        days = filter.days,
        %cutoff,
        remaining = kept.len(),
        "recency filter applied"
    );
    Ok(kept)
}

/// Highest pre-assessment tier with a recorded value; 0 when there is none.
pub fn highest_completed_tier(row: Option<&GradebookRow>, index: &ColumnIndex) -> u32 {
    let Some(row) = row else {
        return 0;
    };

    index
        .pre
        .iter()
        .filter(|column| row.value(column.position).is_some())
        .map(|column| column.tier)
        .max()
        .unwrap_or(0)
}

/// Keeps students whose highest completed tier equals the target exactly.
pub fn apply_tier(
    students: Vec<StudentRecord>,
    filter: &TierFilter,
    lookup: &HashMap<&str, &GradebookRow>,
    index: &ColumnIndex,
) -> Vec<StudentRecord> {
    if !filter.enabled {
        return students;
    }

    let kept: Vec<StudentRecord> = students
        .into_iter()
        .filter(|student| {
            let row = lookup.get(student.id.as_str()).copied();
            highest_completed_tier(row, index) == filter.target
        })
        .collect();

    info!(
        stage = %Stage::HighestTier,
        target = filter.target,
        remaining = kept.len(),
        "tier filter applied"
    );
    kept
}
