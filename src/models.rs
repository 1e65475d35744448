use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;

pub const STUDENT_ID: &str = "CCC ID";
pub const FIRST_NAME: &str = "First Name";
pub const LAST_NAME: &str = "Last Name";
pub const EMAIL: &str = "Email";
pub const CALBRIGHT_EMAIL: &str = "Calbright Email";
pub const ENROLLMENT_DATE: &str = "Date of Enrollment";
pub const LAST_LMS_ACTIVITY: &str = "Last LMS Activity Timestamp";
pub const LAST_SAA_ACTIVITY: &str = "Last LMS SAA Timestamp";
pub const GRADEBOOK_ID: &str = "SIS User ID";
pub const EMAIL_LOG_ID: &str = "ccc_id";
pub const ACTIVITY_STATUS: &str = "Activity Status";

pub const STUDENT_COLUMNS: [&str; 8] = [
    STUDENT_ID,
    FIRST_NAME,
    LAST_NAME,
    EMAIL,
    CALBRIGHT_EMAIL,
    ENROLLMENT_DATE,
    LAST_LMS_ACTIVITY,
    LAST_SAA_ACTIVITY,
];

/// Student columns carried into the export, in output order.
pub const OUTPUT_STUDENT_COLUMNS: [&str; 6] = [
    STUDENT_ID,
    FIRST_NAME,
    LAST_NAME,
    EMAIL,
    CALBRIGHT_EMAIL,
    ENROLLMENT_DATE,
];

/// A parsed CSV export with trimmed headers. Every row has one cell per header.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn position(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == column)
    }
}

/// Which required headers an input table carries.
#[derive(Debug, Clone)]
pub struct HeaderReport {
    pub table: String,
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

impl HeaderReport {
    pub fn has(&self, column: &str) -> bool {
        self.present.iter().any(|present| present == column)
    }

    pub fn require(&self, column: &str) -> crate::error::Result<()> {
        if self.has(column) {
            Ok(())
        } else {
            Err(crate::error::WelcomeError::missing_column(&self.table, column))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub calbright_email: String,
    /// Enrollment cell as exported, kept for the output file.
    pub enrollment_date: String,
    pub enrolled_at: Option<NaiveDateTime>,
    pub last_lms_activity: Option<NaiveDateTime>,
    pub last_saa_activity: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct StudentTable {
    pub headers: HeaderReport,
    pub records: Vec<StudentRecord>,
    pub unparseable_dates: usize,
}

#[derive(Debug, Clone)]
pub struct GradebookRow {
    pub id: String,
    /// Cells aligned with `Gradebook::columns`; `None` marks a missing value.
    pub cells: Vec<Option<String>>,
}

impl GradebookRow {
    pub fn value(&self, position: usize) -> Option<&str> {
        self.cells.get(position).and_then(|cell| cell.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct Gradebook {
    pub headers: HeaderReport,
    pub columns: Vec<String>,
    pub rows: Vec<GradebookRow>,
}

impl Gradebook {
    /// Maps each identifier to its first gradebook row.
    pub fn lookup(&self) -> HashMap<&str, &GradebookRow> {
        let mut lookup = HashMap::with_capacity(self.rows.len());
        for row in &self.rows {
            if row.id.is_empty() {
                continue;
            }
            if lookup.contains_key(row.id.as_str()) {
                tracing::warn!(id = %row.id, "duplicate gradebook identifier, keeping first row");
                continue;
            }
            lookup.insert(row.id.as_str(), row);
        }
        lookup
    }
}

#[derive(Debug, Clone)]
pub struct EmailLog {
    pub headers: HeaderReport,
    pub ids: std::collections::HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    PreAssessment,
    Milestone,
    Summative,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::PreAssessment => "Pre-Assessment",
            Category::Milestone => "Milestone",
            Category::Summative => "Summative",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentColumn {
    pub name: String,
    pub position: usize,
    pub tier: u32,
}

/// Gradebook assessment columns grouped by category, in header order.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    pub pre: Vec<AssessmentColumn>,
    pub milestone: Vec<AssessmentColumn>,
    pub summative: Vec<AssessmentColumn>,
}

impl ColumnIndex {
    /// Whether activity status can be derived for each student.
    pub fn tracks_activity(&self) -> bool {
        !self.pre.is_empty() && !self.milestone.is_empty()
    }

    /// Pre, milestone and summative columns in that order, each column listed once
    /// even when it matched more than one category.
    pub fn output_columns(&self) -> Vec<&AssessmentColumn> {
        let mut seen = std::collections::HashSet::new();
        self.pre
            .iter()
            .chain(self.milestone.iter())
            .chain(self.summative.iter())
            .filter(|column| seen.insert(column.position))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStatus {
    PreAndMilestone,
    PreOnly,
    NoActivity,
    NotInGradebook,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityStatus::PreAndMilestone => "Pre + Milestone",
            ActivityStatus::PreOnly => "Pre only",
            ActivityStatus::NoActivity => "No activity",
            ActivityStatus::NotInGradebook => "Not in Gradebook",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub student: StudentRecord,
    pub highest_tier: u32,
    pub activity: Option<ActivityStatus>,
    /// Cells for `ColumnIndex::output_columns`; `None` when the student has no gradebook row.
    pub assessments: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    Deduplicated,
    EnrollmentRecency,
    LmsActivityRecency,
    SaaActivityRecency,
    HighestTier,
    EmailLogExclusion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Loaded => "loaded",
            Stage::Deduplicated => "de-duplication",
            Stage::EnrollmentRecency => "enrollment recency",
            Stage::LmsActivityRecency => "LMS activity recency",
            Stage::SaaActivityRecency => "SAA activity recency",
            Stage::HighestTier => "highest completed tier",
            Stage::EmailLogExclusion => "email log exclusion",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageCount {
    pub stage: Stage,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct TierSummary {
    pub tier: u32,
    pub count: usize,
}
