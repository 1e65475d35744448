//! One reconciliation run: three raw exports and a filter config in, the
//! students to welcome out, with the head count after every stage.

use chrono::NaiveDateTime;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::columns;
use crate::config::FilterConfig;
use crate::error::Result;
use crate::filters::{self, RecencyField};
use crate::ingest;
use crate::models::{
    ColumnIndex, EmailLog, Gradebook, HeaderReport, OutputRow, Stage, StageCount, StudentTable,
    EMAIL_LOG_ID, GRADEBOOK_ID, STUDENT_COLUMNS,
};
use crate::reconcile;

/// Raw bytes of the three exports, supplied in full on every run.
#[derive(Debug, Clone, Copy)]
pub struct Inputs<'a> {
    pub students: &'a [u8],
    pub gradebook: &'a [u8],
    pub email_log: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub students: StudentTable,
    pub gradebook: Gradebook,
    pub email_log: EmailLog,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub now: NaiveDateTime,
    pub config: FilterConfig,
    pub student_headers: HeaderReport,
    pub gradebook_headers: HeaderReport,
    pub email_log_headers: HeaderReport,
    pub index: ColumnIndex,
    pub stages: Vec<StageCount>,
    pub gradebook_matches: usize,
    pub unparseable_dates: usize,
    pub rows: Vec<OutputRow>,
}

/// Parses the three exports and normalises their headers.
pub fn load(inputs: &Inputs<'_>) -> Result<Loaded> {
    let students = ingest::read_table("students", inputs.students)?;
    let gradebook = ingest::read_table("gradebook", inputs.gradebook)?;
    let email_log = ingest::read_table("email log", inputs.email_log)?;

    Ok(Loaded {
        students: ingest::load_students(&students)?,
        gradebook: ingest::load_gradebook(&gradebook)?,
        email_log: ingest::load_email_log(&email_log)?,
    })
}

/// Header presence for each export and the assessment columns the gradebook
/// would yield. Missing key columns are reported, not raised.
pub fn inspect(inputs: &Inputs<'_>) -> Result<(Vec<HeaderReport>, ColumnIndex)> {
    let students = ingest::read_table("students", inputs.students)?;
    let gradebook = ingest::read_table("gradebook", inputs.gradebook)?;
    let email_log = ingest::read_table("email log", inputs.email_log)?;

    let reports = vec![
        ingest::check_headers(&students, &STUDENT_COLUMNS),
        ingest::check_headers(&gradebook, &[GRADEBOOK_ID]),
        ingest::check_headers(&email_log, &[EMAIL_LOG_ID]),
    ];
    Ok((reports, columns::index_columns(&gradebook.headers)))
}

pub fn run(inputs: &Inputs<'_>, config: &FilterConfig, now: NaiveDateTime) -> Result<RunOutcome> {
    let loaded = load(inputs)?;
    run_loaded(loaded, config, now)
}

pub fn run_loaded(
    loaded: Loaded,
    config: &FilterConfig,
    now: NaiveDateTime,
) -> Result<RunOutcome> {
    config.validate()?;

    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id);
    let _guard = span.enter();

    let Loaded {
        students,
        gradebook,
        email_log,
    } = loaded;

    let index = columns::classify(&gradebook.columns)?;
    let lookup = gradebook.lookup();

    let mut stages = Vec::new();
    let mut record = |stage: Stage, remaining: usize| {
        info!(%stage, remaining, "stage complete");
        stages.push(StageCount { stage, remaining });
    };

    let mut candidates = students.records;
    record(Stage::Loaded, candidates.len());

    // Duplicates resolve before any filter sees them.
    candidates = reconcile::dedupe(candidates);
    record(Stage::Deduplicated, candidates.len());

    let recency = [
        (RecencyField::Enrollment, &config.enrollment),
        (RecencyField::LmsActivity, &config.lms_activity),
        (RecencyField::SaaActivity, &config.saa_activity),
    ];
    for (field, filter) in recency {
        if filter.enabled {
            candidates = filters::apply_recency(candidates, field, filter, &students.headers, now)?;
            record(field.stage(), candidates.len());
        }
    }

    if config.tier.enabled {
        candidates = filters::apply_tier(candidates, &config.tier, &lookup, &index);
        record(Stage::HighestTier, candidates.len());
    }

    candidates = reconcile::exclude_emailed(candidates, &email_log);
    record(Stage::EmailLogExclusion, candidates.len());

    let gradebook_matches = reconcile::gradebook_matches(&candidates, &lookup);
    info!(gradebook_matches, "students matched in gradebook");

    let rows = reconcile::left_join(candidates, &lookup, &index);

    Ok(RunOutcome {
        run_id,
        now,
        config: *config,
        student_headers: students.headers,
        gradebook_headers: gradebook.headers.clone(),
        email_log_headers: email_log.headers,
        index,
        stages,
        gradebook_matches,
        unparseable_dates: students.unparseable_dates,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecencyFilter, TierFilter};
    use crate::error::WelcomeError;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn days_ago(days: i64) -> String {
        (now() - Duration::days(days))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    fn students_csv() -> String {
        format!(
            " CCC ID ,First Name,Last Name,Email,Calbright Email,Date of Enrollment,Last LMS Activity Timestamp,Last LMS SAA Timestamp\n\
             A1,Avery,Lee,avery@example.com,avery@calbright.org,{},{},{}\n\
             A2,Jules,Moreno,jules@example.com,jules@calbright.org,{},{},{}\n\
             A3,Kiara,Patel,kiara@example.com,kiara@calbright.org,{},not a date,{}\n",
            days_ago(5),
            days_ago(1),
            days_ago(2),
            days_ago(10),
            days_ago(20),
            days_ago(20),
            days_ago(3),
            days_ago(40),
        )
    }

    const GRADEBOOK: &str = "Student,SIS User ID ,1.0: Pre-Assessment,3.0: Pre-Assessment,1.0: Milestone,Summative 3.0\n\
        Avery Lee,A1,,92,,\n\
        Jules Moreno,A2,,,,\n";

    const EMAIL_LOG: &str = "ccc_id\nA2\n";

    fn inputs<'a>(students: &'a str, gradebook: &'a str, email_log: &'a str) -> Inputs<'a> {
        Inputs {
            students: students.as_bytes(),
            gradebook: gradebook.as_bytes(),
            email_log: email_log.as_bytes(),
        }
    }

    fn remaining_after(outcome: &RunOutcome, stage: Stage) -> Option<usize> {
        outcome
            .stages
            .iter()
            .find(|count| count.stage == stage)
            .map(|count| count.remaining)
    }

    fn ids(outcome: &RunOutcome) -> Vec<&str> {
        outcome.rows.iter().map(|row| row.student.id.as_str()).collect()
    }

    #[test]
    fn welcomes_unemailed_students_with_left_join() {
        let students = students_csv();
        let outcome = run(
            &inputs(&students, GRADEBOOK, EMAIL_LOG),
            &FilterConfig::default(),
            now(),
        )
        .unwrap();

        assert_eq!(ids(&outcome), vec!["A1", "A3"]);
        let a1 = &outcome.rows[0];
        assert_eq!(a1.highest_tier, 3);
        assert_eq!(
            a1.assessments,
            Some(vec![String::new(), "92".to_string(), String::new(), String::new()])
        );
        assert_eq!(outcome.rows[1].assessments, None);
        assert_eq!(outcome.gradebook_matches, 1);
        assert_eq!(remaining_after(&outcome, Stage::Loaded), Some(3));
        assert_eq!(remaining_after(&outcome, Stage::Deduplicated), Some(3));
        assert_eq!(remaining_after(&outcome, Stage::EnrollmentRecency), Some(3));
        assert_eq!(remaining_after(&outcome, Stage::EmailLogExclusion), Some(2));
        assert_eq!(outcome.unparseable_dates, 1);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let students = students_csv();
        let inputs = inputs(&students, GRADEBOOK, EMAIL_LOG);
        let first = run(&inputs, &FilterConfig::default(), now()).unwrap();
        let second = run(&inputs, &FilterConfig::default(), now()).unwrap();

        assert_eq!(first.rows, second.rows);
        assert_eq!(first.stages, second.stages);
    }

    #[test]
    fn emailed_students_never_appear() {
        let students = students_csv();
        let log = "ccc_id\nA1\nA2\nA3\n";
        let outcome = run(
            &inputs(&students, GRADEBOOK, log),
            &FilterConfig::default(),
            now(),
        )
        .unwrap();
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn recency_filters_apply_per_toggle() {
        let students = students_csv();
        let config = FilterConfig {
            enrollment: RecencyFilter::enabled(7),
            lms_activity: RecencyFilter::enabled(14),
            ..FilterConfig::default()
        };
        let outcome = run(&inputs(&students, GRADEBOOK, "ccc_id\n"), &config, now()).unwrap();

        // A2 enrolled 10 days ago; A3 has an unparseable LMS timestamp.
        assert_eq!(ids(&outcome), vec!["A1"]);
        assert_eq!(remaining_after(&outcome, Stage::EnrollmentRecency), Some(2));
        assert_eq!(remaining_after(&outcome, Stage::LmsActivityRecency), Some(1));
        assert_eq!(remaining_after(&outcome, Stage::SaaActivityRecency), None);
    }

    #[test]
    fn saa_activity_filter_drops_stale_rows() {
        let students = students_csv();
        let config = FilterConfig {
            saa_activity: RecencyFilter::enabled(30),
            ..FilterConfig::default()
        };
        let outcome = run(&inputs(&students, GRADEBOOK, "ccc_id\n"), &config, now()).unwrap();

        // A3's last SAA activity was 40 days ago.
        assert_eq!(ids(&outcome), vec!["A1", "A2"]);
        assert_eq!(remaining_after(&outcome, Stage::EnrollmentRecency), Some(3));
        assert_eq!(remaining_after(&outcome, Stage::SaaActivityRecency), Some(2));
        assert_eq!(remaining_after(&outcome, Stage::LmsActivityRecency), None);
    }

    #[test]
    fn huge_recency_window_keeps_every_dated_student() {
        let students = students_csv();
        let config = FilterConfig {
            enrollment: RecencyFilter::enabled(100_000_000),
            saa_activity: RecencyFilter::enabled(u32::MAX),
            ..FilterConfig::default()
        };
        let outcome = run(&inputs(&students, GRADEBOOK, EMAIL_LOG), &config, now()).unwrap();
        assert_eq!(ids(&outcome), vec!["A1", "A3"]);
    }

    #[test]
    fn first_duplicate_wins_before_filtering() {
        let students = format!(
            "CCC ID,First Name,Last Name,Email,Calbright Email,Date of Enrollment\n\
             A1,Avery,Lee,avery@example.com,avery@calbright.org,{}\n\
             A1,Avery,Lee,avery.new@example.com,avery@calbright.org,{}\n\
             A2,Jules,Moreno,jules@example.com,jules@calbright.org,{}\n",
            days_ago(90),
            days_ago(2),
            days_ago(2),
        );
        let outcome = run(
            &inputs(&students, GRADEBOOK, "ccc_id\n"),
            &FilterConfig::default(),
            now(),
        )
        .unwrap();

        assert_eq!(remaining_after(&outcome, Stage::Loaded), Some(3));
        assert_eq!(remaining_after(&outcome, Stage::Deduplicated), Some(2));
        assert_eq!(ids(&outcome), vec!["A2"]);
        assert_eq!(outcome.stages[1].stage, Stage::Deduplicated);
    }

    #[test]
    fn tier_filter_uses_exact_match() {
        let students = students_csv();
        let config = FilterConfig {
            tier: TierFilter {
                enabled: true,
                target: 0,
            },
            ..FilterConfig::default()
        };
        let outcome = run(&inputs(&students, GRADEBOOK, "ccc_id\n"), &config, now()).unwrap();
        assert_eq!(ids(&outcome), vec!["A2", "A3"]);
    }

    #[test]
    fn float_formatted_ids_still_match() {
        let students = "CCC ID,First Name,Last Name,Email,Calbright Email,Date of Enrollment\n\
                        1001,Avery,Lee,a@example.com,a@calbright.org,2026-10-17\n\
                        1002,Jules,Moreno,j@example.com,j@calbright.org,2026-10-17\n";
        let gradebook = "SIS User ID,2.0: Pre-Assessment\n1001.0,88\n";
        let log = "ccc_id\n1002.0\n";

        let outcome = run(
            &inputs(students, gradebook, log),
            &FilterConfig::default(),
            now(),
        )
        .unwrap();
        assert_eq!(ids(&outcome), vec!["1001"]);
        assert_eq!(outcome.rows[0].highest_tier, 2);
    }

    #[test]
    fn gradebook_without_pre_assessments_halts() {
        let students = students_csv();
        let gradebook = "SIS User ID,1.0: Milestone\nA1,80\n";
        let err = run(&inputs(&students, gradebook, EMAIL_LOG), &FilterConfig::default(), now())
            .unwrap_err();
        assert!(matches!(err, WelcomeError::NoAssignmentColumnsFound));
    }

    #[test]
    fn inspection_reports_without_failing() {
        let students = students_csv();
        let (reports, index) = inspect(&inputs(&students, GRADEBOOK, "id\nA2\n")).unwrap();

        assert!(reports[0].missing.is_empty());
        assert_eq!(reports[2].missing, vec!["ccc_id".to_string()]);
        assert_eq!(index.pre.len(), 2);
    }

    #[test]
    fn missing_email_log_key_is_reported() {
        let students = students_csv();
        let err = run(&inputs(&students, GRADEBOOK, "id\nA2\n"), &FilterConfig::default(), now())
            .unwrap_err();
        assert!(matches!(
            err,
            WelcomeError::MissingColumn { ref column, .. } if column == "ccc_id"
        ));
    }
}
