//! Serialises a run's output rows to a downloadable file.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::error::{Result, WelcomeError};
use crate::models::{ColumnIndex, OutputRow, ACTIVITY_STATUS, OUTPUT_STUDENT_COLUMNS};
use crate::pipeline::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Export {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Serialize)]
struct JsonTable<'a> {
    columns: &'a [String],
    rows: &'a [Vec<String>],
}

/// `students_to_welcome_<YYYYMMDD_HHMMSS>.<ext>`
pub fn export_filename(now: NaiveDateTime, format: ExportFormat) -> String {
    format!(
        "students_to_welcome_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn output_headers(index: &ColumnIndex) -> Vec<String> {
    let mut headers: Vec<String> = OUTPUT_STUDENT_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .collect();
    if index.tracks_activity() {
        headers.push(ACTIVITY_STATUS.to_string());
    }
    headers.extend(index.output_columns().into_iter().map(|column| column.name.clone()));
    headers
}

fn output_record(row: &OutputRow, column_count: usize) -> Vec<String> {
    let student = &row.student;
    let mut record = vec![
        student.id.clone(),
        student.first_name.clone(),
        student.last_name.clone(),
        student.email.clone(),
        student.calbright_email.clone(),
        student.enrollment_date.clone(),
    ];
    if let Some(activity) = row.activity {
        record.push(activity.to_string());
    }
    match &row.assessments {
        Some(cells) => record.extend(cells.iter().cloned()),
        None => record.extend(std::iter::repeat(String::new()).take(column_count)),
    }
    record
}

/// Header row plus one record per output row. Every student column carried
/// into the export must exist in the student table.
pub fn output_table(outcome: &RunOutcome) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    for column in OUTPUT_STUDENT_COLUMNS {
        outcome.student_headers.require(column)?;
    }

    let column_count = outcome.index.output_columns().len();
    let headers = output_headers(&outcome.index);
    let records = outcome
        .rows
        .iter()
        .map(|row| output_record(row, column_count))
        .collect();

    Ok((headers, records))
}

pub fn to_csv(headers: &[String], records: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer
        .into_inner()
        .map_err(|err| WelcomeError::Export(err.to_string()))
}

pub fn to_json(headers: &[String], records: &[Vec<String>]) -> Result<Vec<u8>> {
    let table = JsonTable {
        columns: headers,
        rows: records,
    };
    Ok(serde_json::to_vec_pretty(&table)?)
}

pub fn export(outcome: &RunOutcome, format: ExportFormat) -> Result<Export> {
    let (headers, records) = output_table(outcome)?;
    let bytes = match format {
        ExportFormat::Csv => to_csv(&headers, &records)?,
        ExportFormat::Json => to_json(&headers, &records)?,
    };
    let filename = export_filename(outcome.now, format);

    info!(%filename, rows = records.len(), bytes = bytes.len(), "export ready");
    Ok(Export { filename, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::pipeline::{run, Inputs};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    const STUDENTS: &str = "CCC ID,First Name,Last Name,Email,Calbright Email,Date of Enrollment\n\
        A1,Avery,Lee,avery@example.com,avery@calbright.org,2026-10-10\n\
        A2,Jules,Moreno,jules@example.com,jules@calbright.org,2026-10-11\n\
        A3,Kiara,Patel,kiara@example.com,kiara@calbright.org,2026-10-12\n";

    const GRADEBOOK: &str = "SIS User ID,3.0: Pre-Assessment,3.0: Milestone,Summative 3.0\n\
        A1,95,,\n\
        A2,,,\n";

    fn outcome(students: &str) -> RunOutcome {
        let inputs = Inputs {
            students: students.as_bytes(),
            gradebook: GRADEBOOK.as_bytes(),
            email_log: b"ccc_id\nA2\n",
        };
        run(&inputs, &FilterConfig::default(), now()).unwrap()
    }

    #[test]
    fn filename_carries_second_precision_timestamp() {
        assert_eq!(
            export_filename(now(), ExportFormat::Csv),
            "students_to_welcome_20261018_140509.csv"
        );
        assert_eq!(
            export_filename(now(), ExportFormat::Json),
            "students_to_welcome_20261018_140509.json"
        );
    }

    #[test]
    fn csv_has_header_and_no_index_column() {
        let export = export(&outcome(STUDENTS), ExportFormat::Csv).unwrap();
        let text = String::from_utf8(export.bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "CCC ID,First Name,Last Name,Email,Calbright Email,Date of Enrollment,Activity Status,3.0: Pre-Assessment,3.0: Milestone,Summative 3.0"
        );
        assert_eq!(
            lines[1],
            "A1,Avery,Lee,avery@example.com,avery@calbright.org,2026-10-10,Pre only,95,,"
        );
        assert_eq!(
            lines[2],
            "A3,Kiara,Patel,kiara@example.com,kiara@calbright.org,2026-10-12,Not in Gradebook,,,"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn json_lists_columns_and_rows() {
        let export = export(&outcome(STUDENTS), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&export.bytes).unwrap();

        assert_eq!(value["columns"][0], "CCC ID");
        assert_eq!(value["rows"].as_array().unwrap().len(), 2);
        assert_eq!(value["rows"][1][0], "A3");
    }

    #[test]
    fn missing_output_column_fails_export_only() {
        let students = "CCC ID,First Name,Last Name,Email,Date of Enrollment\n\
                        A1,Avery,Lee,avery@example.com,2026-10-10\n";
        let outcome = outcome(students);
        assert_eq!(outcome.rows.len(), 1);

        let err = export(&outcome, ExportFormat::Csv).unwrap_err();
        assert!(matches!(
            err,
            WelcomeError::MissingColumn { ref column, .. } if column == "Calbright Email"
        ));
    }
}
