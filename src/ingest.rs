//! Ingestion boundary: CSV bytes become typed tables with trimmed headers,
//! canonical identifiers and parsed timestamps.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::error::{Result, WelcomeError};
use crate::models::{
    EmailLog, Gradebook, GradebookRow, HeaderReport, StudentRecord, StudentTable, Table,
    CALBRIGHT_EMAIL, EMAIL, EMAIL_LOG_ID, ENROLLMENT_DATE, FIRST_NAME, GRADEBOOK_ID,
    LAST_LMS_ACTIVITY, LAST_NAME, LAST_SAA_ACTIVITY, STUDENT_COLUMNS, STUDENT_ID,
};

/// Cell values that exports use for "no value".
const MISSING_TOKENS: [&str; 12] = [
    "", "NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "#N/A", "#NA", "<NA>", "None",
];

// Two-digit years come before four-digit ones; `%Y` would accept "26" as year 26.
const DATETIME_FORMATS: [&str; 13] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
];

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d-%b-%Y",
];

pub fn normalize_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_string()
}

/// Reads a CSV export, trimming whitespace from every header.
pub fn read_table(name: &str, bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    debug!(table = name, columns = headers.len(), rows = rows.len(), "table read");

    Ok(Table {
        name: name.to_string(),
        headers,
        rows,
    })
}

pub fn check_headers(table: &Table, required: &[&str]) -> HeaderReport {
    let mut present = Vec::new();
    let mut missing = Vec::new();

    for column in required {
        if table.position(column).is_some() {
            present.push(column.to_string());
        } else {
            warn!(table = %table.name, column, "required column missing");
            missing.push(column.to_string());
        }
    }

    HeaderReport {
        table: table.name.clone(),
        present,
        missing,
    }
}

/// Canonical string form of a join key.
///
/// Spreadsheet round-trips turn `12345` into `12345.0`; integral float text is
/// collapsed back. Leading zeros and letters are kept as-is.
pub fn canonical_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.') {
        if !whole.is_empty()
            && whole.chars().all(|c| c.is_ascii_digit())
            && !fraction.is_empty()
            && fraction.chars().all(|c| c == '0')
        {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

pub fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    MISSING_TOKENS.contains(&trimmed)
}

/// Parses a timestamp cell. Anything unrecognised is the missing sentinel `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if is_missing(value) {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_local());
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(parsed.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }

    None
}

struct Cells<'a> {
    table: &'a Table,
    row: &'a [String],
}

impl<'a> Cells<'a> {
    fn get(&self, column: &str) -> &'a str {
        self.table
            .position(column)
            .and_then(|position| self.row.get(position))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Builds student records. Absent optional columns yield empty cells and are
/// listed in the header report; the identifier column is mandatory.
pub fn load_students(table: &Table) -> Result<StudentTable> {
    let headers = check_headers(table, &STUDENT_COLUMNS);
    headers.require(STUDENT_ID)?;

    let mut unparseable_dates = 0usize;
    let mut records = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let cells = Cells { table, row };
        let id = canonical_id(cells.get(STUDENT_ID));
        let mut timestamp = |column: &str| {
            let raw = cells.get(column);
            let parsed = parse_timestamp(raw);
            if parsed.is_none() && headers.has(column) && !is_missing(raw) {
                debug!(id = %id, column, value = raw, "unparseable date");
                unparseable_dates += 1;
            }
            parsed
        };

        let enrolled_at = timestamp(ENROLLMENT_DATE);
        let last_lms_activity = timestamp(LAST_LMS_ACTIVITY);
        let last_saa_activity = timestamp(LAST_SAA_ACTIVITY);

        records.push(StudentRecord {
            first_name: cells.get(FIRST_NAME).trim().to_string(),
            last_name: cells.get(LAST_NAME).trim().to_string(),
            email: cells.get(EMAIL).trim().to_string(),
            calbright_email: cells.get(CALBRIGHT_EMAIL).trim().to_string(),
            enrollment_date: cells.get(ENROLLMENT_DATE).trim().to_string(),
            enrolled_at,
            last_lms_activity,
            last_saa_activity,
            id,
        });
    }

    if unparseable_dates > 0 {
        warn!(count = unparseable_dates, "unparseable dates treated as missing");
    }

    Ok(StudentTable {
        headers,
        records,
        unparseable_dates,
    })
}

pub fn load_gradebook(table: &Table) -> Result<Gradebook> {
    let headers = check_headers(table, &[GRADEBOOK_ID]);
    let id_position = table
        .position(GRADEBOOK_ID)
        .ok_or_else(|| WelcomeError::missing_column(&table.name, GRADEBOOK_ID))?;

    let rows = table
        .rows
        .iter()
        .map(|row| GradebookRow {
            id: canonical_id(&row[id_position]),
            cells: row
                .iter()
                .map(|cell| {
                    if is_missing(cell) {
                        None
                    } else {
                        Some(cell.trim().to_string())
                    }
                })
                .collect(),
        })
        .collect();

    Ok(Gradebook {
        headers,
        columns: table.headers.clone(),
        rows,
    })
}

pub fn load_email_log(table: &Table) -> Result<EmailLog> {
    let headers = check_headers(table, &[EMAIL_LOG_ID]);
    let id_position = table
        .position(EMAIL_LOG_ID)
        .ok_or_else(|| WelcomeError::missing_column(&table.name, EMAIL_LOG_ID))?;

    let ids: HashSet<String> = table
        .rows
        .iter()
        .map(|row| canonical_id(&row[id_position]))
        .filter(|id| !id.is_empty())
        .collect();

    Ok(EmailLog { headers, ids })
}
