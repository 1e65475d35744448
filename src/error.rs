use thiserror::Error;

#[derive(Error, Debug)]
pub enum WelcomeError {
    #[error("column '{column}' not found in {table} table")]
    MissingColumn { table: String, column: String },

    #[error("no pre-assessment columns found in gradebook")]
    NoAssignmentColumnsFound,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(String),
}

impl WelcomeError {
    pub fn missing_column(table: &str, column: &str) -> Self {
        WelcomeError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WelcomeError>;
