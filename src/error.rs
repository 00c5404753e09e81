use arrow_schema::ArrowError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet Error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow Error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed header in {}: {reason}", path.display())]
    MalformedHeader { path: PathBuf, reason: String },
    #[error("Unexpected token '{token}' on line {line}")]
    UnexpectedToken { line: usize, token: String },
    #[error("Malformed row for day {day}: expected {expected} values, found {found}")]
    MalformedRow {
        day: u32,
        expected: usize,
        found: usize,
    },
    #[error("No daily block (row starting with day 1) found")]
    MissingDailyBlock,
    #[error("Summary rows (min/mean/max) not found after daily block")]
    MissingSummary,
    #[error("Data Error: {0}")]
    Data(String),
}

impl PipelineError {
    pub(crate) fn header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
