// crates/healthline-core/src/error.rs

use std::path::PathBuf;

use healthline_parser::ParserError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("series '{series}' has no timestamp column; available columns: {available:?}")]
    MissingTimestampColumn {
        series: String,
        available: Vec<String>,
    },

    #[error("series '{series}' column '{column}' row {row_index}: unparseable timestamp '{value}'")]
    UnparseableTimestamp {
        series: String,
        column: String,
        row_index: usize,
        value: String,
    },

    #[error("primary series '{series}' has no rows; cannot build a timeline")]
    EmptyPrimarySeries { series: String },

    #[error("series '{series}' column '{column}' was altered during normalization ({mismatched_rows} rows differ)")]
    ValueIntegrityViolation {
        series: String,
        column: String,
        mismatched_rows: usize,
    },

    #[error("series '{series}' failed while reading {file}: {source}")]
    Ingestion {
        series: String,
        file: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether the error stops the whole run rather than a single series.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyPrimarySeries { .. } | PipelineError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
