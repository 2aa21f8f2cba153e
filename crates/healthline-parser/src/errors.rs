use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} CSV error: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("{file} is missing columns {missing:?}; available columns: {available:?}")]
    MissingColumns {
        file: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("{file} has no header row")]
    EmptyHeader { file: String },

    #[error("{file} declares column '{column}' more than once")]
    DuplicateColumn { file: String, column: String },

    #[error("{file} validation error: {message}")]
    Validation { file: String, message: String },
}

impl ParserError {
    /// Identity of the export file the error refers to.
    pub fn file(&self) -> &str {
        match self {
            ParserError::Io { file, .. }
            | ParserError::Csv { file, .. }
            | ParserError::MissingColumns { file, .. }
            | ParserError::EmptyHeader { file }
            | ParserError::DuplicateColumn { file, .. }
            | ParserError::Validation { file, .. } => file,
        }
    }
}
