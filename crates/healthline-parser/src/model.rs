use std::fmt;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Storage class inferred for one CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Text => "text",
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Text => DataType::String,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One export file read whole into memory.
#[derive(Debug, Clone)]
pub struct ParsedExport {
    pub file: String,
    pub df: DataFrame,
    pub column_kinds: Vec<(String, ColumnKind)>,
}

impl ParsedExport {
    pub fn row_count(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.column_kinds
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}
