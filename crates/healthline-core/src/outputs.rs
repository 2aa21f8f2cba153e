use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Utc;
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::ingestion::SeriesReport;
use crate::timeline::MergeStats;

pub const CSV_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Name and dtype of one output column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    pub name: String,
    pub dtype: String,
}

pub fn describe_schema(df: &DataFrame) -> Vec<SchemaEntry> {
    df.get_columns()
        .iter()
        .map(|column| SchemaEntry {
            name: column.name().to_string(),
            dtype: column.dtype().to_string(),
        })
        .collect()
}

/// Machine-readable record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub generated_at: String,
    pub output_path: &'a Path,
    pub series: &'a [SeriesReport],
    pub merge: &'a MergeStats,
    pub schema: &'a [SchemaEntry],
}

impl<'a> RunSummary<'a> {
    pub fn new(
        output_path: &'a Path,
        series: &'a [SeriesReport],
        merge: &'a MergeStats,
        schema: &'a [SchemaEntry],
    ) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            output_path,
            series,
            merge,
            schema,
        }
    }
}

/// Writes the merged dataset with a header row; timestamps are rendered
/// without fractional seconds.
pub fn write_merged_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_datetime_format(Some(CSV_DATETIME_FORMAT.to_string()))
        .finish(df)?;
    info!(path = %path.display(), rows = df.height(), columns = df.width(), "wrote merged dataset");
    Ok(())
}

pub fn write_summary(summary: &RunSummary<'_>, path: &Path) -> Result<()> {
    let file = create_file(path)?;
    serde_json::to_writer_pretty(file, summary)?;
    info!(path = %path.display(), "wrote run summary");
    Ok(())
}

fn create_file(path: &Path) -> Result<File> {
    let io_error = |source| PipelineError::Io {
        path: PathBuf::from(path),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    File::create(path).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::timestamp_normalizer::{naive_to_micros, MICROS_PER_MINUTE};

    #[test]
    fn csv_renders_whole_second_timestamps() {
        let start = naive_to_micros(
            chrono::NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let mut df = df![
            "timestamp" => [start, start + MICROS_PER_MINUTE],
            "bgl" => [Some(101.0), None],
        ]
        .unwrap();
        let ts = df
            .column("timestamp")
            .unwrap()
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
            .unwrap();
        df.with_column(ts).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        write_merged_csv(&mut df, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "timestamp,bgl");
        assert!(lines[1].starts_with("2023-01-01 00:00:00,101"));
        assert_eq!(lines[2], "2023-01-01 00:01:00,");
    }

    #[test]
    fn schema_lists_columns_in_order() {
        let df = df!["timestamp" => [1i64], "spo2" => [97.5]].unwrap();
        let schema = describe_schema(&df);
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].name, "timestamp");
        assert_eq!(schema[1].dtype, DataType::Float64.to_string());
    }
}
