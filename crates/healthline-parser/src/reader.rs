use std::collections::HashSet;
use std::path::Path;

use csv::ReaderBuilder;
use polars::prelude::*;

use crate::errors::ParserError;
use crate::model::{ColumnKind, ParsedExport};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Cell contents read as missing, compared case-insensitively.
const MISSING_TOKENS: &[&str] = &["nan", "na", "n/a", "null"];

/// Reads an export file from disk. See [`parse_export`].
pub fn read_export_file(
    path: &Path,
    columns: Option<&[String]>,
) -> Result<ParsedExport, ParserError> {
    let file = path.display().to_string();
    let content = std::fs::read(path).map_err(|source| ParserError::Io {
        file: file.clone(),
        source,
    })?;
    parse_export(&file, &content, columns)
}

/// Parses a headed CSV export into a typed frame.
///
/// `columns` restricts the frame to the named columns (kept in file order);
/// every requested column must exist. Values are never altered: each column
/// is stored as integer, float or text depending on what all of its
/// non-empty cells parse as, and empty cells and
/// placeholders such as `nan`, `NA` or `null` become nulls.
pub fn parse_export(
    file: &str,
    content: &[u8],
    columns: Option<&[String]>,
) -> Result<ParsedExport, ParserError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(content);

    let header = reader
        .headers()
        .map_err(|source| ParserError::Csv {
            file: file.to_string(),
            source,
        })?
        .clone();

    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = if idx == 0 {
                name.trim_start_matches(BYTE_ORDER_MARK)
            } else {
                name
            };
            name.trim().to_string()
        })
        .collect();

    if names.is_empty() || names.iter().all(|name| name.is_empty()) {
        return Err(ParserError::EmptyHeader {
            file: file.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(ParserError::DuplicateColumn {
                file: file.to_string(),
                column: name.clone(),
            });
        }
    }

    let selected = select_columns(file, &names, columns)?;

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); selected.len()];
    for record in reader.records() {
        let record = record.map_err(|source| ParserError::Csv {
            file: file.to_string(),
            source,
        })?;
        for (slot, &idx) in selected.iter().enumerate() {
            raw[slot].push(clean_cell(record.get(idx)));
        }
    }

    let mut frame_columns: Vec<Column> = Vec::with_capacity(selected.len());
    let mut column_kinds = Vec::with_capacity(selected.len());
    for (slot, &idx) in selected.iter().enumerate() {
        let name = names[idx].as_str();
        let (kind, series) = build_series(name, &raw[slot]);
        column_kinds.push((name.to_string(), kind));
        frame_columns.push(series.into());
    }

    let df = DataFrame::new(frame_columns).map_err(|err| ParserError::Validation {
        file: file.to_string(),
        message: format!("failed to build dataframe: {err}"),
    })?;

    Ok(ParsedExport {
        file: file.to_string(),
        df,
        column_kinds,
    })
}

fn select_columns(
    file: &str,
    names: &[String],
    columns: Option<&[String]>,
) -> Result<Vec<usize>, ParserError> {
    let Some(wanted) = columns else {
        return Ok((0..names.len()).collect());
    };

    let missing: Vec<String> = wanted
        .iter()
        .filter(|want| !names.iter().any(|name| name == *want))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ParserError::MissingColumns {
            file: file.to_string(),
            missing,
            available: names.to_vec(),
        });
    }

    Ok(names
        .iter()
        .enumerate()
        .filter(|(_, name)| wanted.iter().any(|want| want == *name))
        .map(|(idx, _)| idx)
        .collect())
}

fn clean_cell(value: Option<&str>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty()
        || MISSING_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        None
    } else {
        Some(value.to_string())
    }
}

/// Picks the narrowest kind every present value parses as.
pub fn infer_kind(values: &[Option<String>]) -> ColumnKind {
    let mut present = values.iter().flatten().map(|v| v.trim()).peekable();
    if present.peek().is_none() {
        return ColumnKind::Float;
    }

    let mut kind = ColumnKind::Integer;
    for value in present {
        if kind == ColumnKind::Integer && value.parse::<i64>().is_err() {
            kind = ColumnKind::Float;
        }
        if kind == ColumnKind::Float && value.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
    }
    kind
}

fn build_series(name: &str, values: &[Option<String>]) -> (ColumnKind, Series) {
    let kind = infer_kind(values);
    let series = match kind {
        ColumnKind::Integer => {
            let parsed: Vec<Option<i64>> = values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect();
            Series::new(name.into(), parsed)
        }
        ColumnKind::Float => {
            let parsed: Vec<Option<f64>> = values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect();
            Series::new(name.into(), parsed)
        }
        ColumnKind::Text => {
            let utf8: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
            Series::new(name.into(), utf8)
        }
    };
    (kind, series)
}
