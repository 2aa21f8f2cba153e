use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use healthline_parser::PRIMARY_SOURCE;
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::registry::{NormalizedSeries, SeriesRegistry};
use crate::timestamp_normalizer::{
    column_names, naive_from_micros, naive_to_micros, resolve_timestamp_column, MICROS_PER_MINUTE,
};

/// Name of the key column of every merged dataset.
pub const TIMELINE_COLUMN: &str = "timestamp";

const GRID_CHUNK_MINUTES: i64 = 7 * 24 * 60;

fn canonical_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

/// Inclusive extent of the minute grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineBounds {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimelineBounds {
    /// The primary series' span widened by one day on each side.
    pub fn from_primary(primary: &NormalizedSeries) -> Result<Self> {
        let empty = || PipelineError::EmptyPrimarySeries {
            series: primary.name.clone(),
        };
        if primary.is_empty() {
            return Err(empty());
        }

        let key_column = resolve_key_column(primary)?;
        let keys = key_micros(primary.df.column(&key_column)?)?;
        let (min, max) = keys
            .iter()
            .flatten()
            .fold(None, |acc: Option<(i64, i64)>, &value| match acc {
                Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
                None => Some((value, value)),
            })
            .ok_or_else(empty)?;

        let (Some(min), Some(max)) = (naive_from_micros(min), naive_from_micros(max)) else {
            return Err(empty());
        };

        Ok(Self {
            start: min - Duration::days(1),
            end: max + Duration::days(1),
        })
    }

    /// Number of grid rows, both bounds included.
    pub fn minutes(&self) -> usize {
        let span = naive_to_micros(self.end) - naive_to_micros(self.start);
        (span / MICROS_PER_MINUTE) as usize + 1
    }

    /// Whether `micros` is one of the grid's minutes.
    pub fn contains_minute(&self, micros: i64) -> bool {
        let start = naive_to_micros(self.start);
        let end = naive_to_micros(self.end);
        (start..=end).contains(&micros) && (micros - start) % MICROS_PER_MINUTE == 0
    }

    /// Materializes the grid one week at a time into a single chunked column.
    pub fn build_grid(&self) -> Result<DataFrame> {
        let start = naive_to_micros(self.start);
        let end = naive_to_micros(self.end);
        let chunk_span = GRID_CHUNK_MINUTES * MICROS_PER_MINUTE;

        let mut grid = Series::new_empty(TIMELINE_COLUMN.into(), &DataType::Int64);
        let mut chunk_start = start;
        while chunk_start <= end {
            let chunk_end = (chunk_start + chunk_span - MICROS_PER_MINUTE).min(end);
            let minutes: Vec<i64> = (chunk_start..=chunk_end)
                .step_by(MICROS_PER_MINUTE as usize)
                .collect();
            grid.append(&Series::new(TIMELINE_COLUMN.into(), minutes))?;
            chunk_start = chunk_end + MICROS_PER_MINUTE;
        }

        let grid = grid.cast(&canonical_dtype())?;
        Ok(DataFrame::new(vec![grid.into()])?)
    }
}

/// How one series was attached to the timeline.
#[derive(Debug, Clone, Serialize)]
pub struct JoinReport {
    pub series: String,
    pub key_column: String,
    /// `(incoming, stored)` names of columns suffixed to avoid a collision.
    pub renamed: Vec<(String, String)>,
    /// Columns whose suffixed name was already taken; the earlier column wins.
    pub dropped: Vec<String>,
    pub duplicate_rows_dropped: usize,
    pub matched_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnStat {
    pub name: String,
    pub missing: usize,
    pub missing_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeStats {
    pub rows: usize,
    pub bounds: TimelineBounds,
    pub joins: Vec<JoinReport>,
    pub columns: Vec<ColumnStat>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub df: DataFrame,
    pub stats: MergeStats,
}

/// Merges the registry's primary series and then every secondary series in
/// registration order.
pub fn merge_registry(registry: &SeriesRegistry) -> Result<MergeOutcome> {
    let primary = registry
        .primary()
        .ok_or_else(|| PipelineError::EmptyPrimarySeries {
            series: PRIMARY_SOURCE.to_string(),
        })?;
    merge_series(primary, registry.secondary())
}

/// Builds the minute grid from `primary` and left-joins `primary` and then
/// each of `others` onto it by exact canonical minute.
///
/// Each join goes onto the dataset accumulated so far. Rows sharing a minute
/// keep their first occurrence, so the result has exactly one row per grid
/// minute. Absent or empty series are skipped.
pub fn merge_series<'a, I>(primary: &NormalizedSeries, others: I) -> Result<MergeOutcome>
where
    I: IntoIterator<Item = &'a NormalizedSeries>,
{
    let bounds = TimelineBounds::from_primary(primary)?;
    let mut merged = bounds.build_grid()?;
    info!(
        start = %bounds.start,
        end = %bounds.end,
        minutes = merged.height(),
        "built timeline grid"
    );

    let mut joins = Vec::new();
    let (joined, report) = join_onto(merged, primary, &bounds)?;
    merged = joined;
    joins.push(report);

    for series in others {
        if series.is_empty() {
            debug!(series = %series.name, "skipping empty series");
            continue;
        }
        let (joined, report) = join_onto(merged, series, &bounds)?;
        merged = joined;
        joins.push(report);
    }

    let rows = merged.height();
    let columns = merged
        .get_columns()
        .iter()
        .map(|column| {
            let missing = column.null_count();
            ColumnStat {
                name: column.name().to_string(),
                missing,
                missing_pct: if rows == 0 {
                    0.0
                } else {
                    missing as f64 / rows as f64 * 100.0
                },
            }
        })
        .collect();

    Ok(MergeOutcome {
        df: merged,
        stats: MergeStats {
            rows,
            bounds,
            joins,
            columns,
        },
    })
}

fn resolve_key_column(series: &NormalizedSeries) -> Result<String> {
    resolve_timestamp_column(&series.name, &series.df, Some(&series.timestamp_column))
        .or_else(|_| resolve_timestamp_column(&series.name, &series.df, None))
}

fn key_micros(column: &Column) -> Result<Vec<Option<i64>>> {
    let physical = column.cast(&canonical_dtype())?.cast(&DataType::Int64)?;
    Ok(physical.i64()?.into_iter().collect())
}

fn join_onto(
    accumulated: DataFrame,
    series: &NormalizedSeries,
    bounds: &TimelineBounds,
) -> Result<(DataFrame, JoinReport)> {
    let key_column = resolve_key_column(series)?;

    let mut key = series.df.column(&key_column)?.cast(&canonical_dtype())?;
    key.rename(TIMELINE_COLUMN.into());

    let existing: HashSet<String> = column_names(&accumulated).into_iter().collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut renamed = Vec::new();
    let mut dropped = Vec::new();
    let mut incoming: Vec<Column> = vec![key];

    for column in series.df.get_columns() {
        let name = column.name().to_string();
        if name == key_column {
            continue;
        }

        let stored = if !existing.contains(&name) && !taken.contains(&name) {
            name.clone()
        } else {
            let suffixed = format!("{name}_{}", series.name);
            if existing.contains(&suffixed) || taken.contains(&suffixed) {
                dropped.push(name);
                continue;
            }
            renamed.push((name.clone(), suffixed.clone()));
            suffixed
        };

        let mut column = column.clone();
        column.rename(stored.as_str().into());
        taken.insert(stored);
        incoming.push(column);
    }

    let (right, duplicate_rows_dropped) = keep_first_per_minute(DataFrame::new(incoming)?)?;
    let matched_rows = key_micros(right.column(TIMELINE_COLUMN)?)?
        .into_iter()
        .flatten()
        .filter(|minute| bounds.contains_minute(*minute))
        .count();

    let joined = accumulated
        .lazy()
        .join(
            right.lazy(),
            [col(TIMELINE_COLUMN)],
            [col(TIMELINE_COLUMN)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([TIMELINE_COLUMN], SortMultipleOptions::default())
        .collect()?;

    info!(
        series = %series.name,
        key = %key_column,
        matched_rows,
        renamed = renamed.len(),
        dropped = dropped.len(),
        duplicate_rows_dropped,
        "joined series onto timeline"
    );

    Ok((
        joined,
        JoinReport {
            series: series.name.clone(),
            key_column,
            renamed,
            dropped,
            duplicate_rows_dropped,
            matched_rows,
        },
    ))
}

/// Keeps the first row of every minute; rows without a key are discarded.
fn keep_first_per_minute(df: DataFrame) -> Result<(DataFrame, usize)> {
    let keys = key_micros(df.column(TIMELINE_COLUMN)?)?;
    let mut seen = HashSet::with_capacity(keys.len());
    let mut keep: Vec<IdxSize> = Vec::with_capacity(keys.len());
    for (idx, key) in keys.iter().enumerate() {
        if let Some(minute) = key {
            if seen.insert(*minute) {
                keep.push(idx as IdxSize);
            }
        }
    }

    let dropped = keys.len() - keep.len();
    if dropped == 0 {
        return Ok((df, 0));
    }
    let indices = IdxCa::from_vec("idx".into(), keep);
    Ok((df.take(&indices)?, dropped))
}
