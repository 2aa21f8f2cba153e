use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// Confirms that every column of `before` other than `timestamp_column` is
/// present in `after` with identical values, nulls included.
pub fn verify_measurements(
    series: &str,
    before: &DataFrame,
    after: &DataFrame,
    timestamp_column: &str,
) -> Result<()> {
    for column in before.get_columns() {
        let name = column.name().as_str();
        if name == timestamp_column {
            continue;
        }

        let original = column.as_materialized_series();
        let Ok(current) = after.column(name) else {
            return Err(PipelineError::ValueIntegrityViolation {
                series: series.to_string(),
                column: name.to_string(),
                mismatched_rows: original.len(),
            });
        };
        let current = current.as_materialized_series();

        if original.dtype() == current.dtype() && original.equals_missing(current) {
            continue;
        }

        return Err(PipelineError::ValueIntegrityViolation {
            series: series.to_string(),
            column: name.to_string(),
            mismatched_rows: count_mismatches(original, current)?,
        });
    }

    Ok(())
}

fn count_mismatches(original: &Series, current: &Series) -> Result<usize> {
    let shared = original.len().min(current.len());
    let mut mismatched = original.len().abs_diff(current.len());
    for idx in 0..shared {
        if original.get(idx)? != current.get(idx)? {
            mismatched += 1;
        }
    }
    Ok(mismatched)
}
