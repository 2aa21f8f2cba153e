use chrono::NaiveDateTime;
use healthline_core::{
    merge_registry, merge_series, NormalizedSeries, PipelineError, SeriesRegistry, TIMELINE_COLUMN,
};
use polars::prelude::*;

fn parse_naive(ts: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").expect("parse timestamp")
}

fn naive_to_micros(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_micros()
}

/// A canonical series with a datetime key column named `key`.
fn series(name: &str, key: &str, times: &[&str], columns: Vec<Column>) -> NormalizedSeries {
    let micros: Vec<i64> = times
        .iter()
        .map(|t| naive_to_micros(parse_naive(t)))
        .collect();
    let key_column = Series::new(key.into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .expect("cast");

    let mut all: Vec<Column> = vec![key_column.into()];
    all.extend(columns);
    NormalizedSeries::new(name, DataFrame::new(all).expect("df"), key)
}

fn glucose() -> NormalizedSeries {
    series(
        "blood_glucose",
        "date",
        &["2023-01-01 00:00:00", "2023-01-02 00:00:00"],
        vec![Column::new("bgl".into(), [100.0, 110.0])],
    )
}

fn row_of(df: &DataFrame, at: &str) -> usize {
    let target = naive_to_micros(parse_naive(at));
    df.column(TIMELINE_COLUMN)
        .expect("timeline")
        .datetime()
        .expect("datetime")
        .into_iter()
        .position(|v| v == Some(target))
        .expect("minute on grid")
}

#[test]
fn grid_covers_primary_span_plus_a_day() {
    let outcome = merge_series(&glucose(), std::iter::empty::<&NormalizedSeries>()).expect("merge");

    assert_eq!(outcome.df.height(), 4321);
    assert_eq!(outcome.stats.rows, 4321);
    assert_eq!(outcome.df.get_column_names()[0].as_str(), TIMELINE_COLUMN);
    assert_eq!(
        outcome.df.column(TIMELINE_COLUMN).unwrap().dtype(),
        &DataType::Datetime(TimeUnit::Microseconds, None)
    );

    let bgl = outcome.df.column("bgl").unwrap().f64().unwrap();
    assert_eq!(bgl.get(row_of(&outcome.df, "2023-01-01 00:00:00")), Some(100.0));
    assert_eq!(bgl.get(row_of(&outcome.df, "2023-01-02 00:00:00")), Some(110.0));
    assert_eq!(bgl.null_count(), 4319);

    // The primary's own key column is folded into the timeline.
    assert!(outcome.df.column("date").is_err());
}

#[test]
fn secondary_values_land_on_exact_minutes_only() {
    let spo2 = series(
        "spo2",
        "timestamp",
        &[
            "2023-01-01 12:00:00",
            "2023-01-01 12:01:00",
            // Outside the grid.
            "2023-02-01 00:00:00",
        ],
        vec![Column::new("value".into(), [97i64, 96, 90])],
    );

    let outcome = merge_series(&glucose(), [&spo2]).expect("merge");
    assert_eq!(outcome.df.height(), 4321);

    let value = outcome.df.column("value").unwrap().i64().unwrap();
    assert_eq!(value.get(row_of(&outcome.df, "2023-01-01 12:00:00")), Some(97));
    assert_eq!(value.get(row_of(&outcome.df, "2023-01-01 12:01:00")), Some(96));
    assert_eq!(value.get(row_of(&outcome.df, "2023-01-01 12:02:00")), None);
    assert_eq!(value.len() - value.null_count(), 2);

    let join = &outcome.stats.joins[1];
    assert_eq!(join.series, "spo2");
    assert_eq!(join.matched_rows, 2);
}

#[test]
fn colliding_columns_take_the_series_suffix() {
    let readiness = series(
        "daily_readiness",
        "date",
        &["2023-01-01 00:00:00"],
        vec![Column::new("score".into(), [80i64])],
    );
    let sleep = series(
        "sleep_score",
        "timestamp",
        &["2023-01-01 00:00:00"],
        vec![Column::new("score".into(), [72i64])],
    );

    let outcome = merge_series(&glucose(), [&readiness, &sleep]).expect("merge");
    let row = row_of(&outcome.df, "2023-01-01 00:00:00");

    assert_eq!(outcome.df.column("score").unwrap().i64().unwrap().get(row), Some(80));
    assert_eq!(
        outcome
            .df
            .column("score_sleep_score")
            .unwrap()
            .i64()
            .unwrap()
            .get(row),
        Some(72)
    );
    assert_eq!(
        outcome.stats.joins[2].renamed,
        vec![("score".to_string(), "score_sleep_score".to_string())]
    );
}

#[test]
fn taken_suffixed_name_drops_the_later_column() {
    let first = series(
        "a",
        "date",
        &["2023-01-01 00:00:00"],
        vec![
            Column::new("score".into(), [1i64]),
            Column::new("score_b".into(), [2i64]),
        ],
    );
    let second = series(
        "b",
        "date",
        &["2023-01-01 00:00:00"],
        vec![Column::new("score".into(), [3i64])],
    );

    let outcome = merge_series(&glucose(), [&first, &second]).expect("merge");
    let row = row_of(&outcome.df, "2023-01-01 00:00:00");

    let names: Vec<&str> = outcome
        .df
        .get_column_names()
        .into_iter()
        .map(|n| n.as_str())
        .collect();
    assert_eq!(names, vec![TIMELINE_COLUMN, "bgl", "score", "score_b"]);
    assert_eq!(outcome.df.column("score_b").unwrap().i64().unwrap().get(row), Some(2));
    assert_eq!(outcome.stats.joins[2].dropped, vec!["score".to_string()]);
}

#[test]
fn duplicate_minutes_keep_first_and_row_count_is_stable() {
    let hrv = series(
        "hrv_details",
        "timestamp",
        &["2023-01-01 03:00:00", "2023-01-01 03:00:00"],
        vec![Column::new("rmssd".into(), [40.5, 41.0])],
    );

    let outcome = merge_series(&glucose(), [&hrv]).expect("merge");
    assert_eq!(outcome.df.height(), 4321);
    let rmssd = outcome.df.column("rmssd").unwrap().f64().unwrap();
    assert_eq!(rmssd.get(row_of(&outcome.df, "2023-01-01 03:00:00")), Some(40.5));
    assert_eq!(outcome.stats.joins[1].duplicate_rows_dropped, 1);
}

#[test]
fn missing_percentages_cover_every_column() {
    let outcome = merge_series(&glucose(), std::iter::empty::<&NormalizedSeries>()).expect("merge");

    let timeline = &outcome.stats.columns[0];
    assert_eq!(timeline.name, TIMELINE_COLUMN);
    assert_eq!(timeline.missing, 0);

    let bgl = &outcome.stats.columns[1];
    assert_eq!(bgl.missing, 4319);
    assert!((bgl.missing_pct - 4319.0 / 4321.0 * 100.0).abs() < 1e-9);
}

#[test]
fn registry_without_primary_cannot_merge() {
    let mut registry = SeriesRegistry::new();
    registry.insert(series(
        "spo2",
        "timestamp",
        &["2023-01-01 00:00:00"],
        vec![Column::new("value".into(), [97i64])],
    ));

    assert!(matches!(
        merge_registry(&registry),
        Err(PipelineError::EmptyPrimarySeries { .. })
    ));
}

#[test]
fn registry_merges_secondaries_in_registration_order() {
    let mut registry = SeriesRegistry::new();
    registry.set_primary(glucose());
    registry.insert(series(
        "sleep_score",
        "timestamp",
        &["2023-01-01 06:00:00"],
        vec![Column::new("overall_score".into(), [81i64])],
    ));
    registry.insert(series(
        "spo2",
        "timestamp",
        &["2023-01-01 06:00:00"],
        vec![Column::new("value".into(), [95i64])],
    ));

    let outcome = merge_registry(&registry).expect("merge");
    let order: Vec<&str> = outcome.stats.joins.iter().map(|j| j.series.as_str()).collect();
    assert_eq!(order, vec!["blood_glucose", "sleep_score", "spo2"]);
    let names: Vec<&str> = outcome
        .df
        .get_column_names()
        .into_iter()
        .map(|n| n.as_str())
        .collect();
    assert_eq!(names, vec![TIMELINE_COLUMN, "bgl", "overall_score", "value"]);
}
