use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Column names recognised as the temporal key, highest priority first.
pub const TIMESTAMP_CANDIDATES: [&str; 6] = [
    "date",
    "timestamp",
    "creation_date",
    "recorded_time",
    "sleep_start",
    "sleep_end",
];

pub const MICROS_PER_MINUTE: i64 = 60_000_000;
const HALF_MINUTE_MICROS: i64 = MICROS_PER_MINUTE / 2;

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

// Two-digit year variants come first: `%Y` would accept "23" as year 23.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

/// A parsed timestamp before any normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInstant {
    /// No zone information; read as UTC.
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl RawInstant {
    pub fn is_aware(&self) -> bool {
        matches!(self, RawInstant::Aware(_))
    }

    /// The instant anchored to UTC, as microseconds since the epoch.
    pub fn utc_micros(&self) -> i64 {
        match self {
            RawInstant::Naive(naive) => naive.and_utc().timestamp_micros(),
            RawInstant::Aware(aware) => aware.with_timezone(&Utc).timestamp_micros(),
        }
    }
}

/// Parses one raw cell. Rows of the same column may mix zone-aware and naive
/// representations, so every grammar is tried for every value.
pub fn parse_instant(raw: &str) -> Option<RawInstant> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(aware) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(RawInstant::Aware(aware));
    }

    let zulu = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
        .map(|stripped| format!("{}+00:00", stripped.trim_end()));
    let aware_input = zulu.as_deref().unwrap_or(trimmed);
    for fmt in AWARE_FORMATS {
        if let Ok(aware) = DateTime::parse_from_str(aware_input, fmt) {
            return Some(RawInstant::Aware(aware));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(RawInstant::Naive(naive));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date.and_hms_opt(0, 0, 0).map(RawInstant::Naive);
        }
    }

    None
}

/// Rounds to the nearest minute; a value exactly half way goes to the later
/// minute.
pub fn round_to_minute(micros: i64) -> i64 {
    micros
        .saturating_add(HALF_MINUTE_MICROS)
        .div_euclid(MICROS_PER_MINUTE)
        * MICROS_PER_MINUTE
}

pub fn naive_from_micros(value: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_micros(value).map(|dt| dt.naive_utc())
}

pub fn naive_to_micros(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp_micros()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementKind {
    RoundUp,
    RoundDown,
}

impl DisplacementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplacementKind::RoundUp => "round_up",
            DisplacementKind::RoundDown => "round_down",
        }
    }
}

/// A row whose instant moved while being made canonical.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Displacement {
    pub row_index: usize,
    /// The cell exactly as it was read.
    pub original: String,
    pub original_utc: NaiveDateTime,
    pub normalized: NaiveDateTime,
    pub delta_seconds: f64,
    pub kind: DisplacementKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplacementSummary {
    pub total: usize,
    pub round_up: usize,
    pub round_down: usize,
    pub max_abs_seconds: f64,
}

impl DisplacementSummary {
    pub fn from_displacements(displacements: &[Displacement]) -> Self {
        let mut summary = Self::default();
        for displacement in displacements {
            summary.record(displacement);
        }
        summary
    }

    fn record(&mut self, displacement: &Displacement) {
        self.total += 1;
        match displacement.kind {
            DisplacementKind::RoundUp => self.round_up += 1,
            DisplacementKind::RoundDown => self.round_down += 1,
        }
        self.max_abs_seconds = self.max_abs_seconds.max(displacement.delta_seconds.abs());
    }

    pub fn absorb(&mut self, other: &DisplacementSummary) {
        self.total += other.total;
        self.round_up += other.round_up;
        self.round_down += other.round_down;
        self.max_abs_seconds = self.max_abs_seconds.max(other.max_abs_seconds);
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    pub df: DataFrame,
    pub timestamp_column: String,
    pub displacements: Vec<Displacement>,
}

/// Picks the temporal key: the explicit name when given, otherwise the first
/// entry of [`TIMESTAMP_CANDIDATES`] present in the frame.
pub fn resolve_timestamp_column(
    series: &str,
    df: &DataFrame,
    explicit: Option<&str>,
) -> Result<String> {
    let found = match explicit {
        Some(name) => df.get_column_index(name).map(|_| name),
        None => TIMESTAMP_CANDIDATES
            .iter()
            .copied()
            .find(|candidate| df.get_column_index(candidate).is_some()),
    };

    found
        .map(str::to_string)
        .ok_or_else(|| PipelineError::MissingTimestampColumn {
            series: series.to_string(),
            available: column_names(df),
        })
}

pub(crate) fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Replaces the timestamp column of `df` with canonical minute timestamps.
///
/// Naive values are taken as UTC, zone-aware values are converted to UTC, and
/// both are rounded to the nearest minute with ties going up. Every row whose
/// UTC instant differs from its canonical minute yields a [`Displacement`].
/// Row order and all other columns are left untouched.
pub fn normalize_timestamps(
    series: &str,
    df: &DataFrame,
    explicit: Option<&str>,
) -> Result<NormalizedFrame> {
    let column_name = resolve_timestamp_column(series, df, explicit)?;
    let instants = read_instants(series, &column_name, df.column(&column_name)?)?;

    let mut canonical = Vec::with_capacity(instants.len());
    let mut displacements = Vec::new();

    for (row_index, (original, instant)) in instants.into_iter().enumerate() {
        let reference = instant.utc_micros();
        let normalized = round_to_minute(reference);
        canonical.push(normalized);

        if normalized == reference {
            continue;
        }

        let delta_micros = normalized - reference;
        let (Some(original_utc), Some(normalized_dt)) =
            (naive_from_micros(reference), naive_from_micros(normalized))
        else {
            return Err(PipelineError::UnparseableTimestamp {
                series: series.to_string(),
                column: column_name.clone(),
                row_index,
                value: original,
            });
        };

        displacements.push(Displacement {
            row_index,
            original,
            original_utc,
            normalized: normalized_dt,
            delta_seconds: delta_micros as f64 / 1_000_000.0,
            kind: if delta_micros > 0 {
                DisplacementKind::RoundUp
            } else {
                DisplacementKind::RoundDown
            },
        });
    }

    let canonical = Series::new(column_name.as_str().into(), canonical)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;

    let mut out = df.clone();
    out.with_column(canonical)?;

    debug!(
        series,
        column = %column_name,
        rows = out.height(),
        displaced = displacements.len(),
        "normalized timestamps"
    );

    Ok(NormalizedFrame {
        df: out,
        timestamp_column: column_name,
        displacements,
    })
}

fn read_instants(
    series: &str,
    column_name: &str,
    column: &Column,
) -> Result<Vec<(String, RawInstant)>> {
    let unparseable = |row_index: usize, value: &str| PipelineError::UnparseableTimestamp {
        series: series.to_string(),
        column: column_name.to_string(),
        row_index,
        value: value.to_string(),
    };

    match column.dtype() {
        DataType::Datetime(_, zone) => {
            let aware = zone.is_some();
            let micros = column
                .cast(&DataType::Datetime(TimeUnit::Microseconds, zone.clone()))?
                .cast(&DataType::Int64)?;
            let micros = micros.i64()?;

            let mut instants = Vec::with_capacity(micros.len());
            for (row_index, value) in micros.into_iter().enumerate() {
                let utc = value
                    .and_then(DateTime::<Utc>::from_timestamp_micros)
                    .ok_or_else(|| unparseable(row_index, ""))?;
                let instant = if aware {
                    RawInstant::Aware(utc.fixed_offset())
                } else {
                    RawInstant::Naive(utc.naive_utc())
                };
                let original = match instant {
                    RawInstant::Naive(naive) => naive.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                    RawInstant::Aware(dt) => dt.to_rfc3339(),
                };
                instants.push((original, instant));
            }
            Ok(instants)
        }
        _ => {
            let text = column.cast(&DataType::String)?;
            let text = text.str()?;

            let mut instants = Vec::with_capacity(text.len());
            for (row_index, value) in text.into_iter().enumerate() {
                let raw = value.unwrap_or("");
                let instant = parse_instant(raw).ok_or_else(|| unparseable(row_index, raw))?;
                instants.push((raw.to_string(), instant));
            }
            Ok(instants)
        }
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn parses_mixed_representations() {
        assert_eq!(
            parse_instant("2023-01-01 12:00:30"),
            Some(RawInstant::Naive(naive("2023-01-01 12:00:30")))
        );
        assert!(parse_instant("2023-01-01T12:00:30Z").unwrap().is_aware());
        assert!(parse_instant("2023-01-01 12:00:30Z").unwrap().is_aware());
        assert!(parse_instant("2023-01-01T12:00:30+05:00").unwrap().is_aware());
        assert!(parse_instant("2023-01-01T12:00:30.250-0400").unwrap().is_aware());
        assert_eq!(
            parse_instant("2023-01-01T12:00:30.500"),
            Some(RawInstant::Naive(
                naive("2023-01-01 12:00:30") + chrono::Duration::milliseconds(500)
            ))
        );
        assert_eq!(
            parse_instant("01/02/23 08:15:00"),
            Some(RawInstant::Naive(naive("2023-01-02 08:15:00")))
        );
        assert_eq!(
            parse_instant("01/02/2023 08:15"),
            Some(RawInstant::Naive(naive("2023-01-02 08:15:00")))
        );
        assert_eq!(
            parse_instant("2023-01-02"),
            Some(RawInstant::Naive(naive("2023-01-02 00:00:00")))
        );
        assert_eq!(parse_instant("yesterday"), None);
        assert_eq!(parse_instant("   "), None);
    }

    #[test]
    fn aware_instants_convert_to_utc() {
        let instant = parse_instant("2023-01-01T12:00:00+05:00").unwrap();
        assert_eq!(
            instant.utc_micros(),
            naive_to_micros(naive("2023-01-01 07:00:00"))
        );
    }

    #[test]
    fn rounding_ties_go_to_the_later_minute() {
        let base = naive_to_micros(naive("2023-01-01 12:00:00"));
        assert_eq!(round_to_minute(base), base);
        assert_eq!(round_to_minute(base + 29_999_999), base);
        assert_eq!(round_to_minute(base + 30_000_000), base + MICROS_PER_MINUTE);
        assert_eq!(round_to_minute(base - 30_000_000), base);
        assert_eq!(round_to_minute(base - 30_000_001), base - MICROS_PER_MINUTE);
    }

    #[test]
    fn rounding_handles_pre_epoch_instants() {
        let before_epoch = naive_to_micros(naive("1969-12-31 23:59:30"));
        assert_eq!(round_to_minute(before_epoch), 0);
        let earlier = naive_to_micros(naive("1969-12-31 23:58:10"));
        assert_eq!(
            round_to_minute(earlier),
            naive_to_micros(naive("1969-12-31 23:58:00"))
        );
    }

    #[test]
    fn explicit_column_must_exist() {
        let df = df!["DATE" => ["2023-01-01"], "score" => [1i64]].unwrap();
        assert_eq!(
            resolve_timestamp_column("stress", &df, Some("DATE")).unwrap(),
            "DATE"
        );
        match resolve_timestamp_column("stress", &df, Some("date")) {
            Err(PipelineError::MissingTimestampColumn { series, available }) => {
                assert_eq!(series, "stress");
                assert_eq!(available, vec!["DATE".to_string(), "score".to_string()]);
            }
            other => panic!("expected MissingTimestampColumn, got {other:?}"),
        }
    }

    #[test]
    fn candidate_priority_prefers_earlier_entries() {
        let df = df![
            "sleep_end" => ["2023-01-01 08:00:00"],
            "timestamp" => ["2023-01-01 07:00:00"],
        ]
        .unwrap();
        assert_eq!(
            resolve_timestamp_column("sleep", &df, None).unwrap(),
            "timestamp"
        );
    }

    #[test]
    fn summary_tracks_kinds_and_extremes() {
        let at = naive("2023-01-01 12:00:00");
        let displacements = vec![
            Displacement {
                row_index: 0,
                original: "a".into(),
                original_utc: at,
                normalized: at,
                delta_seconds: 30.0,
                kind: DisplacementKind::RoundUp,
            },
            Displacement {
                row_index: 1,
                original: "b".into(),
                original_utc: at,
                normalized: at,
                delta_seconds: -12.5,
                kind: DisplacementKind::RoundDown,
            },
        ];
        let summary = DisplacementSummary::from_displacements(&displacements);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.round_up, 1);
        assert_eq!(summary.round_down, 1);
        assert_eq!(summary.max_abs_seconds, 30.0);
    }
}
