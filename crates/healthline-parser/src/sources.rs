use serde::{Deserialize, Serialize};

/// Logical name of the series that defines the merge timeline.
pub const PRIMARY_SOURCE: &str = "blood_glucose";

/// Where one logical series lives in an export tree and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    /// Glob patterns relative to the data directory.
    pub patterns: Vec<String>,
    /// Column subset to read; `None` keeps every column.
    pub columns: Option<Vec<String>>,
    /// Explicit timestamp column, bypassing the candidate list.
    pub timestamp_column: Option<String>,
    /// `(from, to)` renames applied after reading.
    pub renames: Vec<(String, String)>,
    pub primary: bool,
    /// Sort the consolidated frame by its timestamp column.
    pub sort_by_timestamp: bool,
}

impl SourceDefinition {
    fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            patterns: vec![pattern.to_string()],
            columns: None,
            timestamp_column: None,
            renames: Vec::new(),
            primary: false,
            sort_by_timestamp: false,
        }
    }

    fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    fn timestamp(mut self, column: &str) -> Self {
        self.timestamp_column = Some(column.to_string());
        self
    }

    fn rename(mut self, from: &str, to: &str) -> Self {
        self.renames.push((from.to_string(), to.to_string()));
        self
    }

    fn primary(mut self) -> Self {
        self.primary = true;
        self.sort_by_timestamp = true;
        self
    }
}

/// The export layout produced by the glucose monitor and fitness tracker.
pub fn builtin_sources() -> Vec<SourceDefinition> {
    vec![
        SourceDefinition::new(PRIMARY_SOURCE, "679372_*.csv").primary(),
        SourceDefinition::new(
            "daily_readiness",
            "fitness/DailyReadiness/Daily Readiness Score - *.csv",
        ),
        SourceDefinition::new("sleep_score", "fitness/SleepScore/sleep_score.csv")
            .columns(&[
                "timestamp",
                "overall_score",
                "deep_sleep_in_minutes",
                "resting_heart_rate",
                "restlessness",
            ])
            .timestamp("timestamp"),
        SourceDefinition::new("sleep_profile", "fitness/SleepScore/Sleep Profile.csv")
            .columns(&[
                "creation_date",
                "sleep_type",
                "deep_sleep",
                "rem_sleep",
                "sleep_duration",
            ])
            .timestamp("creation_date"),
        SourceDefinition::new(
            "device_temperature",
            "fitness/Temperature/Device Temperature - *.csv",
        )
        .columns(&["recorded_time", "temperature"])
        .timestamp("recorded_time"),
        SourceDefinition::new(
            "computed_temperature",
            "fitness/Temperature/Computed Temperature - *.csv",
        )
        .columns(&["sleep_start", "sleep_end", "nightly_temperature"])
        .timestamp("sleep_start")
        .rename("nightly_temperature", "temperature"),
        SourceDefinition::new("spo2", "fitness/SPO2/Minute SpO2 - *.csv")
            .columns(&["timestamp", "value"]),
        SourceDefinition::new("stress_score", "fitness/StressScore/Stress Score.csv")
            .columns(&[
                "DATE",
                "STRESS_SCORE",
                "SLEEP_POINTS",
                "RESPONSIVENESS_POINTS",
                "EXERTION_POINTS",
                "STATUS",
            ])
            .timestamp("DATE"),
        SourceDefinition::new(
            "hrv_summary",
            "fitness/HeartRateVariability/HRVSummary/Daily Heart Rate Variability Summary - *.csv",
        ),
        SourceDefinition::new(
            "hrv_details",
            "fitness/HeartRateVariability/HRVDetails/Heart Rate Variability Details - *.csv",
        )
        .columns(&[
            "timestamp",
            "rmssd",
            "coverage",
            "low_frequency",
            "high_frequency",
        ]),
        SourceDefinition::new(
            "respiratory_rate",
            "fitness/HeartRateVariability/RespiratoryRateSummary/*.csv",
        ),
    ]
}
