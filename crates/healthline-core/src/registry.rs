use polars::prelude::DataFrame;

use crate::error::Result;
use crate::timestamp_normalizer::resolve_timestamp_column;

/// A series whose temporal key already holds canonical timestamps.
#[derive(Debug, Clone)]
pub struct NormalizedSeries {
    pub name: String,
    pub df: DataFrame,
    /// Name of the key column as resolved during normalization.
    pub timestamp_column: String,
}

impl NormalizedSeries {
    pub fn new(name: impl Into<String>, df: DataFrame, timestamp_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            df,
            timestamp_column: timestamp_column.into(),
        }
    }

    /// Builds a series from an already canonical frame, locating its key with
    /// the candidate list.
    pub fn detect(name: impl Into<String>, df: DataFrame) -> Result<Self> {
        let name = name.into();
        let timestamp_column = resolve_timestamp_column(&name, &df, None)?;
        Ok(Self {
            name,
            df,
            timestamp_column,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }
}

/// Every series of a run: at most one primary plus secondaries kept in
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct SeriesRegistry {
    primary: Option<NormalizedSeries>,
    secondary: Vec<NormalizedSeries>,
}

impl SeriesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_primary(&mut self, series: NormalizedSeries) -> Option<NormalizedSeries> {
        self.primary.replace(series)
    }

    /// Registers a secondary series. A name seen before is replaced in place
    /// and keeps its original position.
    pub fn insert(&mut self, series: NormalizedSeries) -> Option<NormalizedSeries> {
        match self.secondary.iter_mut().find(|s| s.name == series.name) {
            Some(existing) => Some(std::mem::replace(existing, series)),
            None => {
                self.secondary.push(series);
                None
            }
        }
    }

    pub fn primary(&self) -> Option<&NormalizedSeries> {
        self.primary.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&NormalizedSeries> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .find(|s| s.name == name)
    }

    pub fn secondary(&self) -> impl Iterator<Item = &NormalizedSeries> {
        self.secondary.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.secondary.len() + usize::from(self.primary.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
