pub mod config;
pub mod error;
pub mod ingestion;
pub mod integrity;
pub mod outputs;
pub mod pipeline;
pub mod registry;
pub mod timeline;
pub mod timestamp_normalizer;

pub use config::{PipelineConfig, SourceOverride};
pub use error::{PipelineError, Result};
pub use ingestion::{ingest_source, FileReport, IngestedSeries, SeriesReport, SeriesStatus};
pub use outputs::{write_merged_csv, RunSummary, SchemaEntry};
pub use pipeline::{ingest_all, run, IngestionBatch, RunOutcome};
pub use registry::{NormalizedSeries, SeriesRegistry};
pub use timeline::{merge_registry, merge_series, MergeOutcome, MergeStats, TIMELINE_COLUMN};
pub use timestamp_normalizer::{
    normalize_timestamps, parse_instant, Displacement, DisplacementKind, DisplacementSummary,
    NormalizedFrame,
};
