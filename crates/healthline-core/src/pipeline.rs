use std::path::PathBuf;

use healthline_parser::PRIMARY_SOURCE;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingestion::{ingest_source, SeriesReport};
use crate::outputs::{describe_schema, write_merged_csv, write_summary, RunSummary, SchemaEntry};
use crate::registry::SeriesRegistry;
use crate::timeline::{merge_registry, MergeStats};

#[derive(Debug, Clone)]
pub struct IngestionBatch {
    pub registry: SeriesRegistry,
    pub reports: Vec<SeriesReport>,
}

impl IngestionBatch {
    pub fn failed_series(&self) -> impl Iterator<Item = &SeriesReport> {
        self.reports.iter().filter(|r| r.error.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub series: Vec<SeriesReport>,
    pub merge: MergeStats,
    pub schema: Vec<SchemaEntry>,
    pub output_path: PathBuf,
    pub summary_path: Option<PathBuf>,
}

/// Loads every enabled source into a registry.
///
/// A failing optional series is reported and left out of the merge; a
/// failing or missing primary series stops the run.
pub fn ingest_all(config: &PipelineConfig) -> Result<IngestionBatch> {
    let sources = config.resolve_sources()?;
    info!(
        data_dir = %config.data_dir.display(),
        sources = sources.len(),
        "starting ingestion"
    );

    let mut registry = SeriesRegistry::new();
    let mut reports = Vec::with_capacity(sources.len());

    for definition in &sources {
        match ingest_source(definition, &config.data_dir, config.consolidate_every) {
            Ok(ingested) => {
                if let Some(series) = ingested.series {
                    if definition.primary {
                        registry.set_primary(series);
                    } else {
                        registry.insert(series);
                    }
                }
                reports.push(ingested.report);
            }
            Err(err) if definition.primary || err.is_run_fatal() => return Err(err),
            Err(err) => {
                warn!(series = %definition.name, error = %err, "series skipped");
                reports.push(SeriesReport::failed(definition, &err));
            }
        }
    }

    if registry.primary().map_or(true, |p| p.is_empty()) {
        return Err(PipelineError::EmptyPrimarySeries {
            series: PRIMARY_SOURCE.to_string(),
        });
    }

    Ok(IngestionBatch { registry, reports })
}

/// Ingests, merges and writes the dataset, plus the JSON summary when a
/// summary path is configured.
pub fn run(config: &PipelineConfig) -> Result<RunOutcome> {
    let batch = ingest_all(config)?;
    for failed in batch.failed_series() {
        warn!(series = %failed.series, "series excluded from merge");
    }

    let mut merged = merge_registry(&batch.registry)?;
    write_merged_csv(&mut merged.df, &config.output_path)?;
    let schema = describe_schema(&merged.df);

    if let Some(summary_path) = &config.summary_path {
        let summary = RunSummary::new(
            &config.output_path,
            &batch.reports,
            &merged.stats,
            &schema,
        );
        write_summary(&summary, summary_path)?;
    }

    info!(
        rows = merged.stats.rows,
        columns = schema.len(),
        series = batch.registry.len(),
        "run complete"
    );

    Ok(RunOutcome {
        series: batch.reports,
        merge: merged.stats,
        schema,
        output_path: config.output_path.clone(),
        summary_path: config.summary_path.clone(),
    })
}
