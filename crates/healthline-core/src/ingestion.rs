use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use blake3::Hasher;
use glob::Pattern;
use healthline_parser::{parse_export, SourceDefinition};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::integrity::verify_measurements;
use crate::registry::NormalizedSeries;
use crate::timestamp_normalizer::{normalize_timestamps, Displacement, DisplacementSummary};

/// Displacements shown per series in reports.
pub const DISPLACEMENT_SAMPLE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Parsed,
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub hash: String,
    pub status: FileStatus,
    pub rows: usize,
    pub displacement_summary: DisplacementSummary,
    #[serde(skip_serializing)]
    pub displacements: Vec<Displacement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Loaded,
    NoFiles,
    Failed,
}

impl SeriesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesStatus::Loaded => "loaded",
            SeriesStatus::NoFiles => "no_files",
            SeriesStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub series: String,
    pub primary: bool,
    pub status: SeriesStatus,
    pub timestamp_column: Option<String>,
    pub rows: usize,
    pub files: Vec<FileReport>,
    pub displacements: DisplacementSummary,
    pub error: Option<String>,
}

impl SeriesReport {
    fn empty(definition: &SourceDefinition, status: SeriesStatus) -> Self {
        Self {
            series: definition.name.clone(),
            primary: definition.primary,
            status,
            timestamp_column: None,
            rows: 0,
            files: Vec::new(),
            displacements: DisplacementSummary::default(),
            error: None,
        }
    }

    pub fn failed(definition: &SourceDefinition, error: &PipelineError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(definition, SeriesStatus::Failed)
        }
    }

    /// The first few displacements across all files, tagged with their file.
    pub fn displacement_sample(&self) -> Vec<(&str, &Displacement)> {
        self.files
            .iter()
            .flat_map(|file| file.displacements.iter().map(move |d| (file.path.as_str(), d)))
            .take(DISPLACEMENT_SAMPLE)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IngestedSeries {
    /// `None` when no file matched the source's patterns.
    pub series: Option<NormalizedSeries>,
    pub report: SeriesReport,
}

/// Reads, normalizes and consolidates every file of one source.
///
/// Byte-identical files are skipped. Any failing file aborts the whole
/// series, since the join depends on a complete timestamp column.
pub fn ingest_source(
    definition: &SourceDefinition,
    data_dir: &Path,
    consolidate_every: usize,
) -> Result<IngestedSeries> {
    let paths = expand_patterns(data_dir, &definition.patterns)?;
    if paths.is_empty() {
        info!(series = %definition.name, "no files found");
        return Ok(IngestedSeries {
            series: None,
            report: SeriesReport::empty(definition, SeriesStatus::NoFiles),
        });
    }

    let mut seen_hashes = HashSet::new();
    let mut fragments: Vec<DataFrame> = Vec::new();
    let mut files = Vec::with_capacity(paths.len());
    let mut timestamp_column: Option<String> = definition.timestamp_column.clone();
    let mut summary = DisplacementSummary::default();

    for path in paths {
        let file = path.display().to_string();
        let wrap = |source: PipelineError| PipelineError::Ingestion {
            series: definition.name.clone(),
            file: file.clone(),
            source: Box::new(source),
        };

        let content = std::fs::read(&path).map_err(|source| {
            wrap(PipelineError::Io {
                path: path.clone(),
                source,
            })
        })?;
        let hash = compute_hash(&content);
        if !seen_hashes.insert(hash.clone()) {
            warn!(series = %definition.name, file = %file, "skipping duplicate export file");
            files.push(FileReport {
                path: file,
                hash,
                status: FileStatus::Duplicate,
                rows: 0,
                displacement_summary: DisplacementSummary::default(),
                displacements: Vec::new(),
            });
            continue;
        }

        debug!(series = %definition.name, file = %file, "reading export file");
        let parsed = parse_export(&file, &content, definition.columns.as_deref())
            .map_err(|err| wrap(err.into()))?;
        let mut df = parsed.df;
        apply_renames(&mut df, &definition.renames).map_err(wrap)?;

        let normalized = normalize_timestamps(&definition.name, &df, timestamp_column.as_deref())
            .map_err(wrap)?;
        verify_measurements(
            &definition.name,
            &df,
            &normalized.df,
            &normalized.timestamp_column,
        )
        .map_err(wrap)?;

        let file_summary = DisplacementSummary::from_displacements(&normalized.displacements);
        summary.absorb(&file_summary);
        if file_summary.total > 0 {
            info!(
                series = %definition.name,
                file = %file,
                displaced = file_summary.total,
                round_up = file_summary.round_up,
                round_down = file_summary.round_down,
                max_abs_seconds = file_summary.max_abs_seconds,
                "timestamps adjusted"
            );
        }

        timestamp_column.get_or_insert_with(|| normalized.timestamp_column.clone());
        files.push(FileReport {
            path: file,
            hash,
            status: FileStatus::Parsed,
            rows: normalized.df.height(),
            displacement_summary: file_summary,
            displacements: normalized.displacements,
        });

        fragments.push(normalized.df);
        if fragments.len() >= consolidate_every {
            let folded = consolidate(std::mem::take(&mut fragments))?;
            fragments.push(folded);
        }
    }

    // Only duplicates can leave both of these empty.
    let (Some(key), false) = (timestamp_column, fragments.is_empty()) else {
        return Ok(IngestedSeries {
            series: None,
            report: SeriesReport {
                files,
                ..SeriesReport::empty(definition, SeriesStatus::NoFiles)
            },
        });
    };

    let mut df = consolidate(fragments)?;
    if definition.sort_by_timestamp {
        df = df
            .lazy()
            .sort(
                [key.as_str()],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
    }

    info!(
        series = %definition.name,
        rows = df.height(),
        files = files.len(),
        displaced = summary.total,
        "series ingested"
    );

    let report = SeriesReport {
        series: definition.name.clone(),
        primary: definition.primary,
        status: SeriesStatus::Loaded,
        timestamp_column: Some(key.clone()),
        rows: df.height(),
        files,
        displacements: summary,
        error: None,
    };

    Ok(IngestedSeries {
        series: Some(NormalizedSeries::new(definition.name.clone(), df, key)),
        report,
    })
}

/// Expands glob patterns under `data_dir` into a sorted, de-duplicated list
/// of files. Only `patterns` are globbed; `data_dir` is matched literally.
pub fn expand_patterns(data_dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let root = PathBuf::from(Pattern::escape(&data_dir.to_string_lossy()));
    let mut paths = BTreeSet::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let full = full.to_string_lossy();
        for entry in glob::glob(&full)? {
            match entry {
                Ok(path) if path.is_file() => {
                    paths.insert(path);
                }
                Ok(_) => {}
                Err(err) => warn!(pattern = %full, error = %err, "unreadable glob entry"),
            }
        }
    }
    Ok(paths.into_iter().collect())
}

/// Folds fragments of the same series into one frame, widening column types
/// where files disagree.
pub fn consolidate(fragments: Vec<DataFrame>) -> Result<DataFrame> {
    let mut fragments = fragments;
    match fragments.len() {
        0 => Ok(DataFrame::default()),
        1 => Ok(fragments.remove(0)),
        _ => {
            let lazyframes: Vec<LazyFrame> = fragments.into_iter().map(|df| df.lazy()).collect();
            let args = UnionArgs {
                to_supertypes: true,
                diagonal: true,
                ..UnionArgs::default()
            };
            Ok(concat(&lazyframes, args)?.collect()?)
        }
    }
}

fn apply_renames(df: &mut DataFrame, renames: &[(String, String)]) -> Result<()> {
    for (from, to) in renames {
        if df.get_column_index(from).is_some() {
            df.rename(from, to.as_str().into())?;
        }
    }
    Ok(())
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    hasher.finalize().to_hex().to_string()
}
