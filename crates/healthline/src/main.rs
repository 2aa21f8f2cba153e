use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use healthline_core::ingestion::SeriesReport;
use healthline_core::timestamp_normalizer::normalize_timestamps;
use healthline_core::{Displacement, DisplacementSummary, PipelineConfig, RunOutcome};
use healthline_parser::read_export_file;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Merge health exports onto a minute timeline", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every source and write the merged dataset
    Run(RunArgs),
    /// List the sources that a run would read
    Sources(ConfigArgs),
    /// Normalize the timestamps of a single export and show what moved
    Normalize(NormalizeArgs),
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Root of the export tree
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Merged CSV destination
    #[arg(long)]
    output: Option<PathBuf>,
    /// Also write a JSON run summary here
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Fragments held in memory before they are folded together
    #[arg(long)]
    consolidate_every: Option<usize>,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    file: PathBuf,
    /// Timestamp column; detected from the candidate list when omitted
    #[arg(long)]
    column: Option<String>,
    /// Maximum displacements to print
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    dotenvy::dotenv().ok();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Sources(args) => handle_sources(args),
        Command::Normalize(args) => handle_normalize(args),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn handle_run(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }
    if let Some(summary) = args.summary {
        config.summary_path = Some(summary);
    }
    if let Some(every) = args.consolidate_every {
        config.consolidate_every = every;
    }

    let outcome = healthline_core::run(&config).context("pipeline run failed")?;
    print_run(&outcome);
    info!(output = %outcome.output_path.display(), "done");
    Ok(())
}

fn handle_sources(args: ConfigArgs) -> Result<()> {
    let config = load_config(&args)?;
    let sources = config.resolve_sources()?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Series", "Primary", "Patterns", "Timestamp", "Columns"]);
    for source in &sources {
        table.add_row(vec![
            source.name.clone(),
            yes_no(source.primary).to_string(),
            source.patterns.join("\n"),
            source
                .timestamp_column
                .clone()
                .unwrap_or_else(|| "(detected)".to_string()),
            source
                .columns
                .as_ref()
                .map(|c| c.join(", "))
                .unwrap_or_else(|| "(all)".to_string()),
        ]);
    }
    println!("Data directory: {}", config.data_dir.display());
    println!("{table}");
    Ok(())
}

fn handle_normalize(args: NormalizeArgs) -> Result<()> {
    let parsed = read_export_file(&args.file, None)?;
    let series = series_name(&args.file);
    let normalized = normalize_timestamps(&series, &parsed.df, args.column.as_deref())?;

    println!(
        "{} rows, timestamp column '{}'",
        normalized.df.height(),
        normalized.timestamp_column
    );
    print_displacement_summary(&DisplacementSummary::from_displacements(
        &normalized.displacements,
    ));

    if !normalized.displacements.is_empty() {
        let shown: Vec<(&str, &Displacement)> = normalized
            .displacements
            .iter()
            .take(args.limit)
            .map(|d| (parsed.file.as_str(), d))
            .collect();
        println!("{}", displacement_table(&shown));
    }
    println!("{}", normalized.df.head(Some(10)));
    Ok(())
}

fn series_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_run(outcome: &RunOutcome) {
    println!("\n--- Ingestion ---");
    println!("{}", ingestion_table(&outcome.series));

    let samples: Vec<(&str, &Displacement)> = outcome
        .series
        .iter()
        .flat_map(|report| report.displacement_sample())
        .collect();
    if !samples.is_empty() {
        println!("\n--- Timestamp adjustments (sample) ---");
        println!("{}", displacement_table(&samples));
    }

    println!("\n--- Merged dataset ---");
    println!(
        "{} rows from {} to {}",
        outcome.merge.rows, outcome.merge.bounds.start, outcome.merge.bounds.end
    );
    for join in &outcome.merge.joins {
        for (from, to) in &join.renamed {
            println!("  {}: column '{from}' stored as '{to}'", join.series);
        }
        for dropped in &join.dropped {
            println!("  {}: column '{dropped}' dropped (name taken)", join.series);
        }
        if join.duplicate_rows_dropped > 0 {
            println!(
                "  {}: {} rows sharing a minute were dropped",
                join.series, join.duplicate_rows_dropped
            );
        }
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Column", "Type", "Missing", "Missing %"]);
    for (entry, stat) in outcome.schema.iter().zip(&outcome.merge.columns) {
        table.add_row(vec![
            entry.name.clone(),
            entry.dtype.clone(),
            stat.missing.to_string(),
            format!("{:.2}", stat.missing_pct),
        ]);
    }
    println!("{table}");

    println!("\nMerged data written to {}", outcome.output_path.display());
    if let Some(summary) = &outcome.summary_path {
        println!("Run summary written to {}", summary.display());
    }
}

fn ingestion_table(reports: &[SeriesReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Series",
        "Status",
        "Rows",
        "Files",
        "Timestamp",
        "Adjusted",
        "Error",
    ]);
    for report in reports {
        table.add_row(vec![
            report.series.clone(),
            report.status.as_str().to_string(),
            report.rows.to_string(),
            report.files.len().to_string(),
            report.timestamp_column.clone().unwrap_or_default(),
            report.displacements.total.to_string(),
            report.error.clone().unwrap_or_default(),
        ]);
    }
    table
}

fn displacement_table(rows: &[(&str, &Displacement)]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "File", "Row", "Original", "UTC", "Normalized", "Delta (s)", "Kind",
    ]);
    for (file, displacement) in rows {
        table.add_row(vec![
            file.to_string(),
            displacement.row_index.to_string(),
            displacement.original.clone(),
            displacement.original_utc.to_string(),
            displacement.normalized.to_string(),
            format!("{:+.3}", displacement.delta_seconds),
            displacement.kind.as_str().to_string(),
        ]);
    }
    table
}

fn print_displacement_summary(summary: &DisplacementSummary) {
    println!(
        "{} adjusted ({} up, {} down), largest shift {:.3}s",
        summary.total, summary.round_up, summary.round_down, summary.max_abs_seconds
    );
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
