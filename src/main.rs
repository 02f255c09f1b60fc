//! dupscope - a durable content-fingerprint index for finding duplicate files.
//!
//! Usage:
//!   dupscope index [PATHS]     Build or refresh the index (defaults to $HOME)
//!   dupscope report [PATHS]    Report duplicates per folder (defaults to .)
//!   dupscope stats             Show index totals
//!   dupscope --help            Show help

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};

use dupscope_analyze::{Classification, DuplicateReporter, FolderReport, Stats};
use dupscope_core::{HashMode, IndexConfig, ReportConfig, Settings};
use dupscope_index::IndexStore;
use dupscope_pipeline::Indexer;

const SEP_WIDTH: usize = 70;
const NAME_COLUMN_MAX: usize = 100;

#[derive(Parser)]
#[command(
    name = "dupscope",
    version,
    about = "Find duplicate files through a persistent fingerprint index",
    long_about = "dupscope keeps a SQLite index of file fingerprints under your configuration \
                  directory.\n\n\
                  Run `dupscope index` once over the trees you care about, then \
                  `dupscope report [PATH]` anywhere below them to see which files have \
                  copies and how much of each folder is duplicated."
)]
struct Cli {
    /// Index database to use instead of the per-user default
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Log per-file detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or refresh the fingerprint index
    Index {
        /// Paths to index (defaults to the home directory, or / for root)
        paths: Vec<PathBuf>,

        /// Hash whole files instead of a head + tail window
        #[arg(long)]
        full: bool,

        /// Number of fingerprint workers
        #[arg(short, long)]
        threads: Option<usize>,

        /// Skip unreadable files instead of stopping
        #[arg(short, long)]
        ignore_errors: bool,

        /// Clear the index before indexing
        #[arg(long)]
        reset: bool,

        /// Quick-hash window (e.g., "2MB", "512KB")
        #[arg(long)]
        window: Option<String>,
    },

    /// Report duplicates folder by folder
    Report {
        /// Paths to report on (defaults to the current directory)
        paths: Vec<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recurse: bool,

        /// Show folder summaries without listing files
        #[arg(long, conflicts_with = "overall")]
        summary: bool,

        /// Show only the overall totals
        #[arg(long)]
        overall: bool,

        /// List only duplicate files
        #[arg(short, long)]
        duplicates_only: bool,

        /// Do not list files smaller than this (e.g., "1KB")
        #[arg(long, value_name = "SIZE")]
        min_file_size: Option<String>,

        /// Hide folders whose duplicate percentage is below this
        #[arg(long, value_name = "PERCENT")]
        min_dir_percent: Option<f64>,

        /// Hide folders holding fewer duplicate bytes than this (e.g., "10MB")
        #[arg(long, value_name = "SIZE")]
        min_dir_bytes: Option<String>,

        /// Skip unreadable entries instead of stopping
        #[arg(short, long)]
        ignore_errors: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show index location and totals
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// How much of a text report to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportView {
    Files,
    Folders,
    Overall,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.verbose);
    let settings = Settings::load();

    match cli.command {
        Command::Index {
            paths,
            full,
            threads,
            ignore_errors,
            reset,
            window,
        } => {
            let roots = if paths.is_empty() {
                vec![default_index_root()]
            } else {
                paths
            };
            let mut config = IndexConfig::new(validate_paths(&roots)?);
            settings.apply_to_index(&mut config);
            if full {
                config.hash_mode = HashMode::Full;
            }
            if let Some(threads) = threads {
                config.workers = threads;
            }
            if let Some(window) = window {
                config.quick_window = parse_size(&window).context("Invalid window size")?;
            }
            config.ignore_errors |= ignore_errors;

            run_index(cli.db.as_deref(), config, reset)?;
        }
        Command::Report {
            paths,
            recurse,
            summary,
            overall,
            duplicates_only,
            min_file_size,
            min_dir_percent,
            min_dir_bytes,
            ignore_errors,
            format,
        } => {
            let roots = if paths.is_empty() {
                vec![PathBuf::from(".")]
            } else {
                paths
            };
            let mut config = ReportConfig::new(validate_paths(&roots)?);
            settings.apply_to_report(&mut config);
            config.recurse = recurse;
            config.duplicates_only = duplicates_only;
            config.ignore_errors |= ignore_errors;
            if let Some(size) = min_file_size {
                config.min_file_size = parse_size(&size).context("Invalid --min-file-size")?;
            }
            if let Some(bytes) = min_dir_bytes {
                config.min_dir_bytes = parse_size(&bytes).context("Invalid --min-dir-bytes")?;
            }
            if let Some(percent) = min_dir_percent {
                if !(0.0..=100.0).contains(&percent) {
                    bail!("--min-dir-percent must be between 0 and 100, got {percent}");
                }
                config.min_dir_percent = percent;
            }

            let view = if overall {
                ReportView::Overall
            } else if summary {
                ReportView::Folders
            } else {
                ReportView::Files
            };
            run_report(cli.db.as_deref(), config, view, format)?;
        }
        Command::Stats => {
            run_stats(cli.db.as_deref())?;
        }
    }

    Ok(())
}

/// Build or refresh the index.
fn run_index(db: Option<&Path>, config: IndexConfig, reset: bool) -> Result<()> {
    let store = open_store(db)?;
    if reset {
        store.clear_all().context("Failed to clear the index")?;
        eprintln!("Index cleared.");
    }

    for root in &config.roots {
        eprintln!("Indexing {}...", root.display());
    }

    let indexer = Indexer::new(config, Arc::clone(&store));
    let summary = indexer.run().context("Indexing failed")?;

    println!();
    println!("{}", "─".repeat(SEP_WIDTH));
    println!(
        " Indexed {} files ({}) in {:.2}s",
        summary.files_indexed,
        format_size(summary.bytes_indexed),
        summary.elapsed.as_secs_f64()
    );
    println!(
        " Hashed: {}   Promotions: {}   Errors: {}",
        summary.hashed, summary.promotions, summary.errors
    );
    println!(
        " Throughput: {}/s",
        format_size(summary.bytes_per_second() as u64)
    );
    println!("{}", "─".repeat(SEP_WIDTH));

    if !summary.warnings.is_empty() {
        println!();
        println!("{} warning(s) during indexing", summary.warnings.len());
    }

    Ok(())
}

/// Report duplicates folder by folder.
fn run_report(
    db: Option<&Path>,
    config: ReportConfig,
    view: ReportView,
    format: OutputFormat,
) -> Result<()> {
    let store = open_store(db)?;
    let reporter = DuplicateReporter::new(config, store);

    match format {
        OutputFormat::Text => {
            let overall = reporter
                .for_each_folder(|folder| {
                    if folder.visible && view != ReportView::Overall {
                        print_folder(&folder, view == ReportView::Files);
                    }
                })
                .context("Report failed")?;

            println!("{}", "─".repeat(SEP_WIDTH));
            println!("OVERALL STATS");
            print!("{}", stats_summary(&overall));
            println!("{}", "─".repeat(SEP_WIDTH));
        }
        OutputFormat::Json => {
            let report = reporter.report().context("Report failed")?;
            let json = if view == ReportView::Overall {
                serde_json::to_string_pretty(&report.overall)?
            } else {
                serde_json::to_string_pretty(&report)?
            };
            println!("{}", json);
        }
    }

    Ok(())
}

/// Show index location and totals.
fn run_stats(db: Option<&Path>) -> Result<()> {
    let store = open_store(db)?;
    let files = store.count_files().context("Failed to count files")?;
    let folders = store.count_folders().context("Failed to count folders")?;

    println!(" Index:   {}", store.path().display());
    println!(" Files:   {}", files);
    println!(" Folders: {}", folders);
    Ok(())
}

fn open_store(db: Option<&Path>) -> Result<Arc<IndexStore>> {
    let store = match db {
        Some(path) => IndexStore::open(path),
        None => IndexStore::open_default(),
    }
    .context("Failed to open the index")?;
    Ok(Arc::new(store))
}

/// Canonicalize every path, failing on the first that does not exist.
fn validate_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    paths
        .iter()
        .map(|path| {
            path.canonicalize()
                .with_context(|| format!("Invalid path: {}", path.display()))
        })
        .collect()
}

/// Root for `index` when no path is given.
fn default_index_root() -> PathBuf {
    if running_as_root() {
        return PathBuf::from("/");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(unix)]
fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    // Files under /proc/self belong to the effective user.
    std::fs::metadata("/proc/self").is_ok_and(|m| m.uid() == 0)
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

/// Print a folder header, its counters and optionally its files.
fn print_folder(folder: &FolderReport, with_files: bool) {
    println!("{}", "─".repeat(SEP_WIDTH));
    println!("FOLDER: {}", folder.folder.display());
    print!("{}", stats_summary(&folder.stats));
    println!("{}", "─".repeat(SEP_WIDTH));

    if with_files {
        let width = folder
            .listed_files()
            .map(|f| f.name.chars().count())
            .max()
            .map_or(0, |w| (w + 8).min(NAME_COLUMN_MAX));

        for file in folder.listed_files() {
            match &file.classification {
                Classification::Duplicate { others } => {
                    println!(
                        "  {:<width$} {}: ({})",
                        file.name,
                        file.classification.label(),
                        format_size(file.size)
                    );
                    for other in others {
                        println!("{}- {}", " ".repeat(8), other.display());
                    }
                }
                Classification::Unique => println!(
                    "  {:<width$} {} ({})",
                    file.name,
                    file.classification.label(),
                    format_size(file.size)
                ),
                Classification::IgnoredZeroSize | Classification::IgnoredNotIndexed => {
                    println!("  {:<width$} {}", file.name, file.classification.label())
                }
            }
        }
    }
    println!();
}

/// Render counters as an indented block.
fn stats_summary(stats: &Stats) -> String {
    format!(
        "\tFILES: {}\t\t\tSIZE: {}\n\
         \tDUPLICATES: {}  [{}]\tDUP_SIZE: {} [{}]\n\
         \tIGNORED: {}\t\t\tIGN_SIZE: {}\n",
        stats.file_count,
        format_size(stats.total_bytes),
        stats.duplicate_count,
        format_percent(stats.duplicate_percentage()),
        format_size(stats.duplicate_bytes),
        format_percent(stats.duplicate_byte_percentage()),
        stats.ignored_count,
        format_size(stats.ignored_bytes),
    )
}

fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |p| format!("{p:.1}%"))
}

/// Parse a size string (e.g., "1KB", "2.5M", "512").
fn parse_size(s: &str) -> Result<u64> {
    const UNITS: [(&str, u64); 7] = [
        ("GB", 1 << 30),
        ("G", 1 << 30),
        ("MB", 1 << 20),
        ("M", 1 << 20),
        ("KB", 1 << 10),
        ("K", 1 << 10),
        ("B", 1),
    ];

    let s = s.trim().to_uppercase();
    let (num, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|num| (num, *mult)))
        .unwrap_or((s.as_str(), 1));

    let num: f64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid size: {s}"))?;
    if !num.is_finite() || num < 0.0 {
        bail!("Size must be a non-negative number, got {s}");
    }
    Ok((num * multiplier as f64) as u64)
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
