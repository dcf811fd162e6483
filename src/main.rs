//! foldersize - recursive folder size listings.
//!
//! Usage:
//!   foldersize scan [PATHS...]    List children with subtree totals
//!   foldersize export [PATH]      Export a folder analysis to JSON
//!   foldersize --help             Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use foldersize_core::{ChildRecord, FolderAnalysis};
use foldersize_scan::{AggregationCache, DirectoryScanner, OsFilesystem, ScanConfig};

#[derive(Parser)]
#[command(
    name = "foldersize",
    version,
    about = "Recursive folder size listings",
    long_about = "foldersize lists the immediate children of a directory, each with the \
                  total size, file count and folder count of everything below it.\n\n\
                  Set FOLDERSIZE_LOG to control log output (e.g. FOLDERSIZE_LOG=debug)."
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List children with their subtree totals
    Scan {
        /// Directories to scan, sharing one cache
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Order of the listing
        #[arg(short, long, default_value = "size")]
        sort: SortOrder,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Leave hidden children out of the listing
        #[arg(long)]
        no_hidden: bool,

        /// Worker threads for directory children (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,

        /// Show per-child progress on stderr
        #[arg(short, long)]
        progress: bool,
    },

    /// Export a folder analysis to JSON
    Export {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum SortOrder {
    /// Largest first
    #[default]
    Size,
    /// Alphabetical
    Name,
    /// Directory order
    None,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan {
            paths,
            sort,
            format,
            no_hidden,
            threads,
            progress,
        } => {
            let config = ScanConfig::builder()
                .threads(threads)
                .include_hidden(!no_hidden)
                .build()
                .context("Invalid scan configuration")?;
            let scanner = Arc::new(build_scanner(config)?);

            for path in &paths {
                let mut analysis = run_analysis(&scanner, path, progress).await?;
                apply_sort(&mut analysis, sort);
                match format {
                    OutputFormat::Text => print_analysis(&analysis),
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&analysis.items)?);
                    }
                }
            }

            if cli.verbose {
                let stats = scanner.cache().stats();
                eprintln!(
                    "cache: {} hits, {} misses, {} invalidations, {} walks, {} seeded, {} entries",
                    stats.hits,
                    stats.misses,
                    stats.invalidations,
                    stats.walks,
                    stats.seeded,
                    stats.entries
                );
            }
        }
        Command::Export { path, output } => {
            let scanner = Arc::new(build_scanner(ScanConfig::default())?);
            let analysis = run_analysis(&scanner, &path, false).await?;
            run_export(&analysis, output)?;
        }
    }

    Ok(())
}

/// Install the stderr log subscriber.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("FOLDERSIZE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_scanner(config: ScanConfig) -> Result<DirectoryScanner> {
    let cache = Arc::new(AggregationCache::new(Arc::new(OsFilesystem)));
    DirectoryScanner::with_config(config, cache).context("Failed to create scanner")
}

/// Analyze one path off the async runtime; Ctrl-C cancels it.
async fn run_analysis(
    scanner: &Arc<DirectoryScanner>,
    path: &Path,
    show_progress: bool,
) -> Result<FolderAnalysis> {
    eprintln!("Scanning {}...", path.display());

    let progress_task = show_progress.then(|| {
        let mut progress_rx = scanner.subscribe();
        tokio::spawn(async move {
            loop {
                match progress_rx.recv().await {
                    Ok(progress) => eprint!(
                        "\r {}/{} children, {}   ",
                        progress.children_done,
                        progress.children_total,
                        format_size(progress.bytes_aggregated)
                    ),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let cancel = CancellationToken::new();
    let task = scanner
        .clone()
        .analyze_async(path.to_path_buf(), cancel.clone());
    tokio::pin!(task);

    let result = tokio::select! {
        result = &mut task => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!("Cancelling...");
            cancel.cancel();
            task.await
        }
    };

    if let Some(handle) = progress_task {
        handle.abort();
        eprintln!();
    }

    let analysis = result.with_context(|| format!("Scan of {} failed", path.display()))?;
    debug!(
        path = %analysis.current_path.display(),
        items = analysis.item_count,
        elapsed_ms = analysis.analysis_time.as_millis() as u64,
        "analysis finished"
    );
    Ok(analysis)
}

fn apply_sort(analysis: &mut FolderAnalysis, sort: SortOrder) {
    match sort {
        SortOrder::Size => analysis.order_by_heaviest(),
        SortOrder::Name => analysis.items.sort_by(|a, b| a.name.cmp(&b.name)),
        SortOrder::None => {}
    }
}

/// Print a listing with a summary header.
fn print_analysis(analysis: &FolderAnalysis) {
    println!();
    println!("{}", "─".repeat(72));
    println!(
        " {} - {}",
        analysis.current_path.display(),
        format_size(analysis.total_size)
    );
    println!(
        " {} files, {} folders, {} items",
        analysis.file_count, analysis.folder_count, analysis.item_count
    );
    println!(" Scanned in {:.2}s", analysis.analysis_time.as_secs_f64());
    println!("{}", "─".repeat(72));
    println!();

    for record in &analysis.items {
        print_record(record, analysis.total_size);
    }

    if !analysis.complete {
        println!();
        println!(
            "* partial totals: {} issue(s) during scan",
            analysis.issues.len()
        );
    }
}

fn print_record(record: &ChildRecord, total_size: u64) {
    let ratio = if total_size > 0 {
        record.size as f64 / total_size as f64
    } else {
        0.0
    };

    let name = if record.is_dir() {
        format!("{}/", record.name)
    } else {
        record.name.to_string()
    };
    let marker = if record.complete { ' ' } else { '*' };

    let counts = if record.is_dir() {
        format!("{} files, {} folders", record.file_count, record.folder_count)
    } else {
        record.file_type.to_string()
    };

    println!(
        "{}{:<36} {:>10} {:>5.1}% {} {}",
        marker,
        truncate(&name, 36),
        format_size(record.size),
        ratio * 100.0,
        make_bar(ratio, 10),
        counts
    );
}

/// Export an analysis to JSON.
fn run_export(analysis: &FolderAnalysis, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(analysis)?;

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 1).collect();
        format!("{}…", kept)
    }
}
