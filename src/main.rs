mod archive;
mod author;
mod boilerplate;
mod catalog;
mod gutenberg;
mod pipeline;
mod stats;
mod summary;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::gutenberg::{GutenbergMirror, DEFAULT_MIRROR};
use crate::pipeline::{OutputLayout, RunReport};

#[derive(Parser, Debug)]
#[command(name = "Gutenberg Summary Pairs")]
#[command(about = "Pair book summaries with full Project Gutenberg texts and collect corpus statistics")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "../data/booksummaries.txt", help = "Tab-separated book summaries file")]
    summaries: PathBuf,

    #[arg(long, default_value = "../data/SPGC-metadata-2018-07-18.csv", help = "Project Gutenberg metadata CSV")]
    metadata: PathBuf,

    #[arg(long, default_value = "matched_titles.csv", help = "Where to write the title join before filtering")]
    matched_titles: PathBuf,

    #[arg(long, default_value = "../data/books", help = "Output directory for cleaned books (emptied on start)")]
    books_dir: PathBuf,

    #[arg(long, default_value = "../data/summaries", help = "Output directory for summaries (emptied on start)")]
    summaries_dir: PathBuf,

    #[arg(long, default_value = "data_stats.csv", help = "Output CSV of per-pair statistics")]
    stats: PathBuf,

    #[arg(long, default_value = ".", help = "Directory for downloaded archives")]
    work_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_MIRROR, help = "Base URL of the Gutenberg mirror")]
    mirror: String,

    #[arg(short, long, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,
}

fn setup_logging(log_level_str: &str) {
    let level = match log_level_str.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" | "WARNING" => "warn",
        "ERROR" => "error",
        other => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", other);
            "info"
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, elapsed.subsec_millis())
    }
}

fn print_final_summary(start_time: Instant, report: &RunReport, cli: &Cli) -> Result<()> {
    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Joined rows considered: {}", report.rows_considered);
    info!("Skipped as duplicate titles: {}", report.duplicate_titles);
    info!("Skipped on author mismatch: {}", report.author_mismatches);
    if report.failed_downloads > 0 {
        warn!("Failed downloads: {}", report.failed_downloads);
    }
    if report.verbatim_books > 0 {
        warn!("Books kept without boilerplate removal: {}", report.verbatim_books);
    }
    info!("Book/summary pairs written: {}", report.pairs_written);
    info!(
        "Books in: {} ({} files)",
        cli.books_dir.display(),
        pipeline::count_files(&cli.books_dir)?
    );
    info!(
        "Summaries in: {} ({} files)",
        cli.summaries_dir.display(),
        pipeline::count_files(&cli.summaries_dir)?
    );
    info!("Statistics written to: {}", cli.stats.display());
    Ok(())
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    setup_logging(&cli.log_level);
    info!("Starting book/summary pairing");

    let catalog = catalog::load_catalog(&cli.summaries, &cli.metadata, &cli.matched_titles)?;

    let layout = OutputLayout {
        books_dir: cli.books_dir.clone(),
        summaries_dir: cli.summaries_dir.clone(),
        work_dir: cli.work_dir.clone(),
    };
    warn!(
        "Clearing previous output in {} and {}",
        layout.books_dir.display(),
        layout.summaries_dir.display()
    );
    layout.reset()?;

    let mirror = GutenbergMirror::new(&cli.mirror)?;
    info!("Downloading from mirror: {}", cli.mirror);

    let progress_bar = ProgressBar::new(catalog.rows.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({eta})")?
            .progress_chars("=> "),
    );

    let (stats_rows, report) = pipeline::run(&catalog, &mirror, &layout, &progress_bar)?;
    progress_bar.finish_with_message("Catalog processed.");

    stats::write_stats(&stats_rows, &cli.stats)?;
    print_final_summary(start_time, &report, &cli)?;
    info!("-------------------------------------------------------");

    Ok(())
}
