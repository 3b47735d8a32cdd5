//! Command-line interface for the pipeline tools.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::processors::{summarize_tiles, DirectorySync};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "lidar-pipeline")]
#[command(about = "Point cloud pipeline support tools", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Periodically move results from a source to a destination directory
    MoveFiles {
        /// Path to the source directory
        source_directory: PathBuf,
        /// Path to the destination directory
        destination_directory: PathBuf,
        /// Directory or file names to exclude from moving
        #[arg(long = "exclude_list", alias = "exclude-list", num_args = 0.., value_name = "NAME")]
        exclude_list: Vec<String>,
        /// Seconds between checks for the control markers
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Attempts per move before giving up on permission errors
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Seconds to wait between attempts
        #[arg(long)]
        retry_delay: Option<u64>,
    },

    /// Extract fields from LAS info reports into a CSV table
    SummarizeTiles {
        /// Directory containing the text reports
        input_directory: PathBuf,
        /// Path of the CSV file to write
        output_csv: PathBuf,
        /// Report file extension
        #[arg(long)]
        extension: Option<String>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::MoveFiles {
            source_directory,
            destination_directory,
            exclude_list,
            poll_interval,
            max_attempts,
            retry_delay,
        } => {
            let sync_config =
                apply_sync_overrides(&config.sync, poll_interval, max_attempts, retry_delay);
            cmd_move_files(
                &source_directory,
                &destination_directory,
                exclude_list,
                &sync_config,
            );
        }
        Commands::SummarizeTiles {
            input_directory,
            output_csv,
            extension,
        } => {
            let mut summary_config = config.summary.clone();
            if let Some(ext) = extension {
                summary_config.report_extension = ext;
            }
            match summary_config.extension() {
                Ok(ext) => cmd_summarize_tiles(&input_directory, &output_csv, ext),
                Err(e) => {
                    error!("Invalid configuration: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Layer command-line values over the loaded sync configuration.
fn apply_sync_overrides(
    base: &SyncConfig,
    poll_interval: Option<u64>,
    max_attempts: Option<u32>,
    retry_delay: Option<u64>,
) -> SyncConfig {
    let mut config = base.clone();
    if let Some(secs) = poll_interval {
        config.poll_interval_secs = secs;
    }
    if let Some(attempts) = max_attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(secs) = retry_delay {
        config.retry.backoff_secs = secs;
    }
    config
}

fn cmd_move_files(
    source_dir: &Path,
    destination_dir: &Path,
    exclude_list: Vec<String>,
    config: &SyncConfig,
) {
    let start = Instant::now();

    let sync = match DirectorySync::new(source_dir, destination_dir, exclude_list, config) {
        Ok(sync) => sync,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Setup signal handler for graceful shutdown
    let cancel = sync.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        cancel.cancel();
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    match sync.run() {
        Ok(report) => {
            print_summary(
                if report.completed {
                    "Move Complete"
                } else {
                    "Move Interrupted"
                },
                &[
                    ("Source", source_dir.display().to_string()),
                    ("Destination", destination_dir.display().to_string()),
                    ("Moved", report.moved.to_string()),
                    ("Skipped", report.skipped.to_string()),
                    ("Excluded", report.excluded.to_string()),
                    ("Failed", report.failed.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Move failed: {}", e);
            eprintln!("Error: {:#}", anyhow::Error::from(e));
            std::process::exit(1);
        }
    }
}

fn cmd_summarize_tiles(input_dir: &Path, output_csv: &Path, extension: &str) {
    let start = Instant::now();

    let spinner = create_spinner("Extracting fields from LAS info reports...");

    match summarize_tiles(input_dir, output_csv, extension) {
        Ok(outcome) => {
            spinner.finish_and_clear();

            println!("THE WINDOW CAN NOW BE CLOSED SAFELY.");
            println!(
                "Specified details extracted from LAS INFO files in '{}' have been added to '{}'.",
                input_dir.display(),
                output_csv.display()
            );
            println!("Extraction process completed.");

            let columns: Vec<&str> = outcome.columns.iter().map(|f| f.column()).collect();
            print_summary(
                "Tile Summary Complete",
                &[
                    ("Input directory", input_dir.display().to_string()),
                    ("Output CSV", outcome.output.display().to_string()),
                    ("Reports parsed", outcome.reports.len().to_string()),
                    ("Columns", columns.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Summary failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_files_with_exclusions() {
        let cli = Cli::try_parse_from([
            "lidar-pipeline",
            "move-files",
            "/data/work",
            "/data/out",
            "--exclude_list",
            "temp",
            "logs",
        ])
        .unwrap();

        match cli.command {
            Commands::MoveFiles {
                source_directory,
                destination_directory,
                exclude_list,
                poll_interval,
                ..
            } => {
                assert_eq!(source_directory, PathBuf::from("/data/work"));
                assert_eq!(destination_directory, PathBuf::from("/data/out"));
                assert_eq!(exclude_list, vec!["temp", "logs"]);
                assert_eq!(poll_interval, None);
            }
            _ => panic!("Expected MoveFiles"),
        }
    }

    #[test]
    fn test_parse_move_files_defaults_to_no_exclusions() {
        let cli = Cli::try_parse_from(["lidar-pipeline", "move-files", "a", "b"]).unwrap();
        match cli.command {
            Commands::MoveFiles { exclude_list, .. } => assert!(exclude_list.is_empty()),
            _ => panic!("Expected MoveFiles"),
        }
    }

    #[test]
    fn test_parse_summarize_tiles() {
        let cli = Cli::try_parse_from([
            "lidar-pipeline",
            "-vv",
            "summarize-tiles",
            "reports",
            "summary.csv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::SummarizeTiles {
                input_directory,
                output_csv,
                extension,
            } => {
                assert_eq!(input_directory, PathBuf::from("reports"));
                assert_eq!(output_csv, PathBuf::from("summary.csv"));
                assert_eq!(extension, None);
            }
            _ => panic!("Expected SummarizeTiles"),
        }
    }

    #[test]
    fn test_missing_positional_is_rejected() {
        assert!(Cli::try_parse_from(["lidar-pipeline", "move-files", "only-source"]).is_err());
    }

    #[test]
    fn test_sync_overrides() {
        let base = SyncConfig::default();
        let config = apply_sync_overrides(&base, Some(1), None, Some(0));

        assert_eq!(config.poll_interval_secs, 1);
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.retry.backoff_secs, 0);
    }
}
