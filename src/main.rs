//! Asset Scanner CLI
//!
//! Checks a game build's assets against a JSON rule file.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use asset_scanner::paths::{expand_path, validate_game_path};
use asset_scanner::{ScanConfig, ScanError, Scanner};

const ABOUT: &str = r#"
Asset Scanner - compliance checks for interactive-media asset trees

Examples:
  asset_scanner scan -p ~/games/demo/deploy                  scan with no rules (counts only)
  asset_scanner scan -p ./deploy -c scan-rules.json          scan against a rule file
  asset_scanner scan -p ./deploy -c rules.json --json        print the result as JSON
  asset_scanner scan -p ./deploy -c rules.json --progress    JSON progress events on stderr
  asset_scanner validate -p ./deploy                         check the build folder layout
"#;

/// Compliance scanner for game asset trees
#[derive(Parser)]
#[command(name = "asset_scanner")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan an asset tree against a rule file
    Scan {
        /// Root directory of the assets (`~` is expanded)
        #[arg(short = 'p', long)]
        path: String,

        /// JSON rule file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Worker threads (0 = auto)
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,

        /// Print the scan result as JSON
        #[arg(long)]
        json: bool,

        /// Do not print report lines
        #[arg(short = 'q', long)]
        quiet: bool,

        /// Emit JSON progress events on stderr
        #[arg(long)]
        progress: bool,
    },

    /// Check that a path is a game build folder containing an index.html
    Validate {
        /// Path to the game build folder
        #[arg(short = 'p', long)]
        path: String,
    },
}

fn run_scan(
    path: &str,
    config: Option<PathBuf>,
    threads: usize,
    json: bool,
    quiet: bool,
    progress: bool,
) -> Result<(), ScanError> {
    let root = expand_path(path);
    let scan_config = match config {
        Some(config_path) => {
            info!("Loading rules from {:?}", config_path);
            ScanConfig::load(&expand_path(&config_path.to_string_lossy()))?
        }
        None => {
            info!("No rule file given, every file will be counted as skipped");
            ScanConfig::default()
        }
    };

    let result = Scanner::new(scan_config)
        .num_threads(threads)
        .log_results(!json && !quiet)
        .show_progress(progress)
        .scan(&root)?;

    if json {
        let rendered = serde_json::to_string_pretty(&result)
            .map_err(|e| ScanError::config(None, e.to_string()))?;
        println!("{}", rendered);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::Scan {
            path,
            config,
            threads,
            json,
            quiet,
            progress,
        }) => {
            info!("Starting asset scan...");
            info!("Path: {}", path);
            info!(
                "Threads: {}",
                if threads == 0 {
                    "auto".to_string()
                } else {
                    threads.to_string()
                }
            );
            run_scan(&path, config, threads, json, quiet, progress)
        }
        Some(Commands::Validate { path }) => validate_game_path(&path).map(|resolved| {
            println!("{} valid (resolved to {})", path, resolved.display());
        }),
        None => {
            println!("{}", ABOUT);
            println!("Use 'asset_scanner scan --help' for the scan options");
            return ExitCode::SUCCESS;
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
