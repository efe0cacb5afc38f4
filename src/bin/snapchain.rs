//! # Snapchain CLI - daily incremental backups
//!
//! Command-line front end for the snapchain library, meant to be run once a
//! day from cron or a systemd timer.
//!
//! ## Usage
//! ```bash
//! # Back up for today's date (full archive on the first run)
//! snapchain --config backup.json backup
//!
//! # Restore the latest state, or the state as of a date
//! snapchain --config backup.json restore
//! snapchain --config backup.json restore 2024-03-02 --target /tmp/restore
//!
//! # Show backed-up dates and check the store
//! snapchain --config backup.json list
//! snapchain --config backup.json verify
//! ```
//!
//! ## Exit codes
//! - `0` success
//! - `2` hard failure (mount, scan, I/O, corrupt store, bad configuration)
//! - `3` a backup already ran today
//! - `4` the restore date is malformed or has no snapshot

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use snapchain::error::EXIT_OK;
use snapchain::mount;
use snapchain::{
    format_bytes, parse_date, ArchiveCompression, RestoreOptions, Result, Snapchain,
    SnapchainConfig, SnapchainError,
};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Snapchain CLI - incremental, date-stamped directory backups
#[derive(Parser)]
#[command(name = "snapchain")]
#[command(version)]
#[command(about = "Incremental daily backups with point-in-time restore")]
#[command(long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to back up (overrides the configuration)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Backup store directory (overrides the configuration)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Archive compression for new archives
    #[arg(long, global = true)]
    compression: Option<ArchiveCompression>,

    /// Also append log output to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the source for today's date
    Backup {
        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Restore the source tree as of a date (latest if omitted)
    #[command(alias = "rs")]
    Restore {
        /// Snapshot date, YYYY-MM-DD
        date: Option<String>,

        /// Directory to restore into (defaults to restore_path from the configuration)
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Warn instead of failing when a deleted file is already missing
        #[arg(long)]
        lenient: bool,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// List backed-up dates and their artifacts
    #[command(alias = "ls")]
    List,

    /// Check that every artifact matches the snapshots
    Verify,
}

/// Tracing target for fatal errors; kept out of the console layer, which
/// already gets the coloured message
const FATAL_TARGET: &str = "snapchain::fatal";

/// Parse a restore date argument; anything but a `YYYY-MM-DD` calendar date
/// is refused like an unknown date
fn parse_restore_date(arg: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    arg.map(|s| {
        parse_date(s).ok_or_else(|| SnapchainError::MalformedRestoreDate {
            input: s.to_string(),
        })
    })
    .transpose()
}

fn main() {
    let cli = Cli::parse();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let code = match run(cli) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            tracing::error!(target: FATAL_TARGET, "{}", e);
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    init_logging(cli.verbose, config.log_file.as_ref())
        .map_err(|e| SnapchainError::InvalidConfiguration(format!("{:#}", e)))?;

    if let Some(mount_config) = &config.mount {
        mount::ensure_mounted(mount_config)?;
    }

    match cli.command {
        Commands::Backup { progress } => cmd_backup(config, progress),
        Commands::Restore {
            date,
            target,
            lenient,
            progress,
        } => cmd_restore(config, date, target, lenient, progress),
        Commands::List => cmd_list(config),
        Commands::Verify => cmd_verify(config),
    }
}

/// Build the configuration from the file and command-line overrides
fn resolve_config(cli: &Cli) -> Result<SnapchainConfig> {
    let mut config = match (&cli.config, &cli.source, &cli.store) {
        (Some(path), _, _) => SnapchainConfig::load(path)?,
        (None, Some(source), Some(store)) => SnapchainConfig::new(source.clone(), store.clone()),
        (None, _, _) => {
            return Err(SnapchainError::InvalidConfiguration(
                "pass --config, or both --source and --store".to_string(),
            ))
        }
    };

    if let Some(source) = &cli.source {
        config.source_path = source.clone();
    }
    if let Some(store) = &cli.store {
        config.store_path = store.clone();
    }
    if let Some(compression) = cli.compression {
        config.compression = compression;
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = Some(log_file.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Console logging on stderr, plus an append-mode file when configured
fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    use anyhow::Context;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {:?}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter_fn(|meta| meta.target() != FATAL_TARGET)),
        )
        .with(file_layer)
        .try_init()
        .context("logging already initialized")?;

    Ok(())
}

fn spinner(show: bool, message: &'static str) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Back up the source for today's date
fn cmd_backup(config: SnapchainConfig, show_progress: bool) -> Result<()> {
    let snapchain = Snapchain::new(config)?;
    println!("{}", "Starting backup...".blue().bold());

    let progress = spinner(show_progress, "Scanning and archiving files...");
    let result = snapchain.backup_today();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let report = result?;

    let kind = if report.is_base { "full" } else { "incremental" };
    println!(
        "{} Created {} backup for {}",
        "✓".green().bold(),
        kind,
        report.date.to_string().yellow().bold()
    );
    println!("  Files: {}", report.file_count.to_string().cyan());
    if !report.is_base {
        println!("  Added: {}", report.changes.added.len().to_string().green());
        println!("  Modified: {}", report.changes.modified.len().to_string().yellow());
        println!("  Deleted: {}", report.changes.removed.len().to_string().red());
    }
    for artifact in &report.artifacts {
        let size = fs::metadata(&artifact.path).map(|m| m.len()).unwrap_or(0);
        println!(
            "  {} {} ({})",
            "+".green(),
            artifact.path.display().to_string().cyan(),
            format_bytes(size)
        );
    }
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
    Ok(())
}

/// Restore the tree as of a date
fn cmd_restore(
    config: SnapchainConfig,
    date: Option<String>,
    target: Option<PathBuf>,
    lenient: bool,
    show_progress: bool,
) -> Result<()> {
    let date = parse_restore_date(date.as_deref())?;
    let target = target.or_else(|| config.restore_path.clone()).ok_or_else(|| {
        SnapchainError::InvalidConfiguration(
            "no restore target: pass --target or set restore_path".to_string(),
        )
    })?;
    let options = RestoreOptions {
        target_date: date,
        strict_deletes: config.strict_deletes && !lenient,
    };
    let snapchain = Snapchain::new(config)?;

    println!(
        "{} {}",
        "Restoring into".blue().bold(),
        target.display().to_string().yellow()
    );

    let progress = spinner(show_progress, "Replaying backup chain...");
    let result = snapchain.restore(&target, options);
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let report = result?;

    println!(
        "{} Restored state of {}",
        "✓".green().bold(),
        report.restored_date.to_string().yellow().bold()
    );
    println!("  Dates replayed: {}", report.dates_replayed.len().to_string().cyan());
    println!("  Archives: {}", report.archives_extracted.to_string().cyan());
    println!("  Files extracted: {}", report.files_extracted.to_string().cyan());
    println!("  Files deleted: {}", report.files_deleted.to_string().yellow());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );

    if !report.missing_deletes.is_empty() {
        println!("\n{}", "Already missing:".yellow().bold());
        for path in &report.missing_deletes {
            println!("  - {}", path.display().to_string().yellow());
        }
    }
    Ok(())
}

/// List backed-up dates
fn cmd_list(config: SnapchainConfig) -> Result<()> {
    let snapchain = Snapchain::new(config)?;
    let history = snapchain.history()?;

    if history.is_empty() {
        println!("{}", "No backups yet.".yellow());
        return Ok(());
    }

    println!("{}", "Backups:".bold());
    for entry in &history {
        let kinds: Vec<String> = entry
            .artifacts
            .iter()
            .map(|a| a.kind.to_string())
            .collect();
        let kinds = if kinds.is_empty() {
            "no changes".dimmed().to_string()
        } else {
            kinds.join(", ")
        };
        println!(
            "  {}  {:>8} files  {}",
            entry.date.to_string().yellow(),
            entry.file_count,
            kinds
        );
    }
    println!("\n{} dates", history.len().to_string().cyan());
    Ok(())
}

/// Verify the store
fn cmd_verify(config: SnapchainConfig) -> Result<()> {
    let snapchain = Snapchain::new(config)?;
    let report = snapchain.verify()?;

    if report.is_valid() {
        println!("{} {}", "✓".green().bold(), report.summary());
        return Ok(());
    }

    println!("{} {}", "✗".red().bold(), report.summary());
    for issue in &report.issues {
        let date = issue
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {}: {}",
            date.yellow(),
            issue.path.display(),
            issue.message.red()
        );
    }
    Err(SnapchainError::corruption(
        snapchain.store().root(),
        format!("{} verification issues", report.issues.len()),
    ))
}
