//! QSYNC CLI
//!
//! Command-line interface for QSYNC - a replicated amateur radio contact log.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use qsync_core::{Config, Replica};

mod commands;
mod editor;
mod output;

use commands::qso::QsoFields;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "qsync")]
#[command(about = "QSYNC - Replicated amateur radio contact log")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a new QSO
    Add {
        /// Callsign of the other station
        callsign: String,
        #[command(flatten)]
        fields: QsoFields,
    },
    /// Edit a QSO (opens $EDITOR when no fields are given)
    Edit {
        /// QSO ID (full or prefix)
        id: String,
        /// New callsign
        #[arg(short, long)]
        callsign: Option<String>,
        #[command(flatten)]
        fields: QsoFields,
    },
    /// Delete a QSO
    #[command(alias = "rm")]
    Delete {
        /// QSO ID (full or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List QSOs, newest first
    #[command(alias = "ls")]
    List {
        /// Only QSOs whose callsign contains this text
        #[arg(short, long)]
        callsign: Option<String>,
        /// Show at most this many
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show every field of a QSO
    Show {
        /// QSO ID (full or prefix)
        id: String,
    },
    /// Import QSOs from CSV (`-` reads stdin)
    Import {
        /// CSV file
        path: PathBuf,
    },
    /// Export all QSOs as CSV, oldest first
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Pull updates from the exchange and retry undelivered ones
    Sync {
        /// Replay this exchange file into the local log instead
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,
    },
    /// Show status (log size, exchange, storage)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Interactive logging shell
    Shell,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, exchange_path, max_payload_size, storage,
        /// delete_confirm_ms, station_grid, log_file, log_level)
        key: String,
        /// Configuration value ("none" or "" clears optional keys)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.clone().unwrap_or_else(Config::config_file_path);

    // Config commands work on the file directly and never open the log
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(&config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key.clone(), value.clone(), &config_path, &output)
            }
        };
    }

    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;
    init_logging(&config);

    let mut replica = Replica::open(&config);

    let is_write = matches!(
        &cli.command,
        Commands::Add { .. }
            | Commands::Edit { .. }
            | Commands::Delete { .. }
            | Commands::Import { .. }
    );

    // Catch up with the exchange before reading or changing anything
    let caught_up = replica.poll();
    debug!(inserted = caught_up.inserted, "Replayed exchange");

    let result = match cli.command {
        Commands::Add { callsign, fields } => {
            commands::qso::add(&mut replica, &config, callsign, fields, &output)
        }
        Commands::Edit {
            id,
            callsign,
            fields,
        } => commands::qso::edit(&mut replica, id, callsign, fields, &output),
        Commands::Delete { id, yes } => commands::qso::delete(&mut replica, id, yes, &output),
        Commands::List { callsign, limit } => {
            commands::qso::list(&replica, callsign, limit, &output)
        }
        Commands::Show { id } => commands::qso::show(&replica, id, &output),
        Commands::Import { path } => commands::io::import(&mut replica, path, &output),
        Commands::Export { output: path } => commands::io::export(&replica, path, &output),
        Commands::Sync { from } => commands::sync::sync(&mut replica, &config, from, &output),
        Commands::Status => commands::status::show(&replica, &config, &config_path, &output),
        Commands::Shell => return commands::shell::run(replica, &config, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    // Let the originator see its own update
    if is_write {
        replica.poll();
    }

    result
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Logs go to `log_file` when set,
/// otherwise to stderr.
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "qsync_core={level},qsync_cli={level}",
            level = config.log_level
        ))
    });

    let writer = match &config.log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                BoxMakeWriter::new(std::io::stderr)
            }
        },
        None => BoxMakeWriter::new(std::io::stderr),
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(config.log_file.is_none())
        .with_writer(writer)
        .try_init();
}
