//! Tally CLI
//!
//! Command-line interface for Tally - events and the time logged against them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tally_core::{Config, EventId, RecordId, StorageError, TallyError, Tracker};

mod commands;
mod output;
mod prompt;

use commands::record::RecordSpan;
use commands::CliTracker;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - Local-first event and time tracking")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage events
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },
    /// Manage the records logged against an event
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Push pending changes to the remote
    Sync {
        /// Retry a failed sync this many times
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Show status (counts, pending operations, sync state)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Run a mirror server that other devices sync to
    Serve {
        /// Address to listen on
        #[arg(long, default_value = commands::serve::DEFAULT_LISTEN)]
        listen: String,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    /// Create a new event
    #[command(alias = "add")]
    Create {
        /// Event title
        title: String,
        /// Event description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List all events
    #[command(alias = "ls")]
    List,
    /// Show an event and its records
    Show {
        /// Event ID
        id: EventId,
    },
    /// Edit an event (prompts when no flags are given)
    Edit {
        /// Event ID
        id: EventId,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete an event and its records
    #[command(alias = "rm")]
    Delete {
        /// Event ID
        id: EventId,
    },
    /// Show duration totals for an event
    Stats {
        /// Event ID
        id: EventId,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Log time against an event
    #[command(alias = "create")]
    Add {
        /// Event ID
        event_id: EventId,
        #[command(flatten)]
        span: RecordSpan,
    },
    /// Change a record
    Edit {
        /// Event ID
        event_id: EventId,
        /// Record ID
        record_id: RecordId,
        #[command(flatten)]
        span: RecordSpan,
    },
    /// Delete a record
    #[command(alias = "rm")]
    Delete {
        /// Event ID
        event_id: EventId,
        /// Record ID
        record_id: RecordId,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_url, sync_enabled, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let result = run(cli, &output).await;

    if let Some(hint) = result.as_ref().err().and_then(storage_hint) {
        output.warning(&format!("Hint: {hint}"));
    }
    result
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::config_file_path);

    // Commands that don't need the tracker
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &config_path, output);
    }

    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;

    if let Commands::Serve { listen } = &cli.command {
        return commands::serve::serve(&config, listen, output).await;
    }

    let tracker = Tracker::open(&config).context("Failed to open data directory")?;
    tracker.wait_for_initialization().await;

    let is_write = matches!(
        &cli.command,
        Commands::Event {
            command: EventCommands::Create { .. }
                | EventCommands::Edit { .. }
                | EventCommands::Delete { .. }
        } | Commands::Record { .. }
    );

    let result = match cli.command {
        Commands::Event { command } => handle_event_command(command, &tracker, output),
        Commands::Record { command } => handle_record_command(command, &tracker, output),
        Commands::Sync { retries } => {
            commands::sync::sync(&tracker, &config, retries, output).await
        }
        Commands::Status => commands::status::show(&tracker, &config, output),
        Commands::Config { .. } | Commands::Serve { .. } => unreachable!(), // Handled above
    };

    // Push changes right after writing them
    if is_write && result.is_ok() {
        commands::sync::sync_quiet(&tracker, &config, output).await;
    }

    result
}

/// Recovery hint for a storage failure anywhere in the error chain
fn storage_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.chain().find_map(|cause| {
        if let Some(TallyError::Storage(storage)) = cause.downcast_ref::<TallyError>() {
            return storage.recovery_suggestion();
        }
        cause
            .downcast_ref::<StorageError>()
            .and_then(StorageError::recovery_suggestion)
    })
}

/// Log to stderr when TALLY_LOG is set (e.g. TALLY_LOG=tally_core=debug)
fn init_logging() {
    let Ok(filter) = EnvFilter::try_from_env("TALLY_LOG") else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_event_command(command: EventCommands, tracker: &CliTracker, output: &Output) -> Result<()> {
    match command {
        EventCommands::Create { title, description } => {
            commands::event::create(tracker, title, description, output)
        }
        EventCommands::List => commands::event::list(tracker, output),
        EventCommands::Show { id } => commands::event::show(tracker, id, output),
        EventCommands::Edit {
            id,
            title,
            description,
        } => commands::event::edit(tracker, id, title, description, output),
        EventCommands::Delete { id } => commands::event::delete(tracker, id, output),
        EventCommands::Stats { id } => commands::event::stats(tracker, id, output),
    }
}

fn handle_record_command(command: RecordCommands, tracker: &CliTracker, output: &Output) -> Result<()> {
    match command {
        RecordCommands::Add { event_id, span } => {
            commands::record::add(tracker, event_id, span, output)
        }
        RecordCommands::Edit {
            event_id,
            record_id,
            span,
        } => commands::record::edit(tracker, event_id, record_id, span, output),
        RecordCommands::Delete {
            event_id,
            record_id,
        } => commands::record::delete(tracker, event_id, record_id, output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: &PathBuf,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record_add() {
        let cli = Cli::try_parse_from([
            "tally", "record", "add", "1001", "--date", "2024-11-22", "--start-time", "09:00",
            "--end", "10:30", "--note", "Deep work", "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Record {
                command: RecordCommands::Add { event_id, span },
            } => {
                assert_eq!(event_id, 1001);
                assert_eq!(span.date.as_deref(), Some("2024-11-22"));
                assert_eq!(span.end_time.as_deref(), Some("10:30"));
                assert_eq!(span.note.as_deref(), Some("Deep work"));
            }
            _ => panic!("expected record add"),
        }
    }

    #[test]
    fn test_date_conflicts_with_start_date() {
        let result = Cli::try_parse_from([
            "tally", "record", "add", "1", "--date", "2024-11-22", "--start-date", "2024-11-22",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_storage_hint_found_through_context() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let storage = StorageError::from_io(io_err, PathBuf::from("/data/events.json"));
        let err = anyhow::Error::from(TallyError::Storage(storage)).context("Failed to create event");

        assert!(storage_hint(&err).unwrap().contains("permissions"));
    }

    #[test]
    fn test_storage_hint_for_open_failure() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = anyhow::Error::from(StorageError::CreateDirectory {
            path: PathBuf::from("/data"),
            source: io_err,
        })
        .context("Failed to open data directory");

        assert!(storage_hint(&err).is_some());
    }

    #[test]
    fn test_no_hint_for_other_errors() {
        let err = anyhow::Error::from(TallyError::Validation("title is required".to_string()));
        assert!(storage_hint(&err).is_none());
        assert!(storage_hint(&anyhow::anyhow!("plain failure")).is_none());
    }

    #[test]
    fn test_serve_default_listen() {
        let cli = Cli::try_parse_from(["tally", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { listen } => assert_eq!(listen, "127.0.0.1:3030"),
            _ => panic!("expected serve"),
        }
    }
}
