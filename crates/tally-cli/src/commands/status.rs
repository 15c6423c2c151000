//! Status command handler

use anyhow::Result;

use tally_core::storage::{EVENTS_KEY, PENDING_KEY};
use tally_core::{Config, FileStore};

use super::CliTracker;
use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(tracker: &CliTracker, config: &Config, output: &Output) -> Result<()> {
    let status = tracker.sync_status();
    let events = tracker.get_all_events();
    let record_count: usize = events.iter().map(|e| e.records.len()).sum();
    let storage_size = FileStore::open(&config.data_dir)?.size_of(&[EVENTS_KEY, PENDING_KEY]);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "remote_url": config.remote_url,
                    "sync_enabled": config.sync_enabled,
                    "sync": status,
                    "storage_size": storage_size,
                    "counts": {
                        "events": events.len(),
                        "records": record_count
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", status.pending_operations);
        }
        OutputFormat::Human => {
            println!("Tally Status");
            println!("============");
            println!();
            println!("Data:");
            println!("  Directory: {}", config.data_dir.display());
            println!("  Events:    {}", events.len());
            println!("  Records:   {}", record_count);
            println!("  Size:      {} bytes", storage_size);
            println!();
            println!("Sync:");
            println!(
                "  Status:    {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(ref url) = config.remote_url {
                println!("  Remote:    {}", url);
            }
            println!("  Pending:   {} operation(s)", status.pending_operations);
            match status.last_synced_at {
                Some(at) => println!("  Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("  Last sync: never (this session)"),
            }
            if let Some(ref error) = status.last_error {
                println!("  Error:     {}", error);
            }
        }
    }

    Ok(())
}
