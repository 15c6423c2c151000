//! Sync command handler

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use tally_core::{Config, SyncError};

use super::CliTracker;
use crate::output::Output;

/// Pause between a failed cycle and its retry
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Push pending operations to the remote
pub async fn sync(tracker: &CliTracker, config: &Config, retries: u32, output: &Output) -> Result<()> {
    if !config.sync_enabled {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             tally config set sync_enabled true\n  \
             tally config set remote_url ws://your-server:3030"
        );
    }

    let Some(ref remote_url) = config.remote_url else {
        bail!(
            "Remote URL not configured. Set it with:\n  \
             tally config set remote_url ws://your-server:3030"
        );
    };

    let pending = tracker.pending_operations().len();
    output.message(&format!(
        "Pushing {} pending operation(s) to {}...",
        pending, remote_url
    ));

    let last_failure: Arc<Mutex<Option<SyncError>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&last_failure);
    tracker.set_sync_error_callback(move |error| {
        *sink.lock() = Some(error);
    });

    let mut synced = tracker.sync_to_remote().await;
    let mut attempt = 0;
    while !synced && attempt < retries {
        let Some(failure) = take(&last_failure) else {
            break;
        };
        attempt += 1;
        output.warning(&format!("{} (retry {}/{})", failure, attempt, retries));
        tokio::time::sleep(RETRY_DELAY).await;
        synced = failure.retry.retry().await;
    }

    tracker.clear_sync_error_callback();

    if synced {
        output.success(&format!("Sync complete - {} operation(s) pushed", pending));
        return Ok(());
    }

    let status = tracker.sync_status();
    let reason = match take(&last_failure) {
        Some(failure) => failure.to_string(),
        None => status.last_error.unwrap_or_else(|| "sync failed".to_string()),
    };
    bail!(
        "{}\n{} operation(s) still pending; they will be retried on the next sync.",
        reason,
        status.pending_operations
    )
}

/// Sync quietly (for auto-sync) - only reports failures
pub async fn sync_quiet(tracker: &CliTracker, config: &Config, output: &Output) {
    if !config.sync_configured() {
        return;
    }

    if !tracker.sync_to_remote().await {
        let reason = tracker
            .sync_status()
            .last_error
            .unwrap_or_else(|| "unknown error".to_string());
        output.warning(&format!("Auto-sync failed: {}", reason));
    }
}

fn take(slot: &Mutex<Option<SyncError>>) -> Option<SyncError> {
    slot.lock().take()
}
