//! Serve command handler
//!
//! Runs a mirror that other devices push their operations to.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use tally_core::{Config, FileStore, MirrorServer};

use crate::output::Output;

/// Default listen address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3030";

/// Serve the mirror until interrupted
pub async fn serve(config: &Config, listen: &str, output: &Output) -> Result<()> {
    let mirror_dir = config.mirror_dir();
    let store = FileStore::open(&mirror_dir)
        .with_context(|| format!("Failed to open mirror store: {:?}", mirror_dir))?;
    let server = MirrorServer::open(store).context("Failed to load mirror state")?;

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to listen on {}", listen))?;
    let addr = listener.local_addr()?;

    info!(%addr, events = server.event_count(), "Mirror server listening");
    output.message(&format!(
        "Serving {} event(s) on ws://{} (Ctrl-C to stop)",
        server.event_count(),
        addr
    ));

    tokio::select! {
        result = server.run(listener) => result.context("Mirror server stopped")?,
        _ = tokio::signal::ctrl_c() => output.message("Shutting down."),
    }

    Ok(())
}
