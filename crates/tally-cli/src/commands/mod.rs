//! Command handlers

use tally_core::{FileStore, Tracker, WebSocketRemote};

pub mod config;
pub mod event;
pub mod record;
pub mod serve;
pub mod status;
pub mod sync;

/// Tracker backed by the data directory and the configured remote
pub type CliTracker = Tracker<FileStore, WebSocketRemote>;
