//! Tally Core Library
//!
//! This crate provides the core functionality for Tally, a local-first
//! tracker for events and the timed records logged against them.
//!
//! # Architecture
//!
//! - **Local state**: the canonical copy of every event lives on-device and
//!   is persisted as JSON through a [`KeyValueStore`]
//! - **Pending queue**: every local change is recorded as an operation and
//!   kept until the remote acknowledges it
//! - **Sync engine**: pushes queued operations to a [`Remote`], one cycle at
//!   a time, and reports failures through a callback
//!
//! All reads are served from memory; nothing waits on the network.
//!
//! # Quick Start
//!
//! ```text
//! let tracker = Tracker::open(&Config::load()?)?;
//! tracker.wait_for_initialization().await;
//!
//! // Log an hour and a half of focus time
//! let event = tracker.create_event("Focus Block", "")?;
//! tracker.create_record(event.id, RecordDraft::single_day("2024-11-22", "09:00", "10:30"))?;
//!
//! // Push it when online
//! tracker.sync_to_remote().await;
//! ```
//!
//! # Modules
//!
//! - `tracker`: Facade over everything below (main entry point)
//! - `models`: Events, records and duration rules
//! - `repository`: In-memory event collection and its invariants
//! - `queue`: Pending-operation log
//! - `hub`: Change notification
//! - `storage`: Durable key-value stores
//! - `sync`: Remote contract, WebSocket client, mirror server
//! - `config`: Application configuration

pub mod config;
pub mod error;
pub mod hub;
mod local;
pub mod models;
pub mod queue;
pub mod repository;
pub mod storage;
pub mod sync;
pub mod tracker;

pub use config::Config;
pub use error::{Result, TallyError};
pub use hub::{Subscription, SubscriptionHub};
pub use models::{format_minutes, EntityKind, Event, EventId, EventStats, Record, RecordDraft, RecordId};
pub use queue::{Operation, OperationKind, OperationQueue, PendingOperation};
pub use repository::{seed_events, EventRepository};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use sync::{
    MemoryRemote, MirrorServer, Remote, RemoteError, RetryHandle, SyncError, SyncErrorKind,
    SyncPhase, SyncStatus, WebSocketRemote,
};
pub use tracker::{Tracker, TrackerOptions};
