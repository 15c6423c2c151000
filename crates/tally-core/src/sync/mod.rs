//! Synchronization with a remote mirror
//!
//! Local mutations are recorded as pending operations and pushed, oldest
//! first, by the sync engine. The remote applies each operation at most once
//! (keyed by its `op_id`) and acknowledges it; only acknowledged operations
//! leave the local queue.
//!
//! ## Protocol
//!
//! One request per WebSocket connection, CBOR-encoded binary frames:
//!
//! 1. `pull` → `snapshot { events }`
//! 2. `push { operations }` → `pushResult { acks }`
//!
//! Either request may be answered with `error { message }`.
//!
//! ## Usage
//!
//! ```ignore
//! let remote = WebSocketRemote::new("ws://localhost:3030");
//! let tracker = Tracker::new(store, remote, TrackerOptions::default());
//! tracker.sync_to_remote().await;
//! ```

mod client;
pub(crate) mod engine;
mod memory;
mod message;
mod mirror;
mod remote;
mod server;
mod state;

pub use client::{WebSocketRemote, DEFAULT_TIMEOUT};
pub use engine::{RetryHandle, SyncError, SyncErrorCallback, SyncErrorKind};
pub use memory::MemoryRemote;
pub use message::{ClientMessage, ServerMessage};
pub use mirror::{Mirror, MIRROR_APPLIED_KEY, MIRROR_EVENTS_KEY};
pub use remote::{AckStatus, OpAck, Remote, RemoteError};
pub use server::MirrorServer;
pub use state::{SyncPhase, SyncState, SyncStatus};
