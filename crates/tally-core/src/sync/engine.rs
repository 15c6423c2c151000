//! Sync engine
//!
//! Drains the pending-operation queue against a remote. At most one cycle
//! runs at a time; a request issued while a cycle is in flight awaits that
//! cycle's outcome instead of starting another.
//!
//! Failures never surface as `Err`. They are recorded in the sync state and
//! handed to the registered error callback together with a [`RetryHandle`].

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::remote::{AckStatus, OpAck, Remote, RemoteError};
use super::state::{SyncPhase, SyncState};
use crate::local::LocalState;
use crate::queue::PendingOperation;
use crate::storage::{KeyValueStore, StorageError};

/// A sync cycle that any number of callers can await
pub(crate) type SyncCycle = Shared<BoxFuture<'static, bool>>;

/// Callback receiving sync failures
pub type SyncErrorCallback = Arc<dyn Fn(SyncError) + Send + Sync>;

/// Broad cause of a failed sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncErrorKind {
    /// The remote could not be reached or did not answer in time
    Network,
    /// The remote refused an operation or left it unacknowledged
    Rejected,
    /// The local queue could not be persisted
    Storage,
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncErrorKind::Network => write!(f, "network"),
            SyncErrorKind::Rejected => write!(f, "rejected"),
            SyncErrorKind::Storage => write!(f, "storage"),
        }
    }
}

/// Starts another sync cycle from whatever is still unacknowledged
#[derive(Clone)]
pub struct RetryHandle {
    start: Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>,
}

impl RetryHandle {
    pub(crate) fn new(start: impl Fn() -> BoxFuture<'static, bool> + Send + Sync + 'static) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Run a sync cycle (or join the one in flight); resolves to its outcome
    pub fn retry(&self) -> BoxFuture<'static, bool> {
        (self.start)()
    }
}

impl fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryHandle")
    }
}

/// Report handed to the sync error callback
#[derive(Debug, Clone)]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
    pub retry: RetryHandle,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sync failed ({}): {}", self.kind, self.message)
    }
}

/// Why a cycle stopped
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncFailure {
    pub kind: SyncErrorKind,
    pub message: String,
}

impl SyncFailure {
    fn rejected(message: String) -> Self {
        Self {
            kind: SyncErrorKind::Rejected,
            message,
        }
    }
}

impl From<RemoteError> for SyncFailure {
    fn from(e: RemoteError) -> Self {
        Self {
            kind: SyncErrorKind::Network,
            message: e.to_string(),
        }
    }
}

impl From<StorageError> for SyncFailure {
    fn from(e: StorageError) -> Self {
        Self {
            kind: SyncErrorKind::Storage,
            message: e.to_string(),
        }
    }
}

/// Single-flight coordinator and owner of the sync state
#[derive(Default)]
pub(crate) struct SyncEngine {
    state: Mutex<SyncState>,
    in_flight: Mutex<Option<SyncCycle>>,
    on_error: Mutex<Option<SyncErrorCallback>>,
}

impl SyncEngine {
    pub fn state(&self) -> SyncState {
        self.state.lock().clone()
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.lock().phase
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        debug!(?phase, "Tracker phase changed");
        self.state.lock().phase = phase;
    }

    pub fn set_error_callback(&self, callback: Option<SyncErrorCallback>) {
        *self.on_error.lock() = callback;
    }

    /// Join the cycle in flight, or start one with `start`
    pub fn join_or_start(&self, start: impl FnOnce() -> BoxFuture<'static, bool>) -> SyncCycle {
        let mut in_flight = self.in_flight.lock();
        if let Some(cycle) = in_flight.as_ref() {
            debug!("Sync already in progress; joining it");
            return cycle.clone();
        }

        let cycle = start().shared();
        *in_flight = Some(cycle.clone());
        cycle
    }

    pub fn begin_cycle(&self) {
        self.state.lock().begin_cycle();
    }

    /// Record a drained queue
    pub fn succeed(&self, pushed: usize) {
        self.state.lock().succeed(Utc::now());
        self.in_flight.lock().take();
        info!(pushed, "Sync complete");
    }

    /// Record a failed cycle and report it to the callback
    pub fn fail(&self, failure: SyncFailure, retry: RetryHandle) {
        self.state.lock().fail(failure.message.clone());
        self.in_flight.lock().take();
        warn!(kind = %failure.kind, "Sync failed: {}", failure.message);

        let callback = self.on_error.lock().clone();
        if let Some(callback) = callback {
            callback(SyncError {
                kind: failure.kind,
                message: failure.message,
                retry,
            });
        }
    }

    /// Record a failure that is not reported to the callback
    pub fn note_error(&self, message: String) {
        self.state.lock().last_error = Some(message);
    }
}

/// Push batches until the queue is empty or something fails
///
/// Returns the number of operations the remote accepted.
pub(crate) async fn drain_queue<S, R>(
    local: &Mutex<LocalState<S>>,
    remote: &R,
    batch_size: usize,
) -> Result<usize, SyncFailure>
where
    S: KeyValueStore,
    R: Remote,
{
    let batch_size = batch_size.max(1);
    let mut pushed = 0;

    loop {
        let batch = local.lock().begin_attempt(batch_size);
        if batch.is_empty() {
            return Ok(pushed);
        }

        debug!(operations = batch.len(), "Pushing batch");
        let acks = match remote.push(&batch).await {
            Ok(acks) => acks,
            Err(e) => {
                if let Err(storage) = local.lock().persist_queue() {
                    warn!(error = %storage, "Failed to persist attempt counts");
                }
                return Err(e.into());
            }
        };

        let (accepted, problem) = evaluate(&batch, &acks);
        if !accepted.is_empty() {
            local.lock().acknowledge(&accepted)?;
            pushed += accepted.len();
        }

        if let Some(problem) = problem {
            return Err(problem);
        }
    }
}

/// Split a batch into accepted ids and the first problem, if any
fn evaluate(batch: &[PendingOperation], acks: &[OpAck]) -> (Vec<Uuid>, Option<SyncFailure>) {
    let mut accepted = Vec::new();
    let mut problem = None;

    for op in batch {
        match acks.iter().find(|ack| ack.op_id == op.op_id).map(|ack| &ack.status) {
            Some(AckStatus::Accepted) => accepted.push(op.op_id),
            Some(AckStatus::Rejected { reason }) => {
                problem.get_or_insert_with(|| {
                    SyncFailure::rejected(format!(
                        "{:?} {} {} rejected: {reason}",
                        op.kind(),
                        op.entity(),
                        op.target_id()
                    ))
                });
            }
            None => {
                problem.get_or_insert_with(|| {
                    SyncFailure::rejected(format!("no acknowledgement for operation {}", op.op_id))
                });
            }
        }
    }

    (accepted, problem)
}
