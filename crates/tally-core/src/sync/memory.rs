//! In-process remote backed by a [`Mirror`]
//!
//! Clones share state, so a test can hand one clone to a tracker and use
//! another to take the remote offline or inspect what it received.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use super::mirror::Mirror;
use super::remote::{OpAck, Remote, RemoteError};
use crate::models::Event;
use crate::queue::PendingOperation;

#[derive(Debug, Default)]
struct Shared {
    mirror: Mutex<Mirror>,
    offline: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    pushes: AtomicUsize,
    received: Mutex<Vec<Uuid>>,
}

/// Remote living in the same process
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    shared: Arc<Shared>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote that already holds `events`
    pub fn with_events(events: Vec<Event>) -> Self {
        let remote = Self::new();
        *remote.shared.mirror.lock() = Mirror::with_events(events);
        remote
    }

    /// Fail every request with `reason` until [`MemoryRemote::go_online`]
    pub fn go_offline(&self, reason: impl Into<String>) {
        *self.shared.offline.lock() = Some(reason.into());
    }

    pub fn go_online(&self) {
        *self.shared.offline.lock() = None;
    }

    /// Delay every push by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.shared.latency.lock() = Some(latency);
    }

    /// Number of push requests received, including failed ones
    pub fn push_count(&self) -> usize {
        self.shared.pushes.load(Ordering::SeqCst)
    }

    /// Every operation id received, in arrival order (repeats included)
    pub fn received_op_ids(&self) -> Vec<Uuid> {
        self.shared.received.lock().clone()
    }

    /// Current remote event collection
    pub fn events(&self) -> Vec<Event> {
        self.shared.mirror.lock().events().to_vec()
    }

    /// Number of distinct operations applied
    pub fn applied_count(&self) -> usize {
        self.shared.mirror.lock().applied_count()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        match self.shared.offline.lock().as_ref() {
            Some(reason) => Err(RemoteError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl Remote for MemoryRemote {
    async fn pull(&self) -> Result<Vec<Event>, RemoteError> {
        self.check_online()?;
        Ok(self.events())
    }

    async fn push(&self, operations: &[PendingOperation]) -> Result<Vec<OpAck>, RemoteError> {
        self.shared.pushes.fetch_add(1, Ordering::SeqCst);

        let latency = *self.shared.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.check_online()?;

        self.shared
            .received
            .lock()
            .extend(operations.iter().map(|op| op.op_id));
        Ok(self.shared.mirror.lock().apply_batch(operations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Operation;
    use crate::repository::seed_events;

    #[tokio::test]
    async fn test_pull_returns_remote_events() {
        let remote = MemoryRemote::with_events(seed_events());
        let events = remote.pull().await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_offline_remote_fails_requests() {
        let remote = MemoryRemote::new();
        remote.go_offline("unplugged");

        let err = remote.pull().await.unwrap_err();
        assert_eq!(err, RemoteError::Unavailable("unplugged".to_string()));

        let op = PendingOperation::new(Operation::DeleteEvent { event_id: 1 });
        assert!(remote.push(&[op]).await.is_err());
        assert_eq!(remote.push_count(), 1);
        assert!(remote.received_op_ids().is_empty());

        remote.go_online();
        assert!(remote.pull().await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let remote = MemoryRemote::new();
        let handle = remote.clone();

        let event = seed_events().remove(0);
        let op = PendingOperation::new(Operation::CreateEvent { event });
        let acks = remote.push(std::slice::from_ref(&op)).await.unwrap();

        assert!(acks[0].is_accepted());
        assert_eq!(handle.events().len(), 1);
        assert_eq!(handle.received_op_ids(), vec![op.op_id]);
    }
}
