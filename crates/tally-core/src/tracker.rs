//! Tracker facade
//!
//! The `Tracker` is the single entry point for applications. It owns the
//! local state (repository, pending queue, durable store), the sync engine
//! and the subscription hub.
//!
//! Reads and writes are served from memory and never wait on the network.
//! Every write is persisted before it returns and recorded as a pending
//! operation; [`Tracker::sync_to_remote`] pushes those operations to the
//! remote later.
//!
//! ## Usage
//!
//! ```ignore
//! let tracker = Tracker::open(&config)?;
//! tracker.wait_for_initialization().await;
//!
//! let event = tracker.create_event("Reading", "Evening sessions")?;
//! tracker.create_record(event.id, RecordDraft::single_day("2024-11-22", "20:00", "21:15"))?;
//!
//! if tracker.has_changes() {
//!     tracker.sync_to_remote().await;
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::hub::{Subscription, SubscriptionHub};
use crate::local::LocalState;
use crate::models::{Event, EventId, EventStats, Record, RecordDraft, RecordId};
use crate::queue::{Operation, OperationQueue, PendingOperation};
use crate::repository::EventRepository;
use crate::storage::{FileStore, KeyValueStore, StorageResult};
use crate::sync::engine::{drain_queue, SyncEngine};
use crate::sync::{Remote, RetryHandle, SyncError, SyncPhase, SyncStatus, WebSocketRemote};

/// Tunables for a [`Tracker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerOptions {
    /// Maximum operations per push
    pub batch_size: usize,
    /// Seed the example events when no data exists yet
    pub seed_defaults: bool,
    /// Pull the remote snapshot when no local data exists yet
    pub pull_on_init: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            seed_defaults: true,
            pull_on_init: true,
        }
    }
}

impl TrackerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            seed_defaults: config.seed_defaults,
            pull_on_init: config.sync_configured(),
        }
    }
}

struct Inner<S, R> {
    local: Mutex<LocalState<S>>,
    remote: R,
    engine: SyncEngine,
    hub: SubscriptionHub,
    options: TrackerOptions,
    init: OnceCell<()>,
}

/// Local-first event tracker
///
/// Cloning is cheap; clones share the same state.
pub struct Tracker<S, R> {
    inner: Arc<Inner<S, R>>,
}

impl<S, R> Clone for Tracker<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Tracker<FileStore, WebSocketRemote> {
    /// Open the file-backed tracker described by `config`
    ///
    /// The remote is only contacted when sync is enabled and a URL is set.
    pub fn open(config: &Config) -> StorageResult<Self> {
        let store = FileStore::open(&config.data_dir)?;
        let remote = match config.remote_url.as_deref() {
            Some(url) if config.sync_configured() => {
                WebSocketRemote::new(url).with_timeout(config.request_timeout())
            }
            _ => WebSocketRemote::unconfigured(),
        };

        Ok(Self::new(store, remote, TrackerOptions::from_config(config)))
    }
}

impl<S, R> Tracker<S, R>
where
    S: KeyValueStore + 'static,
    R: Remote,
{
    /// Create a tracker; call [`Tracker::wait_for_initialization`] before
    /// mutating
    pub fn new(store: S, remote: R, options: TrackerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                local: Mutex::new(LocalState::new(store)),
                remote,
                engine: SyncEngine::default(),
                hub: SubscriptionHub::new(),
                options,
                init: OnceCell::new(),
            }),
        }
    }

    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    // ==================== Lifecycle ====================

    /// Load local data (or the remote snapshot, or the seed data on first
    /// run); resolves immediately once done
    ///
    /// Concurrent callers share a single initialization. Never fails:
    /// unreadable data degrades to the defaults and an unreachable remote is
    /// only logged.
    pub async fn wait_for_initialization(&self) {
        self.inner.init.get_or_init(|| self.initialize()).await;
    }

    pub fn is_ready(&self) -> bool {
        self.inner.engine.phase() == SyncPhase::Ready
    }

    async fn initialize(&self) {
        let inner = &self.inner;
        inner.engine.set_phase(SyncPhase::Loading);

        let (stored_events, stored_queue) = {
            let local = inner.local.lock();
            (local.load_events(), local.load_queue())
        };

        let mut queue = match stored_queue {
            Ok(queue) => queue.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "Failed to load pending operations; starting with an empty queue");
                OperationQueue::new()
            }
        };

        let mut unreadable = false;
        let (repo, first_run) = match stored_events {
            Ok(Some(events)) => {
                info!(events = events.len(), pending = queue.len(), "Loaded local data");
                (EventRepository::from_events(events), false)
            }
            Ok(None) => {
                let (repo, upload) = self.first_run_repository().await;
                if upload {
                    for event in repo.events() {
                        queue.enqueue(PendingOperation::new(Operation::CreateEvent {
                            event: event.clone(),
                        }));
                    }
                }
                (repo, true)
            }
            Err(e) => {
                error!(error = %e, "Failed to load events; using defaults");
                unreadable = true;
                (self.default_repository(), false)
            }
        };

        {
            let mut local = inner.local.lock();
            if unreadable {
                local.set_aside_unreadable_events();
            }
            local.install(repo, queue);
            // Queue first: events written without their queue would never be uploaded
            if first_run {
                if let Err(e) = local.persist_queue().and_then(|()| local.persist_events()) {
                    warn!(error = %e, "Failed to write initial data");
                }
            }
        }

        inner.engine.set_phase(SyncPhase::Ready);
        inner.hub.notify();
    }

    /// Repository for a store that was never written, and whether its
    /// events still have to be sent to the remote
    async fn first_run_repository(&self) -> (EventRepository, bool) {
        let inner = &self.inner;
        if inner.options.pull_on_init && inner.remote.is_configured() {
            match inner.remote.pull().await {
                Ok(events) if !events.is_empty() => {
                    info!(events = events.len(), "Adopted remote snapshot");
                    return (EventRepository::from_events(events), false);
                }
                Ok(_) => debug!("Remote snapshot is empty"),
                Err(e) => {
                    warn!(error = %e, "Initial pull failed; continuing offline");
                    inner.engine.note_error(e.to_string());
                }
            }
        }
        (self.default_repository(), true)
    }

    fn default_repository(&self) -> EventRepository {
        if self.inner.options.seed_defaults {
            EventRepository::seeded()
        } else {
            EventRepository::new()
        }
    }

    // ==================== Reads ====================

    /// Every event, in collection order
    pub fn get_all_events(&self) -> Vec<Event> {
        self.inner.local.lock().repo().events().to_vec()
    }

    pub fn get_event_by_id(&self, id: EventId) -> Option<Event> {
        self.inner.local.lock().repo().event(id).cloned()
    }

    /// Summary of an event's records
    pub fn event_stats(&self, id: EventId) -> Option<EventStats> {
        self.inner.local.lock().repo().event(id).map(Event::stats)
    }

    /// Whether any local change still awaits remote acknowledgement
    pub fn has_changes(&self) -> bool {
        self.inner.local.lock().queue().has_pending()
    }

    /// Unacknowledged operations, oldest first
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.inner.local.lock().queue().iter().cloned().collect()
    }

    pub fn sync_status(&self) -> SyncStatus {
        let pending = self.inner.local.lock().queue().len();
        SyncStatus::new(self.inner.engine.state(), pending)
    }

    // ==================== Mutations ====================

    pub fn create_event(&self, title: &str, description: &str) -> Result<Event> {
        self.mutate(|repo| {
            let event = repo.create_event(title, description)?;
            Ok((event.clone(), Operation::CreateEvent { event }))
        })
    }

    /// Replace an event (title, description and records) by id
    pub fn update_event(&self, event: Event) -> Result<Event> {
        self.mutate(|repo| {
            let event = repo.update_event(event)?;
            Ok((event.clone(), Operation::UpdateEvent { event }))
        })
    }

    /// Delete an event together with its records
    pub fn delete_event(&self, id: EventId) -> Result<()> {
        self.mutate(|repo| {
            repo.delete_event(id)?;
            Ok(((), Operation::DeleteEvent { event_id: id }))
        })
    }

    pub fn create_record(&self, event_id: EventId, draft: RecordDraft) -> Result<Record> {
        self.mutate(|repo| {
            let record = repo.create_record(event_id, draft)?;
            Ok((
                record.clone(),
                Operation::CreateRecord { event_id, record },
            ))
        })
    }

    pub fn update_record(&self, event_id: EventId, record: Record) -> Result<Record> {
        self.mutate(|repo| {
            let record = repo.update_record(event_id, record)?;
            Ok((
                record.clone(),
                Operation::UpdateRecord { event_id, record },
            ))
        })
    }

    pub fn delete_record(&self, event_id: EventId, record_id: RecordId) -> Result<()> {
        self.mutate(|repo| {
            repo.delete_record(event_id, record_id)?;
            Ok((
                (),
                Operation::DeleteRecord {
                    event_id,
                    record_id,
                },
            ))
        })
    }

    fn mutate<T>(
        &self,
        mutation: impl FnOnce(&mut EventRepository) -> Result<(T, Operation)>,
    ) -> Result<T> {
        let value = self.inner.local.lock().apply(mutation)?;
        self.inner.hub.notify();
        Ok(value)
    }

    // ==================== Sync ====================

    /// Push pending operations until the queue is empty
    ///
    /// Resolves to `true` when everything was acknowledged. On failure the
    /// error callback (if any) receives the details and `false` is returned.
    /// Calling this while a cycle is running joins that cycle.
    pub fn sync_to_remote(&self) -> impl Future<Output = bool> + Send + 'static {
        let tracker = self.clone();
        self.inner
            .engine
            .join_or_start(move || tracker.run_sync_cycle().boxed())
    }

    async fn run_sync_cycle(self) -> bool {
        self.wait_for_initialization().await;

        let inner = &self.inner;
        inner.engine.begin_cycle();

        let synced = match drain_queue(&inner.local, &inner.remote, inner.options.batch_size).await {
            Ok(pushed) => {
                inner.engine.succeed(pushed);
                true
            }
            Err(failure) => {
                inner.engine.fail(failure, self.retry_handle());
                false
            }
        };

        inner.hub.notify();
        synced
    }

    fn retry_handle(&self) -> RetryHandle {
        let tracker = self.clone();
        RetryHandle::new(move || tracker.sync_to_remote().boxed())
    }

    /// Register the callback that receives sync failures, replacing any
    /// previous one
    pub fn set_sync_error_callback(&self, callback: impl Fn(SyncError) + Send + Sync + 'static) {
        self.inner.engine.set_error_callback(Some(Arc::new(callback)));
    }

    pub fn clear_sync_error_callback(&self) {
        self.inner.engine.set_error_callback(None);
    }

    // ==================== Subscriptions ====================

    /// Register a listener called after every committed change
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.hub.subscribe(listener)
    }
}
