//! Local state
//!
//! Pairs the repository and the pending queue with the durable store. Every
//! change is staged on a copy, written to the store, and only then swapped
//! into memory, so the cache never runs ahead of what is on disk.

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{Result, TallyError};
use crate::models::Event;
use crate::queue::{Operation, OperationQueue, PendingOperation};
use crate::repository::EventRepository;
use crate::storage::{
    read_json, write_json, KeyValueStore, StorageError, StorageResult, EVENTS_BACKUP_KEY,
    EVENTS_KEY, PENDING_KEY,
};

pub(crate) struct LocalState<S> {
    store: S,
    repo: EventRepository,
    queue: OperationQueue,
    ready: bool,
    /// Set when mutating could destroy data that was never backed up
    write_block: Option<String>,
}

impl<S: KeyValueStore> LocalState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            repo: EventRepository::new(),
            queue: OperationQueue::new(),
            ready: false,
            write_block: None,
        }
    }

    pub fn repo(&self) -> &EventRepository {
        &self.repo
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// Persisted event collection, `None` when never written
    pub fn load_events(&self) -> StorageResult<Option<Vec<Event>>> {
        read_json(&self.store, EVENTS_KEY)
    }

    /// Persisted pending log, `None` when never written
    pub fn load_queue(&self) -> StorageResult<Option<OperationQueue>> {
        read_json(&self.store, PENDING_KEY)
    }

    /// Install hydrated state and accept mutations from now on
    pub fn install(&mut self, mut repo: EventRepository, queue: OperationQueue) {
        if let Some(max) = queue.max_target_id() {
            repo.reserve_through(max);
        }
        self.repo = repo;
        self.queue = queue;
        self.ready = true;
    }

    /// Copy the unreadable `events` blob aside so the next write cannot
    /// destroy it; refuse mutations if the copy fails
    pub fn set_aside_unreadable_events(&mut self) {
        let copied = self.store.read(EVENTS_KEY).and_then(|blob| match blob {
            Some(bytes) => self.store.write(EVENTS_BACKUP_KEY, &bytes),
            None => Ok(()),
        });

        match copied {
            Ok(()) => warn!(backup = EVENTS_BACKUP_KEY, "Kept a copy of the unreadable events"),
            Err(e) => {
                error!(error = %e, "Could not back up unreadable events; refusing writes");
                self.write_block = Some(format!(
                    "stored events could not be read or backed up ({e}); not overwriting them"
                ));
            }
        }
    }

    /// Write the current event collection
    pub fn persist_events(&self) -> StorageResult<()> {
        write_json(&self.store, EVENTS_KEY, self.repo.events())
    }

    /// Write the current pending log
    pub fn persist_queue(&self) -> StorageResult<()> {
        write_json(&self.store, PENDING_KEY, &self.queue)
    }

    /// Apply a repository mutation and enqueue the operation it produced
    ///
    /// Both records are written before the in-memory state changes. If the
    /// queue write fails the events record is restored, leaving the store as
    /// it was before the call.
    pub fn apply<T>(
        &mut self,
        mutation: impl FnOnce(&mut EventRepository) -> Result<(T, Operation)>,
    ) -> Result<T> {
        if !self.ready {
            return Err(TallyError::NotInitialized);
        }
        if let Some(reason) = &self.write_block {
            return Err(StorageError::Unavailable(reason.clone()).into());
        }

        let mut repo = self.repo.clone();
        let (value, operation) = mutation(&mut repo)?;

        let pending = PendingOperation::new(operation);
        debug!(
            op_id = %pending.op_id,
            kind = ?pending.kind(),
            entity = %pending.entity(),
            target = pending.target_id(),
            "Queued operation"
        );
        let mut queue = self.queue.clone();
        queue.enqueue(pending);

        write_json(&self.store, EVENTS_KEY, repo.events())?;
        if let Err(e) = write_json(&self.store, PENDING_KEY, &queue) {
            if let Err(restore) = self.persist_events() {
                error!(error = %restore, "Failed to restore events after queue write failure");
            }
            return Err(e.into());
        }

        self.repo = repo;
        self.queue = queue;
        Ok(value)
    }

    /// Take the next batch and count the attempt
    pub fn begin_attempt(&mut self, limit: usize) -> Vec<PendingOperation> {
        let batch = self.queue.peek_batch(limit);
        let ids: Vec<Uuid> = batch.iter().map(|op| op.op_id).collect();
        self.queue.record_attempt(&ids);
        self.queue.peek_batch(limit)
    }

    /// Drop acknowledged operations and persist the shorter queue
    pub fn acknowledge(&mut self, op_ids: &[Uuid]) -> StorageResult<()> {
        let mut queue = self.queue.clone();
        for op_id in op_ids {
            queue.ack(*op_id);
        }

        write_json(&self.store, PENDING_KEY, &queue)?;
        self.queue = queue;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn ready(store: MemoryStore) -> LocalState<MemoryStore> {
        let mut local = LocalState::new(store);
        local.install(EventRepository::seeded(), OperationQueue::new());
        local
    }

    fn create(local: &mut LocalState<MemoryStore>, title: &str) -> Result<Event> {
        local.apply(|repo| {
            let event = repo.create_event(title, "")?;
            Ok((event.clone(), Operation::CreateEvent { event }))
        })
    }

    #[test]
    fn test_mutation_before_install_is_refused() {
        let mut local = LocalState::new(MemoryStore::new());
        let err = create(&mut local, "Reading").unwrap_err();
        assert!(matches!(err, TallyError::NotInitialized));
    }

    #[test]
    fn test_apply_persists_both_records() {
        let store = MemoryStore::new();
        let mut local = ready(store.clone());

        create(&mut local, "Reading").unwrap();

        let events: Vec<Event> = read_json(&store, EVENTS_KEY).unwrap().unwrap();
        let queue: OperationQueue = read_json(&store, PENDING_KEY).unwrap().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_failed_mutation_changes_nothing() {
        let store = MemoryStore::new();
        let mut local = ready(store.clone());

        assert!(create(&mut local, "  ").is_err());
        assert_eq!(local.repo().len(), 2);
        assert!(local.queue().is_empty());
        assert!(!store.contains(EVENTS_KEY));
    }

    #[test]
    fn test_storage_failure_keeps_memory_and_disk_unchanged() {
        let store = MemoryStore::new();
        let mut local = ready(store.clone());
        local.persist_events().unwrap();
        store.set_fail_writes(true);

        let err = create(&mut local, "Reading").unwrap_err();
        assert!(matches!(err, TallyError::Storage(_)));
        assert_eq!(local.repo().len(), 2);
        assert!(local.queue().is_empty());

        let events: Vec<Event> = read_json(&store, EVENTS_KEY).unwrap().unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_queue_write_failure_restores_events_record() {
        let store = MemoryStore::new();
        let mut local = ready(store.clone());
        local.persist_events().unwrap();
        store.set_fail_key(PENDING_KEY, true);

        assert!(create(&mut local, "Reading").is_err());

        let events: Vec<Event> = read_json(&store, EVENTS_KEY).unwrap().unwrap();
        assert_eq!(events.len(), 2);
        assert!(!store.contains(PENDING_KEY));
        assert_eq!(local.repo().len(), 2);
    }

    #[test]
    fn test_unreadable_events_are_copied_before_overwrite() {
        let store = MemoryStore::new();
        store.write(EVENTS_KEY, b"{ half a file").unwrap();
        let mut local = ready(store.clone());

        local.set_aside_unreadable_events();
        create(&mut local, "Reading").unwrap();

        assert_eq!(
            store.read(EVENTS_BACKUP_KEY).unwrap(),
            Some(b"{ half a file".to_vec())
        );
        let events: Vec<Event> = read_json(&store, EVENTS_KEY).unwrap().unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_failed_backup_blocks_writes() {
        let store = MemoryStore::new();
        store.write(EVENTS_KEY, b"{ half a file").unwrap();
        store.set_fail_key(EVENTS_BACKUP_KEY, true);
        let mut local = ready(store.clone());

        local.set_aside_unreadable_events();
        let err = create(&mut local, "Reading").unwrap_err();

        assert!(matches!(err, TallyError::Storage(StorageError::Unavailable(_))));
        assert_eq!(store.read(EVENTS_KEY).unwrap(), Some(b"{ half a file".to_vec()));
        assert!(local.queue().is_empty());
    }

    #[test]
    fn test_install_reserves_ids_from_queue() {
        let mut queue = OperationQueue::new();
        queue.enqueue(PendingOperation::new(Operation::DeleteEvent { event_id: 9000 }));

        let mut local = LocalState::new(MemoryStore::new());
        local.install(EventRepository::seeded(), queue);

        let event = create(&mut local, "Reading").unwrap();
        assert_eq!(event.id, 9001);
    }

    #[test]
    fn test_begin_attempt_and_acknowledge() {
        let store = MemoryStore::new();
        let mut local = ready(store.clone());
        create(&mut local, "One").unwrap();
        create(&mut local, "Two").unwrap();

        let batch = local.begin_attempt(1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].attempt_count, 1);

        local.acknowledge(&[batch[0].op_id]).unwrap();
        assert_eq!(local.queue().len(), 1);

        let persisted: OperationQueue = read_json(&store, PENDING_KEY).unwrap().unwrap();
        assert_eq!(persisted.len(), 1);
    }
}
