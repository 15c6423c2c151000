//! Server-side operation applier
//!
//! A mirror holds the remote copy of the event collection plus the ids of
//! every operation it has applied. Replaying an applied id is acknowledged
//! without touching the data, which makes client retries safe.

use std::collections::HashSet;

use tracing::{debug, warn};
use uuid::Uuid;

use super::remote::OpAck;
use crate::models::{Event, EventId, Record};
use crate::queue::{Operation, PendingOperation};
use crate::storage::{read_json, write_json, KeyValueStore, StorageResult};

/// Key holding the mirrored event collection
pub const MIRROR_EVENTS_KEY: &str = "mirror_events";

/// Key holding the ids of applied operations
pub const MIRROR_APPLIED_KEY: &str = "mirror_applied_ops";

/// Remote copy of the event collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    events: Vec<Event>,
    applied: HashSet<Uuid>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing collection with no applied history
    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events,
            applied: HashSet::new(),
        }
    }

    /// Load a mirror persisted with [`Mirror::save`]; missing keys yield an
    /// empty mirror
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> StorageResult<Self> {
        let events: Vec<Event> = read_json(store, MIRROR_EVENTS_KEY)?.unwrap_or_default();
        let applied: Vec<Uuid> = read_json(store, MIRROR_APPLIED_KEY)?.unwrap_or_default();

        debug!(
            events = events.len(),
            applied = applied.len(),
            "Loaded mirror"
        );

        Ok(Self {
            events,
            applied: applied.into_iter().collect(),
        })
    }

    /// Persist the events and the applied-id set
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> StorageResult<()> {
        let mut applied: Vec<&Uuid> = self.applied.iter().collect();
        applied.sort();

        write_json(store, MIRROR_EVENTS_KEY, &self.events)?;
        write_json(store, MIRROR_APPLIED_KEY, &applied)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn has_applied(&self, op_id: Uuid) -> bool {
        self.applied.contains(&op_id)
    }

    /// Number of distinct operations applied so far
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Apply a batch in order
    ///
    /// Stops at the first operation that cannot be applied; it and every
    /// operation after it are rejected and left unapplied.
    pub fn apply_batch(&mut self, operations: &[PendingOperation]) -> Vec<OpAck> {
        let mut acks = Vec::with_capacity(operations.len());
        let mut failure: Option<String> = None;

        for op in operations {
            if let Some(reason) = &failure {
                acks.push(OpAck::rejected(
                    op.op_id,
                    format!("not applied after earlier rejection: {reason}"),
                ));
                continue;
            }

            if self.applied.contains(&op.op_id) {
                debug!(op_id = %op.op_id, "Replayed operation; already applied");
                acks.push(OpAck::accepted(op.op_id));
                continue;
            }

            match self.apply(&op.operation) {
                Ok(()) => {
                    self.applied.insert(op.op_id);
                    acks.push(OpAck::accepted(op.op_id));
                }
                Err(reason) => {
                    warn!(op_id = %op.op_id, %reason, "Rejected operation");
                    acks.push(OpAck::rejected(op.op_id, reason.clone()));
                    failure = Some(reason);
                }
            }
        }

        acks
    }

    fn apply(&mut self, operation: &Operation) -> Result<(), String> {
        match operation {
            Operation::CreateEvent { event } | Operation::UpdateEvent { event } => {
                match self.events.iter_mut().find(|e| e.id == event.id) {
                    Some(existing) => *existing = event.clone(),
                    None => self.events.push(event.clone()),
                }
            }
            Operation::DeleteEvent { event_id } => {
                self.events.retain(|e| e.id != *event_id);
            }
            Operation::CreateRecord { event_id, record }
            | Operation::UpdateRecord { event_id, record } => {
                self.upsert_record(*event_id, record)?;
            }
            Operation::DeleteRecord {
                event_id,
                record_id,
            } => {
                if let Some(event) = self.events.iter_mut().find(|e| e.id == *event_id) {
                    event.records.retain(|r| r.id != *record_id);
                }
            }
        }
        Ok(())
    }

    fn upsert_record(&mut self, event_id: EventId, record: &Record) -> Result<(), String> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| format!("event {event_id} does not exist"))?;

        match event.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => event.records.insert(0, record.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordDraft;
    use crate::repository::seed_events;
    use crate::storage::MemoryStore;

    fn record(id: u64) -> Record {
        RecordDraft::single_day("2024-11-22", "09:00", "10:00")
            .into_record(id)
            .unwrap()
    }

    #[test]
    fn test_replayed_operation_is_a_no_op() {
        let mut mirror = Mirror::with_events(seed_events());
        let op = PendingOperation::new(Operation::CreateRecord {
            event_id: 1001,
            record: record(7000),
        });

        let first = mirror.apply_batch(std::slice::from_ref(&op));
        let second = mirror.apply_batch(std::slice::from_ref(&op));

        assert!(first[0].is_accepted());
        assert!(second[0].is_accepted());
        assert_eq!(mirror.events()[0].records.len(), 3);
        assert_eq!(mirror.applied_count(), 1);
    }

    #[test]
    fn test_record_for_missing_event_is_rejected() {
        let mut mirror = Mirror::new();
        let bad = PendingOperation::new(Operation::CreateRecord {
            event_id: 42,
            record: record(7000),
        });
        let after = PendingOperation::new(Operation::DeleteEvent { event_id: 1 });

        let acks = mirror.apply_batch(&[bad.clone(), after.clone()]);

        assert!(!acks[0].is_accepted());
        assert!(!acks[1].is_accepted());
        assert!(!mirror.has_applied(bad.op_id));
        assert!(!mirror.has_applied(after.op_id));
    }

    #[test]
    fn test_delete_of_absent_entities_is_accepted() {
        let mut mirror = Mirror::with_events(seed_events());
        let acks = mirror.apply_batch(&[
            PendingOperation::new(Operation::DeleteEvent { event_id: 9999 }),
            PendingOperation::new(Operation::DeleteRecord {
                event_id: 1001,
                record_id: 9999,
            }),
        ]);

        assert!(acks.iter().all(OpAck::is_accepted));
        assert_eq!(mirror.events().len(), 2);
    }

    #[test]
    fn test_update_event_upserts() {
        let mut mirror = Mirror::new();
        let mut event = seed_events().remove(1);

        mirror.apply_batch(&[PendingOperation::new(Operation::UpdateEvent {
            event: event.clone(),
        })]);
        assert_eq!(mirror.events().len(), 1);

        event.title = "Renamed".to_string();
        mirror.apply_batch(&[PendingOperation::new(Operation::UpdateEvent { event })]);
        assert_eq!(mirror.events().len(), 1);
        assert_eq!(mirror.events()[0].title, "Renamed");
    }

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let mut mirror = Mirror::with_events(seed_events());
        let op = PendingOperation::new(Operation::DeleteEvent { event_id: 1002 });
        mirror.apply_batch(std::slice::from_ref(&op));
        mirror.save(&store).unwrap();

        let loaded = Mirror::load(&store).unwrap();
        assert_eq!(loaded, mirror);
        assert!(loaded.has_applied(op.op_id));
    }

    #[test]
    fn test_load_from_empty_store() {
        let mirror = Mirror::load(&MemoryStore::new()).unwrap();
        assert!(mirror.events().is_empty());
        assert_eq!(mirror.applied_count(), 0);
    }
}
