//! Pending-operation queue
//!
//! An ordered log of local mutations the remote has not acknowledged yet.
//! Operations leave the queue only when the remote accepts their exact
//! `op_id`; they are never reordered or coalesced.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EntityKind, Event, EventId, Record, RecordId};

/// What a mutation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// A mutation with its payload snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    CreateEvent { event: Event },
    UpdateEvent { event: Event },
    DeleteEvent { event_id: EventId },
    CreateRecord { event_id: EventId, record: Record },
    UpdateRecord { event_id: EventId, record: Record },
    DeleteRecord { event_id: EventId, record_id: RecordId },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateEvent { .. } | Operation::CreateRecord { .. } => OperationKind::Create,
            Operation::UpdateEvent { .. } | Operation::UpdateRecord { .. } => OperationKind::Update,
            Operation::DeleteEvent { .. } | Operation::DeleteRecord { .. } => OperationKind::Delete,
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            Operation::CreateEvent { .. }
            | Operation::UpdateEvent { .. }
            | Operation::DeleteEvent { .. } => EntityKind::Event,
            _ => EntityKind::Record,
        }
    }

    /// Id of the entity the operation changes
    pub fn target_id(&self) -> u64 {
        match self {
            Operation::CreateEvent { event } | Operation::UpdateEvent { event } => event.id,
            Operation::DeleteEvent { event_id } => *event_id,
            Operation::CreateRecord { record, .. } | Operation::UpdateRecord { record, .. } => {
                record.id
            }
            Operation::DeleteRecord { record_id, .. } => *record_id,
        }
    }
}

/// One queued mutation awaiting remote acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Stable id; the remote treats a repeated id as a no-op
    pub op_id: Uuid,
    pub operation: Operation,
    pub enqueued_at: DateTime<Utc>,
    /// Number of pushes this operation has been part of
    #[serde(default)]
    pub attempt_count: u32,
}

impl PendingOperation {
    pub fn new(operation: Operation) -> Self {
        Self {
            op_id: Uuid::new_v4(),
            operation,
            enqueued_at: Utc::now(),
            attempt_count: 0,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn entity(&self) -> EntityKind {
        self.operation.entity()
    }

    pub fn target_id(&self) -> u64 {
        self.operation.target_id()
    }
}

/// FIFO log of pending operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationQueue {
    ops: VecDeque<PendingOperation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation
    pub fn enqueue(&mut self, op: PendingOperation) {
        self.ops.push_back(op);
    }

    /// Up to `limit` operations from the front, in submission order
    pub fn peek_batch(&self, limit: usize) -> Vec<PendingOperation> {
        self.ops.iter().take(limit).cloned().collect()
    }

    /// Remove a confirmed operation; returns false if it was not queued
    pub fn ack(&mut self, op_id: Uuid) -> bool {
        match self.ops.iter().position(|op| op.op_id == op_id) {
            Some(index) => {
                self.ops.remove(index);
                true
            }
            None => false,
        }
    }

    /// Count one more push attempt for each of the given operations
    pub fn record_attempt(&mut self, op_ids: &[Uuid]) {
        for op in self.ops.iter_mut().filter(|op| op_ids.contains(&op.op_id)) {
            op.attempt_count += 1;
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.ops.iter()
    }

    /// Largest entity id referenced by any queued operation
    pub fn max_target_id(&self) -> Option<u64> {
        self.ops.iter().map(PendingOperation::target_id).max()
    }
}
