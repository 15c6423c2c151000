//! Entity repository
//!
//! Owns the in-memory event collection and enforces its invariants:
//! titles are non-empty, records carry a derived duration, and every id is
//! unique across events and records. The repository does not touch the
//! durable store; callers stage a clone, mutate it, persist, then swap it in.

use std::collections::HashSet;

use tracing::warn;

use crate::error::{Result, TallyError};
use crate::models::{Event, EventId, Record, RecordDraft, RecordId};

/// Default events shown on first run
const SEED_EVENTS: &str = r#"[
  {
    "id": 1001,
    "title": "Launch Preparation",
    "description": "Checklist for getting the launch capsule ready.",
    "createdAt": "2024-11-20T08:15:00Z",
    "records": [
      { "id": 5001, "date": "2024-11-20", "startTime": "08:30", "endTime": "09:10", "note": "Subsystem warmup" },
      { "id": 5002, "date": "2024-11-20", "startTime": "10:00", "endTime": "11:05", "note": "Safety review" }
    ]
  },
  {
    "id": 1002,
    "title": "Research Sprint",
    "description": "Deep work window for data investigation.",
    "createdAt": "2024-11-21T07:00:00Z",
    "records": [
      { "id": 6001, "date": "2024-11-21", "startTime": "13:15", "endTime": "15:00", "note": "Model validation" }
    ]
  }
]"#;

/// The built-in example dataset
pub fn seed_events() -> Vec<Event> {
    match serde_json::from_str(SEED_EVENTS) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Seed dataset failed to decode");
            Vec::new()
        }
    }
}

/// In-memory event collection
#[derive(Debug, Clone, PartialEq)]
pub struct EventRepository {
    events: Vec<Event>,
    next_id: u64,
}

impl EventRepository {
    /// Empty repository
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
        }
    }

    /// Repository populated with the seed dataset
    pub fn seeded() -> Self {
        Self::from_events(seed_events())
    }

    /// Adopt an existing collection; new ids continue after the largest one
    pub fn from_events(events: Vec<Event>) -> Self {
        let max_id = events
            .iter()
            .flat_map(|e| std::iter::once(e.id).chain(e.records.iter().map(|r| r.id)))
            .max()
            .unwrap_or(0);

        Self {
            events,
            next_id: max_id + 1,
        }
    }

    /// Never hand out `id` or anything below it
    ///
    /// Used for ids that only survive in the pending log (e.g. an event that
    /// was created and then deleted before it reached the remote).
    pub fn reserve_through(&mut self, id: u64) {
        self.next_id = self.next_id.max(id + 1);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn position(&self, id: EventId) -> Result<usize> {
        self.events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| TallyError::event_not_found(id))
    }

    fn event_mut(&mut self, id: EventId) -> Result<&mut Event> {
        let index = self.position(id)?;
        Ok(&mut self.events[index])
    }

    /// Create an event with no records and append it
    pub fn create_event(&mut self, title: &str, description: &str) -> Result<Event> {
        let title = validate_title(title)?;
        let event = Event::new(self.allocate_id(), title, description.trim().to_string());
        self.events.push(event.clone());
        Ok(event)
    }

    /// Replace an event wholesale, keeping its position
    ///
    /// Record ids in the replacement must be unique and must not collide
    /// with any other event or record. The id sequence moves past them.
    pub fn update_event(&mut self, mut event: Event) -> Result<Event> {
        let index = self.position(event.id)?;
        event.title = validate_title(&event.title)?;
        self.check_record_ids(index, &event)?;
        for record in &mut event.records {
            record.refresh_duration()?;
        }

        if let Some(max) = event.records.iter().map(|r| r.id).max() {
            self.reserve_through(max);
        }
        self.events[index] = event.clone();
        Ok(event)
    }

    fn check_record_ids(&self, index: usize, event: &Event) -> Result<()> {
        let mut taken: HashSet<u64> = HashSet::new();
        for (i, other) in self.events.iter().enumerate() {
            if i != index {
                taken.insert(other.id);
                taken.extend(other.records.iter().map(|r| r.id));
            }
        }
        taken.insert(event.id);

        for record in &event.records {
            if !taken.insert(record.id) {
                return Err(TallyError::validation(format!(
                    "record id {} is already in use",
                    record.id
                )));
            }
        }
        Ok(())
    }

    /// Remove an event and all of its records
    pub fn delete_event(&mut self, id: EventId) -> Result<Event> {
        let index = self.position(id)?;
        Ok(self.events.remove(index))
    }

    /// Add a record to the front of an event's record list
    pub fn create_record(&mut self, event_id: EventId, draft: RecordDraft) -> Result<Record> {
        self.position(event_id)?;

        let record = draft.into_record(self.next_id)?;
        self.next_id += 1;

        self.event_mut(event_id)?.records.insert(0, record.clone());
        Ok(record)
    }

    /// Replace a record in place; its duration is recomputed
    pub fn update_record(&mut self, event_id: EventId, mut record: Record) -> Result<Record> {
        record.refresh_duration()?;

        let event = self.event_mut(event_id)?;
        let slot = event
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| TallyError::record_not_found(record.id))?;
        *slot = record.clone();
        Ok(record)
    }

    /// Remove a single record
    pub fn delete_record(&mut self, event_id: EventId, record_id: RecordId) -> Result<Record> {
        let event = self.event_mut(event_id)?;
        let index = event
            .records
            .iter()
            .position(|r| r.id == record_id)
            .ok_or_else(|| TallyError::record_not_found(record_id))?;
        Ok(event.records.remove(index))
    }
}

impl Default for EventRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TallyError::validation("title is required"));
    }
    Ok(title.to_string())
}
