//! Data models for Tally
//!
//! Defines the core data structures: [`Event`] and its [`Record`]s.
//!
//! Records have a single canonical shape with explicit start and end dates.
//! Older data stored one `date` per record; that form is accepted when
//! decoding and mapped to `start_date == end_date`.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, TallyError};

/// Identifier of an event
pub type EventId = u64;

/// Identifier of a record (drawn from the same sequence as event ids)
pub type RecordId = u64;

/// Date format used in storage and on the wire
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time-of-day format used in storage and on the wire
pub const TIME_FORMAT: &str = "%H:%M";

const MINUTES_PER_DAY: i64 = 24 * 60;

/// The two kinds of entity the tracker stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Event,
    Record,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Event => write!(f, "event"),
            EntityKind::Record => write!(f, "record"),
        }
    }
}

/// A tracked activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier
    pub id: EventId,
    /// Display title (never empty)
    pub title: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// When this event was created
    pub created_at: DateTime<Utc>,
    /// Timed entries, newest first
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Event {
    pub(crate) fn new(id: EventId, title: String, description: String) -> Self {
        Self {
            id,
            title,
            description,
            created_at: Utc::now(),
            records: Vec::new(),
        }
    }

    /// Find one of this event's records
    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Summary of this event's records
    pub fn stats(&self) -> EventStats {
        EventStats::from_records(&self.records)
    }
}

/// One timed entry within an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredRecord")]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,
    #[serde(serialize_with = "serialize_date")]
    pub start_date: NaiveDate,
    #[serde(serialize_with = "serialize_time")]
    pub start_time: NaiveTime,
    #[serde(serialize_with = "serialize_date")]
    pub end_date: NaiveDate,
    #[serde(serialize_with = "serialize_time")]
    pub end_time: NaiveTime,
    /// Derived from the start and end instants
    pub duration_minutes: u32,
    #[serde(default)]
    pub note: String,
}

impl Record {
    /// Start instant (local wall clock)
    pub fn start(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time)
    }

    /// End instant (local wall clock)
    pub fn end(&self) -> NaiveDateTime {
        self.end_date.and_time(self.end_time)
    }

    /// Whether this record uses the single-date form
    pub fn is_single_day(&self) -> bool {
        self.start_date == self.end_date
    }

    /// Recompute `duration_minutes` from the start and end fields
    pub(crate) fn refresh_duration(&mut self) -> Result<()> {
        self.duration_minutes = duration_between(self.start(), self.end())?;
        Ok(())
    }
}

/// Minutes between two wall-clock instants
///
/// A negative span is read as an overnight entry (the legacy single-date
/// form) and wraps by 24 hours. A span that is still negative is rejected.
pub fn duration_between(start: NaiveDateTime, end: NaiveDateTime) -> Result<u32> {
    let mut minutes = (end - start).num_minutes();

    if minutes < 0 {
        minutes += MINUTES_PER_DAY;
    }

    if minutes < 0 {
        return Err(TallyError::validation(format!(
            "end {} is before start {}",
            end.format("%Y-%m-%d %H:%M"),
            start.format("%Y-%m-%d %H:%M")
        )));
    }

    u32::try_from(minutes)
        .map_err(|_| TallyError::validation(format!("duration of {minutes} minutes is too long")))
}

/// Input for creating a record
///
/// Fields are raw strings so that missing or malformed values are reported
/// as validation errors rather than being impossible to express.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub note: String,
}

impl RecordDraft {
    /// A draft spanning explicit start and end dates
    pub fn new(
        start_date: impl Into<String>,
        start_time: impl Into<String>,
        end_date: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            start_date: Some(start_date.into()),
            start_time: Some(start_time.into()),
            end_date: Some(end_date.into()),
            end_time: Some(end_time.into()),
            note: String::new(),
        }
    }

    /// A draft on a single calendar date; an end before the start is overnight
    pub fn single_day(
        date: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        let date = date.into();
        Self::new(date.clone(), start_time, date, end_time)
    }

    /// Attach a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Validate the draft and build a record with the given id
    pub fn into_record(self, id: RecordId) -> Result<Record> {
        let start_date = parse_date("startDate", required("startDate", &self.start_date)?)?;
        let start_time = parse_time("startTime", required("startTime", &self.start_time)?)?;
        let end_date = parse_date("endDate", required("endDate", &self.end_date)?)?;
        let end_time = parse_time("endTime", required("endTime", &self.end_time)?)?;

        let mut record = Record {
            id,
            start_date,
            start_time,
            end_date,
            end_time,
            duration_minutes: 0,
            note: self.note,
        };
        record.refresh_duration()?;
        Ok(record)
    }
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(TallyError::validation(format!("{field} is required"))),
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        TallyError::validation(format!("{field} must be YYYY-MM-DD, got '{value}'"))
    })
}

/// Parse an `HH:MM` time (seconds are accepted and kept)
pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| TallyError::validation(format!("{field} must be HH:MM, got '{value}'")))
}

fn serialize_date<S: Serializer>(date: &NaiveDate, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&date.format(DATE_FORMAT))
}

fn serialize_time<S: Serializer>(time: &NaiveTime, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(TIME_FORMAT))
}

/// On-disk/wire form of a record, accepting both the legacy `date` field and
/// the `startDate`/`endDate` pair. The stored duration is ignored and
/// recomputed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    id: RecordId,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    note: String,
}

impl TryFrom<StoredRecord> for Record {
    type Error = TallyError;

    fn try_from(stored: StoredRecord) -> Result<Self> {
        let draft = RecordDraft {
            start_date: stored.start_date.or_else(|| stored.date.clone()),
            end_date: stored.end_date.or(stored.date),
            start_time: stored.start_time,
            end_time: stored.end_time,
            note: stored.note,
        };
        draft.into_record(stored.id)
    }
}

/// Summary of an event's records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub record_count: usize,
    pub total_minutes: u64,
    pub longest_minutes: u32,
    /// Rounded to the nearest minute
    pub average_minutes: u32,
}

impl EventStats {
    pub fn from_records(records: &[Record]) -> Self {
        let record_count = records.len();
        let total_minutes: u64 = records.iter().map(|r| u64::from(r.duration_minutes)).sum();
        let longest_minutes = records
            .iter()
            .map(|r| r.duration_minutes)
            .max()
            .unwrap_or(0);
        let average_minutes = if record_count == 0 {
            0
        } else {
            let count = record_count as u64;
            ((total_minutes + count / 2) / count) as u32
        };

        Self {
            record_count,
            total_minutes,
            longest_minutes,
            average_minutes,
        }
    }
}

/// Render minutes as `45m`, `2h` or `1h 30m`
pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(draft: RecordDraft) -> Record {
        draft.into_record(1).unwrap()
    }

    #[test]
    fn test_same_day_duration() {
        let r = record(RecordDraft::single_day("2024-11-20", "09:00", "10:30"));
        assert_eq!(r.duration_minutes, 90);
        assert!(r.is_single_day());
    }

    #[test]
    fn test_overnight_single_date_wraps() {
        let r = record(RecordDraft::single_day("2024-11-20", "23:30", "00:15"));
        assert_eq!(r.duration_minutes, 45);
    }

    #[test]
    fn test_multi_day_span_is_not_wrapped() {
        let r = record(RecordDraft::new("2024-01-01", "22:00", "2024-01-02", "06:00"));
        assert_eq!(r.duration_minutes, 480);
        assert!(!r.is_single_day());
    }

    #[test]
    fn test_negative_span_under_a_day_wraps() {
        let r = record(RecordDraft::new("2024-01-02", "10:00", "2024-01-01", "12:00"));
        assert_eq!(r.duration_minutes, 120);
    }

    #[test]
    fn test_span_still_negative_after_wrap_is_rejected() {
        let err = RecordDraft::new("2024-01-03", "10:00", "2024-01-01", "12:00")
            .into_record(1)
            .unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
        assert!(err.to_string().contains("is before start"));
    }

    #[test]
    fn test_equal_start_and_end_is_zero() {
        let r = record(RecordDraft::single_day("2024-11-20", "08:00", "08:00"));
        assert_eq!(r.duration_minutes, 0);
    }

    #[test]
    fn test_missing_fields_are_validation_errors() {
        let mut draft = RecordDraft::single_day("2024-11-20", "08:00", "09:00");
        draft.end_time = None;
        let err = draft.into_record(1).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: endTime is required");

        let mut draft = RecordDraft::single_day("2024-11-20", "08:00", "09:00");
        draft.start_date = Some("   ".to_string());
        assert!(matches!(
            draft.into_record(1),
            Err(TallyError::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_time_is_rejected() {
        let err = RecordDraft::single_day("2024-11-20", "8 o'clock", "09:00")
            .into_record(1)
            .unwrap_err();
        assert!(err.to_string().contains("startTime"));
    }

    #[test]
    fn test_record_serializes_canonical_shape() {
        let r = record(RecordDraft::single_day("2024-11-20", "08:30", "09:10").with_note("warmup"));
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["startDate"], "2024-11-20");
        assert_eq!(json["startTime"], "08:30");
        assert_eq!(json["endDate"], "2024-11-20");
        assert_eq!(json["endTime"], "09:10");
        assert_eq!(json["durationMinutes"], 40);
        assert_eq!(json["note"], "warmup");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_legacy_single_date_record_decodes() {
        let json = r#"{
            "id": 5001,
            "date": "2024-11-20",
            "startTime": "23:30",
            "endTime": "00:15",
            "durationMinutes": 999,
            "note": "Subsystem warmup"
        }"#;

        let r: Record = serde_json::from_str(json).unwrap();
        assert_eq!(r.start_date, r.end_date);
        assert_eq!(r.duration_minutes, 45);
        assert_eq!(r.note, "Subsystem warmup");
    }

    #[test]
    fn test_event_decodes_without_optional_fields() {
        let json = r#"{"id": 7, "title": "Reading", "createdAt": "2024-11-20T08:15:00.000Z"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, 7);
        assert!(event.description.is_empty());
        assert!(event.records.is_empty());
    }

    #[test]
    fn test_stats() {
        let mut event = Event::new(1, "Focus".into(), String::new());
        assert_eq!(event.stats(), EventStats::default());

        event.records = vec![
            record(RecordDraft::single_day("2024-11-20", "08:30", "09:10")),
            record(RecordDraft::single_day("2024-11-20", "10:00", "11:05")),
        ];

        let stats = event.stats();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.total_minutes, 105);
        assert_eq!(stats.longest_minutes, 65);
        assert_eq!(stats.average_minutes, 53);
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(120), "2h");
        assert_eq!(format_minutes(105), "1h 45m");
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::Event.to_string(), "event");
        assert_eq!(EntityKind::Record.to_string(), "record");
    }
}
