//! Record command handlers

use anyhow::{bail, Context, Result};
use clap::Args;

use tally_core::models::{parse_date, parse_time};
use tally_core::{EventId, RecordDraft, RecordId};

use super::CliTracker;
use crate::output::Output;
use crate::prompt::confirm;

/// Date and time options shared by `record add` and `record edit`
#[derive(Args, Debug, Clone, Default)]
pub struct RecordSpan {
    /// Date for a record that starts and ends on the same day (YYYY-MM-DD)
    #[arg(long, conflicts_with_all = ["start_date", "end_date"])]
    pub date: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD, defaults to the start date)
    #[arg(long)]
    pub end_date: Option<String>,
    /// Start time (HH:MM)
    #[arg(short, long = "start-time", alias = "start")]
    pub start_time: Option<String>,
    /// End time (HH:MM); earlier than the start on the same date means overnight
    #[arg(short, long = "end-time", alias = "end")]
    pub end_time: Option<String>,
    /// Free-text note
    #[arg(short, long)]
    pub note: Option<String>,
}

impl RecordSpan {
    fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.note.is_none()
    }

    /// Build a draft for a new record
    fn into_draft(self) -> Result<RecordDraft> {
        let (start_date, end_date) = match self.date {
            Some(date) => (Some(date.clone()), Some(date)),
            None => {
                let Some(start) = self.start_date else {
                    bail!("A date is required. Pass --date or --start-date.");
                };
                let end = self.end_date.unwrap_or_else(|| start.clone());
                (Some(start), Some(end))
            }
        };

        if self.start_time.is_none() {
            bail!("--start-time is required");
        }
        if self.end_time.is_none() {
            bail!("--end-time is required");
        }

        Ok(RecordDraft {
            start_date,
            start_time: self.start_time,
            end_date,
            end_time: self.end_time,
            note: self.note.unwrap_or_default(),
        })
    }
}

/// Log a new record against an event
pub fn add(tracker: &CliTracker, event_id: EventId, span: RecordSpan, output: &Output) -> Result<()> {
    let draft = span.into_draft()?;
    let record = tracker.create_record(event_id, draft)?;

    if output.is_quiet() || output.is_json() {
        output.print_record(&record);
    } else {
        output.success(&format!("Added record {} to event {}", record.id, event_id));
        output.print_record(&record);
    }

    Ok(())
}

/// Change the dates, times or note of a record
pub fn edit(
    tracker: &CliTracker,
    event_id: EventId,
    record_id: RecordId,
    span: RecordSpan,
    output: &Output,
) -> Result<()> {
    if span.is_empty() {
        bail!("Nothing to change. Pass at least one of --date, --start-date, --end-date, --start-time, --end-time, --note.");
    }

    let event = tracker
        .get_event_by_id(event_id)
        .with_context(|| format!("Event not found: {}", event_id))?;
    let mut record = event
        .record(record_id)
        .cloned()
        .with_context(|| format!("Record {} not found in event {}", record_id, event_id))?;

    if let Some(date) = span.date {
        let date = parse_date("date", &date)?;
        record.start_date = date;
        record.end_date = date;
    }
    if let Some(date) = span.start_date {
        record.start_date = parse_date("startDate", &date)?;
    }
    if let Some(date) = span.end_date {
        record.end_date = parse_date("endDate", &date)?;
    }
    if let Some(time) = span.start_time {
        record.start_time = parse_time("startTime", &time)?;
    }
    if let Some(time) = span.end_time {
        record.end_time = parse_time("endTime", &time)?;
    }
    if let Some(note) = span.note {
        record.note = note;
    }

    let updated = tracker.update_record(event_id, record)?;

    if output.is_quiet() || output.is_json() {
        output.print_record(&updated);
    } else {
        output.success(&format!("Updated record {}", updated.id));
        output.print_record(&updated);
    }

    Ok(())
}

/// Remove a record from an event
pub fn delete(
    tracker: &CliTracker,
    event_id: EventId,
    record_id: RecordId,
    output: &Output,
) -> Result<()> {
    if output.should_prompt() && !confirm(&format!("Delete record {}?", record_id))? {
        println!("Cancelled.");
        return Ok(());
    }

    tracker.delete_record(event_id, record_id)?;
    output.success(&format!("Deleted record {}", record_id));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start_time: &str, end_time: &str) -> RecordSpan {
        RecordSpan {
            start_time: Some(start_time.to_string()),
            end_time: Some(end_time.to_string()),
            ..RecordSpan::default()
        }
    }

    #[test]
    fn test_single_date_fills_both_ends() {
        let draft = RecordSpan {
            date: Some("2024-11-22".to_string()),
            note: Some("Deep work".to_string()),
            ..span("09:00", "10:30")
        }
        .into_draft()
        .unwrap();

        assert_eq!(draft.start_date.as_deref(), Some("2024-11-22"));
        assert_eq!(draft.end_date.as_deref(), Some("2024-11-22"));
        assert_eq!(draft.note, "Deep work");
        assert_eq!(draft.into_record(1).unwrap().duration_minutes, 90);
    }

    #[test]
    fn test_end_date_defaults_to_start_date() {
        let draft = RecordSpan {
            start_date: Some("2024-01-01".to_string()),
            ..span("22:00", "06:00")
        }
        .into_draft()
        .unwrap();

        assert_eq!(draft.end_date.as_deref(), Some("2024-01-01"));
        // Overnight on the same date
        assert_eq!(draft.into_record(1).unwrap().duration_minutes, 480);
    }

    #[test]
    fn test_explicit_end_date() {
        let draft = RecordSpan {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-03".to_string()),
            ..span("08:00", "08:00")
        }
        .into_draft()
        .unwrap();

        assert_eq!(draft.into_record(1).unwrap().duration_minutes, 2880);
    }

    #[test]
    fn test_missing_date_or_time() {
        assert!(span("09:00", "10:00").into_draft().is_err());

        let no_end = RecordSpan {
            date: Some("2024-11-22".to_string()),
            start_time: Some("09:00".to_string()),
            ..RecordSpan::default()
        };
        let err = no_end.into_draft().unwrap_err();
        assert!(err.to_string().contains("--end-time"));
    }

    #[test]
    fn test_is_empty() {
        assert!(RecordSpan::default().is_empty());
        assert!(!RecordSpan {
            note: Some(String::new()),
            ..RecordSpan::default()
        }
        .is_empty());
    }
}
