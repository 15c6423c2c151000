//! Event command handlers

use anyhow::{bail, Context, Result};

use tally_core::EventId;

use super::CliTracker;
use crate::output::Output;
use crate::prompt::{confirm, prompt_with_default};

/// Create a new event
pub fn create(
    tracker: &CliTracker,
    title: String,
    description: Option<String>,
    output: &Output,
) -> Result<()> {
    let event = tracker.create_event(&title, description.as_deref().unwrap_or(""))?;

    if output.is_quiet() || output.is_json() {
        output.print_event(&event);
    } else {
        output.success(&format!("Created event {} ({})", event.title, event.id));
    }

    Ok(())
}

/// List all events
pub fn list(tracker: &CliTracker, output: &Output) -> Result<()> {
    let events = tracker.get_all_events();
    output.print_events(&events);
    Ok(())
}

/// Show an event with its records
pub fn show(tracker: &CliTracker, id: EventId, output: &Output) -> Result<()> {
    let event = tracker
        .get_event_by_id(id)
        .with_context(|| format!("Event not found: {}", id))?;
    output.print_event(&event);
    Ok(())
}

/// Show duration totals for an event
pub fn stats(tracker: &CliTracker, id: EventId, output: &Output) -> Result<()> {
    let event = tracker
        .get_event_by_id(id)
        .with_context(|| format!("Event not found: {}", id))?;
    output.print_stats(&event, &event.stats());
    Ok(())
}

/// Edit an event's title and description
///
/// Without flags, prompts for each field (interactive mode only).
pub fn edit(
    tracker: &CliTracker,
    id: EventId,
    title: Option<String>,
    description: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut event = tracker
        .get_event_by_id(id)
        .with_context(|| format!("Event not found: {}", id))?;

    let (title, description) = if title.is_none() && description.is_none() {
        if !output.should_prompt() {
            bail!("Nothing to change. Pass --title and/or --description.");
        }
        println!("Editing event {} (press Enter to keep current value)", event.id);
        (
            prompt_with_default("Title", &event.title)?,
            prompt_with_default("Description", &event.description)?,
        )
    } else {
        (title, description)
    };

    if let Some(title) = title {
        event.title = title;
    }
    if let Some(description) = description {
        event.description = description;
    }

    let updated = tracker.update_event(event)?;

    if output.is_json() {
        output.print_event(&updated);
    } else {
        output.success(&format!("Updated event {}", updated.id));
    }

    Ok(())
}

/// Delete an event and all of its records
pub fn delete(tracker: &CliTracker, id: EventId, output: &Output) -> Result<()> {
    let event = tracker
        .get_event_by_id(id)
        .with_context(|| format!("Event not found: {}", id))?;

    if output.should_prompt() {
        println!("Event: {}", event.title);
        if !event.records.is_empty() {
            println!("This will also delete {} record(s).", event.records.len());
        }
        if !confirm("Delete this event?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    tracker.delete_event(id)?;
    output.success(&format!("Deleted event {}", id));

    Ok(())
}
