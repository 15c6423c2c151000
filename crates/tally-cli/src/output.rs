//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use tally_core::{format_minutes, Event, EventStats, Record};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single event with its records
    pub fn print_event(&self, event: &Event) {
        match self.format {
            OutputFormat::Human => {
                let stats = event.stats();
                println!("ID:          {}", event.id);
                println!("Title:       {}", event.title);
                if !event.description.is_empty() {
                    println!("Description: {}", event.description);
                }
                println!("Created:     {}", event.created_at.format("%Y-%m-%d %H:%M"));
                println!("Total:       {}", format_minutes(stats.total_minutes));

                if !event.records.is_empty() {
                    println!();
                    println!("── Records ({}) ──", event.records.len());
                    for record in &event.records {
                        println!("{}", record_line(record));
                    }
                }
            }
            OutputFormat::Json => print_json(event),
            OutputFormat::Quiet => println!("{}", event.id),
        }
    }

    /// Print a list of events
    pub fn print_events(&self, events: &[Event]) {
        match self.format {
            OutputFormat::Human => {
                if events.is_empty() {
                    println!("No events found.");
                    return;
                }
                for event in events {
                    let stats = event.stats();
                    println!(
                        "{:>6} | {} | {} record(s) | {}",
                        event.id,
                        truncate(&event.title, 35),
                        stats.record_count,
                        format_minutes(stats.total_minutes)
                    );
                }
                println!("\n{} event(s)", events.len());
            }
            OutputFormat::Json => print_json(&events),
            OutputFormat::Quiet => {
                for event in events {
                    println!("{}", event.id);
                }
            }
        }
    }

    /// Print a single record
    pub fn print_record(&self, record: &Record) {
        match self.format {
            OutputFormat::Human => println!("{}", record_line(record)),
            OutputFormat::Json => print_json(record),
            OutputFormat::Quiet => println!("{}", record.id),
        }
    }

    /// Print the duration summary of an event
    pub fn print_stats(&self, event: &Event, stats: &EventStats) {
        match self.format {
            OutputFormat::Human => {
                println!("{} ({})", event.title, event.id);
                println!("  Records: {}", stats.record_count);
                println!("  Total:   {}", format_minutes(stats.total_minutes));
                println!("  Longest: {}", format_minutes(u64::from(stats.longest_minutes)));
                println!("  Average: {}", format_minutes(u64::from(stats.average_minutes)));
            }
            OutputFormat::Json => print_json(stats),
            OutputFormat::Quiet => println!("{}", stats.total_minutes),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warning(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON output: {}", e),
    }
}

/// One-line rendering of a record
fn record_line(record: &Record) -> String {
    let span = if record.is_single_day() {
        format!(
            "{} {}-{}",
            record.start_date,
            record.start_time.format("%H:%M"),
            record.end_time.format("%H:%M")
        )
    } else {
        format!(
            "{} {} → {} {}",
            record.start_date,
            record.start_time.format("%H:%M"),
            record.end_date,
            record.end_time.format("%H:%M")
        )
    };

    let mut line = format!(
        "{:>6} | {} | {}",
        record.id,
        span,
        format_minutes(u64::from(record.duration_minutes))
    );
    if !record.note.is_empty() {
        line.push_str(" | ");
        line.push_str(&truncate(&record.note, 40));
    }
    line
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::RecordDraft;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("héllo wörld again", 8), "héllo...");
    }

    #[test]
    fn test_record_line_single_day() {
        let record = RecordDraft::single_day("2024-11-20", "08:30", "09:10")
            .with_note("Subsystem warmup")
            .into_record(5001)
            .unwrap();

        assert_eq!(
            record_line(&record),
            "  5001 | 2024-11-20 08:30-09:10 | 40m | Subsystem warmup"
        );
    }

    #[test]
    fn test_record_line_multi_day() {
        let record = RecordDraft::new("2024-01-01", "22:00", "2024-01-02", "06:00")
            .into_record(7)
            .unwrap();

        assert_eq!(
            record_line(&record),
            "     7 | 2024-01-01 22:00 → 2024-01-02 06:00 | 8h"
        );
    }
}
