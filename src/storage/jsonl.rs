//! JSON-lines export and import of events.
//!
//! One event per line, in the order given. Importing does not validate
//! integrity; feed the result through [`super::InMemoryEventLog::from_events`]
//! to re-check it.

use std::io::{BufRead, Write};

use crate::error::StorageError;
use crate::event::Event;

/// Writes `events` as JSON lines, returning how many were written.
///
/// # Errors
///
/// Returns `StorageError::SerializationError` if an event cannot be encoded
/// and `StorageError::BackendError` on I/O failure.
pub fn write_events<'a, W: Write>(
    mut writer: W,
    events: impl IntoIterator<Item = &'a Event>,
) -> Result<usize, StorageError> {
    let mut written = 0;
    for event in events {
        let line = serde_json::to_string(event)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        writeln!(writer, "{line}").map_err(|e| StorageError::BackendError(e.to_string()))?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|e| StorageError::BackendError(e.to_string()))?;
    Ok(written)
}

/// Reads JSON-lines events. Blank lines are skipped.
///
/// # Errors
///
/// Returns `StorageError::SerializationError` naming the 1-based line number
/// of the first undecodable line.
pub fn read_events<R: BufRead>(reader: R) -> Result<Vec<Event>, StorageError> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| StorageError::BackendError(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .map_err(|e| StorageError::SerializationError(format!("line {}: {e}", idx + 1)))?;
        events.push(event);
    }
    Ok(events)
}
