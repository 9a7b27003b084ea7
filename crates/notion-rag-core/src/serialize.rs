//! Record serializer: source record → canonical text + metadata.
//!
//! The text is a fixed-order, line-per-field rendering. Absent fields
//! (`None`, empty strings, empty lists) are left out entirely instead of
//! being rendered as blank lines, so toggling an unset optional field does
//! not perturb the embedding of the rest of the record.
//!
//! Metadata always carries `parent_id`, `type`, and a small denormalized
//! subset used for filtering and display. All values are scalars; lists are
//! joined with `", "`.

use std::fmt::Write;

use crate::error::{RagError, Result};
use crate::models::{Metadata, MetadataValue, Routine, SourceRecord, Task};

/// Output of [`serialize`].
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedRecord {
    pub parent_id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// Render a record. Fails only for records without an ID, since chunk
/// identity is derived from it.
pub fn serialize(record: &SourceRecord) -> Result<SerializedRecord> {
    let parent_id = record.id();
    if parent_id.is_empty() {
        return Err(RagError::RecordSerialization {
            parent_id: String::new(),
            reason: format!("{} record has an empty id", record.kind()),
        });
    }

    let (text, mut metadata) = match record {
        SourceRecord::Task(task) => (task_text(task), task_metadata(task)),
        SourceRecord::Routine(routine) => (routine_text(routine), routine_metadata(routine)),
    };
    metadata.insert("parent_id".into(), parent_id.into());
    metadata.insert("type".into(), record.kind().as_str().into());

    Ok(SerializedRecord {
        parent_id: parent_id.to_string(),
        text,
        metadata,
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn joined(values: &[String]) -> Option<String> {
    let parts: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn line(out: &mut String, label: &str, value: impl std::fmt::Display) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{}: {}", label, value);
}

fn task_text(task: &Task) -> String {
    let mut out = String::new();
    line(&mut out, "Task", task.title.trim());
    if let Some(v) = present(&task.status) {
        line(&mut out, "Status", v);
    }
    if let Some(v) = present(&task.priority) {
        line(&mut out, "Priority", v);
    }
    if let Some(v) = present(&task.due_date) {
        line(&mut out, "Due Date", v);
    }
    if let Some(v) = present(&task.scheduled_time) {
        line(&mut out, "Scheduled Time", v);
    }
    if let Some(minutes) = task.estimated_duration {
        line(&mut out, "Estimated Duration", format!("{} minutes", minutes));
    }
    if let Some(tags) = joined(&task.tags) {
        line(&mut out, "Tags", tags);
    }
    if let Some(v) = present(&task.notes) {
        line(&mut out, "Notes", v);
    }
    out
}

fn task_metadata(task: &Task) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("title".into(), task.title.trim().into());
    meta.insert("status".into(), present(&task.status).unwrap_or("").into());
    meta.insert("priority".into(), present(&task.priority).unwrap_or("").into());
    if let Some(v) = present(&task.due_date) {
        meta.insert("due_date".into(), v.into());
    }
    if let Some(tags) = joined(&task.tags) {
        meta.insert("tags".into(), tags.into());
    }
    if let Some(v) = present(&task.url) {
        meta.insert("url".into(), v.into());
    }
    meta
}

fn routine_text(routine: &Routine) -> String {
    let mut out = String::new();
    line(&mut out, "Routine", routine.name.trim());
    if let Some(v) = present(&routine.category) {
        line(&mut out, "Category", v);
    }
    if let Some(days) = joined(&routine.days) {
        line(&mut out, "Days", days);
    }
    if let Some(v) = present(&routine.time) {
        line(&mut out, "Time", v);
    }
    if let Some(minutes) = routine.duration {
        line(&mut out, "Duration", format!("{} minutes", minutes));
    }
    if let Some(v) = present(&routine.energy_level) {
        line(&mut out, "Energy Level", v);
    }
    if let Some(v) = present(&routine.location) {
        line(&mut out, "Location", v);
    }
    if let Some(status) = joined(&routine.status) {
        line(&mut out, "Status", status);
    }
    if let Some(recurring) = routine.recurring {
        line(&mut out, "Recurring", if recurring { "Yes" } else { "No" });
    }
    if let Some(v) = present(&routine.recurrence_pattern) {
        line(&mut out, "Recurrence Pattern", v);
    }
    if let Some(v) = present(&routine.notes) {
        line(&mut out, "Notes", v);
    }
    out
}

fn routine_metadata(routine: &Routine) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("name".into(), routine.name.trim().into());
    meta.insert(
        "recurring".into(),
        MetadataValue::Bool(routine.recurring.unwrap_or(false)),
    );
    meta.insert(
        "recurrence_pattern".into(),
        present(&routine.recurrence_pattern).unwrap_or("").into(),
    );
    if let Some(v) = present(&routine.category) {
        meta.insert("category".into(), v.into());
    }
    if let Some(days) = joined(&routine.days) {
        meta.insert("days".into(), days.into());
    }
    if let Some(v) = present(&routine.url) {
        meta.insert("url".into(), v.into());
    }
    meta
}
