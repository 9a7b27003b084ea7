//! Core data models shared by the engine and its adapters.
//!
//! Source records ([`Task`], [`Routine`]) are immutable snapshots produced by
//! a connector. [`Chunk`]s are derived from them during sync and are the unit
//! stored in the vector index. [`SearchResult`]s are ephemeral query output.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which logical collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Task,
    Routine,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Task, RecordKind::Routine];

    /// The `type` tag written into chunk metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Task => "task",
            RecordKind::Routine => "routine",
        }
    }

    /// Name of the collection holding chunks of this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Task => "tasks",
            RecordKind::Routine => "routines",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" | "tasks" => Ok(RecordKind::Task),
            "routine" | "routines" => Ok(RecordKind::Routine),
            other => Err(format!(
                "unknown collection '{}': use tasks or routines",
                other
            )),
        }
    }
}

/// A task row from the tasks database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub scheduled_time: Option<String>,
    /// Estimated duration in minutes.
    pub estimated_duration: Option<u32>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
    /// Raw last-edited timestamp as reported by the source (ISO-8601).
    pub last_edited_time: Option<String>,
}

/// A routine row from the routines database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routine {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub days: Vec<String>,
    pub time: Option<String>,
    /// Duration in minutes.
    pub duration: Option<u32>,
    pub energy_level: Option<String>,
    pub location: Option<String>,
    pub status: Vec<String>,
    pub recurring: Option<bool>,
    pub recurrence_pattern: Option<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
    pub last_edited_time: Option<String>,
}

/// A record as handed to the engine by a source connector.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Task(Task),
    Routine(Routine),
}

impl SourceRecord {
    /// The record's ID with surrounding whitespace removed. Chunk IDs,
    /// the synced-ID sets and pruning all key on this form.
    pub fn id(&self) -> &str {
        match self {
            SourceRecord::Task(t) => t.id.trim(),
            SourceRecord::Routine(r) => r.id.trim(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            SourceRecord::Task(_) => RecordKind::Task,
            SourceRecord::Routine(_) => RecordKind::Routine,
        }
    }

    pub fn last_edited_time(&self) -> Option<&str> {
        match self {
            SourceRecord::Task(t) => t.last_edited_time.as_deref(),
            SourceRecord::Routine(r) => r.last_edited_time.as_deref(),
        }
    }
}

impl From<Task> for SourceRecord {
    fn from(t: Task) -> Self {
        SourceRecord::Task(t)
    }
}

impl From<Routine> for SourceRecord {
    fn from(r: Routine) -> Self {
        SourceRecord::Routine(r)
    }
}

/// A primitive metadata value. Vector stores only accept scalars, so list
/// fields are joined into delimited strings before they get here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

/// Ordered metadata map attached to every stored chunk.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A bounded text fragment of one source record.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `{parent_id}_chunk_{index}`.
    pub id: String,
    pub parent_id: String,
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    pub metadata: Metadata,
}

/// One ranked hit from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub parent_id: String,
    pub metadata: Metadata,
    pub text: String,
    /// Cosine distance (`1 - similarity`); smaller is closer.
    pub distance: f32,
}

impl SearchResult {
    /// Convenience accessor for string metadata such as `title` or `name`.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}
