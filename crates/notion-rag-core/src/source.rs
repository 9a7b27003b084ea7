//! Source connector trait.
//!
//! A connector returns the full current set of records of one kind.
//! Pagination, auth and retries are the connector's business. The Notion
//! and JSON-file connectors live in the `notion-rag` app crate; this module
//! provides [`StaticSource`] for tests and embedding in other programs.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::models::{RecordKind, Routine, SourceRecord, Task};

#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Short label used in logs (`notion`, `file:records.json`).
    fn name(&self) -> &str;

    async fn fetch(&self, kind: RecordKind) -> Result<Vec<SourceRecord>>;
}

/// Both record lists, as read from a `{"tasks": [...], "routines": [...]}`
/// document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSet {
    pub tasks: Vec<Task>,
    pub routines: Vec<Routine>,
}

impl RecordSet {
    pub fn records(&self, kind: RecordKind) -> Vec<SourceRecord> {
        match kind {
            RecordKind::Task => self.tasks.iter().cloned().map(SourceRecord::from).collect(),
            RecordKind::Routine => self
                .routines
                .iter()
                .cloned()
                .map(SourceRecord::from)
                .collect(),
        }
    }
}

/// In-memory connector whose contents can be swapped between passes.
#[derive(Default)]
pub struct StaticSource {
    records: RwLock<RecordSet>,
}

impl StaticSource {
    pub fn new(records: RecordSet) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        if let Ok(mut r) = self.records.write() {
            r.tasks = tasks;
        }
    }

    pub fn set_routines(&self, routines: Vec<Routine>) {
        if let Ok(mut r) = self.records.write() {
            r.routines = routines;
        }
    }
}

#[async_trait]
impl SourceConnector for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, kind: RecordKind) -> Result<Vec<SourceRecord>> {
        let records = self.records.read().map_err(|_| RagError::Source {
            kind,
            reason: "record set lock poisoned".into(),
        })?;
        Ok(records.records(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_swaps_contents() {
        let source = StaticSource::default();
        assert!(source.fetch(RecordKind::Task).await.unwrap().is_empty());

        source.set_tasks(vec![Task {
            id: "t1".into(),
            title: "Pay rent".into(),
            ..Default::default()
        }]);
        let tasks = source.fetch(RecordKind::Task).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind(), RecordKind::Task);
        assert!(source.fetch(RecordKind::Routine).await.unwrap().is_empty());
    }

    #[test]
    fn test_record_set_parses_partial_document() {
        let set: RecordSet =
            serde_json::from_str(r#"{"routines": [{"id": "r1", "name": "Run"}]}"#).unwrap();
        assert!(set.tasks.is_empty());
        assert_eq!(set.records(RecordKind::Routine)[0].id(), "r1");
    }
}
