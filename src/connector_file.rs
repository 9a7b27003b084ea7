//! JSON file connector.
//!
//! Reads a `{"tasks": [...], "routines": [...]}` document on every fetch, so
//! edits made between passes are picked up like edits in Notion would be.
//! Field names follow the core [`Task`](notion_rag_core::models::Task) and
//! [`Routine`](notion_rag_core::models::Routine) models; every field except
//! `id` is optional.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use notion_rag_core::models::{RecordKind, SourceRecord};
use notion_rag_core::source::{RecordSet, SourceConnector};
use notion_rag_core::{RagError, Result};

pub struct FileConnector {
    path: PathBuf,
    label: String,
}

impl FileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self, kind: RecordKind) -> Result<RecordSet> {
        let source_err = |reason: String| RagError::Source { kind, reason };

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| source_err(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| source_err(format!("{}: invalid record file: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl SourceConnector for FileConnector {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self, kind: RecordKind) -> Result<Vec<SourceRecord>> {
        let set = self.read(kind).await?;
        let records = set.records(kind);
        if let Some(blank) = records.iter().find(|r| r.id().trim().is_empty()) {
            return Err(RagError::Source {
                kind,
                reason: format!("{}: record without id: {:?}", self.path.display(), blank),
            });
        }
        Ok(records)
    }
}
