//! Vector index abstraction.
//!
//! A [`VectorIndex`] holds the chunks of exactly one logical collection
//! (`tasks` or `routines`) together with their embeddings and flat metadata.
//! Backends: [`memory::InMemoryIndex`] here, and the SQLite index in the
//! `notion-rag` app crate.
//!
//! Indexes store vectors they are handed; they never call an embedder.
//! Embedding is orchestrated one layer up, by
//! [`Collection`](crate::collection::Collection).
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorIndex::upsert) | Insert or overwrite entries by id |
//! | [`delete`](VectorIndex::delete) | Remove every entry matching a filter |
//! | [`get`](VectorIndex::get) | Fetch entries matching a filter (no vectors) |
//! | [`query`](VectorIndex::query) | Nearest neighbours by cosine distance |
//! | [`count`](VectorIndex::count) | Number of stored entries |
//! | [`replace_parent`](VectorIndex::replace_parent) | Delete-then-insert one parent's chunk set |

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Metadata, MetadataValue};

/// One chunk ready to be written: text, metadata, and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub parent_id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// A stored chunk as returned by [`VectorIndex::get`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub id: String,
    pub parent_id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// A ranked hit from [`VectorIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub parent_id: String,
    pub document: String,
    pub metadata: Metadata,
    /// Cosine distance; smaller is closer.
    pub distance: f32,
}

/// Metadata equality filter. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: BTreeMap<String, MetadataValue>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter on the `parent_id` back-reference.
    pub fn parent(parent_id: &str) -> Self {
        Self::all().eq("parent_id", parent_id)
    }

    pub fn eq(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.clauses.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The `parent_id` clause, if present. Backends with a dedicated
    /// column use this to narrow the scan.
    pub fn parent_id(&self) -> Option<&str> {
        match self.clauses.get("parent_id") {
            Some(MetadataValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses
            .iter()
            .all(|(k, v)| metadata.get(k).map(|m| m == v).unwrap_or(false))
    }
}

/// Storage backend for one collection of chunks.
///
/// Implementations must be `Send + Sync`; a single index is shared by the
/// sync orchestrator (writer) and any number of concurrent searchers.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Collection name (`tasks`, `routines`).
    fn name(&self) -> &str;

    /// Insert or overwrite entries, keyed by `id`.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Remove all entries matching `filter`, returning how many were removed.
    async fn delete(&self, filter: &Filter) -> Result<usize>;

    /// Return all entries matching `filter`, ordered by id.
    async fn get(&self, filter: &Filter) -> Result<Vec<StoredChunk>>;

    /// Return up to `top_k` entries ordered by ascending cosine distance
    /// to `vector`. Ties keep id order.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>>;

    async fn count(&self) -> Result<usize>;

    /// Replace every chunk of `parent_id` with `entries`.
    ///
    /// The default runs [`delete`](Self::delete) then [`upsert`](Self::upsert)
    /// as two calls. Backends that can make the pair atomic (a transaction,
    /// a single write lock) should override it. Returns the number of
    /// entries removed.
    async fn replace_parent(&self, parent_id: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        let removed = self.delete(&Filter::parent(parent_id)).await?;
        if !entries.is_empty() {
            self.upsert(entries).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let mut meta = Metadata::new();
        meta.insert("parent_id".into(), "task1".into());
        meta.insert("status".into(), "Done".into());

        assert!(Filter::all().matches(&meta));
        assert!(Filter::parent("task1").matches(&meta));
        assert!(!Filter::parent("task2").matches(&meta));
        assert!(Filter::parent("task1").eq("status", "Done").matches(&meta));
        assert!(!Filter::all().eq("priority", "High").matches(&meta));
    }

    #[test]
    fn test_filter_parent_id_accessor() {
        assert_eq!(Filter::parent("r9").parent_id(), Some("r9"));
        assert_eq!(Filter::all().eq("type", "task").parent_id(), None);
    }
}
