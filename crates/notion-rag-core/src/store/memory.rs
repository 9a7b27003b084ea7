//! In-memory [`VectorIndex`] for tests and ephemeral runs.
//!
//! Entries live in a `BTreeMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every stored vector.
//! [`replace_parent`](VectorIndex::replace_parent) holds the write lock for
//! the whole delete + insert, so readers see either the old or the new
//! chunk set of a parent, never a mix.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{RagError, Result};

use super::{Filter, IndexEntry, QueryHit, StoredChunk, VectorIndex};

pub struct InMemoryIndex {
    name: String,
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, IndexEntry>>> {
        self.entries
            .read()
            .map_err(|_| RagError::index(&self.name, "lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, IndexEntry>>> {
        self.entries
            .write()
            .map_err(|_| RagError::index(&self.name, "lock poisoned"))
    }
}

fn remove_matching(map: &mut BTreeMap<String, IndexEntry>, filter: &Filter) -> usize {
    let before = map.len();
    map.retain(|_, e| !filter.matches(&e.metadata));
    before - map.len()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut map = self.write()?;
        for entry in entries {
            map.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn delete(&self, filter: &Filter) -> Result<usize> {
        let mut map = self.write()?;
        Ok(remove_matching(&mut map, filter))
    }

    async fn get(&self, filter: &Filter) -> Result<Vec<StoredChunk>> {
        let map = self.read()?;
        Ok(map
            .values()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| StoredChunk {
                id: e.id.clone(),
                parent_id: e.parent_id.clone(),
                document: e.document.clone(),
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        let map = self.read()?;
        let mut hits: Vec<QueryHit> = map
            .values()
            .filter(|e| filter.map(|f| f.matches(&e.metadata)).unwrap_or(true))
            .map(|e| QueryHit {
                id: e.id.clone(),
                parent_id: e.parent_id.clone(),
                document: e.document.clone(),
                metadata: e.metadata.clone(),
                distance: cosine_distance(vector, &e.embedding),
            })
            .collect();
        // Stable sort keeps id order among equal distances.
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn replace_parent(&self, parent_id: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        let mut map = self.write()?;
        let removed = remove_matching(&mut map, &Filter::parent(parent_id));
        for entry in entries {
            map.insert(entry.id.clone(), entry);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn entry(id: &str, parent: &str, embedding: Vec<f32>) -> IndexEntry {
        let mut metadata = Metadata::new();
        metadata.insert("parent_id".into(), parent.into());
        IndexEntry {
            id: id.into(),
            parent_id: parent.into(),
            document: format!("doc {}", id),
            metadata,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = InMemoryIndex::new("tasks");
        index
            .upsert(vec![entry("a_chunk_0", "a", vec![1.0, 0.0])])
            .await
            .unwrap();
        let mut e = entry("a_chunk_0", "a", vec![0.0, 1.0]);
        e.document = "updated".into();
        index.upsert(vec![e]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let got = index.get(&Filter::parent("a")).await.unwrap();
        assert_eq!(got[0].document, "updated");
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let index = InMemoryIndex::new("tasks");
        index
            .upsert(vec![
                entry("far", "p1", vec![0.0, 1.0]),
                entry("near", "p2", vec![1.0, 0.1]),
                entry("mid", "p3", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_empty_index() {
        let index = InMemoryIndex::new("routines");
        assert!(index.query(&[1.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_parent_removes_stale_chunks() {
        let index = InMemoryIndex::new("tasks");
        index
            .upsert(vec![
                entry("t_chunk_0", "t", vec![1.0]),
                entry("t_chunk_1", "t", vec![1.0]),
                entry("t_chunk_2", "t", vec![1.0]),
                entry("u_chunk_0", "u", vec![1.0]),
            ])
            .await
            .unwrap();

        let removed = index
            .replace_parent("t", vec![entry("t_chunk_0", "t", vec![0.5])])
            .await
            .unwrap();
        assert_eq!(removed, 3);
        let ids: Vec<String> = index
            .get(&Filter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["t_chunk_0", "u_chunk_0"]);
    }

    #[tokio::test]
    async fn test_delete_by_filter_counts() {
        let index = InMemoryIndex::new("tasks");
        index
            .upsert(vec![entry("x_chunk_0", "x", vec![1.0]), entry("y_chunk_0", "y", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(index.delete(&Filter::parent("x")).await.unwrap(), 1);
        assert_eq!(index.delete(&Filter::parent("x")).await.unwrap(), 0);
        assert_eq!(index.delete(&Filter::all()).await.unwrap(), 1);
    }
}
