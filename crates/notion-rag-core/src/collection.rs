//! Embedding-aware handle on one vector index.
//!
//! A [`Collection`] pairs a [`VectorIndex`] with the [`Embedder`] used for
//! it, and is the only place where text turns into vectors. It is cheap to
//! clone; the sync orchestrator and the context builder hold clones of the
//! same two collections.
//!
//! Writes for one parent are two-phase:
//!
//! 1. [`stage`](Collection::stage) embeds the new chunk set. Nothing in
//!    the index changes, so an embedding failure leaves the old chunks
//!    in place.
//! 2. [`replace_parent`](Collection::replace_parent) deletes the old chunk
//!    set and inserts the staged one.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{Chunk, Metadata, SearchResult};
use crate::store::{Filter, IndexEntry, StoredChunk, VectorIndex};

#[derive(Clone)]
pub struct Collection {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Collection {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn name(&self) -> &str {
        self.index.name()
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embed texts, checking the backend returned one vector per input.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingBackend {
                parent_id: String::new(),
                reason: format!(
                    "{} returned {} vectors for {} texts",
                    self.embedder.model_name(),
                    vectors.len(),
                    texts.len()
                ),
            });
        }
        Ok(vectors)
    }

    /// Embed and write positionally aligned ids, documents and metadata.
    pub async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<()> {
        if ids.len() != documents.len() || ids.len() != metadatas.len() {
            return Err(RagError::index(
                self.name(),
                format!(
                    "misaligned upsert: {} ids, {} documents, {} metadatas",
                    ids.len(),
                    documents.len(),
                    metadatas.len()
                ),
            ));
        }
        let vectors = self.embed(documents).await?;
        let entries = ids
            .iter()
            .zip(documents)
            .zip(metadatas)
            .zip(vectors)
            .map(|(((id, document), metadata), embedding)| IndexEntry {
                id: id.clone(),
                parent_id: parent_of(id, metadata),
                document: document.clone(),
                metadata: metadata.clone(),
                embedding,
            })
            .collect();
        self.index.upsert(entries).await
    }

    /// Phase one of a parent rewrite: embed `chunks` without touching the index.
    pub async fn stage(&self, chunks: &[Chunk]) -> Result<Vec<IndexEntry>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(&texts).await?;
        Ok(chunks
            .iter()
            .zip(vectors)
            .map(|(c, embedding)| IndexEntry {
                id: c.id.clone(),
                parent_id: c.parent_id.clone(),
                document: c.text.clone(),
                metadata: c.metadata.clone(),
                embedding,
            })
            .collect())
    }

    /// Phase two: swap the parent's stored chunks for the staged set.
    pub async fn replace_parent(&self, parent_id: &str, staged: Vec<IndexEntry>) -> Result<usize> {
        let written = staged.len();
        let removed = self.index.replace_parent(parent_id, staged).await?;
        debug!(collection = self.name(), parent_id, removed, written, "replaced chunks");
        Ok(removed)
    }

    pub async fn delete(&self, filter: &Filter) -> Result<usize> {
        self.index.delete(filter).await
    }

    pub async fn get(&self, filter: &Filter) -> Result<Vec<StoredChunk>> {
        self.index.get(filter).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.index.count().await
    }

    /// Nearest chunks to `text`, most similar first. An empty collection
    /// yields an empty list without calling the embedder.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        self.query_filtered(text, top_k, None).await
    }

    pub async fn query_filtered(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 || self.index.count().await? == 0 {
            return Ok(Vec::new());
        }
        let mut vectors = self.embed(&[text.to_string()]).await?;
        let vector = vectors.pop().unwrap_or_default();
        let hits = self.index.query(&vector, top_k, filter).await?;
        Ok(hits
            .into_iter()
            .map(|h| SearchResult {
                chunk_id: h.id,
                parent_id: h.parent_id,
                metadata: h.metadata,
                text: h.document,
                distance: h.distance,
            })
            .collect())
    }
}

fn parent_of(id: &str, metadata: &Metadata) -> String {
    match metadata.get("parent_id") {
        Some(v) => v.to_string(),
        None => id
            .rsplit_once("_chunk_")
            .map(|(p, _)| p.to_string())
            .unwrap_or_else(|| id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_record, ChunkParams};
    use crate::embedding::HashEmbedder;
    use crate::store::memory::InMemoryIndex;

    fn collection() -> Collection {
        Collection::new(
            Arc::new(InMemoryIndex::new("tasks")),
            Arc::new(HashEmbedder::new(32)),
        )
    }

    #[tokio::test]
    async fn test_query_empty_collection_is_empty() {
        let c = collection();
        assert!(c.query("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_rejects_misaligned_lists() {
        let c = collection();
        let err = c
            .upsert(&["a".into()], &[], &[Metadata::new()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Index { .. }));
    }

    #[tokio::test]
    async fn test_upsert_then_query() {
        let c = collection();
        let mut meta = Metadata::new();
        meta.insert("parent_id".into(), "t1".into());
        c.upsert(
            &["t1_chunk_0".into()],
            &["Task: Renew passport".into()],
            &[meta],
        )
        .await
        .unwrap();

        let hits = c.query("passport", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].parent_id, "t1");
        assert_eq!(hits[0].text, "Task: Renew passport");
    }

    #[tokio::test]
    async fn test_stage_then_replace() {
        let c = collection();
        let mut base = Metadata::new();
        base.insert("parent_id".into(), "t1".into());
        let chunks = chunk_record("t1", "Task: Water plants", &base, &ChunkParams::default());

        let staged = c.stage(&chunks).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(c.count().await.unwrap(), 0);

        assert_eq!(c.replace_parent("t1", staged).await.unwrap(), 0);
        assert_eq!(c.count().await.unwrap(), 1);
    }

    #[test]
    fn test_parent_of_falls_back_to_id() {
        assert_eq!(parent_of("abc_chunk_3", &Metadata::new()), "abc");
        assert_eq!(parent_of("plain", &Metadata::new()), "plain");
    }
}
