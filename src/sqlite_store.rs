//! SQLite-backed [`VectorIndex`].
//!
//! One `chunks` table holds both collections; each [`SqliteIndex`] is scoped
//! to one `collection` value. Embeddings are little-endian f32 BLOBs and
//! queries are brute-force cosine distance over the collection's rows.
//! [`replace_parent`](VectorIndex::replace_parent) runs its delete and
//! inserts in a single transaction.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use notion_rag_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use notion_rag_core::models::{Metadata, MetadataValue};
use notion_rag_core::store::{Filter, IndexEntry, QueryHit, StoredChunk, VectorIndex};
use notion_rag_core::{RagError, Result};

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    fn err(&self, e: impl ToString) -> RagError {
        RagError::index(&self.collection, e)
    }

    /// Rows of this collection, narrowed by `parent_id` when the filter has
    /// one. Remaining clauses are applied in Rust.
    async fn fetch_rows(&self, filter: Option<&Filter>) -> Result<Vec<SqliteRow>> {
        let parent = filter.and_then(|f| f.parent_id());
        let rows = match parent {
            Some(parent_id) => {
                sqlx::query(
                    "SELECT id, parent_id, document, metadata_json, embedding FROM chunks \
                     WHERE collection = ? AND parent_id = ? ORDER BY id",
                )
                .bind(&self.collection)
                .bind(parent_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, parent_id, document, metadata_json, embedding FROM chunks \
                     WHERE collection = ? ORDER BY id",
                )
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await
            }
        };
        rows.map_err(|e| self.err(e))
    }

    async fn insert_all(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entries: &[IndexEntry],
    ) -> Result<()> {
        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.metadata).map_err(|e| self.err(e))?;
            sqlx::query(
                r#"
                INSERT INTO chunks (collection, id, parent_id, chunk_index, document, metadata_json, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    parent_id = excluded.parent_id,
                    chunk_index = excluded.chunk_index,
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims
                "#,
            )
            .bind(&self.collection)
            .bind(&entry.id)
            .bind(&entry.parent_id)
            .bind(chunk_index(&entry.metadata))
            .bind(&entry.document)
            .bind(metadata_json)
            .bind(vec_to_blob(&entry.embedding))
            .bind(entry.embedding.len() as i64)
            .execute(&mut **tx)
            .await
            .map_err(|e| self.err(e))?;
        }
        Ok(())
    }

    async fn delete_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        filter: &Filter,
    ) -> Result<usize> {
        if filter.is_empty() {
            let done = sqlx::query("DELETE FROM chunks WHERE collection = ?")
                .bind(&self.collection)
                .execute(&mut **tx)
                .await
                .map_err(|e| self.err(e))?;
            return Ok(done.rows_affected() as usize);
        }

        // Find matching ids first; metadata clauses other than parent_id are
        // evaluated on the decoded JSON.
        let mut query = String::from("SELECT id, metadata_json FROM chunks WHERE collection = ?");
        if filter.parent_id().is_some() {
            query.push_str(" AND parent_id = ?");
        }
        let mut q = sqlx::query(&query).bind(&self.collection);
        if let Some(parent_id) = filter.parent_id() {
            q = q.bind(parent_id);
        }
        let rows = q.fetch_all(&mut **tx).await.map_err(|e| self.err(e))?;

        let mut removed = 0usize;
        for row in rows {
            let metadata = decode_metadata(row.get("metadata_json"));
            if !filter.matches(&metadata) {
                continue;
            }
            let id: String = row.get("id");
            let done = sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(&id)
                .execute(&mut **tx)
                .await
                .map_err(|e| self.err(e))?;
            removed += done.rows_affected() as usize;
        }
        Ok(removed)
    }
}

fn decode_metadata(raw: String) -> Metadata {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn chunk_index(metadata: &Metadata) -> i64 {
    match metadata.get("chunk_index") {
        Some(MetadataValue::Int(i)) => *i,
        _ => 0,
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| self.err(e))?;
        self.insert_all(&mut tx, &entries).await?;
        tx.commit().await.map_err(|e| self.err(e))?;
        Ok(())
    }

    async fn delete(&self, filter: &Filter) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(|e| self.err(e))?;
        let removed = self.delete_in(&mut tx, filter).await?;
        tx.commit().await.map_err(|e| self.err(e))?;
        Ok(removed)
    }

    async fn get(&self, filter: &Filter) -> Result<Vec<StoredChunk>> {
        let rows = self.fetch_rows(Some(filter)).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let metadata = decode_metadata(row.get("metadata_json"));
                if !filter.matches(&metadata) {
                    return None;
                }
                Some(StoredChunk {
                    id: row.get("id"),
                    parent_id: row.get("parent_id"),
                    document: row.get("document"),
                    metadata,
                })
            })
            .collect())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        let rows = self.fetch_rows(filter).await?;

        let mut hits: Vec<QueryHit> = rows
            .into_iter()
            .filter_map(|row| {
                let metadata = decode_metadata(row.get("metadata_json"));
                if let Some(f) = filter {
                    if !f.matches(&metadata) {
                        return None;
                    }
                }
                let blob: Vec<u8> = row.get("embedding");
                Some(QueryHit {
                    id: row.get("id"),
                    parent_id: row.get("parent_id"),
                    document: row.get("document"),
                    metadata,
                    distance: cosine_distance(vector, &blob_to_vec(&blob)),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.err(e))?;
        Ok(n as usize)
    }

    async fn replace_parent(&self, parent_id: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(|e| self.err(e))?;
        let removed = self.delete_in(&mut tx, &Filter::parent(parent_id)).await?;
        self.insert_all(&mut tx, &entries).await?;
        tx.commit().await.map_err(|e| self.err(e))?;
        Ok(removed)
    }
}

/// Chunk and distinct-parent counts for one collection.
pub async fn collection_counts(pool: &SqlitePool, collection: &str) -> anyhow::Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS chunks, COUNT(DISTINCT parent_id) AS parents FROM chunks WHERE collection = ?",
    )
    .bind(collection)
    .fetch_one(pool)
    .await?;
    Ok((row.get("chunks"), row.get("parents")))
}
