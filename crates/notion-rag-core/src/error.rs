//! Error taxonomy for the indexing engine.
//!
//! Per-record variants ([`RagError::RecordSerialization`],
//! [`RagError::EmbeddingBackend`], [`RagError::Index`],
//! [`RagError::TimestampParse`]) are caught by the sync orchestrator and
//! folded into a [`SyncReport`](crate::sync::SyncReport). Pass-level
//! variants ([`RagError::Source`], and [`RagError::Index`] when it is raised
//! outside a single record) propagate to the caller.

use thiserror::Error;

use crate::models::RecordKind;

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// A record could not be rendered into text + metadata.
    #[error("record {parent_id}: serialization failed: {reason}")]
    RecordSerialization { parent_id: String, reason: String },

    /// The embedding function failed for a record's chunk batch.
    #[error("record {parent_id}: embedding failed: {reason}")]
    EmbeddingBackend { parent_id: String, reason: String },

    /// The vector index rejected a read or write.
    #[error("index {collection}: {reason}")]
    Index { collection: String, reason: String },

    /// Sync state could not be persisted.
    #[error("sync state I/O failed: {0}")]
    SyncStateIo(String),

    /// A modification timestamp did not parse.
    #[error("unparseable timestamp: {value:?}")]
    TimestampParse { value: String },

    /// The source connector could not produce records at all.
    #[error("source fetch for {kind} failed: {reason}")]
    Source { kind: RecordKind, reason: String },

    #[error("invalid chunking parameters: max_words={max_words}, overlap={overlap} (need 0 <= overlap < max_words)")]
    InvalidChunkParams { max_words: usize, overlap: usize },

    #[error("invalid tenant id: {0:?}")]
    InvalidTenant(String),
}

impl RagError {
    pub fn index(collection: impl Into<String>, reason: impl ToString) -> Self {
        RagError::Index {
            collection: collection.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors scoped to one record (logged and skipped during sync).
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            RagError::RecordSerialization { .. }
                | RagError::EmbeddingBackend { .. }
                | RagError::TimestampParse { .. }
        )
    }
}
