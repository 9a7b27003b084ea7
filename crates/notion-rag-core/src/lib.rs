//! # notion-rag core
//!
//! The indexing engine behind `nrag`: record models, the record serializer,
//! word-window chunking, the vector index and embedder traits, the
//! incremental sync orchestrator and the context builder.
//!
//! This crate has no tokio runtime, sqlx, HTTP or filesystem dependency.
//! Adapters for those live in the `notion-rag` app crate; in-memory
//! implementations here ([`store::memory::InMemoryIndex`],
//! [`embedding::HashEmbedder`], [`state::MemoryStateStore`],
//! [`source::StaticSource`]) back the tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notion_rag_core::{
//!     chunk::ChunkParams, collection::Collection, embedding::HashEmbedder,
//!     source::StaticSource, state::MemoryStateStore, store::memory::InMemoryIndex,
//!     sync::{SyncOptions, Synchronizer},
//! };
//!
//! # async fn run() -> notion_rag_core::Result<()> {
//! let embedder = Arc::new(HashEmbedder::default());
//! let tasks = Collection::new(Arc::new(InMemoryIndex::new("tasks")), embedder.clone());
//! let routines = Collection::new(Arc::new(InMemoryIndex::new("routines")), embedder);
//! let sync = Synchronizer::new(
//!     Arc::new(StaticSource::default()),
//!     tasks,
//!     routines,
//!     Arc::new(MemoryStateStore::new()),
//!     ChunkParams::default(),
//! );
//! let report = sync.sync(&SyncOptions::default()).await?;
//! println!("{} records processed", report.records_processed());
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod collection;
pub mod context;
pub mod embedding;
pub mod error;
pub mod models;
pub mod serialize;
pub mod source;
pub mod state;
pub mod store;
pub mod sync;

pub use error::{RagError, Result};
