//! # Notion RAG
//!
//! Incremental semantic indexing of a Notion tasks database and a routines
//! database, with per-tenant isolation.
//!
//! The sync algorithm, chunker, serializer and context builder live in
//! [`notion_rag_core`]; this crate supplies the concrete adapters and the
//! `nrag` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Connector  │──▶│ Synchronizer │──▶│ SQLite (tenant)  │
//! │ Notion/File │   │ Chunk+Embed  │   │ tasks + routines │
//! └─────────────┘   └──────┬───────┘   └────────┬─────────┘
//!                          │                    │
//!                          ▼                    ▼
//!                 rag_sync_state.json    ContextBuilder
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`tenant`] | Per-tenant directory layout and purge |
//! | [`engine`] | Wires index, embedder, source and state for one tenant |
//! | [`sqlite_store`] | SQLite-backed vector index |
//! | [`state_file`] | JSON sync state with atomic replace |
//! | [`connector_notion`] | Notion database connector |
//! | [`connector_file`] | JSON file connector |
//! | [`embedding`] | Embedding providers |
//! | [`ingest`] | `nrag sync` |
//! | [`search`] | `nrag search` and `nrag context` |
//! | [`stats`] | `nrag stats` |
//! | [`progress`] | Sync progress on stderr |

pub mod config;
pub mod connector_file;
pub mod connector_notion;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod state_file;
pub mod stats;
pub mod tenant;
