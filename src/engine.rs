//! Wires one tenant's storage, embedder and source into the core engine.
//!
//! [`Engine::open`] resolves the tenant directory, opens (and migrates) its
//! SQLite index and builds the two [`Collection`]s. The source connector is
//! only built by [`Engine::synchronizer`], so read-only commands such as
//! `search` and `stats` need no Notion credentials.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use sqlx::SqlitePool;

use notion_rag_core::chunk::ChunkParams;
use notion_rag_core::collection::Collection;
use notion_rag_core::context::ContextBuilder;
use notion_rag_core::models::RecordKind;
use notion_rag_core::source::SourceConnector;
use notion_rag_core::state::{StateStore, SyncState};
use notion_rag_core::sync::Synchronizer;

use crate::config::{Config, SourceKind};
use crate::connector_file::FileConnector;
use crate::connector_notion::NotionConnector;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::migrate;
use crate::sqlite_store::SqliteIndex;
use crate::state_file::FileStateStore;
use crate::tenant::TenantPaths;

pub struct Engine {
    config: Config,
    paths: TenantPaths,
    pool: SqlitePool,
    tasks: Collection,
    routines: Collection,
    state: Arc<FileStateStore>,
    params: ChunkParams,
}

impl Engine {
    pub async fn open(config: &Config, tenant: Option<&str>) -> Result<Self> {
        let paths = TenantPaths::resolve(&config.storage.root, tenant)?;
        paths.ensure_dir()?;

        let pool = db::connect(&paths.index_path())
            .await
            .with_context(|| format!("Failed to open index {}", paths.index_path().display()))?;
        migrate::run_migrations(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        Self::with_embedder(config, paths, pool, embedder)
    }

    fn with_embedder(
        config: &Config,
        paths: TenantPaths,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let collection = |kind: RecordKind| {
            Collection::new(
                Arc::new(SqliteIndex::new(pool.clone(), kind.collection())),
                Arc::clone(&embedder),
            )
        };
        let tasks = collection(RecordKind::Task);
        let routines = collection(RecordKind::Routine);
        let state = Arc::new(FileStateStore::new(paths.state_path()));

        Ok(Self {
            config: config.clone(),
            params: config.chunking.params()?,
            paths,
            pool,
            tasks,
            routines,
            state,
        })
    }

    pub fn paths(&self) -> &TenantPaths {
        &self.paths
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn collection(&self, kind: RecordKind) -> &Collection {
        match kind {
            RecordKind::Task => &self.tasks,
            RecordKind::Routine => &self.routines,
        }
    }

    pub async fn load_state(&self) -> SyncState {
        self.state.load().await
    }

    /// Build the configured source connector.
    pub fn source(&self) -> Result<Arc<dyn SourceConnector>> {
        let source: Arc<dyn SourceConnector> = match self.config.source.kind {
            SourceKind::Notion => Arc::new(NotionConnector::from_config(&self.config.notion)?),
            SourceKind::File => {
                let path = self
                    .config
                    .source
                    .path
                    .clone()
                    .context("source.path is required when source.kind = \"file\"")?;
                Arc::new(FileConnector::new(path))
            }
        };
        Ok(source)
    }

    pub fn synchronizer(&self) -> Result<Synchronizer> {
        Ok(self.synchronizer_with(self.source()?))
    }

    pub fn synchronizer_with(&self, source: Arc<dyn SourceConnector>) -> Synchronizer {
        Synchronizer::new(
            source,
            self.tasks.clone(),
            self.routines.clone(),
            self.state.clone(),
            self.params,
        )
    }

    pub fn context_builder(&self) -> ContextBuilder {
        ContextBuilder::new(
            self.tasks.clone(),
            self.routines.clone(),
            self.config.retrieval.context_config(),
        )
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
