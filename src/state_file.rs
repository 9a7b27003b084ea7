//! File-backed [`StateStore`]: `rag_sync_state.json` in the tenant directory.
//!
//! Saves write a sibling temp file and rename it over the target, so a
//! crash mid-write leaves the previous state readable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use notion_rag_core::state::{StateStore, SyncState};
use notion_rag_core::{RagError, Result};

pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> SyncState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SyncState::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable sync state; starting from scratch");
                return SyncState::default();
            }
        };
        match SyncState::from_json(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt sync state; starting from scratch");
                SyncState::default()
            }
        }
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        let json = state.to_json()?;
        let io = |e: std::io::Error| RagError::SyncStateIo(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io)?;
        Ok(())
    }
}
