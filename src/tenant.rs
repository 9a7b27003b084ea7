//! Per-tenant storage layout.
//!
//! Each tenant owns one directory under `[storage].root`:
//!
//! ```text
//! {root}/user_{id}/            (or {root}/default/ without --tenant)
//! ├── index.sqlite             chunks + embeddings, both collections
//! └── rag_sync_state.json      watermark and synced-ID sets
//! ```
//!
//! Isolation is by directory only; nothing here relies on filesystem
//! permissions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use notion_rag_core::RagError;

pub const INDEX_FILE: &str = "index.sqlite";
pub const STATE_FILE: &str = "rag_sync_state.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantPaths {
    pub id: Option<String>,
    pub dir: PathBuf,
}

impl TenantPaths {
    /// Resolve the directory for `tenant` under `root`.
    ///
    /// Tenant ids are limited to ASCII alphanumerics, `-` and `_` so they
    /// cannot escape `root`.
    pub fn resolve(root: &Path, tenant: Option<&str>) -> Result<Self, RagError> {
        match tenant {
            None => Ok(Self {
                id: None,
                dir: root.join("default"),
            }),
            Some(id) => {
                validate_tenant_id(id)?;
                Ok(Self {
                    id: Some(id.to_string()),
                    dir: root.join(format!("user_{}", id)),
                })
            }
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("default")
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create tenant directory: {}", self.dir.display()))
    }
}

fn validate_tenant_id(id: &str) -> Result<(), RagError> {
    let ok = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(RagError::InvalidTenant(id.to_string()))
    }
}

/// Delete a tenant's index, sync state and directory.
///
/// Returns `false` when there was nothing to delete.
pub fn purge(paths: &TenantPaths) -> Result<bool> {
    if !paths.dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&paths.dir)
        .with_context(|| format!("Failed to remove {}", paths.dir.display()))?;
    info!(tenant = paths.label(), dir = %paths.dir.display(), "tenant data purged");
    Ok(true)
}

pub fn run_purge(paths: &TenantPaths) -> Result<()> {
    if purge(paths)? {
        println!("purged tenant {}", paths.label());
        println!("  removed: {}", paths.dir.display());
    } else {
        println!("nothing to purge for tenant {}", paths.label());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_and_named_tenants() {
        let root = Path::new("/var/nrag");
        let default = TenantPaths::resolve(root, None).unwrap();
        assert_eq!(default.dir, root.join("default"));
        assert_eq!(default.label(), "default");

        let t = TenantPaths::resolve(root, Some("42")).unwrap();
        assert_eq!(t.dir, root.join("user_42"));
        assert_eq!(t.state_path(), root.join("user_42").join("rag_sync_state.json"));
        assert_eq!(t.index_path(), root.join("user_42").join("index.sqlite"));
    }

    #[test]
    fn test_tenant_id_cannot_escape_root() {
        let root = Path::new("/var/nrag");
        for bad in ["", "../etc", "a/b", "x y", "u.1"] {
            assert!(
                matches!(
                    TenantPaths::resolve(root, Some(bad)),
                    Err(RagError::InvalidTenant(_))
                ),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_purge_removes_directory() {
        let tmp = TempDir::new().unwrap();
        let paths = TenantPaths::resolve(tmp.path(), Some("7")).unwrap();
        assert!(!purge(&paths).unwrap());

        paths.ensure_dir().unwrap();
        std::fs::write(paths.state_path(), "{}").unwrap();
        assert!(purge(&paths).unwrap());
        assert!(!paths.dir.exists());
    }
}
