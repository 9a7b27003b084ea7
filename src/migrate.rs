use anyhow::Result;
use sqlx::SqlitePool;

/// Create the chunk table and its indexes. Idempotent.
///
/// Both collections share one table, keyed by `(collection, id)`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            parent_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            document TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_parent ON chunks(collection, parent_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
