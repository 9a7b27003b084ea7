use notion_rag::db;
use notion_rag::migrate::run_migrations;
use notion_rag::sqlite_store::{collection_counts, SqliteIndex};
use notion_rag_core::models::{Metadata, MetadataValue};
use notion_rag_core::store::{Filter, IndexEntry, VectorIndex};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn open(tmp: &TempDir) -> SqlitePool {
    let pool = db::connect(&tmp.path().join("index.sqlite")).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

fn entry(parent: &str, index: i64, doc: &str, embedding: Vec<f32>) -> IndexEntry {
    let mut metadata = Metadata::new();
    metadata.insert("parent_id".into(), parent.into());
    metadata.insert("chunk_index".into(), MetadataValue::Int(index));
    metadata.insert("type".into(), "task".into());
    IndexEntry {
        id: format!("{}_chunk_{}", parent, index),
        parent_id: parent.to_string(),
        document: doc.to_string(),
        metadata,
        embedding,
    }
}

#[tokio::test]
async fn test_upsert_get_and_count() {
    let tmp = TempDir::new().unwrap();
    let pool = open(&tmp).await;
    let index = SqliteIndex::new(pool.clone(), "tasks");

    index
        .upsert(vec![
            entry("a", 0, "alpha zero", vec![1.0, 0.0]),
            entry("a", 1, "alpha one", vec![0.9, 0.1]),
            entry("b", 0, "beta", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    assert_eq!(index.count().await.unwrap(), 3);

    let a = index.get(&Filter::parent("a")).await.unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a[0].id, "a_chunk_0");
    assert_eq!(a[0].metadata.get("chunk_index"), Some(&MetadataValue::Int(0)));

    // Upsert on an existing id replaces in place.
    index
        .upsert(vec![entry("a", 0, "alpha zero v2", vec![1.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(index.count().await.unwrap(), 3);
    let a0 = index.get(&Filter::parent("a")).await.unwrap();
    assert_eq!(a0[0].document, "alpha zero v2");

    assert_eq!(collection_counts(&pool, "tasks").await.unwrap(), (3, 2));
}

#[tokio::test]
async fn test_replace_parent_shrinks_chunk_set() {
    let tmp = TempDir::new().unwrap();
    let pool = open(&tmp).await;
    let index = SqliteIndex::new(pool, "tasks");

    index
        .upsert(vec![
            entry("a", 0, "one", vec![1.0, 0.0]),
            entry("a", 1, "two", vec![1.0, 0.0]),
            entry("a", 2, "three", vec![1.0, 0.0]),
            entry("b", 0, "other", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    let removed = index
        .replace_parent("a", vec![entry("a", 0, "only", vec![1.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(removed, 3);

    let a = index.get(&Filter::parent("a")).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].document, "only");
    assert_eq!(index.get(&Filter::parent("b")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_query_orders_by_distance() {
    let tmp = TempDir::new().unwrap();
    let pool = open(&tmp).await;
    let index = SqliteIndex::new(pool, "tasks");

    index
        .upsert(vec![
            entry("far", 0, "far", vec![0.0, 1.0]),
            entry("near", 0, "near", vec![1.0, 0.0]),
            entry("mid", 0, "mid", vec![0.7, 0.7]),
        ])
        .await
        .unwrap();

    let hits = index.query(&[1.0, 0.0], 2, None).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.parent_id.as_str()).collect();
    assert_eq!(ids, vec!["near", "mid"]);
    assert!(hits[0].distance < hits[1].distance);
    assert!(hits[0].distance.abs() < 1e-6);

    let filtered = index
        .query(&[1.0, 0.0], 5, Some(&Filter::parent("far")))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].parent_id, "far");
}

#[tokio::test]
async fn test_query_on_empty_collection() {
    let tmp = TempDir::new().unwrap();
    let pool = open(&tmp).await;
    let index = SqliteIndex::new(pool, "routines");
    assert!(index.query(&[1.0, 0.0], 3, None).await.unwrap().is_empty());
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_collections_share_table_but_not_rows() {
    let tmp = TempDir::new().unwrap();
    let pool = open(&tmp).await;
    let tasks = SqliteIndex::new(pool.clone(), "tasks");
    let routines = SqliteIndex::new(pool.clone(), "routines");

    tasks
        .upsert(vec![entry("x", 0, "task x", vec![1.0, 0.0])])
        .await
        .unwrap();
    routines
        .upsert(vec![entry("x", 0, "routine x", vec![1.0, 0.0])])
        .await
        .unwrap();

    assert_eq!(tasks.delete(&Filter::all()).await.unwrap(), 1);
    assert_eq!(tasks.count().await.unwrap(), 0);
    let left = routines.get(&Filter::parent("x")).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].document, "routine x");
}

#[tokio::test]
async fn test_delete_by_metadata_clause() {
    let tmp = TempDir::new().unwrap();
    let pool = open(&tmp).await;
    let index = SqliteIndex::new(pool, "tasks");

    index
        .upsert(vec![
            entry("a", 0, "a0", vec![1.0, 0.0]),
            entry("a", 1, "a1", vec![1.0, 0.0]),
        ])
        .await
        .unwrap();

    let removed = index
        .delete(&Filter::parent("a").eq("chunk_index", 1i64))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let left = index.get(&Filter::all()).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, "a_chunk_0");
}

#[tokio::test]
async fn test_index_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let pool = open(&tmp).await;
        SqliteIndex::new(pool.clone(), "tasks")
            .upsert(vec![entry("a", 0, "persisted", vec![0.5, 0.5])])
            .await
            .unwrap();
        pool.close().await;
    }
    let pool = open(&tmp).await;
    let index = SqliteIndex::new(pool, "tasks");
    let hits = index.query(&[0.5, 0.5], 1, None).await.unwrap();
    assert_eq!(hits[0].document, "persisted");
}
