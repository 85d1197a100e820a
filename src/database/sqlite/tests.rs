use super::*;
use crate::sources::{REPOSITORY_KEY, SOURCE_KEY};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use tempfile::TempDir;

fn chunk(content: &str, source: &str) -> Chunk {
    let mut metadata = BTreeMap::new();
    metadata.insert(SOURCE_KEY.to_string(), source.to_string());
    metadata.insert(REPOSITORY_KEY.to_string(), "linopy".to_string());
    Chunk {
        content: content.to_string(),
        metadata,
    }
}

#[tokio::test]
async fn integration_schema_migration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DocStore::create(&temp_dir.path().join("docstore.db")).await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'",
    )
    .fetch_all(store.pool())
    .await?;

    let expected_tables: HashSet<&'static str> = ["chunks", "index_info"].into_iter().collect();
    let actual_tables: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual_tables, expected_tables);

    Ok(())
}

#[tokio::test]
async fn insert_chunks_assigns_consecutive_positions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DocStore::create(&temp_dir.path().join("docstore.db")).await?;

    store
        .insert_chunks(0, &[chunk("a", "doc/a.rst"), chunk("b", "doc/b.rst")])
        .await?;
    store.insert_chunks(2, &[chunk("c", "linopy/model.py")]).await?;

    assert_eq!(store.list_positions().await?, vec![0, 1, 2]);
    let fetched = store.get_chunks(&[2]).await?;
    assert_eq!(fetched[0].content, "c");
    assert_eq!(fetched[0].source(), "linopy/model.py");
    assert_eq!(fetched[0].repository(), "linopy");

    Ok(())
}

#[tokio::test]
async fn create_replaces_existing_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("docstore.db");

    let store = DocStore::create(&path).await?;
    store.insert_chunks(0, &[chunk("old", "old.py")]).await?;
    store.close().await;

    let store = DocStore::create(&path).await?;
    assert_eq!(store.count_chunks().await?, 0);

    Ok(())
}

#[tokio::test]
async fn read_only_store_rejects_writes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("docstore.db");

    let store = DocStore::create(&path).await?;
    store.insert_chunks(0, &[chunk("a", "a.py")]).await?;
    store.close().await;

    let reader = DocStore::open_read_only(&path).await?;
    assert_eq!(reader.count_chunks().await?, 1);
    assert!(reader.insert_chunks(1, &[chunk("b", "b.py")]).await.is_err());

    Ok(())
}

#[tokio::test]
async fn open_missing_file_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    assert!(
        DocStore::open_read_only(&temp_dir.path().join("missing.db"))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn optimize_keeps_data() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DocStore::create(&temp_dir.path().join("docstore.db")).await?;
    store.insert_chunks(0, &[chunk("a", "a.py")]).await?;

    store.optimize().await?;
    assert_eq!(store.count_chunks().await?, 1);

    Ok(())
}
