use super::*;
use crate::database::sqlite::DocStore;
use tempfile::TempDir;

fn row(position: i64, repository: &str) -> NewChunkRow {
    NewChunkRow {
        position,
        content: format!("chunk {position}"),
        source: format!("file_{position}.py"),
        repository: repository.to_string(),
        metadata: "{}".to_string(),
    }
}

async fn store() -> (TempDir, DocStore) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = DocStore::create(&temp_dir.path().join("docstore.db"))
        .await
        .expect("should create docstore");
    (temp_dir, store)
}

#[tokio::test]
async fn insert_and_fetch_in_requested_order() {
    let (_dir, store) = store().await;
    let rows: Vec<NewChunkRow> = (0..5).map(|i| row(i, "pypsa")).collect();
    ChunkQueries::insert_batch(store.pool(), &rows)
        .await
        .expect("should insert rows");

    let chunks = ChunkQueries::get_by_positions(store.pool(), &[3, 0, 4])
        .await
        .expect("should fetch chunks");

    let positions: Vec<u64> = chunks.iter().map(|c| c.position).collect();
    assert_eq!(positions, vec![3, 0, 4]);
    assert_eq!(chunks[0].content, "chunk 3");
    assert_eq!(chunks[0].source(), "file_3.py");
}

#[tokio::test]
async fn unknown_positions_are_skipped() {
    let (_dir, store) = store().await;
    ChunkQueries::insert_batch(store.pool(), &[row(0, "pypsa")])
        .await
        .expect("should insert rows");

    let chunks = ChunkQueries::get_by_positions(store.pool(), &[9, 0])
        .await
        .expect("should fetch chunks");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].position, 0);
}

#[tokio::test]
async fn duplicate_position_rolls_back_batch() {
    let (_dir, store) = store().await;
    let rows = vec![row(0, "pypsa"), row(1, "pypsa"), row(1, "pypsa")];

    assert!(ChunkQueries::insert_batch(store.pool(), &rows).await.is_err());
    assert_eq!(ChunkQueries::count(store.pool()).await.expect("should count"), 0);
}

#[tokio::test]
async fn counts_and_positions() {
    let (_dir, store) = store().await;
    let rows = vec![
        row(2, "pypsa-eur"),
        row(0, "pypsa"),
        row(1, "pypsa-eur"),
    ];
    ChunkQueries::insert_batch(store.pool(), &rows)
        .await
        .expect("should insert rows");

    assert_eq!(ChunkQueries::count(store.pool()).await.expect("should count"), 3);
    assert_eq!(
        ChunkQueries::list_positions(store.pool())
            .await
            .expect("should list positions"),
        vec![0, 1, 2]
    );
    assert_eq!(
        ChunkQueries::count_by_repository(store.pool())
            .await
            .expect("should group counts"),
        vec![("pypsa".to_string(), 1), ("pypsa-eur".to_string(), 2)]
    );
}

#[tokio::test]
async fn index_info_round_trip() {
    let (_dir, store) = store().await;
    IndexInfoQueries::set(store.pool(), "dimension", "1024")
        .await
        .expect("should set info");
    IndexInfoQueries::set(store.pool(), "dimension", "768")
        .await
        .expect("should replace info");

    assert_eq!(
        IndexInfoQueries::get(store.pool(), "dimension")
            .await
            .expect("should get info"),
        Some("768".to_string())
    );
    assert_eq!(
        IndexInfoQueries::get(store.pool(), "missing")
            .await
            .expect("should get info"),
        None
    );
}
