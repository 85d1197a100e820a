use super::*;

fn chunk() -> Chunk {
    let mut metadata = BTreeMap::new();
    metadata.insert(SOURCE_KEY.to_string(), "doc/index.rst".to_string());
    metadata.insert(REPOSITORY_KEY.to_string(), "pypsa".to_string());
    metadata.insert("title".to_string(), "Index".to_string());
    Chunk {
        content: "PyPSA stands for Python for Power System Analysis.".to_string(),
        metadata,
    }
}

#[test]
fn new_row_splits_out_source_and_repository() {
    let row = NewChunkRow::from_chunk(5, &chunk()).expect("should build row");

    assert_eq!(row.position, 5);
    assert_eq!(row.source, "doc/index.rst");
    assert_eq!(row.repository, "pypsa");
    assert_eq!(row.metadata, r#"{"title":"Index"}"#);
}

#[test]
fn stored_chunk_restores_metadata() {
    let row = ChunkRow {
        position: 2,
        content: "text".to_string(),
        source: "Snakefile".to_string(),
        repository: "pypsa-eur".to_string(),
        metadata: r#"{"url":"https://github.com/PyPSA/pypsa-eur/issues/1"}"#.to_string(),
    };

    let stored = StoredChunk::try_from(row).expect("should convert row");
    assert_eq!(stored.position, 2);
    assert_eq!(stored.source(), "Snakefile");
    assert_eq!(stored.repository(), "pypsa-eur");
    assert_eq!(stored.metadata.len(), 3);
}

#[test]
fn negative_position_is_rejected() {
    let row = ChunkRow {
        position: -1,
        content: String::new(),
        source: String::new(),
        repository: String::new(),
        metadata: "{}".to_string(),
    };
    assert!(StoredChunk::try_from(row).is_err());
}

#[test]
fn malformed_metadata_is_rejected() {
    let row = ChunkRow {
        position: 0,
        content: String::new(),
        source: String::new(),
        repository: String::new(),
        metadata: "not json".to_string(),
    };
    assert!(StoredChunk::try_from(row).is_err());
}
