use super::*;
use crate::database::EmbeddingRecord;
use crate::embeddings::Chunk;
use std::collections::BTreeMap;
use tempfile::TempDir;

#[test]
fn aligned_positions_are_consistent() {
    let report = ConsistencyReport::compare(&[0, 1, 2], &[2, 0, 1]);

    assert!(report.is_consistent);
    assert_eq!(report.total_issues(), 0);
    assert!(report.summary().contains("Index is consistent"));
}

#[test]
fn missing_and_orphaned_positions_are_reported() {
    let report = ConsistencyReport::compare(&[0, 1, 2, 3], &[0, 1, 4]);

    assert!(!report.is_consistent);
    assert_eq!(report.missing_vectors, vec![2, 3]);
    assert_eq!(report.orphaned_vectors, vec![4]);
    assert_eq!(report.total_issues(), 3);
    assert!(report.summary().contains("inconsistencies found"));
}

#[test]
fn duplicate_vector_positions_are_reported() {
    let report = ConsistencyReport::compare(&[0, 1], &[0, 1, 1]);

    assert!(!report.is_consistent);
    assert_eq!(report.duplicate_vectors, vec![1]);
    assert_eq!(report.vector_embeddings, 3);
}

#[test]
fn empty_stores_are_consistent() {
    assert!(ConsistencyReport::compare(&[], &[]).is_consistent);
}

#[tokio::test]
async fn validator_reads_both_stores() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let vectors = VectorStore::create(&temp_dir.path().join("vectors"), 2)
        .await
        .expect("should create vectors");
    let docs = DocStore::create(&temp_dir.path().join("docstore.db"))
        .await
        .expect("should create docstore");

    vectors
        .add_batch(&[
            EmbeddingRecord::new(0, vec![1.0, 0.0]),
            EmbeddingRecord::new(1, vec![0.0, 1.0]),
        ])
        .await
        .expect("should add vectors");
    let chunk = Chunk {
        content: "only one chunk".to_string(),
        metadata: BTreeMap::new(),
    };
    docs.insert_chunks(0, &[chunk])
        .await
        .expect("should add chunk");

    let report = ConsistencyValidator::new(&docs, &vectors)
        .validate_consistency()
        .await
        .expect("should validate");

    assert!(!report.is_consistent);
    assert_eq!(report.orphaned_vectors, vec![1]);
    assert_eq!(report.docstore_chunks, 1);
}
