use super::*;

#[test]
fn embedding_record_structure() {
    let record = EmbeddingRecord::new(7, vec![0.6, 0.8]);

    assert_eq!(record.position, 7);
    assert_eq!(record.vector.len(), 2);
}

#[test]
fn embedding_record_serialization() {
    let record = EmbeddingRecord::new(3, vec![1.0, 0.0, 0.0]);

    let json = serde_json::to_string(&record).expect("should serialize record");
    assert!(json.contains("\"position\":3"));

    let back: EmbeddingRecord = serde_json::from_str(&json).expect("should deserialize record");
    assert_eq!(back, record);
}
