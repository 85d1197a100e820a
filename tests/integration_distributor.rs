#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! A locally built index published as a release asset and fetched elsewhere
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use pypsa_helper_bot::config::DistributorConfig;
use pypsa_helper_bot::database::{RELEASE_TAG_FILE, VectorIndex};
use pypsa_helper_bot::distributor::{DownloadOutcome, IndexDistributor, IndexState};
use pypsa_helper_bot::embeddings::{Chunk, Embedder};
use pypsa_helper_bot::indexer::IndexBuilder;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INDEX_NAME: &str = "pypsa_ecosystem_faiss_index";

/// One-hot embedding on the first character
struct InitialEmbedder;

fn initial_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; 3];
    match text.chars().next() {
        Some('a') => vector[0] = 1.0,
        Some('b') => vector[1] = 1.0,
        _ => vector[2] = 1.0,
    }
    vector
}

#[async_trait]
impl Embedder for InitialEmbedder {
    fn dimension(&self) -> usize {
        3
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| initial_vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(initial_vector(text))
    }
}

fn chunk(content: &str, source: &str) -> Chunk {
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), source.to_string());
    metadata.insert("repository".to_string(), "pypsa".to_string());
    Chunk {
        content: content.to_string(),
        metadata,
    }
}

fn archive_index(index_dir: &Path) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    builder
        .append_dir_all(INDEX_NAME, index_dir)
        .expect("should archive index");
    builder
        .into_inner()
        .expect("should finish tar")
        .finish()
        .expect("should finish gzip")
}

#[tokio::test]
async fn published_index_can_be_fetched_and_searched() {
    let build_dir = TempDir::new().expect("should create temp dir");
    let built_index = build_dir.path().join(INDEX_NAME);
    IndexBuilder::new(Arc::new(InitialEmbedder), 2)
        .build(
            &[
                chunk("buses connect components", "doc/buses.rst"),
                chunk("lines carry power", "doc/lines.rst"),
                chunk("all about carriers", "doc/carriers.rst"),
            ],
            &built_index,
        )
        .await
        .expect("should build index");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/GbotemiB/pypsa-helper-bot/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "tag_name": "index-2024-05-01",
            "created_at": "2024-05-01T12:00:00Z",
            "assets": [{
                "name": "faiss-index.tar.gz",
                "browser_download_url": format!("{}/assets/faiss-index.tar.gz", server.uri())
            }]
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/assets/faiss-index.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_index(&built_index)))
        .expect(1)
        .mount(&server)
        .await;

    let serve_dir = TempDir::new().expect("should create temp dir");
    let local_index = serve_dir.path().join(INDEX_NAME);
    let config = DistributorConfig {
        api_base: server.uri(),
        ..DistributorConfig::default()
    };
    let distributor = Arc::new(
        IndexDistributor::new(config, &local_index, None).expect("should build distributor"),
    );
    assert_eq!(distributor.index_state(), IndexState::Absent);

    let worker = Arc::clone(&distributor);
    let outcome = tokio::task::spawn_blocking(move || worker.download_index(false))
        .await
        .expect("download task should not panic")
        .expect("download should succeed");
    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            tag: "index-2024-05-01".to_string()
        }
    );
    assert_eq!(distributor.index_state(), IndexState::Fresh);
    assert_eq!(
        std::fs::read_to_string(local_index.join(RELEASE_TAG_FILE)).expect("tag file"),
        "index-2024-05-01"
    );

    let worker = Arc::clone(&distributor);
    let update = tokio::task::spawn_blocking(move || worker.check_for_updates())
        .await
        .expect("update task should not panic");
    assert!(!update);

    let index = VectorIndex::open(&local_index).await.expect("should open fetched index");
    let hits = index
        .search(&initial_vector("b"), 1)
        .await
        .expect("should search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.source(), "doc/buses.rst");
}
