// Database module
// A persisted index is a directory holding a LanceDB vector table and a SQLite
// docstore, aligned on chunk position


pub mod lancedb;
pub mod sqlite;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use self::lancedb::EmbeddingRecord;
pub use self::lancedb::vector_store::{SearchResult, VectorStore};
pub use sqlite::DocStore;
pub use sqlite::models::StoredChunk;
use sqlite::models::info_keys;

pub const VECTORS_DIR: &str = "vectors";
pub const DOCSTORE_FILE: &str = "docstore.db";
pub const LAST_UPDATED_FILE: &str = "last_updated.txt";
pub const RELEASE_TAG_FILE: &str = "release_tag.txt";

/// A chunk returned by similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: StoredChunk,
    /// Cosine distance to the query
    pub distance: f32,
}

/// Provenance recorded by the index builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub built_at: Option<String>,
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
}

/// Read side of a persisted index
#[derive(Debug)]
pub struct VectorIndex {
    root: PathBuf,
    vectors: VectorStore,
    docs: DocStore,
}

impl VectorIndex {
    #[inline]
    pub async fn open(root: &Path) -> Result<Self> {
        let vectors = VectorStore::open(&root.join(VECTORS_DIR))
            .await
            .with_context(|| format!("Failed to open vector table in {}", root.display()))?;
        let docs = DocStore::open_read_only(&root.join(DOCSTORE_FILE)).await?;

        info!(
            "Loaded index from {} ({} dimensions)",
            root.display(),
            vectors.vector_dimension()
        );

        Ok(Self {
            root: root.to_path_buf(),
            vectors,
            docs,
        })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vectors.vector_dimension()
    }

    #[inline]
    #[must_use]
    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    #[inline]
    #[must_use]
    pub fn docs(&self) -> &DocStore {
        &self.docs
    }

    #[inline]
    pub async fn build_info(&self) -> Result<BuildInfo> {
        let dimension = match self.docs.get_info(info_keys::DIMENSION).await? {
            Some(raw) => Some(raw.parse().with_context(|| {
                format!("Invalid dimension '{}' in {}", raw, self.root.display())
            })?),
            None => None,
        };
        Ok(BuildInfo {
            built_at: self.docs.get_info(info_keys::BUILT_AT).await?,
            embedding_model: self.docs.get_info(info_keys::EMBEDDING_MODEL).await?,
            dimension,
        })
    }

    /// Vector table readable and matching the dimension the builder recorded
    #[inline]
    pub async fn verify(&self) -> Result<bool> {
        if !self.vectors.validate_integrity().await? {
            return Ok(false);
        }
        let recorded = self.build_info().await?.dimension;
        if recorded.is_some_and(|dimension| dimension != self.dimension()) {
            warn!(
                "{} records {:?} dimensions but vectors have {}",
                self.root.display(),
                recorded,
                self.dimension()
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// The `k` chunks nearest to `query_vector`, best first
    #[inline]
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let hits = self.vectors.search(query_vector, k).await?;
        let positions: Vec<u64> = hits.iter().map(|hit| hit.position).collect();
        let chunks = self.docs.get_chunks(&positions).await?;

        let results: Vec<RetrievedChunk> = hits
            .iter()
            .zip(positions.iter())
            .filter_map(|(hit, position)| {
                chunks
                    .iter()
                    .find(|chunk| chunk.position == *position)
                    .map(|chunk| RetrievedChunk {
                        chunk: chunk.clone(),
                        distance: hit.distance,
                    })
            })
            .collect();

        debug!("Retrieved {} chunks for query", results.len());
        Ok(results)
    }
}

/// Directory layout check used before opening an index
#[inline]
#[must_use]
pub fn index_files_present(root: &Path) -> bool {
    root.join(VECTORS_DIR).is_dir() && root.join(DOCSTORE_FILE).is_file()
}
