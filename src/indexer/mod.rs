// Indexer module
// Turns the declared repositories into a persisted, searchable index

pub mod consistency;


use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::HelperError;
use crate::database::sqlite::models::info_keys;
use crate::database::{
    DOCSTORE_FILE, DocStore, EmbeddingRecord, LAST_UPDATED_FILE, VECTORS_DIR, VectorStore,
};
use crate::embeddings::{Chunk, ChunkingConfig, Embedder, chunk_documents};
use crate::sources::{DocumentLoader, SourceCollector, SourceRepository};

pub use consistency::{ConsistencyReport, ConsistencyValidator};

/// Statistics about one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub repositories: usize,
    pub file_documents: usize,
    pub issue_documents: usize,
    pub skipped_targets: usize,
    pub chunks: usize,
}

/// Statistics about a finished index build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStats {
    pub chunks: usize,
    pub batches: usize,
    pub dimension: usize,
}

/// Clone (if needed), load and chunk every repository, in declaration order
#[inline]
pub fn collect_chunks(
    repositories: &[SourceRepository],
    collector: &SourceCollector,
    loader: &DocumentLoader,
    chunking: &ChunkingConfig,
) -> Result<(Vec<Chunk>, IngestionStats)> {
    let mut documents = Vec::new();
    let mut stats = IngestionStats::default();

    for repo in repositories {
        info!("Processing repository: {}", repo.name);
        let path = collector
            .ensure_cloned(repo)
            .with_context(|| format!("Failed to clone {}", repo.name))?;

        let (repo_documents, load_stats) = loader.load_repository(repo, &path);
        stats.repositories += 1;
        stats.file_documents += load_stats.file_documents;
        stats.issue_documents += load_stats.issue_documents;
        stats.skipped_targets += load_stats.skipped_targets;
        documents.extend(repo_documents);
    }

    info!("Loaded {} documents in total", documents.len());

    let chunks = chunk_documents(&documents, chunking);
    stats.chunks = chunks.len();
    info!("Split documents into {} chunks", chunks.len());

    Ok((chunks, stats))
}

/// Embeds chunks in fixed-size batches and writes them into a fresh index
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    model_name: String,
}

impl IndexBuilder {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            model_name: String::new(),
        }
    }

    /// Record the embedding model name in the index info table
    #[inline]
    #[must_use]
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Build the index for `chunks` and install it at `index_dir`
    ///
    /// The build writes into a sibling staging directory; the old index is
    /// only replaced after every batch has been stored and the two stores
    /// agree on positions.
    #[inline]
    pub async fn build(&self, chunks: &[Chunk], index_dir: &Path) -> Result<BuildStats> {
        if chunks.is_empty() {
            return Err(HelperError::Ingestion("No chunks to index".to_string()).into());
        }

        let staging = staging_path(index_dir);
        if staging.exists() {
            warn!("Removing leftover staging directory {}", staging.display());
            std::fs::remove_dir_all(&staging).with_context(|| {
                format!("Failed to remove staging directory {}", staging.display())
            })?;
        }

        let result = self.build_into(chunks, &staging).await;
        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                error!("Index build failed: {}", e);
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    debug!("Staging cleanup failed: {}", cleanup);
                }
                return Err(e);
            }
        };

        replace_dir(&staging, index_dir)?;
        info!(
            "Index with {} chunks saved to {}",
            stats.chunks,
            index_dir.display()
        );
        Ok(stats)
    }

    async fn build_into(&self, chunks: &[Chunk], staging: &Path) -> Result<BuildStats> {
        let dimension = self.embedder.dimension();
        let vectors = VectorStore::create(&staging.join(VECTORS_DIR), dimension).await?;
        let docs = DocStore::create(&staging.join(DOCSTORE_FILE)).await?;

        let total_batches = chunks.len().div_ceil(self.batch_size);
        let bar = progress_bar(total_batches as u64);

        let mut position = 0u64;
        for (batch_number, batch) in chunks.chunks(self.batch_size).enumerate() {
            bar.set_message(format!("batch {}/{}", batch_number + 1, total_batches));
            info!(
                "Embedding batch {}/{} ({} chunks)",
                batch_number + 1,
                total_batches,
                batch.len()
            );

            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self
                .embedder
                .embed_documents(&texts)
                .await
                .with_context(|| format!("Failed to embed batch {}", batch_number + 1))?;

            if embeddings.len() != batch.len() {
                return Err(HelperError::Embedding(format!(
                    "Embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                ))
                .into());
            }

            let records: Vec<EmbeddingRecord> = embeddings
                .into_iter()
                .zip(position..)
                .map(|(vector, pos)| EmbeddingRecord::new(pos, vector))
                .collect();

            vectors.add_batch(&records).await?;
            docs.insert_chunks(position, batch).await?;

            position += batch.len() as u64;
            bar.inc(1);
        }
        bar.finish_and_clear();

        docs.set_info(info_keys::BUILT_AT, &Utc::now().to_rfc3339())
            .await?;
        docs.set_info(info_keys::DIMENSION, &dimension.to_string())
            .await?;
        if !self.model_name.is_empty() {
            docs.set_info(info_keys::EMBEDDING_MODEL, &self.model_name)
                .await?;
        }

        vectors.optimize().await?;
        docs.optimize().await?;

        let report = ConsistencyValidator::new(&docs, &vectors)
            .validate_consistency()
            .await?;
        if !report.is_consistent {
            return Err(HelperError::Database(report.summary()).into());
        }

        docs.close().await;
        write_timestamp(staging)?;

        Ok(BuildStats {
            chunks: chunks.len(),
            batches: total_batches,
            dimension,
        })
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    if console::user_attended_stderr() {
        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len).with_style(style)
    } else {
        ProgressBar::hidden()
    }
}

fn staging_path(index_dir: &Path) -> PathBuf {
    let name = index_dir
        .file_name()
        .map_or_else(|| "index".into(), |n| n.to_string_lossy().into_owned());
    index_dir.with_file_name(format!("{}.staging", name))
}

/// Swap `staging` into place at `target`, removing whatever was there
fn replace_dir(staging: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        std::fs::remove_dir_all(target)
            .with_context(|| format!("Failed to remove old index {}", target.display()))?;
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::rename(staging, target).with_context(|| {
        format!(
            "Failed to move {} to {}",
            staging.display(),
            target.display()
        )
    })
}

/// Write the `last_updated.txt` stamp whose mtime drives freshness checks
#[inline]
pub fn write_timestamp(index_dir: &Path) -> Result<()> {
    let path = index_dir.join(LAST_UPDATED_FILE);
    std::fs::write(&path, Utc::now().to_rfc3339())
        .with_context(|| format!("Failed to write {}", path.display()))
}
