use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{NewChunkRow, StoredChunk};
use crate::database::sqlite::queries::{ChunkQueries, IndexInfoQueries};
use crate::embeddings::Chunk;

#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Chunk text and metadata keyed by index position
#[derive(Debug, Clone)]
pub struct DocStore {
    pool: DbPool,
}

impl DocStore {
    /// Create a new, empty docstore at `path`, replacing any file already there
    #[inline]
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create docstore directory: {}", parent.display())
            })?;
        }
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove old docstore: {}", path.display()))?;
        }

        // Rollback journal keeps the docstore a single file inside release archives
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create docstore connection pool")?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing docstore for reading
    #[inline]
    pub async fn open_read_only(path: &Path) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("Docstore not found at {}", path.display());
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open docstore at {}", path.display()))?;

        debug!("Opened docstore at {}", path.display());
        Ok(Self { pool })
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running docstore migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Docstore migrations completed successfully");
        Ok(())
    }

    /// Store `chunks` at consecutive positions starting from `first_position`
    #[inline]
    pub async fn insert_chunks(&self, first_position: u64, chunks: &[Chunk]) -> Result<()> {
        let rows = chunks
            .iter()
            .zip(first_position..)
            .map(|(chunk, position)| NewChunkRow::from_chunk(position, chunk))
            .collect::<Result<Vec<_>>>()?;

        ChunkQueries::insert_batch(&self.pool, &rows).await
    }

    #[inline]
    pub async fn get_chunks(&self, positions: &[u64]) -> Result<Vec<StoredChunk>> {
        ChunkQueries::get_by_positions(&self.pool, positions).await
    }

    #[inline]
    pub async fn count_chunks(&self) -> Result<u64> {
        ChunkQueries::count(&self.pool).await
    }

    #[inline]
    pub async fn list_positions(&self) -> Result<Vec<u64>> {
        ChunkQueries::list_positions(&self.pool).await
    }

    #[inline]
    pub async fn count_by_repository(&self) -> Result<Vec<(String, u64)>> {
        ChunkQueries::count_by_repository(&self.pool).await
    }

    #[inline]
    pub async fn set_info(&self, key: &str, value: &str) -> Result<()> {
        IndexInfoQueries::set(&self.pool, key, value).await
    }

    #[inline]
    pub async fn get_info(&self, key: &str) -> Result<Option<String>> {
        IndexInfoQueries::get(&self.pool, key).await
    }

    /// Reclaim space and refresh planner statistics
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing docstore");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum docstore")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze docstore")?;

        debug!("Docstore optimization completed");
        Ok(())
    }

    /// Close the pool so the file can be moved
    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
