#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, warn};

pub struct ChunkQueries;

impl ChunkQueries {
    /// Insert rows in one transaction; either all land or none do
    #[inline]
    pub async fn insert_batch(pool: &SqlitePool, rows: &[NewChunkRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        for row in rows {
            sqlx::query(
                "INSERT INTO chunks (position, content, source, repository, metadata) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(row.position)
            .bind(&row.content)
            .bind(&row.source)
            .bind(&row.repository)
            .bind(&row.metadata)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert chunk at position {}", row.position))?;
        }

        tx.commit().await.context("Failed to commit chunk batch")?;
        debug!("Inserted {} chunks", rows.len());
        Ok(())
    }

    /// Fetch chunks in the order of `positions`; unknown positions are skipped
    #[inline]
    pub async fn get_by_positions(pool: &SqlitePool, positions: &[u64]) -> Result<Vec<StoredChunk>> {
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; positions.len()].join(", ");
        let sql = format!(
            "SELECT position, content, source, repository, metadata FROM chunks WHERE position IN ({})",
            placeholders
        );

        let mut query = sqlx::query_as::<_, ChunkRow>(&sql);
        for &position in positions {
            let position = i64::try_from(position)
                .with_context(|| format!("Chunk position {} out of range", position))?;
            query = query.bind(position);
        }

        let rows = query
            .fetch_all(pool)
            .await
            .context("Failed to get chunks by position")?;

        let mut by_position: HashMap<i64, ChunkRow> =
            rows.into_iter().map(|row| (row.position, row)).collect();

        let mut chunks = Vec::with_capacity(positions.len());
        for &position in positions {
            let key = i64::try_from(position).unwrap_or(i64::MAX);
            match by_position.remove(&key) {
                Some(row) => chunks.push(StoredChunk::try_from(row)?),
                None => warn!("No chunk stored at position {}", position),
            }
        }

        Ok(chunks)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[inline]
    pub async fn list_positions(pool: &SqlitePool) -> Result<Vec<u64>> {
        let positions: Vec<i64> = sqlx::query_scalar("SELECT position FROM chunks ORDER BY position")
            .fetch_all(pool)
            .await
            .context("Failed to list chunk positions")?;

        positions
            .into_iter()
            .map(|p| u64::try_from(p).with_context(|| format!("Negative chunk position {}", p)))
            .collect()
    }

    /// Chunk counts per repository, sorted by repository name
    #[inline]
    pub async fn count_by_repository(pool: &SqlitePool) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT repository, COUNT(*) FROM chunks GROUP BY repository ORDER BY repository",
        )
        .fetch_all(pool)
        .await
        .context("Failed to count chunks by repository")?;

        Ok(rows
            .into_iter()
            .map(|(repo, count)| (repo, u64::try_from(count).unwrap_or(0)))
            .collect())
    }
}

pub struct IndexInfoQueries;

impl IndexInfoQueries {
    #[inline]
    pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO index_info (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to set index info {}", key))?;
        Ok(())
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM index_info WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("Failed to get index info {}", key))
    }
}
