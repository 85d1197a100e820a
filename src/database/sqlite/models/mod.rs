#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::embeddings::Chunk;
use crate::sources::{REPOSITORY_KEY, SOURCE_KEY};

/// Row shape of the `chunks` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ChunkRow {
    pub position: i64,
    pub content: String,
    pub source: String,
    pub repository: String,
    pub metadata: String,
}

/// A chunk as read back from the docstore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub position: u64,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl StoredChunk {
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map_or("", String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn repository(&self) -> &str {
        self.metadata.get(REPOSITORY_KEY).map_or("", String::as_str)
    }
}

impl TryFrom<ChunkRow> for StoredChunk {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        let position = u64::try_from(row.position)
            .map_err(|_| anyhow::anyhow!("Negative chunk position {}", row.position))?;
        let mut metadata: BTreeMap<String, String> = serde_json::from_str(&row.metadata)
            .map_err(|e| anyhow::anyhow!("Invalid metadata at position {}: {}", position, e))?;
        metadata.insert(SOURCE_KEY.to_string(), row.source);
        metadata.insert(REPOSITORY_KEY.to_string(), row.repository);

        Ok(Self {
            position,
            content: row.content,
            metadata,
        })
    }
}

/// Insert shape for a chunk at a given position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChunkRow {
    pub position: i64,
    pub content: String,
    pub source: String,
    pub repository: String,
    pub metadata: String,
}

impl NewChunkRow {
    #[inline]
    pub fn from_chunk(position: u64, chunk: &Chunk) -> anyhow::Result<Self> {
        let position = i64::try_from(position)
            .map_err(|_| anyhow::anyhow!("Chunk position {} out of range", position))?;

        let extra: BTreeMap<&str, &str> = chunk
            .metadata
            .iter()
            .filter(|(key, _)| key.as_str() != SOURCE_KEY && key.as_str() != REPOSITORY_KEY)
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();

        Ok(Self {
            position,
            content: chunk.content.clone(),
            source: chunk.metadata.get(SOURCE_KEY).cloned().unwrap_or_default(),
            repository: chunk
                .metadata
                .get(REPOSITORY_KEY)
                .cloned()
                .unwrap_or_default(),
            metadata: serde_json::to_string(&extra)?,
        })
    }
}

/// Keys written to the `index_info` table
pub mod info_keys {
    pub const BUILT_AT: &str = "built_at";
    pub const EMBEDDING_MODEL: &str = "embedding_model";
    pub const DIMENSION: &str = "dimension";
}
