// LanceDB vector database module
// Holds one unit-length vector per chunk, keyed by the chunk's index position

#[cfg(test)]
mod tests;

pub mod vector_store;

use serde::{Deserialize, Serialize};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Position of the chunk in the index; matches the docstore row
    pub position: u64,
    /// The vector embedding (1024 dimensions for bge-large)
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    #[inline]
    #[must_use]
    pub fn new(position: u64, vector: Vec<f32>) -> Self {
        Self { position, vector }
    }
}
