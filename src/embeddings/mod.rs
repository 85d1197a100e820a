// Embeddings module
// Text chunking and the embedding backends that turn chunks into vectors

pub mod chunking;
pub mod ollama;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;
use async_trait::async_trait;

pub use chunking::{Chunk, ChunkingConfig, chunk_documents, split_text};
pub use ollama::OllamaClient;

/// Turns text into fixed-dimension, unit-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of every returned vector
    fn dimension(&self) -> usize;

    /// Embed passages for storage, preserving input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Scale a vector to unit length in place; zero vectors are left untouched
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_scales_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0; 4];
        normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }
}
