use anyhow::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Embedder, normalize};

pub const HASH_DIMENSION: usize = 8;

/// Pseudo-random but deterministic unit vector for `text`
pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut state = hasher.finish() | 1;

    let mut v: Vec<f32> = (0..HASH_DIMENSION)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 2000) as f32 / 1000.0 - 1.0
        })
        .collect();
    v[0] += 0.001;
    normalize(&mut v);
    v
}

/// Deterministic hashing embedder for tests
#[derive(Debug, Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        HASH_DIMENSION
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_vector(text))
    }
}

/// Embedder whose every call fails
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        HASH_DIMENSION
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding backend unavailable")
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("embedding backend unavailable")
    }
}
