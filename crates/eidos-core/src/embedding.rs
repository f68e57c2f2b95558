//! Embedding provider contract: batch of texts in, one unit-length vector per
//! text out, in input order, at a fixed dimensionality per provider.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// A backend that turns text into fixed-dimension embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Returns one L2-normalized vector per input, in
    /// input order. An empty batch returns an empty result without error.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Dimensionality of the vectors this provider produces.
    fn dimensions(&self) -> usize;
}

#[derive(Debug, Error)]
pub enum EmbedError {
    /// The underlying model could not be reached or refused the request.
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
    /// The backend returned the wrong number of vectors for a batch.
    #[error("embedding backend returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Deterministic stand-in embedding for a text: a unit vector seeded from the
/// text's hash. Same input, same vector; unrelated inputs land far apart.
///
/// Used by the fallback path when the real model is down and a degraded mode
/// was explicitly configured. Retrieval quality over these vectors is noise.
pub fn pseudo_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());
    let v: Vec<f32> = (0..dimensions).map(|_| rng.gen_range(-1.0f32..1.0f32)).collect();
    normalize(&v)
}
