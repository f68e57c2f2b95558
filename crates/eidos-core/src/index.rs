//! Flat in-memory vector index with exact L2 nearest-neighbor search.
//!
//! Vectors live at ordinal positions in insertion order; callers keep their
//! own records aligned with those ordinals. There is no delete primitive:
//! removing entries means discarding the index and re-adding the survivors,
//! which re-establishes alignment from zero. Exact search over a flat array
//! is plenty for collections where embedding and LLM calls dominate cost.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Growable set of fixed-dimension vectors with exact k-nearest search.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    vectors: Vec<Vec<f32>>,
    /// Fixed by the first non-empty `add`; `None` while the index is empty
    /// and has never been added to.
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append vectors in argument order. The first non-empty batch fixes the
    /// index dimensionality; later batches must agree. The whole batch is
    /// validated before anything is appended, so a failed add leaves the
    /// index exactly as it was.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let dim = self.dimension.unwrap_or(first.len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                got: bad.len(),
            });
        }
        self.dimension = Some(dim);
        self.vectors.extend(vectors);
        Ok(())
    }

    /// Return up to `k` `(ordinal, distance)` pairs ordered by ascending L2
    /// distance, ties broken by lower ordinal. An empty index returns an
    /// empty result; a query of the wrong dimension matches nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }
        if self.dimension != Some(query.len()) {
            tracing::warn!(
                query_dim = query.len(),
                index_dim = ?self.dimension,
                "query dimension does not match index, returning no results"
            );
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, l2_distance(query, v)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality fixed by the first add, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// A batch's vectors disagree with the index dimensionality. This is a
    /// programming or configuration error; vectors are never truncated or
    /// padded to fit.
    #[error("vector dimension mismatch: index holds {expected}-d vectors, got {got}-d")]
    DimensionMismatch { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_search_is_empty() {
        let index = VectorIndex::new();
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn first_add_fixes_dimension() {
        let mut index = VectorIndex::new();
        index.add(vec![vec![1.0, 0.0]]).unwrap();
        assert_eq!(index.dimension(), Some(2));
        let err = index.add(vec![vec![1.0, 0.0, 0.0]]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 2, got: 3 }
        ));
        // Failed add left the index untouched.
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn mixed_batch_rejected_without_partial_append() {
        let mut index = VectorIndex::new();
        let err = index.add(vec![vec![1.0, 0.0], vec![0.0]]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn search_orders_by_distance_then_ordinal() {
        let mut index = VectorIndex::new();
        index
            .add(vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0], // same distance as ordinal 0
            ])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 1);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn search_never_exceeds_population() {
        let mut index = VectorIndex::new();
        index.add(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 2);
        assert_eq!(index.search(&[1.0, 0.0], 1).len(), 1);
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let mut index = VectorIndex::new();
        index.add(Vec::new()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }
}
