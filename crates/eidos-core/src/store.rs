//! Document store: chunk records, derived metadata, and the vector index,
//! kept strictly aligned by ordinal position.
//!
//! Invariant: for all i, the vector at ordinal i in the index embeds
//! `chunks[i]`, and `metadata[i]` describes `chunks[i]`. Every mutator
//! validates its inputs before touching any of the three structures, so a
//! failed call never leaves a partial append or a misaligned pair.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::chunks::Chunk;
use crate::index::{IndexError, VectorIndex};

/// A chunk record plus its position-derived identifier.
///
/// `doc_id` equals the chunk's ordinal position at insertion time and is
/// recomputed on rebuild: after a removal, surviving chunks are renumbered
/// from zero. It identifies a slot, not a chunk across its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub doc_id: usize,
    pub chunk: Chunk,
}

/// A search hit: the matched chunk, its current slot, and its L2 distance
/// from the query (smaller is closer).
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub doc_id: usize,
    pub chunk: Chunk,
    pub distance: f32,
}

/// Chunks, metadata, and embeddings as one index-aligned unit.
#[derive(Debug, Default)]
pub struct DocumentStore {
    index: VectorIndex,
    chunks: Vec<Chunk>,
    metadata: Vec<ChunkMeta>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from persisted parts. The caller (the persistence
    /// layer) has already validated alignment.
    pub(crate) fn from_parts(index: VectorIndex, chunks: Vec<Chunk>, metadata: Vec<ChunkMeta>) -> Self {
        debug_assert_eq!(index.len(), chunks.len());
        debug_assert_eq!(chunks.len(), metadata.len());
        Self { index, chunks, metadata }
    }

    /// Append a batch of chunks with their embeddings. One embedding per
    /// chunk, all of the index dimensionality; on any validation failure the
    /// store is left unmodified.
    pub fn add_documents(
        &mut self,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), StoreError> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::BatchMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(());
        }
        // The index validates the whole batch before appending, so a
        // dimension error here cannot leave the arrays out of step.
        self.index.add(embeddings)?;
        let base = self.chunks.len();
        for (offset, chunk) in chunks.iter().enumerate() {
            self.metadata.push(ChunkMeta {
                doc_id: base + offset,
                chunk: chunk.clone(),
            });
        }
        self.chunks.extend(chunks);
        tracing::debug!(total = self.chunks.len(), "added chunk batch to store");
        Ok(())
    }

    /// Partition for removal: the chunks that would survive removing
    /// `filename`, or `None` if no stored chunk has that filename. Does not
    /// mutate; the caller re-embeds the survivors and calls [`rebuild`].
    ///
    /// [`rebuild`]: DocumentStore::rebuild
    pub fn kept_after_remove(&self, filename: &str) -> Option<Vec<Chunk>> {
        if self.chunks.is_empty() {
            return None;
        }
        let kept: Vec<Chunk> = self
            .chunks
            .iter()
            .filter(|c| c.filename != filename)
            .cloned()
            .collect();
        if kept.len() == self.chunks.len() {
            return None;
        }
        Some(kept)
    }

    /// Replace the whole store with the given chunks and their fresh
    /// embeddings, renumbering `doc_id` from zero. This is the only removal
    /// path: the index has no selective delete, so survivors are re-embedded
    /// and re-added in a new index.
    pub fn rebuild(
        &mut self,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), StoreError> {
        let mut fresh = DocumentStore::new();
        fresh.add_documents(chunks, embeddings)?;
        *self = fresh;
        Ok(())
    }

    /// Empty the index and both arrays. Idempotent.
    pub fn clear(&mut self) {
        self.index = VectorIndex::new();
        self.chunks.clear();
        self.metadata.clear();
    }

    /// K-nearest chunks to the query embedding, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        self.index
            .search(query, k)
            .into_iter()
            .map(|(ordinal, distance)| SearchHit {
                doc_id: self.metadata[ordinal].doc_id,
                chunk: self.chunks[ordinal].clone(),
                distance,
            })
            .collect()
    }

    /// Number of distinct source files. "Documents" are files the user
    /// uploaded; chunks are how the index slices them.
    pub fn document_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| c.filename.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of stored chunks (equals the number of indexed vectors).
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn metadata(&self) -> &[ChunkMeta] {
        &self.metadata
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("batch mismatch: {chunks} chunks but {embeddings} embeddings")]
    BatchMismatch { chunks: usize, embeddings: usize },
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(filename: &str, chunk_id: usize, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            filename: filename.to_string(),
            file_type: "txt".to_string(),
            file_path: format!("/tmp/{filename}"),
            chunk_id,
            total_chunks: 1,
        }
    }

    fn vec2(x: f32, y: f32) -> Vec<f32> {
        vec![x, y]
    }

    #[test]
    fn add_keeps_arrays_aligned() {
        let mut store = DocumentStore::new();
        store
            .add_documents(
                vec![chunk("a.txt", 0, "alpha"), chunk("b.txt", 0, "beta")],
                vec![vec2(1.0, 0.0), vec2(0.0, 1.0)],
            )
            .unwrap();
        assert_eq!(store.index().len(), store.chunk_count());
        assert_eq!(store.metadata().len(), store.chunk_count());
        for (i, m) in store.metadata().iter().enumerate() {
            assert_eq!(m.doc_id, i);
            assert_eq!(m.chunk, store.chunks()[i]);
        }
    }

    #[test]
    fn mismatched_batch_leaves_store_unmodified() {
        let mut store = DocumentStore::new();
        let err = store
            .add_documents(vec![chunk("a.txt", 0, "alpha")], Vec::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::BatchMismatch { .. }));
        assert!(store.is_empty());
        assert_eq!(store.index().len(), 0);
    }

    #[test]
    fn dimension_error_leaves_store_unmodified() {
        let mut store = DocumentStore::new();
        store
            .add_documents(vec![chunk("a.txt", 0, "alpha")], vec![vec2(1.0, 0.0)])
            .unwrap();
        let err = store
            .add_documents(vec![chunk("b.txt", 0, "beta")], vec![vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, StoreError::Index(_)));
        assert_eq!(store.chunk_count(), 1);
        assert_eq!(store.index().len(), 1);
    }

    #[test]
    fn kept_after_remove_partitions_by_filename() {
        let mut store = DocumentStore::new();
        store
            .add_documents(
                vec![
                    chunk("f.txt", 0, "f0"),
                    chunk("g.txt", 0, "g0"),
                    chunk("f.txt", 1, "f1"),
                    chunk("h.txt", 0, "h0"),
                ],
                vec![
                    vec2(1.0, 0.0),
                    vec2(0.0, 1.0),
                    vec2(0.9, 0.1),
                    vec2(0.5, 0.5),
                ],
            )
            .unwrap();
        let kept = store.kept_after_remove("f.txt").unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|c| c.filename != "f.txt"));
        assert!(store.kept_after_remove("missing.txt").is_none());
        // Planning did not mutate.
        assert_eq!(store.chunk_count(), 4);
    }

    #[test]
    fn rebuild_renumbers_doc_ids() {
        let mut store = DocumentStore::new();
        store
            .add_documents(
                vec![
                    chunk("f.txt", 0, "f0"),
                    chunk("g.txt", 0, "g0"),
                    chunk("h.txt", 0, "h0"),
                ],
                vec![vec2(1.0, 0.0), vec2(0.0, 1.0), vec2(0.5, 0.5)],
            )
            .unwrap();
        let kept = store.kept_after_remove("g.txt").unwrap();
        store
            .rebuild(kept, vec![vec2(1.0, 0.0), vec2(0.5, 0.5)])
            .unwrap();
        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.index().len(), 2);
        let ids: Vec<usize> = store.metadata().iter().map(|m| m.doc_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(store.kept_after_remove("g.txt").is_none());
    }

    #[test]
    fn removal_leaves_only_survivors_searchable() {
        let mut store = DocumentStore::new();
        store
            .add_documents(
                vec![
                    chunk("f.txt", 0, "f0"),
                    chunk("g.txt", 0, "g0"),
                    chunk("h.txt", 0, "h0"),
                ],
                vec![vec2(1.0, 0.0), vec2(0.0, 1.0), vec2(0.7, 0.7)],
            )
            .unwrap();
        let kept = store.kept_after_remove("f.txt").unwrap();
        store
            .rebuild(kept, vec![vec2(0.0, 1.0), vec2(0.7, 0.7)])
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 10);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.filename != "f.txt"));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut store = DocumentStore::new();
        store
            .add_documents(vec![chunk("a.txt", 0, "alpha")], vec![vec2(1.0, 0.0)])
            .unwrap();
        store.clear();
        store.clear();
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.chunk_count(), 0);
        assert!(store.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn document_count_is_distinct_filenames() {
        let mut store = DocumentStore::new();
        store
            .add_documents(
                vec![
                    chunk("a.txt", 0, "a0"),
                    chunk("a.txt", 1, "a1"),
                    chunk("b.txt", 0, "b0"),
                ],
                vec![vec2(1.0, 0.0), vec2(0.9, 0.1), vec2(0.0, 1.0)],
            )
            .unwrap();
        assert_eq!(store.document_count(), 2);
        assert_eq!(store.chunk_count(), 3);
    }
}
