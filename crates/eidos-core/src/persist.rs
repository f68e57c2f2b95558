//! Persists the vector index and both parallel arrays as one unit.
//!
//! Four artifacts under the data directory: `index.json`, `chunks.json`,
//! `metadata.json`, and `manifest.json`. The manifest records a generation
//! counter and the expected lengths and is written last, so a crash between
//! artifact writes leaves a manifest that disagrees with the artifacts.
//! Loading treats any disagreement, parse failure, or misalignment as a
//! corrupt snapshot and falls back to an empty store rather than serving a
//! misaligned index.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunks::Chunk;
use crate::index::VectorIndex;
use crate::store::{ChunkMeta, DocumentStore};

const INDEX_FILENAME: &str = "index.json";
const CHUNKS_FILENAME: &str = "chunks.json";
const METADATA_FILENAME: &str = "metadata.json";
const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    generation: u64,
    vectors: usize,
    chunks: usize,
    metadata: usize,
}

/// Write the store's three structures plus the manifest. The manifest goes
/// last; until it lands, the previous generation stays authoritative.
pub fn save(dir: &Path, store: &DocumentStore) -> Result<(), PersistError> {
    std::fs::create_dir_all(dir).map_err(|e| PersistError::Write(dir.to_path_buf(), e))?;
    write_json(&dir.join(INDEX_FILENAME), store.index())?;
    write_json(&dir.join(CHUNKS_FILENAME), &store.chunks())?;
    write_json(&dir.join(METADATA_FILENAME), &store.metadata())?;
    let manifest = Manifest {
        generation: read_manifest(dir).map_or(0, |m| m.generation) + 1,
        vectors: store.index().len(),
        chunks: store.chunk_count(),
        metadata: store.metadata().len(),
    };
    write_json(&dir.join(MANIFEST_FILENAME), &manifest)?;
    tracing::debug!(
        generation = manifest.generation,
        chunks = manifest.chunks,
        dir = %dir.display(),
        "persisted vector store snapshot"
    );
    Ok(())
}

/// Load a persisted store. Fail-safe: a missing snapshot yields an empty
/// store, and so does a corrupt one (partial write, parse failure, or
/// artifact lengths out of step) — logged as a warning, never an error.
pub fn load(dir: &Path) -> DocumentStore {
    let manifest_path = dir.join(MANIFEST_FILENAME);
    if !manifest_path.exists() {
        if dir.join(INDEX_FILENAME).exists() || dir.join(CHUNKS_FILENAME).exists() {
            tracing::warn!(
                dir = %dir.display(),
                "found artifacts without a manifest, starting from an empty store"
            );
        }
        return DocumentStore::new();
    }
    match try_load(dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(
                dir = %dir.display(),
                error = %e,
                "persisted vector store is corrupt, starting from an empty store"
            );
            DocumentStore::new()
        }
    }
}

fn try_load(dir: &Path) -> Result<DocumentStore, PersistError> {
    let manifest: Manifest = read_json(&dir.join(MANIFEST_FILENAME))?;
    let index: VectorIndex = read_json(&dir.join(INDEX_FILENAME))?;
    let chunks: Vec<Chunk> = read_json(&dir.join(CHUNKS_FILENAME))?;
    let metadata: Vec<ChunkMeta> = read_json(&dir.join(METADATA_FILENAME))?;
    let aligned = index.len() == chunks.len() && chunks.len() == metadata.len();
    let matches_manifest = manifest.vectors == index.len()
        && manifest.chunks == chunks.len()
        && manifest.metadata == metadata.len();
    if !aligned || !matches_manifest {
        return Err(PersistError::Misaligned {
            vectors: index.len(),
            chunks: chunks.len(),
            metadata: metadata.len(),
        });
    }
    tracing::debug!(
        generation = manifest.generation,
        chunks = chunks.len(),
        "loaded vector store snapshot"
    );
    Ok(DocumentStore::from_parts(index, chunks, metadata))
}

/// Delete all persisted artifacts. Idempotent; missing files are fine.
pub fn clear(dir: &Path) -> Result<(), PersistError> {
    for name in [MANIFEST_FILENAME, INDEX_FILENAME, CHUNKS_FILENAME, METADATA_FILENAME] {
        let path = dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PersistError::Write(path, e)),
        }
    }
    Ok(())
}

fn read_manifest(dir: &Path) -> Option<Manifest> {
    read_json(&dir.join(MANIFEST_FILENAME)).ok()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let s = serde_json::to_string(value).map_err(PersistError::Serialize)?;
    std::fs::write(path, s).map_err(|e| PersistError::Write(path.to_path_buf(), e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PersistError> {
    let s = std::fs::read_to_string(path).map_err(|e| PersistError::Read(path.to_path_buf(), e))?;
    serde_json::from_str(&s).map_err(PersistError::Parse)
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to serialize artifact: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to write {0}: {1}")]
    Write(std::path::PathBuf, std::io::Error),
    #[error("failed to read {0}: {1}")]
    Read(std::path::PathBuf, std::io::Error),
    #[error("failed to parse artifact: {0}")]
    Parse(serde_json::Error),
    #[error("artifacts misaligned: {vectors} vectors, {chunks} chunks, {metadata} metadata records")]
    Misaligned {
        vectors: usize,
        chunks: usize,
        metadata: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::Chunk;

    fn sample_store() -> DocumentStore {
        let mut store = DocumentStore::new();
        store
            .add_documents(
                vec![
                    Chunk {
                        text: "alpha".into(),
                        filename: "a.txt".into(),
                        file_type: "txt".into(),
                        file_path: "/tmp/a.txt".into(),
                        chunk_id: 0,
                        total_chunks: 2,
                    },
                    Chunk {
                        text: "beta".into(),
                        filename: "a.txt".into(),
                        file_type: "txt".into(),
                        file_path: "/tmp/a.txt".into(),
                        chunk_id: 1,
                        total_chunks: 2,
                    },
                ],
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();
        store
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = sample_store();
        save(dir.path(), &store).unwrap();
        let loaded = load(dir.path());
        assert_eq!(loaded.chunk_count(), 2);
        assert_eq!(loaded.index().len(), 2);
        assert_eq!(loaded.chunks(), store.chunks());
        assert_eq!(loaded.metadata(), store.metadata());
    }

    #[test]
    fn load_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(dir.path());
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_rejects_misaligned_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &sample_store()).unwrap();
        // Simulate a partial write: chunks artifact from an older, shorter
        // generation.
        std::fs::write(dir.path().join(CHUNKS_FILENAME), "[]").unwrap();
        let loaded = load(dir.path());
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &sample_store()).unwrap();
        std::fs::write(dir.path().join(INDEX_FILENAME), "not json").unwrap();
        let loaded = load(dir.path());
        assert!(loaded.is_empty());
    }

    #[test]
    fn generation_increments_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = sample_store();
        save(dir.path(), &store).unwrap();
        save(dir.path(), &store).unwrap();
        let manifest = read_manifest(dir.path()).unwrap();
        assert_eq!(manifest.generation, 2);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &sample_store()).unwrap();
        clear(dir.path()).unwrap();
        clear(dir.path()).unwrap();
        assert!(load(dir.path()).is_empty());
    }
}
