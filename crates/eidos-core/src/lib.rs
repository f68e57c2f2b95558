//! All backend logic independent of how the service is exposed (CLI or an
//! HTTP API layer).
//!
//! Documents arrive as pre-chunked text, get embedded, and land in a flat
//! vector index kept strictly aligned with the chunk records ([store]).
//! Questions go through the retrieval orchestrator ([rag]), which grounds an
//! LLM answer in the nearest chunks. State persists as a JSON snapshot in
//! the app data directory (see [app_data]).

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod persist;
pub mod rag;
pub mod session;
pub mod store;

pub use app_data::app_data_dir;
pub use chunks::{chunk_document, chunk_text, Chunk, DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_OVERLAP};
pub use config::{load_config, save_config, Config, ConfigError};
pub use embedding::{EmbedError, EmbeddingProvider};
pub use index::{IndexError, VectorIndex};
pub use llm::{LlmError, TextGenerator};
pub use ollama::{OllamaClient, OllamaError};
pub use rag::{AskOutcome, RagError, RagService, SourceGroup, SourceMatch, UploadStats, DEFAULT_TOP_K};
pub use session::{SessionStore, Turn};
pub use store::{ChunkMeta, DocumentStore, SearchHit, StoreError};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "eidos-core ready"
}
