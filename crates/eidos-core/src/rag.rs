//! Retrieval orchestration: question in, grounded answer plus sources out.
//!
//! The service owns the document store behind one RwLock, talks to the
//! embedding and generation backends through their traits, and keeps bounded
//! per-session conversation memory. Embedding the query and generating the
//! answer never hold the store lock; the rebuild inside `remove_document`
//! does, because a search racing a half-rebuilt index would read misaligned
//! state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::embedding::{EmbedError, EmbeddingProvider};
use crate::llm::TextGenerator;
use crate::ollama::{OllamaClient, OllamaError};
use crate::persist::{self, PersistError};
use crate::session::{SessionStore, Turn};
use crate::store::{DocumentStore, SearchHit, StoreError};
use crate::chunks::Chunk;

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 10;

/// Words that mark a question as referring back to the conversation.
const PRONOUN_INDICATORS: &[&str] = &["those", "they", "them", "it", "this", "that"];
/// Prior turns injected into the prompt.
const HISTORY_TURNS: usize = 2;
/// Matches listed per source file.
const MAX_MATCHES_PER_FILE: usize = 3;
/// Characters of chunk text shown per source match.
const SNIPPET_CHARS: usize = 200;
/// Characters of a previous answer quoted in the history block.
const HISTORY_ANSWER_CHARS: usize = 150;
/// Characters of raw context returned when generation is down.
const DEGRADED_CONTEXT_CHARS: usize = 1000;

/// One retrieved excerpt inside a source group.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMatch {
    pub snippet: String,
    pub chunk_id: usize,
}

/// All matches from one source file, in rank order.
#[derive(Debug, Clone, Serialize)]
pub struct SourceGroup {
    pub filename: String,
    pub matches: Vec<SourceMatch>,
}

/// Result of asking a question. An empty retrieval is reported here as a
/// non-success outcome with an error tag, not as an `Err`: having no
/// relevant documents is a normal state, not a failure.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<SourceGroup>,
    pub relevant_chunks: usize,
    pub error: Option<String>,
}

/// Result of uploading a chunk batch.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStats {
    pub total_chunks: usize,
    pub total_characters: usize,
}

/// The retrieval service. Construct one at startup and share it; there is no
/// implicit global instance.
pub struct RagService {
    store: RwLock<DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    sessions: Mutex<SessionStore>,
    /// Snapshot directory; `None` disables persistence.
    data_dir: Option<PathBuf>,
    embed_timeout: Duration,
    generate_timeout: Duration,
    top_k: usize,
}

impl RagService {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store: RwLock::new(DocumentStore::new()),
            embedder,
            generator,
            sessions: Mutex::new(SessionStore::new()),
            data_dir: None,
            embed_timeout: Duration::from_secs(60),
            generate_timeout: Duration::from_secs(120),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Build an Ollama-backed service from config, loading any persisted
    /// snapshot from the configured data directory.
    pub fn from_config(config: &Config) -> Result<Self, OllamaError> {
        let client = OllamaClient::from_url(&config.ollama_url)?
            .with_embed_model(&config.embed_model, config.embed_dimensions)
            .with_chat_model(&config.chat_model)
            .with_embed_fallback(config.embed_fallback);
        let client = Arc::new(client);
        let mut service = Self::new(client.clone(), client).with_timeouts(
            Duration::from_secs(config.embed_timeout_secs),
            Duration::from_secs(config.generate_timeout_secs),
        );
        service.top_k = config.top_k.max(1);
        if let Some(dir) = config.store_dir() {
            service = service.with_data_dir(dir);
        }
        Ok(service)
    }

    /// Persist to (and initially load from) the given directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.store = RwLock::new(persist::load(&dir));
        self.data_dir = Some(dir);
        self
    }

    /// Deadlines for the embedding and generation calls.
    pub fn with_timeouts(mut self, embed: Duration, generate: Duration) -> Self {
        self.embed_timeout = embed;
        self.generate_timeout = generate;
        self
    }

    /// Default number of chunks to retrieve per question, for callers that
    /// don't pass an explicit `k` to [`ask`](RagService::ask).
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Add a batch of processed chunks to the collection. Embeds first, then
    /// appends and persists; an embedding failure leaves the store untouched.
    pub async fn upload(&self, chunks: Vec<Chunk>) -> Result<UploadStats, RagError> {
        if chunks.is_empty() {
            return Ok(UploadStats { total_chunks: 0, total_characters: 0 });
        }
        let stats = UploadStats {
            total_chunks: chunks.len(),
            total_characters: chunks.iter().map(|c| c.text.chars().count()).sum(),
        };
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embed_with_timeout(&texts).await?;

        let mut store = self.store.write().await;
        store.add_documents(chunks, embeddings)?;
        self.persist(&store)?;
        tracing::info!(
            chunks = stats.total_chunks,
            total = store.chunk_count(),
            "uploaded chunk batch"
        );
        Ok(stats)
    }

    /// Answer a question from the indexed collection, using the session's
    /// recent conversation for query expansion and prompt history.
    pub async fn ask(
        &self,
        question: &str,
        session_id: &str,
        k: usize,
    ) -> Result<AskOutcome, RagError> {
        // Vague follow-ups ("what about those days?") search badly on their
        // own; prepend the previous question to give the query substance.
        // Only the retrieval query is expanded, never the prompt's question.
        let mut search_query = question.to_string();
        if has_pronoun_indicator(question) {
            if let Some(last) = self.sessions.lock().await.last_question(session_id) {
                search_query = format!("{last} {question}");
                tracing::debug!(query = %search_query, "expanded follow-up search query");
            }
        }

        let query_embedding = self.embed_one(&search_query).await?;
        let hits = {
            let store = self.store.read().await;
            store.search(&query_embedding, k)
        };

        if hits.is_empty() {
            return Ok(AskOutcome {
                success: false,
                answer: "I couldn't find relevant information in the documents.".to_string(),
                sources: Vec::new(),
                relevant_chunks: 0,
                error: Some("No relevant documents found".to_string()),
            });
        }

        let context = hits
            .iter()
            .map(|h| h.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = group_sources(&hits);

        let history = {
            let sessions = self.sessions.lock().await;
            format_history(&sessions, session_id)
        };
        let prompt = build_prompt(question, &context, &history);

        let answer = match tokio::time::timeout(
            self.generate_timeout,
            self.generator.complete(&prompt),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "generation failed, answering with raw context");
                degraded_answer(&context)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.generate_timeout, "generation timed out, answering with raw context");
                degraded_answer(&context)
            }
        };

        self.sessions.lock().await.push_turn(
            session_id,
            Turn {
                question: question.to_string(),
                answer: answer.clone(),
                sources: sources.clone(),
            },
        );

        Ok(AskOutcome {
            success: true,
            answer,
            sources,
            relevant_chunks: hits.len(),
            error: None,
        })
    }

    /// Remove every chunk of one file. Survivors are re-embedded and the
    /// index rebuilt from scratch; the write lock is held throughout so no
    /// search observes the store mid-rebuild. Returns false (and mutates
    /// nothing) when the filename is not present.
    pub async fn remove_document(&self, filename: &str) -> Result<bool, RagError> {
        let mut store = self.store.write().await;
        let Some(kept) = store.kept_after_remove(filename) else {
            tracing::debug!(filename, "remove requested for unknown document");
            return Ok(false);
        };
        let removed = store.chunk_count() - kept.len();
        if kept.is_empty() {
            store.clear();
        } else {
            let texts: Vec<String> = kept.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embed_with_timeout(&texts).await?;
            store.rebuild(kept, embeddings)?;
        }
        self.persist(&store)?;
        tracing::info!(
            filename,
            removed,
            remaining = store.chunk_count(),
            "removed document and rebuilt index"
        );
        Ok(true)
    }

    /// Drop the whole collection and its persisted artifacts. Idempotent.
    pub async fn clear(&self) -> Result<(), RagError> {
        let mut store = self.store.write().await;
        store.clear();
        if let Some(dir) = &self.data_dir {
            persist::clear(dir)?;
        }
        tracing::info!("cleared document collection");
        Ok(())
    }

    /// Number of distinct uploaded files.
    pub async fn document_count(&self) -> usize {
        self.store.read().await.document_count()
    }

    /// Number of indexed chunks.
    pub async fn chunk_count(&self) -> usize {
        self.store.read().await.chunk_count()
    }

    fn persist(&self, store: &DocumentStore) -> Result<(), PersistError> {
        match &self.data_dir {
            Some(dir) => persist::save(dir, store),
            None => Ok(()),
        }
    }

    async fn embed_with_timeout(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        match tokio::time::timeout(self.embed_timeout, self.embedder.embed_batch(texts)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RagError::Timeout("embedding", self.embed_timeout)),
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_with_timeout(&[text.to_string()]).await?;
        vectors.pop().ok_or(RagError::Embed(EmbedError::CountMismatch {
            expected: 1,
            got: 0,
        }))
    }
}

fn has_pronoun_indicator(question: &str) -> bool {
    let lower = question.to_lowercase();
    PRONOUN_INDICATORS.iter().any(|p| lower.contains(p))
}

/// Group hits by filename in first-seen rank order, at most three matches
/// per file, snippets clipped to 200 characters.
fn group_sources(hits: &[SearchHit]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    for hit in hits {
        let group = match groups.iter_mut().find(|g| g.filename == hit.chunk.filename) {
            Some(g) => g,
            None => {
                groups.push(SourceGroup {
                    filename: hit.chunk.filename.clone(),
                    matches: Vec::new(),
                });
                groups.last_mut().expect("just pushed")
            }
        };
        if group.matches.len() < MAX_MATCHES_PER_FILE {
            group.matches.push(SourceMatch {
                snippet: format!("{}...", truncate_chars(&hit.chunk.text, SNIPPET_CHARS)),
                chunk_id: hit.chunk.chunk_id,
            });
        }
    }
    groups
}

/// The last two turns as "Previous Question/Previous Answer" pairs, oldest
/// first. Empty string when the session has no history.
fn format_history(sessions: &SessionStore, session_id: &str) -> String {
    let mut history = String::new();
    for turn in sessions.recent_turns(session_id, HISTORY_TURNS) {
        history.push_str(&format!(
            "Previous Question: {}\nPrevious Answer: {}...\n\n",
            turn.question,
            truncate_chars(&turn.answer, HISTORY_ANSWER_CHARS)
        ));
    }
    history
}

/// Deterministic prompt template: role, date facts resolved at call time,
/// history, context, the literal current question, and the answering rules.
fn build_prompt(question: &str, context: &str, history: &str) -> String {
    let today = Local::now();
    let current_date = today.format("%B %d, %Y");
    let current_day = today.format("%A");
    let current_year = today.year();

    format!(
        "You are a document assistant. Answer based STRICTLY on the context below.\n\
        \n\
        IMPORTANT DATE CONTEXT:\n\
        - Today is {current_date} ({current_day})\n\
        - Current year is {current_year}\n\
        \n\
        CONVERSATION HISTORY:\n\
        {history}\n\
        CONTEXT FROM DOCUMENTS:\n\
        {context}\n\
        \n\
        CURRENT QUESTION: {question}\n\
        \n\
        INSTRUCTIONS:\n\
        1. Answer ONLY using information from the context or the conversation history\n\
        2. Use today's date ({current_date}) to answer date-sensitive questions\n\
        3. If the context explicitly states that something is prohibited, say so clearly\n\
        4. If the question refers to the previous conversation (like \"those\", \"they\", \"them\", \"it\"), check the HISTORY\n\
        5. If the context doesn't contain the answer, say \"Based on the provided documents, I don't have information about this\"\n\
        \n\
        ANSWER:"
    )
}

fn degraded_answer(context: &str) -> String {
    format!(
        "Based on the documents, here's what I found:\n\n{}",
        truncate_chars(context, DEGRADED_CONTEXT_CHARS)
    )
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}
