//! Ollama client for embeddings and completion. Wraps ollama-rs with a simple API.

use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use thiserror::Error;

use crate::embedding::{normalize, pseudo_embedding, EmbedError, EmbeddingProvider};
use crate::llm::{LlmError, TextGenerator};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Dimensionality of `nomic-embed-text` vectors.
pub const DEFAULT_EMBED_DIM: usize = 768;

/// Low-temperature, bounded-length decoding for grounded answers.
const ANSWER_TEMPERATURE: f32 = 0.1;
const ANSWER_MAX_TOKENS: i32 = 512;

/// Thin wrapper around Ollama for embedding and completion.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    chat_model: String,
    embed_dim: usize,
    /// Degraded mode: on embedding failure, substitute deterministic
    /// pseudo-random vectors instead of failing the call. Never on by
    /// default; search quality collapses silently when this kicks in.
    embed_fallback: bool,
}

impl OllamaClient {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embed_dim: DEFAULT_EMBED_DIM,
            embed_fallback: false,
        })
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`) and
    /// the dimensionality of its vectors.
    pub fn with_embed_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.embed_model = model.into();
        self.embed_dim = dimensions;
        self
    }

    /// Set the chat model used for answer generation.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Enable the degraded pseudo-random embedding fallback.
    pub fn with_embed_fallback(mut self, enabled: bool) -> Self {
        self.embed_fallback = enabled;
        self
    }

    /// Embed multiple strings in one call. Returns one embedding per input.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(OllamaError::Request)?;
        Ok(res.embeddings)
    }

    /// Complete a prompt with the chat model.
    pub async fn generate(&self, prompt: &str) -> Result<String, OllamaError> {
        let options = ModelOptions::default()
            .temperature(ANSWER_TEMPERATURE)
            .num_predict(ANSWER_MAX_TOKENS);
        let req = GenerationRequest::new(self.chat_model.clone(), prompt.to_string())
            .options(options);
        let res = self.inner.generate(req).await.map_err(OllamaError::Request)?;
        Ok(res.response)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.embed_texts(texts).await {
            Ok(vectors) => {
                if vectors.len() != texts.len() {
                    return Err(EmbedError::CountMismatch {
                        expected: texts.len(),
                        got: vectors.len(),
                    });
                }
                Ok(vectors.iter().map(|v| normalize(v)).collect())
            }
            Err(e) if self.embed_fallback => {
                tracing::warn!(
                    error = %e,
                    count = texts.len(),
                    "embedding backend down, substituting pseudo-random vectors"
                );
                Ok(texts
                    .iter()
                    .map(|t| pseudo_embedding(t, self.embed_dim))
                    .collect())
            }
            Err(e) => Err(EmbedError::Unavailable(e.to_string())),
        }
    }

    fn dimensions(&self) -> usize {
        self.embed_dim
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate(prompt)
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
}
