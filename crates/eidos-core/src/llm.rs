//! Text-completion collaborator contract. The orchestrator only needs
//! "prompt string in, answer string out"; everything else is backend detail.

use async_trait::async_trait;
use thiserror::Error;

/// A backend that completes a prompt into an answer.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Error)]
pub enum LlmError {
    /// The model could not be reached or failed to produce a completion.
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),
}
