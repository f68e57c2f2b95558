//! Persisted config (models, chunking, timeouts) in the app data directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::{DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_OVERLAP};
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBED_DIM, DEFAULT_EMBED_MODEL};
use crate::rag::DEFAULT_TOP_K;

const CONFIG_FILENAME: &str = "config.toml";
const STORE_DIRNAME: &str = "vector_store";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ollama base URL.
    pub ollama_url: String,
    /// Embedding model name and the dimensionality of its vectors.
    pub embed_model: String,
    pub embed_dimensions: usize,
    /// Chat model used for answer generation.
    pub chat_model: String,
    /// Chunking window and overlap, in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Substitute deterministic pseudo-random vectors when the embedding
    /// model is down. Degrades search quality silently; off unless asked for.
    pub embed_fallback: bool,
    pub embed_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    /// Override for the snapshot directory. Default: `vector_store/` under
    /// the app data directory.
    pub store_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            embed_dimensions: DEFAULT_EMBED_DIM,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_CHARS,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            embed_fallback: false,
            embed_timeout_secs: 60,
            generate_timeout_secs: 120,
            store_dir: None,
        }
    }
}

impl Config {
    /// Directory for persisted index artifacts, if one can be determined.
    pub fn store_dir(&self) -> Option<PathBuf> {
        match &self.store_dir {
            Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
            _ => app_data::app_data_dir().map(|d| d.join(STORE_DIRNAME)),
        }
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_default()
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    let path = data_dir.join(CONFIG_FILENAME);
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let s = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.embed_model, config.embed_model);
        assert_eq!(back.chunk_size, config.chunk_size);
        assert!(!back.embed_fallback);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let back: Config = toml::from_str("chat_model = \"mistral\"").unwrap();
        assert_eq!(back.chat_model, "mistral");
        assert_eq!(back.top_k, DEFAULT_TOP_K);
    }
}
