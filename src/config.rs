//! Engine configuration.
//!
//! Every option has a built-in default. Overrides are stored as plain
//! key/value pairs in the settings database (`docrag config set KEY VALUE`)
//! and the model id can additionally be forced through `DOCRAG_MODEL`.

use std::{path::PathBuf, str::FromStr};

use serde::Serialize;

use crate::{
    error::{Error, Result},
    settings_db::SettingsDb,
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "DOCRAG_MODEL";

/// Tunables for indexing and context assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Embedding model id (Hugging Face) or local model directory. Its
    /// tokenizer is the one every token length is measured with.
    pub embedding_model: String,
    /// Corpus root scanned by build and update passes.
    pub documents_path: PathBuf,
    /// Target chunk size in characters before token limiting.
    pub chunk_size: usize,
    /// Overlap between adjacent windows of an oversized span, in characters.
    pub chunk_overlap: usize,
    /// Breadth of a plain similarity search.
    pub similarity_k: usize,
    /// Ceiling on the candidates recalled for reranking.
    pub max_candidates: usize,
    /// Token budget of the assembled context.
    pub max_prompt_tokens: usize,
    /// Hard per-chunk token limit of the embedding model.
    pub max_chunk_tokens: usize,
    /// Minimum characters for a chunk to be indexed.
    pub min_chunk_chars: usize,
    /// Minimum characters for a context line to survive cleaning.
    pub min_line_chars: usize,
    /// Minimum characters for a cleaned candidate to be selected.
    pub min_context_chars: usize,
    /// Shared keywords required by downstream answer validation.
    pub min_keyword_overlap: usize,
    /// Maximum characters returned by a best-passage lookup.
    pub max_doc_chars: usize,
    /// Characters of untranslated context used when translation fails.
    pub translation_fallback_chars: usize,
    /// Characters kept in the normalized debug preview.
    pub normalized_preview_chars: usize,
    /// Language of the corpus and of incoming queries.
    pub source_language: String,
    /// Language the scoring models work in.
    pub pivot_language: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_MODEL_ID.to_string(),
            documents_path: PathBuf::from("data/documents"),
            chunk_size: 1200,
            chunk_overlap: 200,
            similarity_k: 7,
            max_candidates: 20,
            max_prompt_tokens: 512,
            max_chunk_tokens: 512,
            min_chunk_chars: 40,
            min_line_chars: 30,
            min_context_chars: 100,
            min_keyword_overlap: 3,
            max_doc_chars: 800,
            translation_fallback_chars: 500,
            normalized_preview_chars: 800,
            source_language: "pt".to_string(),
            pivot_language: "en".to_string(),
        }
    }
}

/// Setting keys recognized by [`EngineConfig::set`].
pub const KEYS: &[&str] = &[
    "embedding_model",
    "documents_path",
    "chunk_size",
    "chunk_overlap",
    "similarity_k",
    "max_candidates",
    "max_prompt_tokens",
    "max_chunk_tokens",
    "min_chunk_chars",
    "min_line_chars",
    "min_context_chars",
    "min_keyword_overlap",
    "max_doc_chars",
    "translation_fallback_chars",
    "normalized_preview_chars",
    "source_language",
    "pivot_language",
];

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("invalid value for {key}: {value:?}"))
    })
}

impl EngineConfig {
    /// Defaults overlaid with the stored settings, then `DOCRAG_MODEL`.
    pub fn load(settings: &SettingsDb) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in settings.list_settings()? {
            config.set(&key, &value)?;
        }
        if let Ok(model) = std::env::var(MODEL_ENV_VAR) {
            config.embedding_model = model;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply a single `key = value` override.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "embedding_model" => self.embedding_model = value.to_string(),
            "documents_path" => self.documents_path = PathBuf::from(value),
            "chunk_size" => self.chunk_size = parse(key, value)?,
            "chunk_overlap" => self.chunk_overlap = parse(key, value)?,
            "similarity_k" => self.similarity_k = parse(key, value)?,
            "max_candidates" => self.max_candidates = parse(key, value)?,
            "max_prompt_tokens" => self.max_prompt_tokens = parse(key, value)?,
            "max_chunk_tokens" => self.max_chunk_tokens = parse(key, value)?,
            "min_chunk_chars" => self.min_chunk_chars = parse(key, value)?,
            "min_line_chars" => self.min_line_chars = parse(key, value)?,
            "min_context_chars" => self.min_context_chars = parse(key, value)?,
            "min_keyword_overlap" => {
                self.min_keyword_overlap = parse(key, value)?
            }
            "max_doc_chars" => self.max_doc_chars = parse(key, value)?,
            "translation_fallback_chars" => {
                self.translation_fallback_chars = parse(key, value)?
            }
            "normalized_preview_chars" => {
                self.normalized_preview_chars = parse(key, value)?
            }
            "source_language" => self.source_language = value.to_string(),
            "pivot_language" => self.pivot_language = value.to_string(),
            _ => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Reject combinations the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_chunk_tokens == 0 || self.max_prompt_tokens == 0 {
            return Err(Error::Config(
                "token limits must be positive".into(),
            ));
        }
        if self.max_candidates == 0 || self.similarity_k == 0 {
            return Err(Error::Config(
                "search breadth must be positive".into(),
            ));
        }
        Ok(())
    }
}
