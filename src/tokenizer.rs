//! Token counting against the embedding model's tokenizer.
//!
//! Every length limit in the pipeline (per-chunk model limit, prompt budget)
//! is expressed in tokens of the embedding tokenizer, so chunking and
//! context assembly share a single [`TokenCounter`].

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tokenizers::Tokenizer;

use crate::error::{Error, Result};

/// Text → token measurements.
pub trait TokenCounter {
    /// Number of tokens in `text`, without special tokens.
    fn count(&self, text: &str) -> Result<usize>;

    /// The longest prefix of `text` holding at most `max_tokens` tokens.
    ///
    /// The result is always a slice of the input, so callers can continue
    /// from `&text[prefix.len()..]`.
    fn truncate<'a>(&self, text: &'a str, max_tokens: usize) -> Result<&'a str>;
}

/// A Hugging Face `tokenizers` tokenizer with padding and truncation off.
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    /// Load `tokenizer.json` for `model_id`.
    ///
    /// A local model directory is used as-is; anything else is treated as a
    /// Hugging Face Hub model id and fetched through the hub cache.
    pub fn load(model_id: &str) -> Result<Self> {
        let path = resolve_tokenizer_file(model_id)?;
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut inner = Tokenizer::from_file(path).map_err(|e| {
            Error::Tokenizer(format!("cannot load {}: {e}", path.display()))
        })?;
        // Bundled configs often truncate at the model limit, which would
        // make every count saturate.
        inner
            .with_truncation(None)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        inner.with_padding(None);
        Ok(Self { inner })
    }

    fn offsets(&self, text: &str) -> Result<Vec<(usize, usize)>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(encoding.get_offsets().to_vec())
    }
}

impl TokenCounter for HfTokenizer {
    fn count(&self, text: &str) -> Result<usize> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().len())
    }

    fn truncate<'a>(
        &self,
        text: &'a str,
        max_tokens: usize,
    ) -> Result<&'a str> {
        let offsets = self.offsets(text)?;
        if offsets.len() <= max_tokens {
            return Ok(text);
        }
        if max_tokens == 0 {
            return Ok("");
        }

        let mut end = offsets[max_tokens - 1].1.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut prefix = &text[..end];

        // Re-tokenizing a prefix can merge differently at the cut; shrink
        // until the prefix fits.
        while !prefix.is_empty() && self.count(prefix)? > max_tokens {
            let mut cut = prefix.len() - 1;
            while !prefix.is_char_boundary(cut) {
                cut -= 1;
            }
            prefix = &prefix[..cut];
        }
        Ok(prefix)
    }
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer").finish_non_exhaustive()
    }
}

/// An [`HfTokenizer`] fetched on first use.
pub struct LazyTokenizer {
    model_id: String,
    inner: OnceLock<HfTokenizer>,
}

impl LazyTokenizer {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            inner: OnceLock::new(),
        }
    }

    fn get(&self) -> Result<&HfTokenizer> {
        if let Some(tokenizer) = self.inner.get() {
            return Ok(tokenizer);
        }
        tracing::debug!(model = %self.model_id, "loading tokenizer");
        let tokenizer = HfTokenizer::load(&self.model_id)?;
        Ok(self.inner.get_or_init(|| tokenizer))
    }
}

impl TokenCounter for LazyTokenizer {
    fn count(&self, text: &str) -> Result<usize> {
        self.get()?.count(text)
    }

    fn truncate<'a>(
        &self,
        text: &'a str,
        max_tokens: usize,
    ) -> Result<&'a str> {
        self.get()?.truncate(text, max_tokens)
    }
}

impl std::fmt::Debug for LazyTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTokenizer")
            .field("model_id", &self.model_id)
            .field("loaded", &self.inner.get().is_some())
            .finish()
    }
}

fn resolve_tokenizer_file(model_id: &str) -> Result<PathBuf> {
    let local = Path::new(model_id).join("tokenizer.json");
    if local.is_file() {
        return Ok(local);
    }

    let api = hf_hub::api::sync::Api::new()
        .map_err(|e| Error::Tokenizer(format!("hub client: {e}")))?;
    api.model(model_id.to_string())
        .get("tokenizer.json")
        .map_err(|e| {
            Error::Tokenizer(format!(
                "cannot fetch tokenizer for {model_id}: {e}"
            ))
        })
}
