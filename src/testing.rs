//! Deterministic stand-ins for the model-backed collaborators.

use sha2::{Digest, Sha256};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    reranker::Reranker,
    tokenizer::TokenCounter,
    translate::Translator,
};

/// One token per whitespace-separated word.
pub(crate) struct WordTokenizer;

impl TokenCounter for WordTokenizer {
    fn count(&self, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }

    fn truncate<'a>(
        &self,
        text: &'a str,
        max_tokens: usize,
    ) -> Result<&'a str> {
        let mut end = 0;
        for (i, word) in text.split_whitespace().enumerate() {
            if i == max_tokens {
                return Ok(&text[..end]);
            }
            end = word.as_ptr() as usize - text.as_ptr() as usize + word.len();
        }
        Ok(text)
    }
}

/// Like [`WordTokenizer`], but fails on any text containing
/// [`POISON_WORD`].
pub(crate) struct PoisonTokenizer;

pub(crate) const POISON_WORD: &str = "veneno";

impl PoisonTokenizer {
    fn check(text: &str) -> Result<()> {
        if text.contains(POISON_WORD) {
            return Err(Error::Tokenizer("unencodable input".into()));
        }
        Ok(())
    }
}

impl TokenCounter for PoisonTokenizer {
    fn count(&self, text: &str) -> Result<usize> {
        Self::check(text)?;
        WordTokenizer.count(text)
    }

    fn truncate<'a>(
        &self,
        text: &'a str,
        max_tokens: usize,
    ) -> Result<&'a str> {
        Self::check(text)?;
        WordTokenizer.truncate(text, max_tokens)
    }
}

pub(crate) fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Bag-of-words vectors over hashed word buckets, so lexical overlap drives
/// similarity.
pub(crate) struct HashEmbedder;

const DIM: usize = 64;

impl HashEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        for word in words(text) {
            let digest = Sha256::digest(word.as_bytes());
            v[digest[0] as usize % DIM] += 1.0;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(query))
    }
}

/// Scores a text by how many distinct query words it contains.
pub(crate) struct OverlapReranker;

impl Reranker for OverlapReranker {
    fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        let query: std::collections::HashSet<String> = words(query).collect();
        Ok(texts
            .iter()
            .map(|text| {
                let text: std::collections::HashSet<String> =
                    words(text).collect();
                query.intersection(&text).count() as f32
            })
            .collect())
    }
}

/// Returns fixed scores in order.
pub(crate) struct ScriptedReranker(pub Vec<f32>);

impl Reranker for ScriptedReranker {
    fn score(&self, _query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        Ok(self.0.iter().copied().take(texts.len()).collect())
    }
}

pub(crate) struct FailingReranker;

impl Reranker for FailingReranker {
    fn score(&self, _query: &str, _texts: &[&str]) -> Result<Vec<f32>> {
        Err(Error::Model("reranker unavailable".into()))
    }
}

pub(crate) struct UppercaseTranslator;

impl Translator for UppercaseTranslator {
    fn translate(
        &self,
        text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String> {
        Ok(text.to_uppercase())
    }
}

pub(crate) struct FailingTranslator;

impl Translator for FailingTranslator {
    fn translate(
        &self,
        _text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String> {
        Err(Error::Model("translator unavailable".into()))
    }
}
