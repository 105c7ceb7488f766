use crate::{
    chunking::{Chunk, heading_of, limit_tokens, split_semantic, window_text},
    config::EngineConfig,
    dedup::dedup_chunks,
    error::Result,
    loader::SourceDocument,
    noise::{classify, scrub_chunk},
    tokenizer::TokenCounter,
    vector_store::VectorIndex,
};

/// Chunks handed to the index per `add` call.
pub const INDEX_BATCH_SIZE: usize = 32;

/// Error type a progress callback may return. It is logged, never raised.
pub type ProgressError = Box<dyn std::error::Error + Send + Sync>;

/// Called with `(done, total)` chunks after every successful add.
pub type Progress<'a> =
    dyn FnMut(usize, usize) -> std::result::Result<(), ProgressError> + 'a;

/// Chunking limits taken from the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunk_tokens: usize,
    pub min_chunk_chars: usize,
}

impl From<&EngineConfig> for ChunkingParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            max_chunk_tokens: config.max_chunk_tokens,
            min_chunk_chars: config.min_chunk_chars,
        }
    }
}

/// Split, scrub, window, token-limit and noise-filter one document.
///
/// A span the tokenizer cannot handle is logged and skipped.
pub fn chunk_document(
    doc: &SourceDocument,
    params: &ChunkingParams,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for span in split_semantic(&doc.text) {
        let section = heading_of(span);
        let scrubbed = scrub_chunk(span);

        let windows =
            window_text(&scrubbed, params.chunk_size, params.chunk_overlap);
        for window in windows {
            let limited =
                limit_tokens(window, params.max_chunk_tokens, counter);
            let pieces = match limited {
                Ok(pieces) => pieces,
                Err(e) => {
                    tracing::warn!(
                        path = %doc.path,
                        error = %e,
                        "skipping span"
                    );
                    continue;
                }
            };

            for (piece, tokens) in pieces {
                if let Some(reason) = classify(piece, params.min_chunk_chars) {
                    tracing::trace!(
                        path = %doc.path,
                        ?reason,
                        "dropping noisy chunk"
                    );
                    continue;
                }
                chunks.push(Chunk::new(piece, &doc.path, section, tokens));
            }
        }
    }

    chunks
}

/// Chunk every document and drop exact duplicates across the batch.
pub fn prepare_chunks(
    docs: &[&SourceDocument],
    params: &ChunkingParams,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    let candidates: Vec<Chunk> = docs
        .iter()
        .flat_map(|doc| chunk_document(doc, params, counter))
        .collect();
    let before = candidates.len();
    let unique = dedup_chunks(candidates);
    tracing::debug!(
        candidates = before,
        unique = unique.len(),
        "deduplicated chunks"
    );
    unique
}

/// Add `chunks` to the index in batches, reporting progress after each.
///
/// Returns the number of chunks the index did not hold before.
pub fn index_chunks(
    index: &dyn VectorIndex,
    chunks: &[Chunk],
    progress: &mut Progress<'_>,
) -> Result<usize> {
    let total = chunks.len();
    let mut done = 0;
    let mut added = 0;

    for batch in chunks.chunks(INDEX_BATCH_SIZE) {
        added += index.add(batch)?;
        done += batch.len();
        if let Err(e) = progress(done, total) {
            tracing::warn!(error = %e, "progress callback failed");
        }
    }

    Ok(added)
}
