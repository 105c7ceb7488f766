//! Exact, content-addressed chunk deduplication.
//!
//! Two chunks are duplicates when the SHA-256 digests of their trimmed text
//! match. Near-duplicates are kept; the context assembler drops contained
//! passages at query time.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::chunking::Chunk;

/// SHA-256 of `text`, as lowercase hex.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content hash of a chunk: SHA-256 hex of its trimmed text.
///
/// # Examples
///
/// ```
/// use docrag::dedup::content_hash;
///
/// assert_eq!(content_hash("  same text \n"), content_hash("same text"));
/// assert_ne!(content_hash("same text"), content_hash("same text."));
/// ```
pub fn content_hash(text: &str) -> String {
    sha256_hex(text.trim())
}

/// Keep the first chunk for every distinct content hash, in input order.
pub fn dedup_chunks(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|chunk| !chunk.text.trim().is_empty())
        .filter(|chunk| seen.insert(chunk.hash.clone()))
        .collect()
}
