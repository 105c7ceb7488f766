//! Persistent dense-vector index over chunks.
//!
//! Chunks and their embeddings live in a redb database next to the
//! settings database. Entries are keyed by the chunk's content hash, so
//! adding the same text twice writes the same slot. Each entry also records
//! the insertion sequence it first got, which breaks similarity ties.
//!
//! Vector format per entry: `D` little-endian f32 values, L2-normalized, so
//! the dot product of two entries is their cosine similarity.

use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};

use crate::{
    chunking::Chunk,
    embedding::Embedder,
    error::{Error, Result},
};

const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_SEQ: &str = "next_seq";

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Storage and similarity lookup over embedded chunks.
pub trait VectorIndex {
    /// Embed and store `chunks`. Returns how many were not stored before.
    fn add(&self, chunks: &[Chunk]) -> Result<usize>;

    /// The `k` chunks most similar to `query`, best first.
    fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Remove every chunk.
    fn clear(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredChunk {
    seq: u64,
    chunk: Chunk,
}

/// Numeric table key of a chunk: the leading 64 bits of its content hash.
pub fn chunk_key(hash: &str) -> u64 {
    hash.get(..16)
        .and_then(|prefix| u64::from_str_radix(prefix, 16).ok())
        .unwrap_or_else(|| {
            let digest = crate::dedup::sha256_hex(hash);
            u64::from_str_radix(&digest[..16], 16).unwrap_or_default()
        })
}

/// Scale `v` to unit length. The zero vector is left as is.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// redb-backed [`VectorIndex`].
pub struct VectorStore {
    db: Database,
    embedder: Box<dyn Embedder>,
}

impl VectorStore {
    /// Open or create a vector database at the given path.
    pub fn open(path: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_table(VECTORS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db, embedder })
    }

    /// Every stored chunk in insertion order.
    #[cfg(test)]
    fn chunks(&self) -> Result<Vec<Chunk>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        let mut stored = Vec::new();
        for entry in table.iter()? {
            let (_, v) = entry?;
            stored.push(serde_json::from_slice::<StoredChunk>(v.value())?);
        }
        stored.sort_by_key(|s| s.seq);
        Ok(stored.into_iter().map(|s| s.chunk).collect())
    }
}

impl VectorIndex for VectorStore {
    fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        // Split into chunks already stored (record refresh only) and new
        // chunks that need an embedding.
        let mut existing = Vec::new();
        let mut fresh: Vec<&Chunk> = Vec::new();
        {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(CHUNKS)?;
            for chunk in chunks {
                let key = chunk_key(&chunk.hash);
                match table.get(key)? {
                    Some(v) => {
                        let stored: StoredChunk =
                            serde_json::from_slice(v.value())?;
                        existing.push((key, stored.seq, chunk));
                    }
                    None if fresh.iter().any(|c| c.hash == chunk.hash) => {}
                    None => fresh.push(chunk),
                }
            }
        }

        let texts: Vec<String> = fresh.iter().map(|c| c.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_documents(&texts)?
        };
        if vectors.len() != fresh.len() {
            return Err(Error::Model(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                fresh.len()
            )));
        }

        let txn = self.db.begin_write()?;
        {
            let mut records = txn.open_table(CHUNKS)?;
            let mut vector_table = txn.open_table(VECTORS)?;
            let mut meta = txn.open_table(META)?;
            let mut next_seq =
                meta.get(NEXT_SEQ)?.map(|v| v.value()).unwrap_or(0);

            for (key, seq, chunk) in existing {
                let record = serde_json::to_vec(&StoredChunk {
                    seq,
                    chunk: chunk.clone(),
                })?;
                records.insert(key, record.as_slice())?;
            }

            for (chunk, mut vector) in fresh.iter().zip(vectors) {
                let key = chunk_key(&chunk.hash);
                normalize(&mut vector);
                let record = serde_json::to_vec(&StoredChunk {
                    seq: next_seq,
                    chunk: (*chunk).clone(),
                })?;
                records.insert(key, record.as_slice())?;
                vector_table
                    .insert(key, bytemuck::cast_slice::<f32, u8>(&vector))?;
                next_seq += 1;
            }

            meta.insert(NEXT_SEQ, next_seq)?;
        }
        txn.commit()?;

        tracing::debug!(
            added = fresh.len(),
            total = chunks.len(),
            "stored chunks"
        );
        Ok(fresh.len())
    }

    fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_read()?;
        let vectors = txn.open_table(VECTORS)?;
        let records = txn.open_table(CHUNKS)?;
        if vectors.is_empty()? {
            return Ok(Vec::new());
        }

        let mut query_vector = self.embedder.embed_query(query)?;
        normalize(&mut query_vector);

        let mut scored: Vec<(f32, u64, StoredChunk)> = Vec::new();
        for entry in vectors.iter()? {
            let (key, value) = entry?;
            let bytes = value.value();
            let stored = decode_vector(bytes);
            if stored.len() != query_vector.len() {
                tracing::warn!(
                    key = key.value(),
                    "skipping vector with mismatched dimension"
                );
                continue;
            }
            let Some(record) = records.get(key.value())? else {
                continue;
            };
            let record: StoredChunk = serde_json::from_slice(record.value())?;
            scored.push((dot(&query_vector, &stored), record.seq, record));
        }

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, _, record)| ScoredChunk {
                chunk: record.chunk,
                score,
            })
            .collect())
    }

    fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(CHUNKS)?;
        txn.delete_table(VECTORS)?;
        txn.delete_table(META)?;
        txn.open_table(CHUNKS)?;
        txn.open_table(VECTORS)?;
        txn.open_table(META)?;
        txn.commit()?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        Ok(table.len()? as usize)
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HashEmbedder;

    fn test_store() -> (tempfile::TempDir, VectorStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(
            &tmp.path().join("vectors.redb"),
            Box::new(HashEmbedder),
        )
        .unwrap();
        (tmp, store)
    }

    fn chunk(text: &str) -> Chunk {
        Chunk::new(text, "doc.txt", None, text.split_whitespace().count())
    }

    #[test]
    fn empty_store() {
        let (_tmp, store) = test_store();
        assert!(store.is_empty().unwrap());
        assert!(store.similarity_search("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn add_is_idempotent() {
        let (_tmp, store) = test_store();
        let chunks = vec![
            chunk("actors start use cases"),
            chunk("classes have attributes"),
        ];

        assert_eq!(store.add(&chunks).unwrap(), 2);
        assert_eq!(store.add(&chunks).unwrap(), 0);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn duplicate_hashes_in_one_batch_count_once() {
        let (_tmp, store) = test_store();
        let chunks = vec![chunk("same text here"), chunk("same text here")];
        assert_eq!(store.add(&chunks).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn search_ranks_by_similarity() {
        let (_tmp, store) = test_store();
        store
            .add(&[
                chunk("classes have attributes and operations"),
                chunk("actors start use cases in the system"),
                chunk("sequence diagrams order messages"),
            ])
            .unwrap();

        let hits = store.similarity_search("actors use cases", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "actors start use cases in the system");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let (_tmp, store) = test_store();
        store
            .add(&[chunk("zeta"), chunk("alpha"), chunk("mu")])
            .unwrap();

        // A query without words embeds to zero, so every similarity is 0.
        let hits = store.similarity_search("?", 3).unwrap();
        let texts: Vec<_> =
            hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["zeta", "alpha", "mu"]);
    }

    #[test]
    fn readding_refreshes_source_without_new_entry() {
        let (_tmp, store) = test_store();
        store.add(&[chunk("shared passage")]).unwrap();

        let moved = Chunk::new("shared passage", "other.txt", None, 2);
        assert_eq!(store.add(&[moved]).unwrap(), 0);
        assert_eq!(store.chunks().unwrap()[0].source, "other.txt");
    }

    #[test]
    fn clear_empties_and_resets() {
        let (_tmp, store) = test_store();
        store.add(&[chunk("first passage")]).unwrap();
        store.clear().unwrap();
        assert_eq!(store.len().unwrap(), 0);

        assert_eq!(store.add(&[chunk("first passage")]).unwrap(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.redb");
        {
            let store =
                VectorStore::open(&path, Box::new(HashEmbedder)).unwrap();
            store.add(&[chunk("durable passage")]).unwrap();
        }
        let store = VectorStore::open(&path, Box::new(HashEmbedder)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn normalize_makes_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn chunk_key_uses_hash_prefix() {
        assert_eq!(chunk_key("00000000000000ffabc"), 0xff);
        assert_eq!(chunk_key("short"), chunk_key("short"));
    }
}
