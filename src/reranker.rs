use candle_core::Tensor;
use serde::Serialize;

use crate::{
    chunking::Chunk,
    error::{Error, Result},
    model_manager::SharedModel,
    vector_store::ScoredChunk,
};

/// Scores `(query, text)` pairs; higher is more relevant.
pub trait Reranker {
    /// One score per text, in input order.
    fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>>;
}

/// A recalled chunk with its rerank score.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub chunk: Chunk,
    pub score: f32,
    /// Zero-based position in the recall list.
    pub recall_rank: usize,
}

/// Order recalled chunks by reranker score, descending.
///
/// The sort is stable, so equal scores keep their recall order.
pub fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    recalled: Vec<ScoredChunk>,
) -> Result<Vec<RankedCandidate>> {
    let texts: Vec<&str> =
        recalled.iter().map(|r| r.chunk.text.as_str()).collect();
    let scores = reranker.score(query, &texts)?;
    if scores.len() != recalled.len() {
        return Err(Error::Model(format!(
            "reranker returned {} scores for {} texts",
            scores.len(),
            recalled.len()
        )));
    }

    let mut ranked: Vec<RankedCandidate> = recalled
        .into_iter()
        .zip(scores)
        .enumerate()
        .map(|(recall_rank, (hit, score))| RankedCandidate {
            chunk: hit.chunk,
            score,
            recall_rank,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(ranked)
}

/// Like [`rerank`], but a failing reranker leaves the recall order and
/// similarity scores in place.
pub fn rerank_or_recall(
    reranker: &dyn Reranker,
    query: &str,
    recalled: Vec<ScoredChunk>,
) -> Vec<RankedCandidate> {
    match rerank(reranker, query, recalled.clone()) {
        Ok(ranked) => ranked,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "reranking failed, keeping recall order"
            );
            recalled
                .into_iter()
                .enumerate()
                .map(|(recall_rank, hit)| RankedCandidate {
                    chunk: hit.chunk,
                    score: hit.score,
                    recall_rank,
                })
                .collect()
        }
    }
}

/// Late-interaction scoring with the ColBERT model.
impl Reranker for SharedModel {
    fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        let mut model = self.lock()?;
        let query_embedding = model.encode_query(query)?;
        texts
            .iter()
            .map(|text| {
                let doc_embedding = model.encode_document(text)?;
                maxsim(&query_embedding, &doc_embedding)
            })
            .collect()
    }
}

/// Compute the MaxSim score between a query embedding and a document embedding.
///
/// query_embedding: [Q, D] where Q = query tokens, D = embedding dimension
/// doc_embedding: [T, D] where T = document tokens, D = embedding dimension
///
/// MaxSim = sum over query tokens of max(query_token . doc_token for all doc tokens)
pub fn maxsim(query_embedding: &Tensor, doc_embedding: &Tensor) -> Result<f32> {
    // [Q, T]
    let sim_matrix = query_embedding.matmul(&doc_embedding.t()?)?;
    let row_maxes = sim_matrix.max(1)?;
    Ok(row_maxes.sum_all()?.to_scalar::<f32>()?)
}
