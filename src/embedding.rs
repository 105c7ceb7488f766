use candle_core::Tensor;

use crate::{error::Result, model_manager::SharedModel};

/// Turns text into a single dense vector.
///
/// Vectors need not be normalized; the vector index normalizes them before
/// storing or comparing.
pub trait Embedder {
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, query: &str) -> Result<Vec<f32>>;
}

/// Mean of the token embeddings of a `[T, D]` matrix.
pub fn mean_pool(token_embeddings: &Tensor) -> Result<Vec<f32>> {
    Ok(token_embeddings.mean(0)?.to_vec1::<f32>()?)
}

/// ColBERT token embeddings mean-pooled into one vector per text.
impl Embedder for SharedModel {
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut model = self.lock()?;
        texts
            .iter()
            .map(|text| mean_pool(&model.encode_document(text)?))
            .collect()
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut model = self.lock()?;
        mean_pool(&model.encode_query(query)?)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    #[test]
    fn mean_pool_averages_tokens() {
        // 3 tokens, 2 dimensions
        let tokens = Tensor::from_vec(
            vec![1.0f32, 0.0, 3.0, 2.0, 2.0, 4.0],
            (3, 2),
            &Device::Cpu,
        )
        .unwrap();
        assert_eq!(mean_pool(&tokens).unwrap(), vec![2.0, 2.0]);
    }
}
