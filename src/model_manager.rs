use std::sync::{Arc, Mutex, MutexGuard};

use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;

use crate::error::{Error, Result};

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Owns the ColBERT model, loading it on first use.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl ModelManager {
    /// Nothing is loaded until the first encode call.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model: None,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from Hugging Face Hub if
    /// needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        match &mut self.model {
            Some(model) => Ok(model),
            slot => {
                tracing::info!(model = %self.model_id, "loading ColBERT model");
                let colbert: ColBERT = ColBERT::from(&self.model_id)
                    .with_device(default_device())
                    .try_into()?;
                Ok(slot.insert(colbert))
            }
        }
    }

    /// Token embeddings of one document, shape `[T, D]`.
    ///
    /// Documents are encoded one at a time so no padding rows leak into
    /// the result.
    pub fn encode_document(&mut self, text: &str) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        let embeddings = model.encode(&[text.to_string()], false)?;
        Ok(embeddings.squeeze(0)?)
    }

    /// Token embeddings of a query, shape `[Q, D]`.
    pub fn encode_query(&mut self, query: &str) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        let embeddings = model.encode(&[query.to_string()], true)?;
        // [1, Q, D] -> [Q, D]
        Ok(embeddings.squeeze(0)?)
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

/// A [`ModelManager`] shared between the embedder and the reranker, so the
/// weights are loaded once.
#[derive(Debug, Clone)]
pub struct SharedModel {
    inner: Arc<Mutex<ModelManager>>,
}

impl SharedModel {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ModelManager::new(model_id))),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, ModelManager>> {
        self.inner
            .lock()
            .map_err(|_| Error::Model("model lock poisoned".to_string()))
    }
}
