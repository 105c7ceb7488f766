//! The retrieval engine: indexing passes and query-time retrieval over one
//! corpus.

use std::path::PathBuf;

use serde::Serialize;

use crate::{
    config::EngineConfig,
    context::{
        Budget,
        DebugBundle,
        Retrieval,
        assemble,
        is_weak_context,
        normalized_preview,
        select_under_budget,
    },
    data_dir::DataDir,
    error::Result,
    incremental::{
        Manifest,
        deleted_paths,
        diff_documents,
        load_manifest,
        store_manifest,
    },
    ingestion::{ChunkingParams, Progress, index_chunks, prepare_chunks},
    loader::{SourceDocument, load_documents},
    model_manager::SharedModel,
    reranker::{Reranker, rerank_or_recall},
    settings_db::SettingsDb,
    tokenizer::{LazyTokenizer, TokenCounter},
    translate::{Passthrough, Translator, try_translate},
    vector_store::{ScoredChunk, VectorIndex, VectorStore},
    walker::discover_files,
};

/// Counter of documents re-indexed after an edit since the last full
/// rebuild. Chunks of their earlier versions may still be in the index.
const STALE_DOCUMENTS_KEY: &str = "stale_documents";

/// Outcome of a build or update pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Documents found in the corpus.
    pub documents: usize,
    /// Documents that were (re)processed.
    pub processed: usize,
    /// Unique chunks prepared from the processed documents.
    pub chunks_prepared: usize,
    /// Chunks the index did not hold before.
    pub chunks_added: usize,
    /// Manifest entries whose document disappeared.
    pub deleted: Vec<String>,
}

/// Snapshot of the index state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub embedding_model: String,
    pub documents_path: PathBuf,
    pub indexed_chunks: usize,
    pub indexed_documents: usize,
    /// Documents that an update would process; `None` without a corpus.
    pub pending: Option<usize>,
    /// Indexed documents no longer in the corpus; `None` without a corpus.
    pub deleted: Option<Vec<String>>,
    /// Documents edited since the last full rebuild. When non-zero the
    /// index may still return passages from their earlier versions.
    pub stale_documents: u64,
}

/// Owns the configuration, persisted state and model collaborators.
pub struct Engine {
    config: EngineConfig,
    settings: SettingsDb,
    index: Box<dyn VectorIndex>,
    tokenizer: Box<dyn TokenCounter>,
    reranker: Box<dyn Reranker>,
    translator: Box<dyn Translator>,
}

impl Engine {
    /// Open the engine over a data directory, with the ColBERT model (loaded
    /// on first use) as embedder and reranker.
    pub fn open(data_dir: &DataDir) -> Result<Self> {
        let settings = SettingsDb::open(&data_dir.settings_db())?;
        let config = EngineConfig::load(&settings)?;
        let model = SharedModel::new(config.embedding_model.clone());
        let index = VectorStore::open(
            &data_dir.vector_db(),
            Box::new(model.clone()),
        )?;
        let tokenizer = LazyTokenizer::new(config.embedding_model.clone());

        Ok(Self::from_parts(
            config,
            settings,
            Box::new(index),
            Box::new(tokenizer),
            Box::new(model),
            Box::new(Passthrough),
        ))
    }

    /// Assemble an engine from explicit collaborators.
    pub fn from_parts(
        config: EngineConfig,
        settings: SettingsDb,
        index: Box<dyn VectorIndex>,
        tokenizer: Box<dyn TokenCounter>,
        reranker: Box<dyn Reranker>,
        translator: Box<dyn Translator>,
    ) -> Self {
        Self {
            config,
            settings,
            index,
            tokenizer,
            reranker,
            translator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Release the databases and model handles.
    pub fn close(self) {
        tracing::debug!("closing engine");
    }

    fn load_corpus(&self) -> Result<Vec<SourceDocument>> {
        let files = discover_files(&self.config.documents_path)?;
        let docs = load_documents(&files);
        tracing::info!(
            discovered = files.len(),
            loaded = docs.len(),
            root = %self.config.documents_path.display(),
            "loaded corpus"
        );
        Ok(docs)
    }

    fn process(
        &self,
        docs: &[&SourceDocument],
        progress: &mut Progress<'_>,
    ) -> Result<(usize, usize)> {
        let params = ChunkingParams::from(&self.config);
        let chunks = prepare_chunks(docs, &params, self.tokenizer.as_ref());
        let added = index_chunks(self.index.as_ref(), &chunks, progress)?;
        Ok((chunks.len(), added))
    }

    /// Count `changed` documents that were indexed before under another
    /// hash.
    fn record_edits(
        &self,
        changed: &[&SourceDocument],
        previous: &Manifest,
    ) -> Result<()> {
        let edited = changed
            .iter()
            .filter(|doc| previous.contains_key(&doc.path))
            .count() as u64;
        if edited == 0 {
            return Ok(());
        }
        tracing::info!(edited, "edited documents may leave stale chunks");
        let stale = self.settings.get_counter(STALE_DOCUMENTS_KEY)?;
        self.settings.set_counter(STALE_DOCUMENTS_KEY, stale + edited)
    }

    // -- Indexing --

    /// Index every document in the corpus. With `force_rebuild`, the index
    /// and manifest are cleared first.
    pub fn build(
        &self,
        force_rebuild: bool,
        progress: &mut Progress<'_>,
    ) -> Result<IndexReport> {
        let docs = self.load_corpus()?;
        let previous = load_manifest(&self.settings)?;

        if force_rebuild {
            tracing::info!("clearing index for full rebuild");
            self.index.clear()?;
            self.settings.clear_manifest()?;
            self.settings.set_counter(STALE_DOCUMENTS_KEY, 0)?;
        }

        let all: Vec<&SourceDocument> = docs.iter().collect();
        let (chunks_prepared, chunks_added) = self.process(&all, progress)?;
        store_manifest(&self.settings, &docs)?;
        if !force_rebuild {
            self.record_edits(&diff_documents(&docs, &previous), &previous)?;
        }

        let report = IndexReport {
            documents: docs.len(),
            processed: docs.len(),
            chunks_prepared,
            chunks_added,
            deleted: deleted_paths(&docs, &previous),
        };
        tracing::info!(
            documents = report.documents,
            added = report.chunks_added,
            "build finished"
        );
        Ok(report)
    }

    /// Index only documents that are new or changed since the last pass.
    ///
    /// When nothing changed this is a successful no-op.
    pub fn update(&self, progress: &mut Progress<'_>) -> Result<IndexReport> {
        let docs = self.load_corpus()?;
        let manifest = load_manifest(&self.settings)?;
        let changed = diff_documents(&docs, &manifest);
        let deleted = deleted_paths(&docs, &manifest);

        for path in &deleted {
            tracing::info!(path = %path, "document removed from corpus");
        }

        if changed.is_empty() {
            tracing::info!("index is up to date");
            return Ok(IndexReport {
                documents: docs.len(),
                deleted,
                ..IndexReport::default()
            });
        }

        tracing::info!(changed = changed.len(), "updating index");
        let (chunks_prepared, chunks_added) =
            self.process(&changed, progress)?;
        store_manifest(&self.settings, &docs)?;
        self.record_edits(&changed, &manifest)?;

        Ok(IndexReport {
            documents: docs.len(),
            processed: changed.len(),
            chunks_prepared,
            chunks_added,
            deleted,
        })
    }

    // -- Querying --

    /// Retrieve context for `query` with the configured candidate ceiling.
    ///
    /// Never fails: any error degrades to the no-context result.
    pub fn retrieve(&self, query: &str) -> Retrieval {
        self.retrieve_with(query, self.config.max_candidates)
    }

    /// Like [`Engine::retrieve`], recalling `candidates` chunks for the
    /// reranker.
    pub fn retrieve_with(&self, query: &str, candidates: usize) -> Retrieval {
        match self.try_retrieve(query, candidates) {
            Ok(retrieval) => retrieval,
            Err(e) => {
                tracing::error!(error = %e, "retrieval failed");
                Retrieval::empty(query)
            }
        }
    }

    fn try_retrieve(
        &self,
        query: &str,
        candidates: usize,
    ) -> Result<Retrieval> {
        let config = &self.config;
        let translator = self.translator.as_ref();
        let tokenizer = self.tokenizer.as_ref();

        let query_translated = try_translate(
            translator,
            query,
            &config.source_language,
            &config.pivot_language,
        )
        .unwrap_or_else(|| query.to_string());

        let recalled = self
            .index
            .similarity_search(&query_translated, candidates)?;
        if recalled.is_empty() {
            tracing::info!("no candidates recalled");
            return Ok(Retrieval::empty(&query_translated));
        }

        let ranked = rerank_or_recall(
            self.reranker.as_ref(),
            &query_translated,
            recalled,
        );
        let budget = Budget::from(config);
        let selected = select_under_budget(&ranked, &budget, tokenizer)?;
        let context =
            assemble(&selected, budget.max_prompt_tokens, tokenizer)?;

        let weak = is_weak_context(&context, config.min_context_chars);
        if weak {
            tracing::warn!("retrieved context is thin or generic");
        }

        let context_translated = match try_translate(
            translator,
            &context,
            &config.source_language,
            &config.pivot_language,
        ) {
            Some(translated) => tokenizer
                .truncate(&translated, budget.max_prompt_tokens)?
                .to_string(),
            None => context
                .chars()
                .take(config.translation_fallback_chars)
                .collect(),
        };

        tracing::debug!(
            recalled = ranked.len(),
            selected = selected.len(),
            "assembled context"
        );

        Ok(Retrieval {
            debug: DebugBundle {
                query_translated,
                context: context.clone(),
                context_translated,
                normalized: normalized_preview(
                    &context,
                    config.min_line_chars,
                    config.normalized_preview_chars,
                ),
            },
            context,
            ranked,
            weak,
        })
    }

    /// The `k` chunks most similar to `query`, without reranking.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.index.similarity_search(query, k)
    }

    /// Text of the single most similar chunk, cut to `max_doc_chars`.
    pub fn best_passage(&self, query: &str) -> Result<Option<String>> {
        Ok(self.search(query, 1)?.into_iter().next().map(|hit| {
            hit.chunk
                .text
                .chars()
                .take(self.config.max_doc_chars)
                .collect()
        }))
    }

    pub fn status(&self) -> Result<Status> {
        let manifest = load_manifest(&self.settings)?;
        let (pending, deleted) = if self.config.documents_path.is_dir() {
            let docs = self.load_corpus()?;
            (
                Some(diff_documents(&docs, &manifest).len()),
                Some(deleted_paths(&docs, &manifest)),
            )
        } else {
            (None, None)
        };

        Ok(Status {
            embedding_model: self.config.embedding_model.clone(),
            documents_path: self.config.documents_path.clone(),
            indexed_chunks: self.index.len()?,
            indexed_documents: manifest.len(),
            pending,
            deleted,
            stale_documents: self.settings.get_counter(STALE_DOCUMENTS_KEY)?,
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
