//! docrag - incremental retrieval and context assembly over a document corpus.
//!
//! docrag splits a corpus of text, markdown and PDF files into semantic
//! chunks, filters out layout noise and duplicates, and stores embeddings in
//! a local [redb](https://github.com/cberner/redb) vector store. At query time
//! it recalls candidates by embedding similarity, reranks them with
//! [ColBERT](https://github.com/stanford-futuredata/ColBERT) late interaction
//! and assembles a context that fits a prompt token budget.
//!
//! # Quick start
//!
//! ```no_run
//! use docrag::{DataDir, Engine};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let engine = Engine::open(&data_dir).unwrap();
//!
//! let report = engine.update(&mut |done, total| {
//!     eprintln!("{done}/{total}");
//!     Ok(())
//! })
//! .unwrap();
//! println!("{} new chunks", report.chunks_added);
//!
//! let retrieval = engine.retrieve("O que é um ator num caso de uso?");
//! println!("{}", retrieval.context);
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod data_dir;
pub mod dedup;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod incremental;
pub mod ingestion;
pub mod loader;
pub mod model_manager;
pub mod noise;
pub mod reranker;
pub mod settings_db;
pub mod tokenizer;
pub mod translate;
pub mod validation;
pub mod vector_store;
pub mod walker;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use context::Retrieval;
pub use data_dir::DataDir;
pub use engine::{Engine, IndexReport, Status};
pub use error::{Error, Result};
pub use model_manager::ModelManager;
pub use settings_db::SettingsDb;
pub use vector_store::VectorStore;
