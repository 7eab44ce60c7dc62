//! Curated memory storage
//!
//! - `types`: `MemoryRecord` and the project/session bookkeeping records
//! - `vector`: cosine similarity and top-k search
//! - `embedding`: pluggable `Embedder` backends
//! - `store`: the `MemoryStore` contract and `InMemoryStore`
//! - `file_store`: JSON-file persistence

pub mod embedding;
pub mod file_store;
pub mod store;
pub mod types;
pub mod vector;

pub use embedding::{build_embedder, Embedder, HashingEmbedder, OllamaEmbedder};
pub use file_store::FileMemoryStore;
pub use store::{InMemoryStore, MemoryStore};
pub use types::{
    EmotionalResonance, MemoryMetadata, MemoryRecord, MemoryRecordBuilder, ProjectRecord,
    ProjectSnapshot, ProjectStats, SessionSummary, StoreStats, TemporalRelevance,
};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use std::sync::Arc;

/// Open the configured store backend
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn MemoryStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StorageBackend::File => Ok(Arc::new(
            FileMemoryStore::open(config.base_dir.clone()).await?,
        )),
    }
}
