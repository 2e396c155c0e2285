//! homematch-vector
//!
//! Similarity indexes over listing fragments: a LanceDB-backed persisted
//! table (`store`, `search`, `writer`) and a brute-force in-memory variant
//! (`flat`). Both are reached through `IndexStore` / `SimilarityIndex`.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod flat;
pub mod schema;
pub mod search;
pub mod store;
pub mod table;
pub mod writer;

use std::sync::Arc;

use homematch_core::config::{IndexBackend, IndexSettings};
use homematch_core::traits::{Embedder, IndexStore};

pub use flat::{FlatIndex, MemoryIndexStore};
pub use search::LanceIndex;
pub use store::LanceIndexStore;

/// Store for the configured backend. `db_path` is the resolved `index.dir`.
pub fn index_store(settings: &IndexSettings, db_path: std::path::PathBuf, embedder: Arc<dyn Embedder>) -> Arc<dyn IndexStore> {
    match settings.backend {
        IndexBackend::Lance => Arc::new(LanceIndexStore::new(db_path, &settings.table, embedder, settings.batch_size)),
        IndexBackend::Memory => Arc::new(MemoryIndexStore::new(embedder)),
    }
}
