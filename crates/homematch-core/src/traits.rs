use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{CandidateMatch, Fragment, Listing};

/// Produces the listing corpus for a run.
pub trait CorpusLoader: Send + Sync {
    fn load(&self) -> Result<Vec<Listing>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashing:d1024`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    /// Embed a batch of texts; output order matches input order and every
    /// vector is L2-normalised.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Query side of a similarity index over listing fragments.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Up to `top_k` nearest fragments for `statement`, best first.
    async fn query(&self, statement: &str, top_k: usize) -> Result<Vec<CandidateMatch>>;
    /// Number of indexed fragments.
    async fn fragment_count(&self) -> Result<usize>;
}

/// How the index handle for a run came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Built,
    Loaded,
}

/// An index ready for querying, tagged with its origin.
#[derive(Clone)]
pub struct IndexHandle {
    pub origin: IndexOrigin,
    pub index: Arc<dyn SimilarityIndex>,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle").field("origin", &self.origin).finish_non_exhaustive()
    }
}

/// Persistence side of an index: open what is stored for a corpus, or build
/// (and persist) a fresh one.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Open a persisted index built from a corpus with `fingerprint`.
    /// `Ok(None)` when nothing usable is stored.
    async fn open(&self, fingerprint: &str) -> Result<Option<Arc<dyn SimilarityIndex>>>;
    /// Build from `fragments`, persist it under `fingerprint`, and return it.
    async fn build(&self, fragments: &[Fragment], fingerprint: &str) -> Result<Arc<dyn SimilarityIndex>>;
}

/// Turns a listing plus the statements it matched into narrative text.
#[async_trait]
pub trait PersonalizationGenerator: Send + Sync {
    /// `Ok(None)` or an empty string both mean "no content".
    async fn personalize(&self, listing_body: &str, matched_criteria: &[String]) -> Result<Option<String>>;
}
