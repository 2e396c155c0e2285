//! Brute-force in-memory index, for small corpora and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use homematch_core::error::{Error, Result};
use homematch_core::traits::{Embedder, IndexStore, SimilarityIndex};
use homematch_core::types::{CandidateMatch, Fragment, FragmentId};

pub struct FlatIndex {
    entries: Vec<(FragmentId, Vec<f32>)>,
    embedder: Arc<dyn Embedder>,
}

impl FlatIndex {
    pub async fn build(fragments: &[Fragment], embedder: Arc<dyn Embedder>) -> Result<Self> {
        let texts: Vec<String> = fragments.iter().map(|f| f.content.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != fragments.len() {
            return Err(Error::Embedding(format!("embedder returned {} vectors for {} fragments", vectors.len(), fragments.len())));
        }
        let entries = fragments.iter().map(|f| f.id.clone()).zip(vectors).collect();
        Ok(Self { entries, embedder })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl SimilarityIndex for FlatIndex {
    async fn query(&self, statement: &str, top_k: usize) -> Result<Vec<CandidateMatch>> {
        let q = self
            .embedder
            .embed_batch(&[statement.to_string()])
            .await
            .map_err(|e| Error::Query(e.to_string()))?
            .pop()
            .ok_or_else(|| Error::Query("embedder returned no vector".into()))?;
        let mut hits: Vec<CandidateMatch> = self
            .entries
            .iter()
            .map(|(id, v)| CandidateMatch { fragment: id.clone(), score: cosine(&q, v) })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.fragment.key().cmp(&b.fragment.key())));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn fragment_count(&self) -> Result<usize> { Ok(self.entries.len()) }
}

/// Keeps built indexes for the life of the process, keyed by fingerprint.
pub struct MemoryIndexStore {
    embedder: Arc<dyn Embedder>,
    built: RwLock<HashMap<String, Arc<FlatIndex>>>,
}

impl MemoryIndexStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self { Self { embedder, built: RwLock::new(HashMap::new()) } }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn open(&self, fingerprint: &str) -> Result<Option<Arc<dyn SimilarityIndex>>> {
        Ok(self.built.read().await.get(fingerprint).map(|i| Arc::clone(i) as Arc<dyn SimilarityIndex>))
    }

    async fn build(&self, fragments: &[Fragment], fingerprint: &str) -> Result<Arc<dyn SimilarityIndex>> {
        let index = FlatIndex::build(fragments, Arc::clone(&self.embedder))
            .await
            .map_err(|e| Error::IndexUnavailable(format!("in-memory build: {e}")))?;
        let index = Arc::new(index);
        self.built.write().await.insert(fingerprint.to_string(), Arc::clone(&index));
        Ok(index as Arc<dyn SimilarityIndex>)
    }
}
