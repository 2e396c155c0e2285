use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use homematch_core::error::Result;
use homematch_core::traits::Embedder;

/// Deterministic bag-of-words embedder: each lower-cased token is hashed to a
/// bucket and the vector is L2-normalised. Texts sharing vocabulary get a
/// positive cosine similarity, which is enough for offline runs and tests.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hashing:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dim as u64) as usize;
            #[allow(clippy::cast_precision_loss)]
            let weight = 0.5 + ((h >> 40) as f32) / ((1u64 << 24) as f32);
            v[idx] += weight;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
