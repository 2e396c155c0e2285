//! Embedding providers for HomeMatch.
//!
//! `APP_USE_FAKE_EMBEDDINGS=1` forces the deterministic [`HashingEmbedder`]
//! regardless of configuration, for fast offline runs and tests.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod hashing;
pub mod openai;

use std::sync::Arc;
use tracing::info;

use homematch_core::config::{EmbeddingProvider, EmbeddingSettings};
use homematch_core::error::{Error, Result};
use homematch_core::traits::Embedder;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

pub fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Build the embedder selected by `settings`.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_forced() || settings.provider == EmbeddingProvider::Hashing {
        info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashingEmbedder::new(settings.dim)));
    }
    let api_key = std::env::var(&settings.api_key_env)
        .map_err(|_| Error::InvalidConfig(format!("{} is not set", settings.api_key_env)))?;
    info!(model = %settings.model, dim = settings.dim, "using OpenAI embedder");
    Ok(Arc::new(OpenAiEmbedder::new(settings, api_key)?))
}
