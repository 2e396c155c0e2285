//! OpenAI-compatible `/embeddings` client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use homematch_core::config::EmbeddingSettings;
use homematch_core::error::{Error, Result};
use homematch_core::policy::{RetryPolicy, Throttle};
use homematch_core::traits::Embedder;

/// Inputs per request.
const MAX_BATCH: usize = 256;

pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
    id: String,
    timeout_ms: u64,
    throttle: Throttle,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            dim: settings.dim,
            id: format!("openai:{}:d{}", settings.model, settings.dim),
            timeout_ms: settings.timeout_secs * 1000,
            throttle: Throttle::new(Duration::from_millis(settings.min_interval_ms)),
            retry: RetryPolicy::with_retries(settings.max_retries),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.throttle.acquire().await;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dim,
        });
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { Error::Timeout(self.timeout_ms) } else { Error::Network(e.to_string()) })?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map_or(5_000, |secs| secs * 1000);
            return Err(Error::RateLimited { retry_after_ms });
        }
        if status.is_server_error() {
            return Err(Error::Network(format!("embeddings endpoint returned {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("{status}: {text}")));
        }
        let parsed: EmbeddingResponse = response.json().await.map_err(|e| Error::Embedding(e.to_string()))?;
        order_embeddings(parsed, texts.len(), self.dim)
    }
}

/// Put response vectors back in request order and check their shape.
fn order_embeddings(parsed: EmbeddingResponse, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    let mut out: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in parsed.data {
        if datum.embedding.len() != dim {
            return Err(Error::Embedding(format!("expected {dim} dims, got {}", datum.embedding.len())));
        }
        let slot = out
            .get_mut(datum.index)
            .ok_or_else(|| Error::Embedding(format!("response index {} out of range", datum.index)))?;
        *slot = Some(datum.embedding);
    }
    out.into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| Error::Embedding(format!("missing embedding for input {i}"))))
        .collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            debug!(inputs = batch.len(), model = %self.model, "embedding batch");
            let vectors = self.retry.run("embeddings", || self.request(batch)).await?;
            all.extend(vectors);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorders_by_index() {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [{"index": 1, "embedding": [0.0, 1.0]}, {"index": 0, "embedding": [1.0, 0.0]}]}"#,
        )
        .unwrap();
        let out = order_embeddings(parsed, 2, 2).unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn rejects_wrong_dimension_and_gaps() {
        let parsed: EmbeddingResponse = serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#).unwrap();
        assert!(order_embeddings(parsed, 1, 2).is_err());
        let parsed: EmbeddingResponse = serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0, 0.0]}]}"#).unwrap();
        assert!(order_embeddings(parsed, 2, 2).is_err());
    }
}
