//! OpenAI-compatible `/chat/completions` client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use homematch_core::config::PersonalizeSettings;
use homematch_core::error::{Error, Result};
use homematch_core::policy::{RetryPolicy, Throttle};
use homematch_core::traits::PersonalizationGenerator;

use crate::prompt::messages;

pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_ms: u64,
    throttle: Throttle,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(settings: &PersonalizeSettings, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout_ms: settings.timeout_secs * 1000,
            throttle: Throttle::new(Duration::from_millis(settings.min_interval_ms)),
            retry: RetryPolicy::with_retries(settings.max_retries),
        })
    }

    async fn request(&self, listing_body: &str, matched_criteria: &[String]) -> Result<Option<String>> {
        self.throttle.acquire().await;
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": messages(listing_body, matched_criteria),
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
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
            return Err(Error::Network(format!("chat endpoint returned {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("{status}: {text}")));
        }
        let parsed: ChatResponse = response.json().await.map_err(|e| Error::Generation(e.to_string()))?;
        Ok(first_content(parsed))
    }
}

/// Text of the first choice; blank content counts as none.
fn first_content(parsed: ChatResponse) -> Option<String> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl PersonalizationGenerator for OpenAiGenerator {
    async fn personalize(&self, listing_body: &str, matched_criteria: &[String]) -> Result<Option<String>> {
        debug!(model = %self.model, criteria = matched_criteria.len(), "requesting personalization");
        self.retry.run("chat completion", || self.request(listing_body, matched_criteria)).await
    }
}
