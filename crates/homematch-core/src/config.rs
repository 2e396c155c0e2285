//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_MATCHING__TOP_K`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::policy::RetryPolicy;

pub const DEFAULT_FALLBACK_MESSAGE: &str = "Personalized description is not available.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus: CorpusSettings,
    pub criteria: CriteriaSettings,
    pub matching: MatchSettings,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub personalize: PersonalizeSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusFormat {
    /// A JSON array of listing objects.
    Json,
    /// A directory of `.txt` files, one listing per file.
    TextDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub path: String,
    pub format: CorpusFormat,
}

impl Default for CorpusSettings {
    fn default() -> Self { Self { path: "listings.json".into(), format: CorpusFormat::Json } }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaSettings {
    /// Inline statements, in display order.
    pub statements: Vec<String>,
    /// File with one statement per line; used when `statements` is empty.
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    pub top_k: usize,
    pub min_relevance: f32,
    pub min_matches: usize,
    pub query_concurrency: usize,
    pub query_timeout_secs: u64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self { top_k: 5, min_relevance: 0.1, min_matches: 3, query_concurrency: 4, query_timeout_secs: 30 }
    }
}

impl MatchSettings {
    pub fn query_timeout(&self) -> Duration { Duration::from_secs(self.query_timeout_secs) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// LanceDB table persisted under `index.dir`.
    Lance,
    /// Brute-force in-process index; nothing survives the process.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub dir: String,
    pub table: String,
    /// Ignore any persisted index and build a new one.
    pub rebuild: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Lance,
            dir: "listings_lancedb".into(),
            table: "listings".into(),
            rebuild: false,
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Hashing,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dim: usize,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub min_interval_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-large".into(),
            dim: 1024,
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 60,
            max_retries: 2,
            min_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizeSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Minimum gap between two calls to the provider.
    pub min_interval_ms: u64,
    pub concurrency: usize,
    pub fallback_message: String,
}

impl Default for PersonalizeSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            temperature: 0.25,
            max_tokens: 2000,
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 120,
            max_retries: 2,
            min_interval_ms: 0,
            concurrency: 2,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.into(),
        }
    }
}

impl PersonalizeSettings {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

    /// Upper bound for one listing's generation: every attempt at full
    /// timeout plus the longest backoff between them.
    pub fn call_budget(&self) -> Duration {
        let attempts = self.timeout().saturating_mul(self.max_retries.saturating_add(1));
        attempts.saturating_add(RetryPolicy::with_retries(self.max_retries).max_total_delay())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let m = &self.matching;
        if m.top_k == 0 { return Err(Error::InvalidConfig("matching.top_k must be at least 1".into())); }
        if !m.min_relevance.is_finite() { return Err(Error::InvalidConfig("matching.min_relevance must be finite".into())); }
        if m.query_concurrency == 0 { return Err(Error::InvalidConfig("matching.query_concurrency must be at least 1".into())); }
        let i = &self.index;
        if i.chunk_size == 0 { return Err(Error::InvalidConfig("index.chunk_size must be at least 1".into())); }
        if i.chunk_overlap >= i.chunk_size {
            return Err(Error::InvalidConfig(format!("index.chunk_overlap ({}) must be smaller than index.chunk_size ({})", i.chunk_overlap, i.chunk_size)));
        }
        if i.batch_size == 0 { return Err(Error::InvalidConfig("index.batch_size must be at least 1".into())); }
        if self.embedding.dim == 0 { return Err(Error::InvalidConfig("embedding.dim must be at least 1".into())); }
        let p = &self.personalize;
        if p.concurrency == 0 { return Err(Error::InvalidConfig("personalize.concurrency must be at least 1".into())); }
        if p.fallback_message.trim().is_empty() { return Err(Error::InvalidConfig("personalize.fallback_message must not be empty".into())); }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load_from(base_dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment, base_dir: base_dir.to_path_buf() })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed, validated settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Resolve a configured path against the directory the config came from.
    pub fn resolve_path(&self, p: &str) -> PathBuf { resolve_with_base(&self.base_dir, p) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
