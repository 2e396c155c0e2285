//! Narrative generation for matched listings.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod openai;
pub mod prompt;

use std::sync::Arc;
use tracing::info;

use homematch_core::config::PersonalizeSettings;
use homematch_core::error::{Error, Result};
use homematch_core::traits::PersonalizationGenerator;

pub use openai::OpenAiGenerator;

/// Generator for `settings`; the API key is read from `settings.api_key_env`.
pub fn default_generator(settings: &PersonalizeSettings) -> Result<Arc<dyn PersonalizationGenerator>> {
    let api_key = std::env::var(&settings.api_key_env)
        .map_err(|_| Error::InvalidConfig(format!("{} is not set", settings.api_key_env)))?;
    info!(model = %settings.model, temperature = settings.temperature, "using OpenAI generator");
    Ok(Arc::new(OpenAiGenerator::new(settings, api_key)?))
}
