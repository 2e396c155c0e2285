//! Wiring from settings to a ready pipeline, plus report rendering.

use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use homematch_core::config::{Config, CorpusFormat, CorpusSettings, CriteriaSettings, Settings};
use homematch_core::corpus::{JsonCorpusLoader, TextDirLoader};
use homematch_core::error::{Error, Result};
use homematch_core::traits::CorpusLoader;
use homematch_core::types::{Criteria, ListingId, PersonalizationRecord};
use homematch_embed::get_default_embedder;
use homematch_personalize::default_generator;
use homematch_pipeline::{Evaluation, Pipeline};

/// One statement per line; blank lines and `#` comments are skipped.
pub fn parse_criteria_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_criteria(settings: &CriteriaSettings, base: &Path) -> Result<Criteria> {
    let statements = match (&settings.file, settings.statements.is_empty()) {
        (Some(file), true) => {
            let path = homematch_core::config::resolve_with_base(base, file);
            let content = fs::read_to_string(&path).map_err(|e| Error::InvalidConfig(format!("criteria file {}: {e}", path.display())))?;
            parse_criteria_lines(&content)
        }
        _ => settings.statements.clone(),
    };
    if statements.is_empty() {
        return Err(Error::InvalidConfig("no criteria configured (criteria.statements or criteria.file)".into()));
    }
    Criteria::new(statements)
}

pub fn corpus_loader(settings: &CorpusSettings, path: PathBuf) -> Arc<dyn CorpusLoader> {
    match settings.format {
        CorpusFormat::Json => Arc::new(JsonCorpusLoader::new(path)),
        CorpusFormat::TextDir => Arc::new(TextDirLoader::new(path)),
    }
}

/// Pipeline for `settings`. The generator (and its API key) is only
/// required for full runs.
pub fn build_pipeline(config: &Config, settings: &Settings, with_generator: bool) -> Result<Pipeline> {
    let loader = corpus_loader(&settings.corpus, config.resolve_path(&settings.corpus.path));
    let embedder = get_default_embedder(&settings.embedding)?;
    let store = homematch_vector::index_store(&settings.index, config.resolve_path(&settings.index.dir), embedder);
    let pipeline = Pipeline::new(settings.clone(), loader, store);
    if with_generator {
        Ok(pipeline.with_generator(default_generator(&settings.personalize)?))
    } else {
        Ok(pipeline)
    }
}

/// Records keyed by id, in id order.
pub fn records_json(records: &HashMap<ListingId, PersonalizationRecord>) -> serde_json::Result<String> {
    let ordered: BTreeMap<&str, &PersonalizationRecord> = records.iter().map(|(id, r)| (id.as_str(), r)).collect();
    serde_json::to_string_pretty(&ordered)
}

#[derive(Serialize)]
struct MatchedListing {
    criteria: Vec<usize>,
    statements: Vec<String>,
}

/// Surviving listings with the statements they matched, plus degraded criteria.
pub fn evaluation_json(eval: &Evaluation, criteria: &Criteria) -> serde_json::Result<String> {
    let listings: BTreeMap<&str, MatchedListing> = eval
        .filtered
        .iter()
        .map(|(id, indices)| {
            (id.as_str(), MatchedListing { criteria: indices.iter().copied().collect(), statements: criteria.texts_for(indices) })
        })
        .collect();
    serde_json::to_string_pretty(&json!({
        "min_matches": eval.filtered.min_matches(),
        "listings": listings,
        "degraded": eval.degraded,
    }))
}
