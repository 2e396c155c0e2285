use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use homematch_core::config::Settings;
use homematch_core::corpus::Corpus;
use homematch_core::data_processor::{fingerprint, ChunkingConfig, DataProcessor};
use homematch_core::error::{Error, Result};
use homematch_core::evidence::{filter_evidence, FilteredResult};
use homematch_core::traits::{CorpusLoader, IndexHandle, IndexOrigin, IndexStore, PersonalizationGenerator};
use homematch_core::types::{Criteria, CriterionIndex, ListingId, NarrativeSource, PersonalizationRecord};
use homematch_core::Stage;

use crate::cancel::Cancellation;
use crate::matcher::{CriteriaMatcher, DegradedCriterion};

/// Everything up to (and including) the corroboration filter.
pub struct Evaluation {
    pub corpus: Corpus,
    pub origin: IndexOrigin,
    pub degraded: Vec<DegradedCriterion>,
    pub filtered: FilteredResult,
}

#[derive(Debug)]
pub struct RunReport {
    pub origin: IndexOrigin,
    pub degraded: Vec<DegradedCriterion>,
    pub records: HashMap<ListingId, PersonalizationRecord>,
}

/// Owns one matching run end to end:
/// load -> index -> match -> filter -> personalize -> collect.
pub struct Pipeline {
    settings: Settings,
    loader: Arc<dyn CorpusLoader>,
    store: Arc<dyn IndexStore>,
    generator: Option<Arc<dyn PersonalizationGenerator>>,
    processor: DataProcessor,
}

impl Pipeline {
    pub fn new(settings: Settings, loader: Arc<dyn CorpusLoader>, store: Arc<dyn IndexStore>) -> Self {
        let processor = DataProcessor::new(ChunkingConfig {
            chunk_size: settings.index.chunk_size,
            chunk_overlap: settings.index.chunk_overlap,
        });
        Self { settings, loader, store, generator: None, processor }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn PersonalizationGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn load_corpus(&self) -> Result<Corpus> {
        let corpus = Corpus::new(self.loader.load()?)?;
        info!(listings = corpus.len(), "corpus loaded");
        Ok(corpus)
    }

    /// Reuse the persisted index for this corpus when there is one (and no
    /// rebuild was requested), otherwise build and persist a fresh one.
    pub async fn prepare_index(&self, corpus: &Corpus) -> Result<IndexHandle> {
        let fragments = self.processor.process_corpus(corpus);
        let fp = fingerprint(&fragments);
        if self.settings.index.rebuild {
            info!("index rebuild requested");
        } else if let Some(index) = self.store.open(&fp).await? {
            info!(fingerprint = %fp, "reusing persisted index");
            return Ok(IndexHandle { origin: IndexOrigin::Loaded, index });
        }
        let started = Instant::now();
        let index = self.store.build(&fragments, &fp).await?;
        info!(fragments = fragments.len(), elapsed_ms = duration_ms(started.elapsed()), "index built");
        Ok(IndexHandle { origin: IndexOrigin::Built, index })
    }

    /// Load and index only.
    pub async fn index(&self, cancel: &Cancellation) -> Result<IndexHandle> {
        cancel.check(Stage::Load)?;
        let corpus = self.load_corpus().map_err(|e| e.at(Stage::Load))?;
        cancel.check(Stage::Index)?;
        self.prepare_index(&corpus).await.map_err(|e| e.at(Stage::Index))
    }

    pub async fn evaluate(&self, criteria: &Criteria, cancel: &Cancellation) -> Result<Evaluation> {
        cancel.check(Stage::Load)?;
        let corpus = self.load_corpus().map_err(|e| e.at(Stage::Load))?;

        cancel.check(Stage::Index)?;
        let handle = self.prepare_index(&corpus).await.map_err(|e| e.at(Stage::Index))?;

        cancel.check(Stage::Match)?;
        let report = CriteriaMatcher::from_settings(&self.settings.matching).match_criteria(criteria, handle.index.as_ref()).await;
        if !report.degraded.is_empty() {
            warn!(degraded = report.degraded.len(), criteria = criteria.len(), "some criteria contributed no evidence");
        }

        cancel.check(Stage::Filter)?;
        let candidates = report.evidence.len();
        let filtered = filter_evidence(report.evidence, self.settings.matching.min_matches);
        info!(candidates, kept = filtered.len(), min_matches = filtered.min_matches(), "evidence filtered");

        Ok(Evaluation { corpus, origin: handle.origin, degraded: report.degraded, filtered })
    }

    pub async fn run_detailed(&self, criteria: &Criteria, cancel: &Cancellation) -> Result<RunReport> {
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| Error::InvalidConfig("no personalization generator configured".into()))?;
        let eval = self.evaluate(criteria, cancel).await?;

        cancel.check(Stage::Personalize)?;
        let produced = self.personalize(&eval, criteria, generator.as_ref()).await;

        cancel.check(Stage::Collect)?;
        let records: HashMap<ListingId, PersonalizationRecord> = produced.into_iter().map(|r| (r.record_uuid.clone(), r)).collect();
        let fallbacks = records.values().filter(|r| r.is_fallback()).count();
        info!(records = records.len(), fallbacks, "run complete");
        Ok(RunReport { origin: eval.origin, degraded: eval.degraded, records })
    }

    /// Personalized records for every corroborated listing, keyed by id.
    pub async fn run(&self, criteria: &Criteria, cancel: &Cancellation) -> Result<HashMap<ListingId, PersonalizationRecord>> {
        Ok(self.run_detailed(criteria, cancel).await?.records)
    }

    async fn personalize(&self, eval: &Evaluation, criteria: &Criteria, generator: &dyn PersonalizationGenerator) -> Vec<PersonalizationRecord> {
        let concurrency = self.settings.personalize.concurrency.max(1);
        stream::iter(eval.filtered.iter())
            .map(|(id, indices)| self.personalize_one(&eval.corpus, criteria, id, indices, generator))
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    async fn personalize_one(
        &self,
        corpus: &Corpus,
        criteria: &Criteria,
        id: &ListingId,
        indices: &BTreeSet<CriterionIndex>,
        generator: &dyn PersonalizationGenerator,
    ) -> PersonalizationRecord {
        let settings = &self.settings.personalize;
        let answers = criteria.texts_for(indices);
        let outcome = match corpus.get(id) {
            None => Err("listing is not in the corpus".to_string()),
            Some(listing) => match tokio::time::timeout(settings.call_budget(), generator.personalize(&listing.body, &answers)).await {
                Ok(Ok(Some(text))) if !text.trim().is_empty() => Ok(text),
                Ok(Ok(_)) => Err("generator returned no content".to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {} ms", duration_ms(settings.call_budget()))),
            },
        };
        let (description, source) = match outcome {
            Ok(text) => (text, NarrativeSource::Generated),
            Err(reason) => {
                warn!(listing = %id, %reason, "using fallback description");
                (settings.fallback_message.clone(), NarrativeSource::Fallback { reason })
            }
        };
        PersonalizationRecord { record_uuid: id.clone(), filtered_answers: answers, description, source }
    }
}

fn duration_ms(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }
