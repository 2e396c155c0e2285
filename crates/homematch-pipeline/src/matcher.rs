//! Criterion-by-criterion similarity matching, resolved to listings.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use homematch_core::config::MatchSettings;
use homematch_core::error::{Error, Result};
use homematch_core::evidence::EvidenceMap;
use homematch_core::traits::SimilarityIndex;
use homematch_core::types::{CandidateMatch, Criteria, Criterion, CriterionIndex};

/// A criterion whose query failed; it contributed no evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedCriterion {
    pub index: CriterionIndex,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub evidence: EvidenceMap,
    /// Sorted by criterion index.
    pub degraded: Vec<DegradedCriterion>,
}

/// Queries the index once per criterion and folds accepted hits into
/// listing-level evidence.
#[derive(Debug, Clone)]
pub struct CriteriaMatcher {
    top_k: usize,
    min_relevance: f32,
    concurrency: usize,
    timeout: Duration,
}

impl CriteriaMatcher {
    pub fn new(top_k: usize, min_relevance: f32) -> Self {
        Self { top_k, min_relevance, concurrency: 4, timeout: Duration::from_secs(30) }
    }

    pub fn from_settings(settings: &MatchSettings) -> Self {
        Self::new(settings.top_k, settings.min_relevance)
            .with_concurrency(settings.query_concurrency)
            .with_timeout(settings.query_timeout())
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn match_criteria(&self, criteria: &Criteria, index: &dyn SimilarityIndex) -> MatchReport {
        let mut report = MatchReport::default();
        let mut outcomes = stream::iter(criteria.iter())
            .map(move |criterion| async move { (criterion, self.query_one(criterion, index).await) })
            .buffer_unordered(self.concurrency);
        while let Some((criterion, outcome)) = outcomes.next().await {
            match outcome {
                Ok(partial) => report.evidence.merge(partial),
                Err(e) => {
                    warn!(criterion = criterion.index, text = %criterion.text, error = %e, "criterion query failed; no evidence recorded");
                    report.degraded.push(DegradedCriterion { index: criterion.index, text: criterion.text.clone(), reason: e.to_string() });
                }
            }
        }
        report.degraded.sort_by_key(|d| d.index);
        debug!(listings = report.evidence.len(), degraded = report.degraded.len(), "matched criteria");
        report
    }

    async fn query_one(&self, criterion: &Criterion, index: &dyn SimilarityIndex) -> Result<EvidenceMap> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let hits = tokio::time::timeout(self.timeout, index.query(&criterion.text, self.top_k))
            .await
            .map_err(|_| Error::Timeout(timeout_ms))??;
        let mut partial = EvidenceMap::new();
        let accepted = fold_candidates(&mut partial, criterion.index, &hits, self.min_relevance);
        debug!(criterion = criterion.index, hits = hits.len(), accepted, "criterion queried");
        Ok(partial)
    }
}

/// Record `criterion` for the owner of every candidate scoring at least
/// `min_relevance`. Rank does not matter, only the score. Returns the number
/// of accepted candidates.
pub fn fold_candidates(evidence: &mut EvidenceMap, criterion: CriterionIndex, candidates: &[CandidateMatch], min_relevance: f32) -> usize {
    let mut accepted = 0;
    for c in candidates.iter().filter(|c| c.score >= min_relevance) {
        evidence.record(c.fragment.owner().clone(), criterion);
        accepted += 1;
    }
    accepted
}
