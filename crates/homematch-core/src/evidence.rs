//! Listing-level evidence accumulated across criteria, and the corroboration
//! filter applied to it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::types::{CriterionIndex, ListingId};

/// Listing id -> set of criterion indices that matched at least one of its
/// fragments.
///
/// Grows only: `record` and `merge` add entries, nothing removes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceMap {
    entries: HashMap<ListingId, BTreeSet<CriterionIndex>>,
}

impl EvidenceMap {
    pub fn new() -> Self { Self::default() }

    /// Add `criterion` to `listing`'s set. Returns `false` when it was already
    /// present, which is the normal case for a second fragment of the same
    /// listing.
    pub fn record(&mut self, listing: ListingId, criterion: CriterionIndex) -> bool {
        self.entries.entry(listing).or_default().insert(criterion)
    }

    /// Set union with `other`, listing by listing.
    pub fn merge(&mut self, other: EvidenceMap) {
        for (listing, criteria) in other.entries {
            self.entries.entry(listing).or_default().extend(criteria);
        }
    }

    pub fn get(&self, listing: &ListingId) -> Option<&BTreeSet<CriterionIndex>> { self.entries.get(listing) }
    pub fn contains(&self, listing: &ListingId) -> bool { self.entries.contains_key(listing) }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Iteration order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (&ListingId, &BTreeSet<CriterionIndex>)> { self.entries.iter() }

    pub fn listing_ids(&self) -> BTreeSet<&ListingId> { self.entries.keys().collect() }
}

impl FromIterator<(ListingId, BTreeSet<CriterionIndex>)> for EvidenceMap {
    fn from_iter<T: IntoIterator<Item = (ListingId, BTreeSet<CriterionIndex>)>>(iter: T) -> Self {
        let mut map = EvidenceMap::new();
        for (listing, criteria) in iter {
            map.entries.entry(listing).or_default().extend(criteria);
        }
        map
    }
}

impl IntoIterator for EvidenceMap {
    type Item = (ListingId, BTreeSet<CriterionIndex>);
    type IntoIter = std::collections::hash_map::IntoIter<ListingId, BTreeSet<CriterionIndex>>;
    fn into_iter(self) -> Self::IntoIter { self.entries.into_iter() }
}

/// Evidence restricted to listings corroborated by at least `min_matches`
/// distinct criteria. Keeps the full index sets, not just counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilteredResult {
    min_matches: usize,
    evidence: EvidenceMap,
}

impl FilteredResult {
    pub fn min_matches(&self) -> usize { self.min_matches }
    pub fn evidence(&self) -> &EvidenceMap { &self.evidence }
    pub fn into_evidence(self) -> EvidenceMap { self.evidence }
    pub fn len(&self) -> usize { self.evidence.len() }
    pub fn is_empty(&self) -> bool { self.evidence.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = (&ListingId, &BTreeSet<CriterionIndex>)> { self.evidence.iter() }
}

/// `{ k -> v in evidence : |v| >= min_matches }`.
///
/// `min_matches == 0` keeps every entry; a threshold above the criterion
/// count keeps none.
pub fn filter_evidence(evidence: EvidenceMap, min_matches: usize) -> FilteredResult {
    let kept = evidence
        .entries
        .into_iter()
        .filter(|(_, criteria)| criteria.len() >= min_matches)
        .collect();
    FilteredResult { min_matches, evidence: EvidenceMap { entries: kept } }
}
