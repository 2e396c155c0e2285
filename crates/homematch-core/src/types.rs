//! Domain types used by the matcher, the index and the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// Opaque listing identifier (usually a UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(String);

impl ListingId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ListingId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// Structured listing fields. Only used for rendering, never for matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_us_dollars: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size_acres: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_size_sq_ft: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedroom_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathroom_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_description: Option<String>,
}

/// One catalog entry: identifier, full text body and optional attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub body: String,
    #[serde(default)]
    pub attributes: ListingAttributes,
}

/// Zero-based position of a criterion within the run's ordered statements.
pub type CriterionIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub index: CriterionIndex,
    pub text: String,
}

/// Ordered, fixed set of preference statements for one run.
///
/// Indices are always contiguous `0..len()`; construction rejects blank
/// statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    items: Vec<Criterion>,
}

impl Criteria {
    pub fn new<I, S>(statements: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items = Vec::new();
        for (index, text) in statements.into_iter().enumerate() {
            let text: String = text.into();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(Error::Validation { position: index, id: None, reason: "blank criterion statement".into() });
            }
            items.push(Criterion { index, text: trimmed.to_string() });
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, Criterion> { self.items.iter() }
    pub fn get(&self, index: CriterionIndex) -> Option<&Criterion> { self.items.get(index) }

    /// Statement texts for `indices`, in ascending criterion order.
    /// Indices outside `0..len()` are skipped.
    pub fn texts_for(&self, indices: &BTreeSet<CriterionIndex>) -> Vec<String> {
        indices.iter().filter_map(|&i| self.get(i)).map(|c| c.text.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a Criteria {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;
    fn into_iter(self) -> Self::IntoIter { self.items.iter() }
}

/// Identity of one indexed fragment: its owning listing plus ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId {
    pub listing_id: ListingId,
    pub chunk_index: usize,
}

impl FragmentId {
    pub fn new(listing_id: ListingId, chunk_index: usize) -> Self { Self { listing_id, chunk_index } }

    /// The listing this fragment was cut from.
    pub fn owner(&self) -> &ListingId { &self.listing_id }

    /// Stable string key, `"<listing>:<ordinal>"`.
    pub fn key(&self) -> String { format!("{}:{}", self.listing_id, self.chunk_index) }
}

/// A sub-portion of a listing body that is independently indexed.
///
/// - `id`: owning listing plus position
/// - `content`: the text payload of the fragment
/// - `total_chunks`: number of fragments cut from the parent listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub content: String,
    pub total_chunks: usize,
}

/// One index hit for a criterion query. `score` is a relevance where higher
/// is more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub fragment: FragmentId,
    pub score: f32,
}

/// Whether a narrative came from the generator or is the fallback text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeSource {
    Generated,
    Fallback { reason: String },
}

/// Final per-listing output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationRecord {
    pub record_uuid: ListingId,
    pub filtered_answers: Vec<String>,
    pub description: String,
    pub source: NarrativeSource,
}

impl PersonalizationRecord {
    pub fn is_fallback(&self) -> bool { matches!(self.source, NarrativeSource::Fallback { .. }) }
}
