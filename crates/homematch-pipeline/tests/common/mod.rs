#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use homematch_core::error::{Error, Result};
use homematch_core::traits::{CorpusLoader, IndexStore, PersonalizationGenerator, SimilarityIndex};
use homematch_core::types::{CandidateMatch, Fragment, FragmentId, Listing, ListingAttributes, ListingId};

pub fn listing(id: &str, body: &str) -> Listing {
    Listing { id: ListingId::from(id), body: body.to_string(), attributes: ListingAttributes::default() }
}

pub fn hit(listing: &str, chunk: usize, score: f32) -> CandidateMatch {
    CandidateMatch { fragment: FragmentId::new(ListingId::from(listing), chunk), score }
}

pub struct VecLoader(pub Vec<Listing>);

impl CorpusLoader for VecLoader {
    fn load(&self) -> Result<Vec<Listing>> { Ok(self.0.clone()) }
}

enum Reply {
    Hits(Vec<CandidateMatch>),
    Fail(String),
    Hang,
}

/// Index answering from a fixed statement -> reply table. Unknown
/// statements get no hits.
#[derive(Default)]
pub struct ScriptedIndex {
    replies: HashMap<String, Reply>,
    pub queries: AtomicUsize,
}

impl ScriptedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn hits(mut self, statement: &str, hits: Vec<CandidateMatch>) -> Self {
        self.replies.insert(statement.to_string(), Reply::Hits(hits));
        self
    }

    pub fn failing(mut self, statement: &str, reason: &str) -> Self {
        self.replies.insert(statement.to_string(), Reply::Fail(reason.to_string()));
        self
    }

    pub fn hanging(mut self, statement: &str) -> Self {
        self.replies.insert(statement.to_string(), Reply::Hang);
        self
    }
}

#[async_trait]
impl SimilarityIndex for ScriptedIndex {
    async fn query(&self, statement: &str, top_k: usize) -> Result<Vec<CandidateMatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(statement) {
            Some(Reply::Hits(h)) => Ok(h.iter().take(top_k).cloned().collect()),
            Some(Reply::Fail(reason)) => Err(Error::Query(reason.clone())),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn fragment_count(&self) -> Result<usize> { Ok(0) }
}

/// Store that hands out one fixed index and remembers which fingerprints
/// were built, counting calls.
pub struct CountingStore {
    index: Arc<dyn SimilarityIndex>,
    persisted: Mutex<HashSet<String>>,
    pub opens: AtomicUsize,
    pub builds: AtomicUsize,
    pub fail_build: bool,
}

impl CountingStore {
    pub fn new(index: Arc<dyn SimilarityIndex>) -> Self {
        Self { index, persisted: Mutex::new(HashSet::new()), opens: AtomicUsize::new(0), builds: AtomicUsize::new(0), fail_build: false }
    }

    pub fn builds(&self) -> usize { self.builds.load(Ordering::SeqCst) }
    pub fn opens(&self) -> usize { self.opens.load(Ordering::SeqCst) }
}

#[async_trait]
impl IndexStore for CountingStore {
    async fn open(&self, fingerprint: &str) -> Result<Option<Arc<dyn SimilarityIndex>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let known = self.persisted.lock().unwrap().contains(fingerprint);
        Ok(known.then(|| Arc::clone(&self.index)))
    }

    async fn build(&self, _fragments: &[Fragment], fingerprint: &str) -> Result<Arc<dyn SimilarityIndex>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_build {
            return Err(Error::IndexUnavailable("disk full".into()));
        }
        self.persisted.lock().unwrap().insert(fingerprint.to_string());
        Ok(Arc::clone(&self.index))
    }
}

/// Generator keyed by listing body. Bodies without a script get a narrative
/// echoing the statements.
#[derive(Default)]
pub struct ScriptedGenerator {
    empty_for: HashSet<String>,
    failing_for: HashSet<String>,
    hanging_for: HashSet<String>,
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self { Self::default() }

    pub fn empty_for(mut self, body: &str) -> Self {
        self.empty_for.insert(body.to_string());
        self
    }

    pub fn failing_for(mut self, body: &str) -> Self {
        self.failing_for.insert(body.to_string());
        self
    }

    pub fn hanging_for(mut self, body: &str) -> Self {
        self.hanging_for.insert(body.to_string());
        self
    }
}

pub fn narrative(body: &str, criteria: &[String]) -> String { format!("{body} | {}", criteria.join("; ")) }

#[async_trait]
impl PersonalizationGenerator for ScriptedGenerator {
    async fn personalize(&self, listing_body: &str, matched_criteria: &[String]) -> Result<Option<String>> {
        self.calls.lock().unwrap().push((listing_body.to_string(), matched_criteria.to_vec()));
        if self.empty_for.contains(listing_body) {
            return Ok(Some(String::new()));
        }
        if self.failing_for.contains(listing_body) {
            return Err(Error::Generation("model overloaded".into()));
        }
        if self.hanging_for.contains(listing_body) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(Some(narrative(listing_body, matched_criteria)))
    }
}
