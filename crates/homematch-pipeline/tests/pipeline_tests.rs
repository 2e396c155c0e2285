mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{hit, listing, narrative, CountingStore, ScriptedGenerator, ScriptedIndex, VecLoader};
use homematch_core::config::{IndexBackend, Settings, DEFAULT_FALLBACK_MESSAGE};
use homematch_core::error::Error;
use homematch_core::traits::{IndexOrigin, IndexStore, SimilarityIndex};
use homematch_core::types::{Criteria, ListingId, NarrativeSource};
use homematch_core::Stage;
use homematch_pipeline::{Cancellation, Pipeline};

const STATEMENTS: [&str; 5] = [
    "A comfortable three-bedroom house.",
    "A quiet neighborhood with good schools.",
    "A backyard for gardening.",
    "Easy access to a bus line.",
    "A balance of suburban and urban amenities.",
];

fn corpus() -> Vec<homematch_core::types::Listing> {
    vec![listing("A", "body of A"), listing("B", "body of B"), listing("C", "body of C")]
}

/// A matches {0,1,2}, B matches {0,3}, C matches {1,3,4}; several hits land
/// on different fragments of the same listing.
fn scenario_index() -> ScriptedIndex {
    ScriptedIndex::new()
        .hits(STATEMENTS[0], vec![hit("A", 0, 0.9), hit("A", 1, 0.8), hit("B", 0, 0.5)])
        .hits(STATEMENTS[1], vec![hit("C", 0, 0.7), hit("A", 2, 0.6)])
        .hits(STATEMENTS[2], vec![hit("A", 0, 0.4), hit("C", 1, 0.05)])
        .hits(STATEMENTS[3], vec![hit("B", 1, 0.3), hit("C", 0, 0.3)])
        .hits(STATEMENTS[4], vec![hit("C", 2, 0.2)])
}

fn settings() -> Settings {
    let mut s = Settings::default();
    s.index.backend = IndexBackend::Memory;
    s.matching.min_matches = 3;
    s.personalize.max_retries = 0;
    s.personalize.timeout_secs = 1;
    s
}

fn pipeline(store: Arc<dyn IndexStore>, generator: ScriptedGenerator) -> Pipeline {
    Pipeline::new(settings(), Arc::new(VecLoader(corpus())), store).with_generator(Arc::new(generator))
}

fn criteria() -> Criteria { Criteria::new(STATEMENTS).unwrap() }

fn set(items: &[usize]) -> BTreeSet<usize> { items.iter().copied().collect() }

#[tokio::test]
async fn five_criteria_three_listings_keeps_corroborated_ones() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let p = Pipeline::new(settings(), Arc::new(VecLoader(corpus())), store);
    let eval = p.evaluate(&criteria(), &Cancellation::new()).await.unwrap();

    assert_eq!(eval.origin, IndexOrigin::Built);
    let kept: BTreeSet<&str> = eval.filtered.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(kept, ["A", "C"].into_iter().collect());
    assert_eq!(eval.filtered.evidence().get(&ListingId::from("A")), Some(&set(&[0, 1, 2])));
    assert_eq!(eval.filtered.evidence().get(&ListingId::from("C")), Some(&set(&[1, 3, 4])));
}

#[tokio::test]
async fn run_produces_records_with_matched_statements_in_order() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let records = pipeline(store, ScriptedGenerator::new()).run(&criteria(), &Cancellation::new()).await.unwrap();

    assert_eq!(records.len(), 2);
    let a = &records[&ListingId::from("A")];
    assert_eq!(a.record_uuid.as_str(), "A");
    assert_eq!(a.filtered_answers, STATEMENTS[..3].iter().map(|s| s.to_string()).collect::<Vec<_>>());
    assert_eq!(a.description, narrative("body of A", &a.filtered_answers));
    assert_eq!(a.source, NarrativeSource::Generated);
    let c = &records[&ListingId::from("C")];
    assert_eq!(c.filtered_answers, vec![STATEMENTS[1].to_string(), STATEMENTS[3].to_string(), STATEMENTS[4].to_string()]);
}

#[tokio::test]
async fn empty_generation_falls_back_for_that_listing_only() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let generator = ScriptedGenerator::new().empty_for("body of C");
    let records = pipeline(store, generator).run(&criteria(), &Cancellation::new()).await.unwrap();

    let c = &records[&ListingId::from("C")];
    assert_eq!(c.description, DEFAULT_FALLBACK_MESSAGE);
    assert!(c.is_fallback());
    let a = &records[&ListingId::from("A")];
    assert!(!a.is_fallback());
    assert_eq!(a.description, narrative("body of A", &a.filtered_answers));
}

#[tokio::test]
async fn generator_error_falls_back_with_reason() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let generator = ScriptedGenerator::new().failing_for("body of A");
    let records = pipeline(store, generator).run(&criteria(), &Cancellation::new()).await.unwrap();

    match &records[&ListingId::from("A")].source {
        NarrativeSource::Fallback { reason } => assert!(reason.contains("model overloaded")),
        other => panic!("expected fallback, got {other:?}"),
    }
    assert!(!records[&ListingId::from("C")].is_fallback());
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out_into_fallback() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let generator = ScriptedGenerator::new().hanging_for("body of A");
    let records = pipeline(store, generator).run(&criteria(), &Cancellation::new()).await.unwrap();

    let a = &records[&ListingId::from("A")];
    assert_eq!(a.description, DEFAULT_FALLBACK_MESSAGE);
    assert!(matches!(&a.source, NarrativeSource::Fallback { reason } if reason.contains("timed out")));
    assert!(!records[&ListingId::from("C")].is_fallback());
}

#[tokio::test]
async fn second_run_reuses_the_persisted_index() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let p = pipeline(Arc::clone(&store) as Arc<dyn IndexStore>, ScriptedGenerator::new());

    let first = p.run_detailed(&criteria(), &Cancellation::new()).await.unwrap();
    assert_eq!(first.origin, IndexOrigin::Built);
    assert_eq!(store.builds(), 1);

    let second = p.run_detailed(&criteria(), &Cancellation::new()).await.unwrap();
    assert_eq!(second.origin, IndexOrigin::Loaded);
    assert_eq!(store.builds(), 1, "build must not run again");
    assert_eq!(first.records, second.records);
}

#[tokio::test]
async fn rebuild_flag_skips_reuse() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let mut s = settings();
    s.index.rebuild = true;
    let p = Pipeline::new(s, Arc::new(VecLoader(corpus())), Arc::clone(&store) as Arc<dyn IndexStore>);
    p.index(&Cancellation::new()).await.unwrap();
    let handle = p.index(&Cancellation::new()).await.unwrap();
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(store.builds(), 2);
    assert_eq!(store.opens(), 0);
}

#[tokio::test]
async fn changed_corpus_is_rebuilt() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let first = Pipeline::new(settings(), Arc::new(VecLoader(corpus())), Arc::clone(&store) as Arc<dyn IndexStore>);
    first.index(&Cancellation::new()).await.unwrap();

    let mut listings = corpus();
    listings[1].body = "body of B, renovated".into();
    let second = Pipeline::new(settings(), Arc::new(VecLoader(listings)), Arc::clone(&store) as Arc<dyn IndexStore>);
    let handle = second.index(&Cancellation::new()).await.unwrap();
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(store.builds(), 2);
}

#[tokio::test]
async fn duplicate_listing_ids_abort_at_load() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let loader = VecLoader(vec![listing("A", "one"), listing("B", "two"), listing("A", "three")]);
    let p = Pipeline::new(settings(), Arc::new(loader), Arc::clone(&store) as Arc<dyn IndexStore>)
        .with_generator(Arc::new(ScriptedGenerator::new()));
    let err = p.run(&criteria(), &Cancellation::new()).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Load));
    match err {
        Error::Stage { source, .. } => assert!(matches!(*source, Error::Validation { .. })),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.builds(), 0);
}

#[tokio::test]
async fn index_failure_is_fatal_and_tagged() {
    let mut store = CountingStore::new(Arc::new(scenario_index()));
    store.fail_build = true;
    let p = pipeline(Arc::new(store), ScriptedGenerator::new());
    let err = p.run(&criteria(), &Cancellation::new()).await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Index));
    assert!(err.to_string().contains("Similarity index unavailable"));
}

#[tokio::test]
async fn cancelled_run_stops_before_loading() {
    let index = Arc::new(scenario_index());
    let store = Arc::new(CountingStore::new(Arc::clone(&index) as Arc<dyn SimilarityIndex>));
    let generator = Arc::new(ScriptedGenerator::new());
    let p = Pipeline::new(settings(), Arc::new(VecLoader(corpus())), Arc::clone(&store) as Arc<dyn IndexStore>)
        .with_generator(Arc::clone(&generator) as Arc<dyn homematch_core::traits::PersonalizationGenerator>);
    let cancel = Cancellation::new();
    cancel.cancel();

    let err = p.run(&criteria(), &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled { stage: Stage::Load }));
    assert_eq!(store.builds(), 0);
    assert!(generator.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn run_without_generator_is_a_config_error() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let p = Pipeline::new(settings(), Arc::new(VecLoader(corpus())), store);
    assert!(matches!(p.run(&criteria(), &Cancellation::new()).await, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn min_matches_zero_keeps_every_matched_listing() {
    let store = Arc::new(CountingStore::new(Arc::new(scenario_index())));
    let mut s = settings();
    s.matching.min_matches = 0;
    let p = Pipeline::new(s, Arc::new(VecLoader(corpus())), store);
    let eval = p.evaluate(&criteria(), &Cancellation::new()).await.unwrap();
    assert_eq!(eval.filtered.len(), 3);
}

/// Rate limited twice, then answers; retries go through the same policy the
/// HTTP clients use.
struct RateLimitedGenerator {
    calls: std::sync::atomic::AtomicU32,
    retry: homematch_core::policy::RetryPolicy,
}

#[async_trait::async_trait]
impl homematch_core::traits::PersonalizationGenerator for RateLimitedGenerator {
    async fn personalize(&self, listing_body: &str, _matched: &[String]) -> homematch_core::Result<Option<String>> {
        self.retry
            .run("chat completion", || async {
                let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n < 2 { Err(Error::RateLimited { retry_after_ms: 5_000 }) } else { Ok(Some(format!("third try: {listing_body}"))) }
            })
            .await
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limit_backoff_fits_inside_the_listing_budget() {
    let index = ScriptedIndex::new().hits(STATEMENTS[0], vec![hit("A", 0, 0.9)]);
    let mut s = settings();
    s.matching.min_matches = 1;
    s.personalize.max_retries = 2;
    s.personalize.timeout_secs = 1;
    let generator = Arc::new(RateLimitedGenerator {
        calls: std::sync::atomic::AtomicU32::new(0),
        retry: homematch_core::policy::RetryPolicy::with_retries(s.personalize.max_retries),
    });
    let p = Pipeline::new(s, Arc::new(VecLoader(corpus())), Arc::new(CountingStore::new(Arc::new(index))))
        .with_generator(Arc::clone(&generator) as Arc<dyn homematch_core::traits::PersonalizationGenerator>);

    let records = p.run(&criteria(), &Cancellation::new()).await.unwrap();
    let a = &records[&ListingId::from("A")];
    assert_eq!(a.source, NarrativeSource::Generated, "{a:?}");
    assert_eq!(a.description, "third try: body of A");
    assert_eq!(generator.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}
