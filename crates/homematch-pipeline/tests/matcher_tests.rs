mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::{hit, ScriptedIndex};
use homematch_core::types::{Criteria, ListingId};
use homematch_pipeline::CriteriaMatcher;

fn set(items: &[usize]) -> BTreeSet<usize> { items.iter().copied().collect() }

#[tokio::test]
async fn evidence_is_per_listing_not_per_fragment() {
    let criteria = Criteria::new(["quiet street"]).unwrap();
    let index = ScriptedIndex::new().hits("quiet street", vec![hit("A", 0, 0.9), hit("A", 1, 0.85), hit("A", 2, 0.6)]);
    let report = CriteriaMatcher::new(5, 0.1).match_criteria(&criteria, &index).await;
    assert_eq!(report.evidence.len(), 1);
    assert_eq!(report.evidence.get(&ListingId::from("A")), Some(&set(&[0])));
}

#[tokio::test]
async fn low_relevance_is_excluded_even_when_ranked_first() {
    let criteria = Criteria::new(["bike paths"]).unwrap();
    let index = ScriptedIndex::new().hits("bike paths", vec![hit("A", 0, 0.05)]);
    let report = CriteriaMatcher::new(5, 0.1).match_criteria(&criteria, &index).await;
    assert!(report.evidence.is_empty());
    assert!(report.degraded.is_empty(), "zero accepted candidates is not a failure");
}

#[tokio::test]
async fn top_k_bounds_the_candidates_considered() {
    let criteria = Criteria::new(["garage"]).unwrap();
    let index = ScriptedIndex::new().hits("garage", vec![hit("A", 0, 0.9), hit("B", 0, 0.8), hit("C", 0, 0.7)]);
    let report = CriteriaMatcher::new(2, 0.1).match_criteria(&criteria, &index).await;
    assert!(report.evidence.contains(&ListingId::from("A")));
    assert!(report.evidence.contains(&ListingId::from("B")));
    assert!(!report.evidence.contains(&ListingId::from("C")));
}

#[tokio::test]
async fn repeated_runs_agree() {
    let criteria = Criteria::new(["s0", "s1", "s2"]).unwrap();
    let index = ScriptedIndex::new()
        .hits("s0", vec![hit("A", 0, 0.9), hit("B", 0, 0.4)])
        .hits("s1", vec![hit("B", 1, 0.7)])
        .hits("s2", vec![hit("C", 0, 0.3), hit("A", 1, 0.2)]);
    let matcher = CriteriaMatcher::new(5, 0.1).with_concurrency(3);
    let first = matcher.match_criteria(&criteria, &index).await;
    let second = matcher.match_criteria(&criteria, &index).await;
    assert_eq!(first, second);
    assert_eq!(first.evidence.get(&ListingId::from("A")), Some(&set(&[0, 2])));
}

#[tokio::test]
async fn failed_query_degrades_only_its_criterion() {
    let criteria = Criteria::new(["ok", "broken"]).unwrap();
    let index = ScriptedIndex::new().hits("ok", vec![hit("A", 0, 0.9)]).failing("broken", "connection reset");
    let report = CriteriaMatcher::new(5, 0.1).match_criteria(&criteria, &index).await;
    assert_eq!(report.evidence.get(&ListingId::from("A")), Some(&set(&[0])));
    assert_eq!(report.degraded.len(), 1);
    assert_eq!(report.degraded[0].index, 1);
    assert_eq!(report.degraded[0].text, "broken");
    assert!(report.degraded[0].reason.contains("connection reset"));
}

#[tokio::test(start_paused = true)]
async fn slow_query_times_out_as_degraded() {
    let criteria = Criteria::new(["fast", "slow"]).unwrap();
    let index = ScriptedIndex::new().hits("fast", vec![hit("A", 0, 0.9)]).hanging("slow");
    let report = CriteriaMatcher::new(5, 0.1).with_timeout(Duration::from_secs(2)).match_criteria(&criteria, &index).await;
    assert!(report.evidence.contains(&ListingId::from("A")));
    assert_eq!(report.degraded.len(), 1);
    assert_eq!(report.degraded[0].index, 1);
    assert!(report.degraded[0].reason.contains("2000 ms"));
}
