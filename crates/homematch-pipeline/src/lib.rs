//! homematch-pipeline
//!
//! Criteria matching and the end-to-end personalization run built on the
//! collaborator traits in `homematch-core`.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod cancel;
pub mod matcher;
pub mod pipeline;

pub use cancel::Cancellation;
pub use matcher::{fold_candidates, CriteriaMatcher, DegradedCriterion, MatchReport};
pub use pipeline::{Evaluation, Pipeline, RunReport};
