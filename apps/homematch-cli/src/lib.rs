//! Command-line front end for HomeMatch.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod app;
pub mod args;

pub use args::{Cli, Commands, CorpusArgs, MatchArgs, RunArgs};
