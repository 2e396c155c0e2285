#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! Domain types, collaborator traits, corpus loading and configuration shared
//! by every HomeMatch crate.

pub mod config;
pub mod corpus;
pub mod data_processor;
pub mod error;
pub mod evidence;
pub mod policy;
pub mod traits;
pub mod types;

pub use error::{Error, Result, Stage};
