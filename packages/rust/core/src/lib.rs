//! Question-answering pipeline for kbanswer.
//!
//! Ties the search API, the lookup table, the local document store and the
//! language model into one flow: identify → retrieve → synthesize → route.

pub mod graph;
pub mod identify;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod route;
pub mod state;
pub mod synthesize;

pub use pipeline::{Pipeline, PipelineConfig, ProgressReporter, SilentProgress};
pub use state::{PipelineState, Route};
