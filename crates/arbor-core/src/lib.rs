//! Configuration, bootstrap and the end-to-end digest pipeline.

pub mod bootstrap;
pub mod config;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{BuildOutcome, Pipeline};
