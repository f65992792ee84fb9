// src/config/mod.rs

//! Pipeline file loading and validation for reprodag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a pipeline file and turn it into a [`Pipeline`](crate::pipeline::Pipeline) (`loader.rs`).
//! - Validate per-entry invariants and parse durations (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{LoadedPipeline, default_config_path, load_and_validate, load_pipeline};
pub use model::{ConfigSection, PipelineFile, RawPipelineFile, TargetConfig};
pub use validate::parse_duration;
