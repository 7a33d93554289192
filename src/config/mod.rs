// src/config/mod.rs

//! Pipeline file handling.
//!
//! - [`model`] holds the serde types for `Pipedag.toml` and turns a
//!   validated file into a graph, weights and a [`RunConfig`](crate::types::RunConfig).
//! - [`loader`] reads and deserializes the file.
//! - [`validate`] performs the semantic checks behind
//!   `TryFrom<RawPipelineFile> for PipelineFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{parse_duration, ConfigSection, PipelineFile, RawPipelineFile, TaskConfig};
