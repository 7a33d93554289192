// src/engine/mod.rs

//! Orchestration engine.
//!
//! The pure scheduling state machine lives in [`crate::dag::Scheduler`];
//! the async shell that launches executors, waits for settlements, applies
//! progress reports and emits events is [`Orchestrator`].

pub mod orchestrator;

pub use orchestrator::Orchestrator;
