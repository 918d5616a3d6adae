//! # tally-engine
//! Slot pipeline, turn runner and report sinks.

pub mod config;
pub mod pipeline;
pub mod sink;

pub use config::EngineConfig;
pub use pipeline::{Engine, RunSummary, SlotState};
pub use sink::{JsonLinesSink, LogSink};
