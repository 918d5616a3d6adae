//! # tally-attribution
//! Rate-limited bundle attribution.
//!
//! - [`budget::RateBudget`] — shared fixed-window request budget
//! - [`client::AttributionClient`] — single lookup with throttle retry
//! - [`coordinator::Coordinator`] — batch fan-out gated by the budget
//! - [`http::HttpTransport`] — reqwest transport for the bundle explorer API

pub mod budget;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod http;

pub use budget::RateBudget;
pub use client::{AttributionClient, Lookup};
pub use config::AttributionConfig;
pub use coordinator::{Coordinator, Progress};
pub use http::HttpTransport;
