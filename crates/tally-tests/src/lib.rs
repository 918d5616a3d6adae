//! End-to-end test suite for tally.
//!
//! Drives the engine against scripted block sources and attribution services
//! and checks the reports and the request pacing they produce.

pub mod helpers;
