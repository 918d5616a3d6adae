//! # tally-core
//! Types, transaction classification, and reward aggregation for bundle
//! tallies.

pub mod aggregate;
pub mod classifier;
pub mod constants;
pub mod error;
pub mod report;
pub mod traits;
pub mod types;

pub use aggregate::aggregate;
pub use classifier::{classify, Classification};
pub use report::{BlockReport, BlockTotals, FailedSlot, SlotOutcome, TurnReport};
pub use types::{AttributionResult, AttributionSet, Block, BundleId, Transaction};
