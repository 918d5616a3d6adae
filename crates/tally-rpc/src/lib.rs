//! Block source backed by a validator's JSON-RPC endpoint.
//!
//! [`RpcBlockSource`] issues `getBlock` with full `jsonParsed` transactions
//! and rewards, retries slots the node does not have yet, and decodes the
//! result into a [`tally_core::Block`].

pub mod client;
pub mod parse;

pub use client::{RpcBlockSource, RpcConfig};
pub use parse::parse_block;
