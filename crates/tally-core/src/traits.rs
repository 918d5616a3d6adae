//! Trait interfaces for the tally's external collaborators.
//!
//! - [`BlockSource`] — block data by slot (tally-rpc implements)
//! - [`AttributionTransport`] — raw bundle lookups (tally-attribution implements)
//! - [`ReportSink`] — write-once destination for reports (tally-engine implements)

use async_trait::async_trait;

use crate::error::{BlockSourceError, SinkError};
use crate::report::{BlockReport, TurnReport};
use crate::types::Block;

/// Source of produced blocks.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Fetch the block produced in `slot`.
    ///
    /// Implementations decide how many attempts to make; an `Err` returned
    /// here is final for the slot.
    async fn fetch_block(&self, slot: u64) -> Result<Block, BlockSourceError>;
}

/// Status and body of one attribution-service response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// One request to the bundle attribution service.
///
/// Interprets nothing: status classification and retries belong to the
/// caller. `Err` means no response was received (connect failure, timeout,
/// body read error).
#[async_trait]
pub trait AttributionTransport: Send + Sync {
    async fn get_bundles(&self, signature: &str) -> Result<HttpReply, String>;
}

/// Destination for finished reports. Reports are never read back.
pub trait ReportSink: Send {
    fn write_block(&mut self, report: &BlockReport) -> Result<(), SinkError>;

    fn write_turn(&mut self, turn: &TurnReport) -> Result<(), SinkError>;

    /// Flush buffered output. Default implementation does nothing.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
