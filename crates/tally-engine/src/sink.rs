//! Report sinks.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::DateTime;
use serde::Serialize;
use tracing::info;

use tally_core::constants::LAMPORTS_PER_SOL;
use tally_core::error::SinkError;
use tally_core::report::{BlockReport, TurnReport};
use tally_core::traits::ReportSink;

/// Lamports as a decimal SOL string.
pub fn format_sol(lamports: i64) -> String {
    let sign = if lamports < 0 { "-" } else { "" };
    let abs = lamports.unsigned_abs();
    format!("{sign}{}.{:09}", abs / LAMPORTS_PER_SOL, abs % LAMPORTS_PER_SOL)
}

/// Block time as RFC 3339, or `unknown`.
pub fn format_block_time(block_time: Option<i64>) -> String {
    block_time
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Emits reports as `tracing` events.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn write_block(&mut self, r: &BlockReport) -> Result<(), SinkError> {
        info!(
            slot = r.slot,
            epoch = r.epoch,
            block_time = %format_block_time(r.block_time),
            txns = r.total_txns,
            non_vote_txns = r.non_vote_txns,
            block_reward = %format_sol(r.block_reward_lamports),
            non_vote_reward = %format_sol(r.non_vote_reward_lamports),
            bundles = r.bundle_count,
            bundle_txns = r.attributed_txn_count,
            net_bundle_fee = %format_sol(r.net_bundle_fee_lamports),
            attribution_errors = r.attribution_errors,
            "block report"
        );
        Ok(())
    }

    fn write_turn(&mut self, turn: &TurnReport) -> Result<(), SinkError> {
        let t = &turn.totals;
        info!(
            turn = %turn.label,
            slots = ?turn.slots(),
            blocks = t.blocks,
            failed = turn.failed.len(),
            block_reward = %format_sol(t.block_reward_lamports),
            non_vote_reward = %format_sol(t.non_vote_reward_lamports),
            bundles = t.bundle_count,
            bundle_txns = t.attributed_txn_count,
            net_bundle_fee = %format_sol(t.net_bundle_fee_lamports),
            "turn report"
        );
        Ok(())
    }
}

/// One JSON record per line.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Block(&'a BlockReport),
    Turn(&'a TurnReport),
}

/// Writes reports as JSON lines to any writer.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &Record<'_>) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Create (or truncate) `path`.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn write_block(&mut self, report: &BlockReport) -> Result<(), SinkError> {
        self.write_record(&Record::Block(report))
    }

    fn write_turn(&mut self, turn: &TurnReport) -> Result<(), SinkError> {
        self.write_record(&Record::Turn(turn))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}
