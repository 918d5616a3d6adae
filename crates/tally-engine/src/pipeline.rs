//! Per-slot processing and turn folding.
//!
//! Each slot moves through
//! `Pending -> Fetching -> Classifying -> Attributing -> Aggregated`, or from
//! `Fetching` straight to `Failed` when the block source gives up. Slots are
//! processed one after another in the order given; the concurrency lives
//! inside each slot's attribution batch.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use tally_attribution::Coordinator;
use tally_core::aggregate;
use tally_core::classifier::split_votes;
use tally_core::error::TallyError;
use tally_core::report::{BlockTotals, FailedSlot, SlotOutcome, TurnReport};
use tally_core::traits::{AttributionTransport, BlockSource, ReportSink};

use crate::config::EngineConfig;

/// Processing state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    Fetching,
    Classifying,
    Attributing,
    Aggregated,
    Failed,
}

impl SlotState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Aggregated | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: SlotState) -> bool {
        use SlotState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Classifying)
                | (Fetching, Failed)
                | (Classifying, Attributing)
                | (Attributing, Aggregated)
        )
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Classifying => "classifying",
            Self::Attributing => "attributing",
            Self::Aggregated => "aggregated",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State tracker for a slot in flight.
#[derive(Debug)]
struct SlotRun {
    slot: u64,
    state: SlotState,
}

impl SlotRun {
    fn new(slot: u64) -> Self {
        Self { slot, state: SlotState::Pending }
    }

    fn advance(&mut self, next: SlotState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal slot transition {} -> {}",
            self.state,
            next
        );
        debug!(slot = self.slot, from = %self.state, to = %next, "slot state");
        self.state = next;
    }
}

/// Totals across every turn of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub turns: usize,
    pub failed_slots: usize,
    pub totals: BlockTotals,
}

impl RunSummary {
    fn add_turn(&mut self, turn: &TurnReport) {
        self.turns += 1;
        self.failed_slots += turn.failed.len();
        self.totals.merge(&turn.totals);
    }
}

/// Drives slots from the block source through attribution to reports.
pub struct Engine {
    source: Arc<dyn BlockSource>,
    coordinator: Coordinator,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        source: Arc<dyn BlockSource>,
        transport: Arc<dyn AttributionTransport>,
        config: EngineConfig,
    ) -> Self {
        let coordinator = Coordinator::new(transport, config.attribution.clone());
        Self { source, coordinator, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tally a single slot. Never fails: a slot whose block cannot be
    /// fetched comes back as [`SlotOutcome::Failed`].
    pub async fn process_slot(&self, slot: u64) -> SlotOutcome {
        let mut run = SlotRun::new(slot);

        run.advance(SlotState::Fetching);
        let block = match self.source.fetch_block(slot).await {
            Ok(block) => block,
            Err(e) => {
                run.advance(SlotState::Failed);
                warn!(slot, error = %e, "slot failed");
                return SlotOutcome::Failed(FailedSlot { slot, reason: e.to_string() });
            }
        };

        run.advance(SlotState::Classifying);
        let split = split_votes(&block.transactions);
        debug!(
            slot,
            votes = split.votes.len(),
            non_votes = split.non_votes.len(),
            vote_fee = split.vote_fee_lamports,
            "classified block"
        );

        run.advance(SlotState::Attributing);
        let attributions = self
            .coordinator
            .attribute(split.non_votes, self.config.requests_per_window)
            .await;

        let report = aggregate(&block, &attributions);
        run.advance(SlotState::Aggregated);
        info!(
            slot,
            bundles = report.bundle_count,
            bundle_txns = report.attributed_txn_count,
            net_bundle_fee = report.net_bundle_fee_lamports,
            "slot tallied"
        );
        SlotOutcome::Aggregated(report)
    }

    /// Tally `slots` as one turn.
    pub async fn run_turn(&self, label: impl Into<String>, slots: &[u64]) -> TurnReport {
        let mut outcomes = Vec::with_capacity(slots.len());
        for &slot in slots {
            outcomes.push(self.process_slot(slot).await);
        }
        TurnReport::from_outcomes(label, outcomes)
    }

    /// Tally `slots` in turns of the configured size, writing every block and
    /// turn report to `sink` as it completes.
    ///
    /// Only sink failures abort the run.
    pub async fn run(
        &self,
        slots: &[u64],
        sink: &mut dyn ReportSink,
    ) -> Result<RunSummary, TallyError> {
        let mut summary = RunSummary::default();
        for (index, chunk) in slots.chunks(self.config.effective_turn_size()).enumerate() {
            let turn = self.run_turn(self.config.turn_label(index), chunk).await;
            for block in &turn.blocks {
                sink.write_block(block)?;
            }
            sink.write_turn(&turn)?;
            summary.add_turn(&turn);
        }
        sink.flush()?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tally_core::constants::VOTE_PROGRAM_SUCCESS_LOG;
    use tally_core::error::{BlockSourceError, SinkError};
    use tally_core::report::BlockReport;
    use tally_core::traits::HttpReply;
    use tally_core::types::{Block, Reward, RewardType, Transaction};

    // ------------------------------------------------------------------
    // Mocks
    // ------------------------------------------------------------------

    struct MapSource {
        blocks: HashMap<u64, Block>,
        fetched: Mutex<Vec<u64>>,
    }

    impl MapSource {
        fn new(blocks: Vec<Block>) -> Arc<Self> {
            Arc::new(Self {
                blocks: blocks.into_iter().map(|b| (b.slot, b)).collect(),
                fetched: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl BlockSource for MapSource {
        async fn fetch_block(&self, slot: u64) -> Result<Block, BlockSourceError> {
            self.fetched.lock().push(slot);
            self.blocks.get(&slot).cloned().ok_or(BlockSourceError::Skipped {
                slot,
                message: "no block".into(),
            })
        }
    }

    /// Every signature starting with `b-` belongs to bundle `B`.
    struct PrefixTransport {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AttributionTransport for PrefixTransport {
        async fn get_bundles(&self, signature: &str) -> Result<HttpReply, String> {
            self.calls.lock().push(signature.to_string());
            if signature.starts_with("b-") {
                Ok(HttpReply::new(200, r#"[{"bundle_id":"B"}]"#))
            } else {
                Ok(HttpReply::new(404, ""))
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        blocks: Vec<u64>,
        turns: Vec<String>,
        flushed: bool,
    }

    impl ReportSink for RecordingSink {
        fn write_block(&mut self, report: &BlockReport) -> Result<(), SinkError> {
            self.blocks.push(report.slot);
            Ok(())
        }

        fn write_turn(&mut self, turn: &TurnReport) -> Result<(), SinkError> {
            self.turns.push(turn.label.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<(), SinkError> {
            self.flushed = true;
            Ok(())
        }
    }

    struct BrokenSink;

    impl ReportSink for BrokenSink {
        fn write_block(&mut self, _: &BlockReport) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        }

        fn write_turn(&mut self, _: &TurnReport) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn vote(sig: &str) -> Transaction {
        Transaction::new(vec![sig.into()], 5_000, vec![VOTE_PROGRAM_SUCCESS_LOG.into()])
    }

    fn plain(sig: &str, fee: u64) -> Transaction {
        Transaction::new(vec![sig.into()], fee, vec![])
    }

    fn block(slot: u64, txs: Vec<Transaction>, reward: i64) -> Block {
        Block {
            slot,
            block_time: Some(1_750_000_000),
            transactions: txs,
            rewards: vec![Reward {
                pubkey: "leader".into(),
                lamports: reward,
                post_balance: 0,
                reward_type: Some(RewardType::Fee),
            }],
        }
    }

    fn engine(source: Arc<MapSource>, transport: Arc<PrefixTransport>, turn_size: usize) -> Engine {
        Engine::new(source, transport, EngineConfig { turn_size, ..EngineConfig::default() })
    }

    fn transport() -> Arc<PrefixTransport> {
        Arc::new(PrefixTransport { calls: Mutex::new(Vec::new()) })
    }

    #[test]
    fn legal_transitions() {
        use SlotState::*;
        assert!(Pending.can_advance_to(Fetching));
        assert!(Fetching.can_advance_to(Failed));
        assert!(Attributing.can_advance_to(Aggregated));
        assert!(!Classifying.can_advance_to(Failed));
        assert!(!Pending.can_advance_to(Aggregated));
        assert!(!Aggregated.can_advance_to(Fetching));
        assert!(Failed.is_terminal());
        assert!(!Attributing.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn only_non_votes_are_looked_up() {
        let source = MapSource::new(vec![block(
            10,
            vec![vote("v1"), vote("v2"), plain("b-1", 10_000), plain("x", 5_000)],
            1_000_000,
        )]);
        let t = transport();
        let e = engine(source, Arc::clone(&t), 4);

        let SlotOutcome::Aggregated(report) = e.process_slot(10).await else {
            panic!("slot should aggregate");
        };
        let mut calls = t.calls.lock().clone();
        calls.sort();
        assert_eq!(calls, vec!["b-1".to_string(), "x".to_string()]);
        assert_eq!(report.vote_fee_lamports, 10_000);
        assert_eq!(report.vote_fee_credit_lamports, 5_000);
        assert_eq!(report.non_vote_reward_lamports, 995_000);
        assert_eq!(report.bundle_count, 1);
        assert_eq!(report.net_bundle_fee_lamports, 7_500);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_makes_failed_slot() {
        let e = engine(MapSource::new(vec![]), transport(), 4);
        match e.process_slot(99).await {
            SlotOutcome::Failed(f) => {
                assert_eq!(f.slot, 99);
                assert!(f.reason.contains("skipped"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_groups_slots_into_labelled_turns() {
        let source = MapSource::new(vec![
            block(1, vec![plain("b-1", 7_500)], 100),
            block(2, vec![plain("a", 5_000)], 200),
            block(4, vec![plain("b-4", 5_000)], 400),
        ]);
        let mut cfg = EngineConfig { turn_size: 2, ..EngineConfig::default() };
        cfg.labels = vec!["previous".into(), "ours".into()];
        let e = Engine::new(source.clone(), transport(), cfg);
        let mut sink = RecordingSink::default();

        let summary = e.run(&[1, 2, 3, 4, 5], &mut sink).await.unwrap();
        assert_eq!(*source.fetched.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(sink.turns, vec!["previous", "ours", "turn-2"]);
        assert_eq!(sink.blocks, vec![1, 2, 4]);
        assert!(sink.flushed);

        assert_eq!(summary.turns, 3);
        assert_eq!(summary.failed_slots, 2);
        assert_eq!(summary.totals.blocks, 3);
        assert_eq!(summary.totals.block_reward_lamports, 700);
        assert_eq!(summary.totals.bundle_count, 2);
        assert_eq!(summary.totals.attributed_fee_lamports, 12_500);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_aborts_run() {
        let source = MapSource::new(vec![block(1, vec![], 0)]);
        let e = engine(source, transport(), 4);
        let err = e.run(&[1], &mut BrokenSink).await.unwrap_err();
        assert!(matches!(err, TallyError::Sink(_)));
    }
}
