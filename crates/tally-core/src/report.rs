//! Per-block and per-turn reward reports.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Reward accounting for one slot. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub slot: u64,
    pub epoch: u64,
    pub block_time: Option<i64>,
    pub total_txns: u64,
    pub non_vote_txns: u64,
    /// Fee reward from the block's own reward entries.
    pub block_reward_lamports: i64,
    /// Raw sum of vote-transaction fees.
    pub vote_fee_lamports: u64,
    /// Part of the vote fees credited to the reward pool.
    pub vote_fee_credit_lamports: u64,
    /// `block_reward - vote_fee_credit`.
    pub non_vote_reward_lamports: i64,
    /// Distinct bundle ids seen in the block.
    pub bundle_count: u64,
    pub attributed_txn_count: u64,
    pub attributed_fee_lamports: u64,
    pub attributed_signature_count: u64,
    /// Attributed fees minus the per-signature base cost. May be negative.
    pub net_bundle_fee_lamports: i64,
    /// Lookups that ended in an error; counted as not attributed.
    pub attribution_errors: u64,
}

/// Element-wise sums over a set of block reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTotals {
    pub blocks: u64,
    pub total_txns: u64,
    pub non_vote_txns: u64,
    pub block_reward_lamports: i64,
    pub vote_fee_lamports: u64,
    pub vote_fee_credit_lamports: u64,
    pub non_vote_reward_lamports: i64,
    pub bundle_count: u64,
    pub attributed_txn_count: u64,
    pub attributed_fee_lamports: u64,
    pub attributed_signature_count: u64,
    pub net_bundle_fee_lamports: i64,
    pub attribution_errors: u64,
}

impl BlockTotals {
    pub fn add_block(&mut self, r: &BlockReport) {
        self.merge(&BlockTotals {
            blocks: 1,
            total_txns: r.total_txns,
            non_vote_txns: r.non_vote_txns,
            block_reward_lamports: r.block_reward_lamports,
            vote_fee_lamports: r.vote_fee_lamports,
            vote_fee_credit_lamports: r.vote_fee_credit_lamports,
            non_vote_reward_lamports: r.non_vote_reward_lamports,
            bundle_count: r.bundle_count,
            attributed_txn_count: r.attributed_txn_count,
            attributed_fee_lamports: r.attributed_fee_lamports,
            attributed_signature_count: r.attributed_signature_count,
            net_bundle_fee_lamports: r.net_bundle_fee_lamports,
            attribution_errors: r.attribution_errors,
        });
    }

    /// Element-wise saturating sum.
    pub fn merge(&mut self, other: &BlockTotals) {
        self.blocks = self.blocks.saturating_add(other.blocks);
        self.total_txns = self.total_txns.saturating_add(other.total_txns);
        self.non_vote_txns = self.non_vote_txns.saturating_add(other.non_vote_txns);
        self.block_reward_lamports = self.block_reward_lamports.saturating_add(other.block_reward_lamports);
        self.vote_fee_lamports = self.vote_fee_lamports.saturating_add(other.vote_fee_lamports);
        self.vote_fee_credit_lamports = self.vote_fee_credit_lamports.saturating_add(other.vote_fee_credit_lamports);
        self.non_vote_reward_lamports = self.non_vote_reward_lamports.saturating_add(other.non_vote_reward_lamports);
        self.bundle_count = self.bundle_count.saturating_add(other.bundle_count);
        self.attributed_txn_count = self.attributed_txn_count.saturating_add(other.attributed_txn_count);
        self.attributed_fee_lamports = self.attributed_fee_lamports.saturating_add(other.attributed_fee_lamports);
        self.attributed_signature_count =
            self.attributed_signature_count.saturating_add(other.attributed_signature_count);
        self.net_bundle_fee_lamports = self.net_bundle_fee_lamports.saturating_add(other.net_bundle_fee_lamports);
        self.attribution_errors = self.attribution_errors.saturating_add(other.attribution_errors);
    }
}

impl<'a> FromIterator<&'a BlockReport> for BlockTotals {
    fn from_iter<I: IntoIterator<Item = &'a BlockReport>>(iter: I) -> Self {
        let mut totals = BlockTotals::default();
        for r in iter {
            totals.add_block(r);
        }
        totals
    }
}

/// A slot that could not be tallied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSlot {
    pub slot: u64,
    pub reason: String,
}

/// Terminal outcome of processing one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    Aggregated(BlockReport),
    Failed(FailedSlot),
}

impl SlotOutcome {
    pub fn slot(&self) -> u64 {
        match self {
            Self::Aggregated(r) => r.slot,
            Self::Failed(f) => f.slot,
        }
    }
}

/// An operator-defined group of slots analysed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    pub label: String,
    /// Successfully tallied blocks, in slot order.
    pub blocks: Vec<BlockReport>,
    /// Slots excluded from the totals.
    pub failed: Vec<FailedSlot>,
    pub totals: BlockTotals,
}

impl TurnReport {
    /// Fold slot outcomes into a turn.
    ///
    /// Failed slots are listed and logged but never contribute to `totals`.
    pub fn from_outcomes(label: impl Into<String>, outcomes: impl IntoIterator<Item = SlotOutcome>) -> Self {
        let label = label.into();
        let mut blocks = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                SlotOutcome::Aggregated(r) => blocks.push(r),
                SlotOutcome::Failed(f) => {
                    warn!(turn = %label, slot = f.slot, reason = %f.reason, "slot excluded from turn totals");
                    failed.push(f);
                }
            }
        }
        blocks.sort_by_key(|r| r.slot);
        failed.sort_by_key(|f| f.slot);
        let totals = blocks.iter().collect();
        Self { label, blocks, failed, totals }
    }

    /// Slots covered by the turn, tallied or not, in order.
    pub fn slots(&self) -> Vec<u64> {
        let mut slots: Vec<u64> = self
            .blocks
            .iter()
            .map(|b| b.slot)
            .chain(self.failed.iter().map(|f| f.slot))
            .collect();
        slots.sort_unstable();
        slots
    }
}
