//! Reward aggregation: one block plus its attribution results into a
//! [`BlockReport`].
//!
//! All arithmetic is integer arithmetic in lamports so that re-running the
//! same inputs reproduces the same report bit for bit.

use std::collections::BTreeSet;

use crate::classifier::classify;
use crate::constants::{epoch_of, SIGNATURE_COST_LAMPORTS, VOTE_FEE_CREDIT_PERCENT};
use crate::report::BlockReport;
use crate::types::{AttributionResult, AttributionSet, Block};

/// Part of the vote fees credited to the block-reward pool.
///
/// Integer division, rounding toward zero. Vote fees are whole multiples of
/// the per-signature fee, so with a 50 % credit the result is exact.
pub fn vote_fee_credit(vote_fee_lamports: u64) -> u64 {
    let credit = u128::from(vote_fee_lamports) * u128::from(VOTE_FEE_CREDIT_PERCENT) / 100;
    u64::try_from(credit).unwrap_or(u64::MAX)
}

/// Attributed fees net of the base per-signature cost. Negative when the
/// bundle transactions paid little more than the base fee.
pub fn net_bundle_fee(attributed_fee_lamports: u64, attributed_signatures: u64) -> i64 {
    let gross = i128::from(attributed_fee_lamports);
    let cost = i128::from(attributed_signatures) * i128::from(SIGNATURE_COST_LAMPORTS);
    saturate(gross - cost)
}

/// Build the report for `block` from the coordinator's results.
///
/// Non-vote transactions without a result, or with an error result, count as
/// not attributed; errors are additionally counted in `attribution_errors`.
pub fn aggregate(block: &Block, attributions: &AttributionSet) -> BlockReport {
    let mut vote_fee: u64 = 0;
    let mut non_vote_txns: u64 = 0;
    let mut attributed_txns: u64 = 0;
    let mut attributed_fee: u64 = 0;
    let mut attributed_sigs: u64 = 0;
    let mut errors: u64 = 0;
    let mut bundles = BTreeSet::new();

    for tx in &block.transactions {
        let c = classify(tx);
        if c.is_vote {
            vote_fee = vote_fee.saturating_add(c.fee);
            continue;
        }
        non_vote_txns += 1;

        match tx.signature().and_then(|sig| attributions.get(sig)) {
            Some(AttributionResult::Attributed(bundle)) => {
                attributed_txns += 1;
                attributed_fee = attributed_fee.saturating_add(c.fee);
                attributed_sigs += tx.signature_count();
                bundles.insert(bundle);
            }
            Some(AttributionResult::Error(_)) => errors += 1,
            Some(AttributionResult::NotAttributed) | None => {}
        }
    }

    let block_reward = block.fee_reward_lamports();
    let credit = vote_fee_credit(vote_fee);

    BlockReport {
        slot: block.slot,
        epoch: epoch_of(block.slot),
        block_time: block.block_time,
        total_txns: block.transactions.len() as u64,
        non_vote_txns,
        block_reward_lamports: block_reward,
        vote_fee_lamports: vote_fee,
        vote_fee_credit_lamports: credit,
        non_vote_reward_lamports: saturate(i128::from(block_reward) - i128::from(credit)),
        bundle_count: bundles.len() as u64,
        attributed_txn_count: attributed_txns,
        attributed_fee_lamports: attributed_fee,
        attributed_signature_count: attributed_sigs,
        net_bundle_fee_lamports: net_bundle_fee(attributed_fee, attributed_sigs),
        attribution_errors: errors,
    }
}

fn saturate(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}
