//! Protocol and tooling constants. All monetary values in lamports.

use std::time::Duration;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Slots per epoch on mainnet.
pub const SLOTS_PER_EPOCH: u64 = 432_000;

/// Consecutive slots a leader is scheduled for. Default turn size.
pub const NUM_CONSECUTIVE_LEADER_SLOTS: usize = 4;

/// Log line emitted by the vote program on success. Its presence in a
/// transaction's execution log is what makes the transaction a vote.
pub const VOTE_PROGRAM_SUCCESS_LOG: &str =
    "Program Vote111111111111111111111111111111111111111 success";

/// Base protocol fee charged per signature. Not discretionary revenue, so it
/// is subtracted from attributed bundle fees.
pub const SIGNATURE_COST_LAMPORTS: u64 = 2_500;

/// Share of vote-transaction fees credited to the block-reward pool, in
/// percent. The remainder is burned.
///
/// Tracks the network's fee-split rule; bump it if the rule changes.
pub const VOTE_FEE_CREDIT_PERCENT: u64 = 50;

// ---------------------------------------------------------------------------
// Attribution service
// ---------------------------------------------------------------------------

/// Lookup attempts per signature before a throttled lookup gives up.
pub const MAX_LOOKUP_ATTEMPTS: u32 = 5;

/// Fixed delay between throttled lookup attempts.
pub const LOOKUP_RETRY_BACKOFF: Duration = Duration::from_millis(300);

/// Per-request timeout for attribution lookups.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests allowed per budget window by default.
pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 20;

/// Budget refill period. Longer than one second so that a full window of
/// in-flight requests has drained before the next refill.
pub const BUDGET_WINDOW: Duration = Duration::from_millis(2_200);

pub const DEFAULT_BUNDLES_URL: &str = "https://bundles.jito.wtf";

// ---------------------------------------------------------------------------
// Block source
// ---------------------------------------------------------------------------

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Attempts per slot for retryable block-source failures.
pub const BLOCK_FETCH_MAX_ATTEMPTS: u32 = 3;

pub const BLOCK_FETCH_BACKOFF: Duration = Duration::from_millis(500);

pub const BLOCK_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Epoch that contains `slot`.
pub fn epoch_of(slot: u64) -> u64 {
    slot / SLOTS_PER_EPOCH
}
