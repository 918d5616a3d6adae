//! Shared builders and collaborator mocks for the end-to-end tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use tally_core::constants::VOTE_PROGRAM_SUCCESS_LOG;
use tally_core::error::{BlockSourceError, SinkError};
use tally_core::report::{BlockReport, TurnReport};
use tally_core::traits::{AttributionTransport, BlockSource, HttpReply, ReportSink};
use tally_core::types::{Block, Reward, RewardType, Transaction};
use tally_rpc::client::fetch_with_retry;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn vote_tx(sig: &str, fee: u64) -> Transaction {
    Transaction::new(
        vec![sig.to_string()],
        fee,
        vec![
            "Program Vote111111111111111111111111111111111111111 invoke [1]".to_string(),
            VOTE_PROGRAM_SUCCESS_LOG.to_string(),
        ],
    )
}

pub fn plain_tx(sig: &str, fee: u64) -> Transaction {
    Transaction::new(
        vec![sig.to_string()],
        fee,
        vec!["Program log: Instruction: Transfer".to_string()],
    )
}

pub fn multi_sig_tx(sigs: &[&str], fee: u64) -> Transaction {
    Transaction::new(sigs.iter().map(|s| s.to_string()).collect(), fee, vec![])
}

pub fn fee_reward(lamports: i64) -> Reward {
    Reward {
        pubkey: "LeaderIdentity1111111111111111111111111111111".to_string(),
        lamports,
        post_balance: 0,
        reward_type: Some(RewardType::Fee),
    }
}

pub fn block(slot: u64, transactions: Vec<Transaction>, reward: i64) -> Block {
    Block {
        slot,
        block_time: Some(1_750_000_000 + slot as i64),
        transactions,
        rewards: vec![fee_reward(reward)],
    }
}

/// Ten transactions: votes paying 5, 5 and 10, then seven non-votes
/// `n0..n6` paying 100 each, with a 1000-lamport fee reward. Pair with
/// [`reference_service`] so that `n0` and `n1` land in bundle `B1`.
pub fn reference_block(slot: u64) -> Block {
    let mut txs = vec![vote_tx("v0", 5), vote_tx("v1", 5), vote_tx("v2", 10)];
    txs.extend((0..7).map(|i| plain_tx(&format!("n{i}"), 100)));
    block(slot, txs, 1_000)
}

pub fn reference_service() -> ServiceMock {
    ServiceMock::new()
        .reply("n0", vec![bundle_reply("B1")])
        .reply("n1", vec![bundle_reply("B1")])
}

pub fn bundle_reply(id: &str) -> HttpReply {
    HttpReply::new(
        200,
        format!(r#"[{{"bundle_id":"{id}","timestamp":"2025-06-15T12:00:00Z","tippers":["t"],"landedTipLamports":10000}}]"#),
    )
}

pub fn status(code: u16) -> HttpReply {
    HttpReply::new(code, "")
}

// ---------------------------------------------------------------------------
// Mock: BlockSource
// ---------------------------------------------------------------------------

/// Replays per-slot scripts. Each fetch pops the next entry; the last entry
/// repeats. Unknown slots are skipped.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<u64, VecDeque<Result<Block, BlockSourceError>>>>,
    fetches: Mutex<Vec<u64>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(self, block: Block) -> Self {
        self.scripts.lock().insert(block.slot, VecDeque::from(vec![Ok(block)]));
        self
    }

    pub fn with_script(self, slot: u64, script: Vec<Result<Block, BlockSourceError>>) -> Self {
        self.scripts.lock().insert(slot, script.into());
        self
    }

    pub fn fetches(&self) -> Vec<u64> {
        self.fetches.lock().clone()
    }

    fn next(&self, slot: u64) -> Result<Block, BlockSourceError> {
        self.fetches.lock().push(slot);
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&slot) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| skipped(slot)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| skipped(slot)),
            None => skipped(slot),
        }
    }
}

fn skipped(slot: u64) -> Result<Block, BlockSourceError> {
    Err(BlockSourceError::Skipped { slot, message: "no block scripted".into() })
}

pub fn not_available(slot: u64) -> BlockSourceError {
    BlockSourceError::NotAvailable { slot, message: "Block not available for slot".into() }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn fetch_block(&self, slot: u64) -> Result<Block, BlockSourceError> {
        self.next(slot)
    }
}

/// A [`ScriptedSource`] behind the RPC source's retry policy.
pub struct RetryingSource {
    pub inner: ScriptedSource,
    pub max_attempts: u32,
    pub backoff: Duration,
}

#[async_trait]
impl BlockSource for RetryingSource {
    async fn fetch_block(&self, slot: u64) -> Result<Block, BlockSourceError> {
        fetch_with_retry(slot, self.max_attempts, self.backoff, || async move {
            self.inner.next(slot)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Mock: AttributionTransport
// ---------------------------------------------------------------------------

/// Bundle service stand-in. Replies per signature from a script whose last
/// entry repeats; unknown signatures get 404. Every request start is logged
/// with its (virtual) time.
pub struct ServiceMock {
    replies: Mutex<HashMap<String, VecDeque<HttpReply>>>,
    latency: Duration,
    started: Mutex<Vec<(String, Instant)>>,
}

impl Default for ServiceMock {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMock {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, sig: &str, script: Vec<HttpReply>) -> Self {
        self.replies.lock().insert(sig.to_string(), script.into());
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls_for(&self, sig: &str) -> usize {
        self.started.lock().iter().filter(|(s, _)| s == sig).count()
    }

    pub fn total_calls(&self) -> usize {
        self.started.lock().len()
    }

    /// Request start times relative to `origin`.
    pub fn start_offsets(&self, origin: Instant) -> Vec<Duration> {
        self.started.lock().iter().map(|(_, at)| at.duration_since(origin)).collect()
    }
}

#[async_trait]
impl AttributionTransport for ServiceMock {
    async fn get_bundles(&self, signature: &str) -> Result<HttpReply, String> {
        self.started.lock().push((signature.to_string(), Instant::now()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut replies = self.replies.lock();
        Ok(match replies.get_mut(signature) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| status(404)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| status(404)),
            None => status(404),
        })
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub blocks: Vec<BlockReport>,
    pub turns: Vec<TurnReport>,
}

impl ReportSink for RecordingSink {
    fn write_block(&mut self, report: &BlockReport) -> Result<(), SinkError> {
        self.blocks.push(report.clone());
        Ok(())
    }

    fn write_turn(&mut self, turn: &TurnReport) -> Result<(), SinkError> {
        self.turns.push(turn.clone());
        Ok(())
    }
}
