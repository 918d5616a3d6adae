//! Block, transaction, and attribution types.
//!
//! Transaction and reward shapes follow the `jsonParsed` encoding returned by
//! `getBlock`. Only the fields the tally needs are modelled; everything else in
//! the payload is ignored on deserialization.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AttributionErrorKind;

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// A block transaction, reduced to what classification and attribution need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, rename = "transaction")]
    pub envelope: TransactionEnvelope,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    /// Base58 signatures. The first one identifies the transaction.
    #[serde(default)]
    pub signatures: Vec<String>,
}

/// Execution metadata recorded by the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
}

impl Transaction {
    /// Build a transaction from its parts.
    pub fn new(signatures: Vec<String>, fee: u64, log_messages: Vec<String>) -> Self {
        Self {
            envelope: TransactionEnvelope { signatures },
            meta: Some(TransactionMeta {
                fee: Some(fee),
                log_messages: Some(log_messages),
            }),
        }
    }

    /// Decode one entry of a block's `transactions` array.
    ///
    /// Entries that do not match the expected shape decode to an empty
    /// transaction (no signature, no fee, no logs) instead of failing, so a
    /// single odd entry cannot poison a block's totals.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Primary signature, used as the transaction identifier.
    pub fn signature(&self) -> Option<&str> {
        self.envelope.signatures.first().map(String::as_str)
    }

    pub fn signature_count(&self) -> u64 {
        self.envelope.signatures.len() as u64
    }

    pub fn fee(&self) -> Option<u64> {
        self.meta.as_ref().and_then(|m| m.fee)
    }

    pub fn log_messages(&self) -> &[String] {
        self.meta
            .as_ref()
            .and_then(|m| m.log_messages.as_deref())
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Rewards and blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardType {
    Fee,
    Rent,
    Staking,
    Voting,
    #[serde(other)]
    Unknown,
}

/// A block-level reward entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    #[serde(default)]
    pub pubkey: String,
    pub lamports: i64,
    #[serde(default)]
    pub post_balance: u64,
    #[serde(default)]
    pub reward_type: Option<RewardType>,
}

/// A produced block: its transactions plus the reward bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub slot: u64,
    /// Unix seconds, when the cluster reported one.
    pub block_time: Option<i64>,
    pub transactions: Vec<Transaction>,
    pub rewards: Vec<Reward>,
}

impl Block {
    /// Fee reward paid to the leader, per the block's own reward entries.
    pub fn fee_reward_lamports(&self) -> i64 {
        self.rewards
            .iter()
            .filter(|r| r.reward_type == Some(RewardType::Fee))
            .map(|r| r.lamports)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

/// Identifier of a bundle delivered through the relay.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(pub String);

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BundleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Terminal outcome of looking up one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionResult {
    Attributed(BundleId),
    NotAttributed,
    Error(AttributionErrorKind),
}

impl AttributionResult {
    pub fn bundle_id(&self) -> Option<&BundleId> {
        match self {
            Self::Attributed(id) => Some(id),
            _ => None,
        }
    }
}

/// Counters describing one attribution batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionStats {
    /// Distinct signatures submitted.
    pub requested: u64,
    /// Requests actually issued, retries included.
    pub attempts: u64,
    pub attributed: u64,
    pub not_attributed: u64,
    pub rate_limited: u64,
    pub transport_errors: u64,
}

/// Results of one attribution batch, keyed by primary signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionSet {
    results: HashMap<String, AttributionResult>,
    attempts: u64,
}

impl AttributionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal result for `signature`.
    ///
    /// Returns `false` and keeps the first result if one was already recorded.
    pub fn record(&mut self, signature: impl Into<String>, result: AttributionResult) -> bool {
        use std::collections::hash_map::Entry;
        match self.results.entry(signature.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(result);
                true
            }
        }
    }

    pub fn add_attempts(&mut self, attempts: u64) {
        self.attempts += attempts;
    }

    pub fn get(&self, signature: &str) -> Option<&AttributionResult> {
        self.results.get(signature)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributionResult)> {
        self.results.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Distinct bundle ids across all attributed signatures.
    pub fn bundle_ids(&self) -> BTreeSet<&BundleId> {
        self.results.values().filter_map(AttributionResult::bundle_id).collect()
    }

    pub fn stats(&self) -> AttributionStats {
        let mut stats = AttributionStats {
            requested: self.results.len() as u64,
            attempts: self.attempts,
            ..AttributionStats::default()
        };
        for result in self.results.values() {
            match result {
                AttributionResult::Attributed(_) => stats.attributed += 1,
                AttributionResult::NotAttributed => stats.not_attributed += 1,
                AttributionResult::Error(AttributionErrorKind::RateLimited) => stats.rate_limited += 1,
                AttributionResult::Error(AttributionErrorKind::Transport) => stats.transport_errors += 1,
            }
        }
        stats
    }
}
