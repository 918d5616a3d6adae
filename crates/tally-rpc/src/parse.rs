//! Decoding of `getBlock` results.

use serde::Deserialize;
use serde_json::Value;

use tally_core::error::BlockSourceError;
use tally_core::types::{Block, Reward, Transaction};

/// The subset of a `getBlock` result the tally reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    transactions: Vec<Value>,
    #[serde(default)]
    rewards: Option<Vec<Value>>,
}

/// Decode a `getBlock` result for `slot`.
///
/// A `null` result means the node has no block for the slot yet. Individual
/// transaction or reward entries that fail to decode are tolerated (see
/// [`Transaction::from_value`]); only a result that is not a block object at
/// all is rejected.
pub fn parse_block(slot: u64, result: Value) -> Result<Block, BlockSourceError> {
    if result.is_null() {
        return Err(BlockSourceError::NotAvailable {
            slot,
            message: "empty getBlock result".into(),
        });
    }
    let raw: RawBlock = serde_json::from_value(result).map_err(|e| BlockSourceError::Malformed {
        slot,
        message: e.to_string(),
    })?;

    let transactions = raw.transactions.into_iter().map(Transaction::from_value).collect();
    let rewards = raw
        .rewards
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| serde_json::from_value::<Reward>(r).ok())
        .collect();

    Ok(Block {
        slot,
        block_time: raw.block_time,
        transactions,
        rewards,
    })
}
