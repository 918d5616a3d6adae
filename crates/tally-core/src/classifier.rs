//! Vote / non-vote classification of block transactions.

use crate::constants::VOTE_PROGRAM_SUCCESS_LOG;
use crate::types::Transaction;

/// Classifier output for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_vote: bool,
    /// Fee in lamports; 0 when the metadata carries none.
    pub fee: u64,
}

/// Classify a transaction.
///
/// A transaction is a vote iff its execution log contains the vote program's
/// success line. Never fails: a transaction with missing metadata classifies
/// as a non-vote with zero fee.
pub fn classify(tx: &Transaction) -> Classification {
    Classification {
        is_vote: tx
            .log_messages()
            .iter()
            .any(|line| line == VOTE_PROGRAM_SUCCESS_LOG),
        fee: tx.fee().unwrap_or(0),
    }
}

/// A block's transactions split into votes and non-votes.
#[derive(Debug, Default)]
pub struct VoteSplit<'a> {
    pub votes: Vec<&'a Transaction>,
    pub non_votes: Vec<&'a Transaction>,
    /// Raw sum of vote-transaction fees.
    pub vote_fee_lamports: u64,
}

/// Partition `txs`, preserving block order within each side.
pub fn split_votes(txs: &[Transaction]) -> VoteSplit<'_> {
    let mut split = VoteSplit::default();
    for tx in txs {
        let c = classify(tx);
        if c.is_vote {
            split.vote_fee_lamports = split.vote_fee_lamports.saturating_add(c.fee);
            split.votes.push(tx);
        } else {
            split.non_votes.push(tx);
        }
    }
    split
}
