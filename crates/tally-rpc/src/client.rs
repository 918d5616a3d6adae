//! [`BlockSource`] over a validator's JSON-RPC `getBlock`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::{json, Value};
use tracing::{debug, warn};

use tally_core::constants::{
    BLOCK_FETCH_BACKOFF, BLOCK_FETCH_MAX_ATTEMPTS, BLOCK_FETCH_TIMEOUT, DEFAULT_RPC_URL,
};
use tally_core::error::BlockSourceError;
use tally_core::traits::BlockSource;
use tally_core::types::Block;

use crate::parse::parse_block;

// Server error codes returned by `getBlock`.
const BLOCK_NOT_AVAILABLE: i32 = -32004;
const SLOT_SKIPPED: i32 = -32007;
const LONG_TERM_STORAGE_SLOT_SKIPPED: i32 = -32009;
const BLOCK_STATUS_NOT_AVAILABLE_YET: i32 = -32014;

/// Block source connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// `finalized` or `confirmed`.
    pub commitment: String,
    /// Attempts per slot for retryable failures.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RPC_URL.to_string(),
            timeout: BLOCK_FETCH_TIMEOUT,
            commitment: "finalized".to_string(),
            max_attempts: BLOCK_FETCH_MAX_ATTEMPTS,
            retry_backoff: BLOCK_FETCH_BACKOFF,
        }
    }
}

pub struct RpcBlockSource {
    client: HttpClient,
    config: RpcConfig,
}

impl RpcBlockSource {
    pub fn new(config: RpcConfig) -> Result<Self, ClientError> {
        let client = HttpClientBuilder::default()
            .request_timeout(config.timeout)
            .build(&config.endpoint)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    async fn fetch_once(&self, slot: u64) -> Result<Block, BlockSourceError> {
        let params = block_params(slot, &self.config.commitment)?;
        let result: Value = self
            .client
            .request("getBlock", params)
            .await
            .map_err(|e| classify_client_error(slot, e))?;
        parse_block(slot, result)
    }
}

#[async_trait]
impl BlockSource for RpcBlockSource {
    async fn fetch_block(&self, slot: u64) -> Result<Block, BlockSourceError> {
        let block = fetch_with_retry(
            slot,
            self.config.max_attempts,
            self.config.retry_backoff,
            || self.fetch_once(slot),
        )
        .await?;
        debug!(slot, txns = block.transactions.len(), "fetched block");
        Ok(block)
    }
}

/// `getBlock` options: full transactions in `jsonParsed` form, with rewards.
pub fn block_request_options(commitment: &str) -> Value {
    json!({
        "encoding": "jsonParsed",
        "maxSupportedTransactionVersion": 0,
        "transactionDetails": "full",
        "rewards": true,
        "commitment": commitment,
    })
}

/// Positional `getBlock` parameters: the slot, then [`block_request_options`].
pub fn block_params(slot: u64, commitment: &str) -> Result<ArrayParams, BlockSourceError> {
    let malformed = |e: serde_json::Error| BlockSourceError::Malformed { slot, message: e.to_string() };
    let mut params = ArrayParams::new();
    params.insert(slot).map_err(malformed)?;
    params.insert(block_request_options(commitment)).map_err(malformed)?;
    Ok(params)
}

/// Run `fetch` until it succeeds, fails permanently, or `max_attempts`
/// attempts have been made, sleeping `backoff` between attempts.
pub async fn fetch_with_retry<F, Fut>(
    slot: u64,
    max_attempts: u32,
    backoff: Duration,
    mut fetch: F,
) -> Result<Block, BlockSourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Block, BlockSourceError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch().await {
            Ok(block) => return Ok(block),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(slot, attempt, error = %e, "block fetch failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a JSON-RPC client failure onto the block-source taxonomy.
pub fn classify_client_error(slot: u64, err: ClientError) -> BlockSourceError {
    match err {
        ClientError::Call(obj) => {
            let message = obj.message().to_string();
            match obj.code() {
                BLOCK_NOT_AVAILABLE | BLOCK_STATUS_NOT_AVAILABLE_YET => {
                    BlockSourceError::NotAvailable { slot, message }
                }
                SLOT_SKIPPED | LONG_TERM_STORAGE_SLOT_SKIPPED => {
                    BlockSourceError::Skipped { slot, message }
                }
                code => BlockSourceError::Rpc { slot, code, message },
            }
        }
        ClientError::ParseError(e) => BlockSourceError::Malformed { slot, message: e.to_string() },
        other => BlockSourceError::Transport { slot, message: other.to_string() },
    }
}
