//! Bundle lookup for a single transaction, with throttle-aware retry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use tally_core::error::AttributionErrorKind;
use tally_core::traits::{AttributionTransport, HttpReply};
use tally_core::types::{AttributionResult, BundleId};

use crate::budget::RateBudget;

/// Final result of one lookup plus the number of requests it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub result: AttributionResult,
    pub attempts: u32,
}

/// What a single response means for the lookup.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Done(AttributionResult),
    Throttled,
}

/// Looks up bundle membership of transactions, drawing one permit from the
/// shared budget per request.
#[derive(Clone)]
pub struct AttributionClient {
    transport: Arc<dyn AttributionTransport>,
    budget: Arc<RateBudget>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl AttributionClient {
    pub fn new(
        transport: Arc<dyn AttributionTransport>,
        budget: Arc<RateBudget>,
        max_attempts: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            transport,
            budget,
            max_attempts: max_attempts.max(1),
            retry_backoff,
        }
    }

    /// Look up `signature` and return its terminal result.
    pub async fn lookup(&self, signature: &str) -> AttributionResult {
        self.lookup_counted(signature).await.result
    }

    /// Look up `signature`, reporting how many requests were issued.
    ///
    /// - 200: attributed if the body is a non-empty list whose first entry
    ///   has a `bundle_id`, otherwise not attributed.
    /// - 404: not attributed, no retry.
    /// - 429 / 403: retried after a fixed backoff, up to `max_attempts`
    ///   requests in total, then `Error(RateLimited)`.
    /// - anything else, or no response: `Error(Transport)`, no retry.
    pub async fn lookup_counted(&self, signature: &str) -> Lookup {
        let mut attempts = 0;
        loop {
            self.budget.acquire().await;
            attempts += 1;
            debug!(%signature, attempt = attempts, "bundle lookup");

            let step = match self.transport.get_bundles(signature).await {
                Ok(reply) => interpret(signature, &reply),
                Err(e) => {
                    warn!(%signature, error = %e, "bundle lookup transport error");
                    Step::Done(AttributionResult::Error(AttributionErrorKind::Transport))
                }
            };

            match step {
                Step::Done(result) => return Lookup { result, attempts },
                Step::Throttled if attempts >= self.max_attempts => {
                    warn!(%signature, attempts, "bundle lookup still throttled, giving up");
                    return Lookup {
                        result: AttributionResult::Error(AttributionErrorKind::RateLimited),
                        attempts,
                    };
                }
                Step::Throttled => tokio::time::sleep(self.retry_backoff).await,
            }
        }
    }
}

fn interpret(signature: &str, reply: &HttpReply) -> Step {
    match reply.status {
        200 => match serde_json::from_str::<Value>(&reply.body) {
            Ok(payload) => Step::Done(match first_bundle_id(&payload) {
                Some(id) => AttributionResult::Attributed(id),
                None => AttributionResult::NotAttributed,
            }),
            Err(e) => {
                warn!(%signature, error = %e, "unparseable bundle lookup body");
                Step::Done(AttributionResult::Error(AttributionErrorKind::Transport))
            }
        },
        404 => Step::Done(AttributionResult::NotAttributed),
        429 | 403 => {
            debug!(%signature, status = reply.status, "bundle lookup throttled");
            Step::Throttled
        }
        status => {
            warn!(%signature, status, "bundle lookup HTTP error");
            Step::Done(AttributionResult::Error(AttributionErrorKind::Transport))
        }
    }
}

/// `bundle_id` of the first entry of a JSON array, if present.
fn first_bundle_id(payload: &Value) -> Option<BundleId> {
    payload
        .as_array()?
        .first()?
        .get("bundle_id")?
        .as_str()
        .map(BundleId::from)
}
