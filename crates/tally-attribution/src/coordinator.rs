//! Fan-out of a transaction batch over the attribution client.
//!
//! One task per distinct signature. Concurrency is not capped by a pool: the
//! shared [`RateBudget`] alone gates throughput, so a bigger batch takes
//! longer but never issues requests faster. An optional semaphore bounds the
//! number of live lookups for very large batches.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use tally_core::traits::AttributionTransport;
use tally_core::types::{AttributionResult, AttributionSet, Transaction};

use crate::budget::RateBudget;
use crate::client::{AttributionClient, Lookup};
use crate::config::AttributionConfig;

/// Batch progress, readable while the batch runs.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicU64,
    completed: AtomicU64,
    attributed: AtomicU64,
}

impl Progress {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn attributed(&self) -> u64 {
        self.attributed.load(Ordering::Relaxed)
    }

    fn record(&self, result: &AttributionResult) {
        if result.bundle_id().is_some() {
            self.attributed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives attribution batches against one transport.
pub struct Coordinator {
    transport: Arc<dyn AttributionTransport>,
    config: AttributionConfig,
}

impl Coordinator {
    pub fn new(transport: Arc<dyn AttributionTransport>, config: AttributionConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    /// Attribute every transaction in `txs`.
    ///
    /// Returns once each distinct signature has a terminal result. Failed
    /// lookups are recorded as `Error(..)` and never abort the batch.
    /// Transactions without a signature are not looked up and are absent
    /// from the result.
    pub async fn attribute<'a, I>(&self, txs: I, requests_per_window: u32) -> AttributionSet
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        self.attribute_with_progress(txs, requests_per_window, Arc::new(Progress::default()))
            .await
    }

    /// [`attribute`](Self::attribute), publishing progress into `progress`.
    pub async fn attribute_with_progress<'a, I>(
        &self,
        txs: I,
        requests_per_window: u32,
        progress: Arc<Progress>,
    ) -> AttributionSet
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut seen = HashSet::new();
        let signatures: Vec<String> = txs
            .into_iter()
            .filter_map(Transaction::signature)
            .filter(|sig| seen.insert(*sig))
            .map(str::to_string)
            .collect();

        let mut set = AttributionSet::new();
        if signatures.is_empty() {
            return set;
        }
        progress.total.store(signatures.len() as u64, Ordering::Relaxed);

        let budget = Arc::new(RateBudget::new(requests_per_window, self.config.window));
        let client = AttributionClient::new(
            Arc::clone(&self.transport),
            Arc::clone(&budget),
            self.config.max_attempts,
            self.config.retry_backoff,
        );
        let in_flight = self.config.max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1))));

        let refill = {
            let progress = Arc::clone(&progress);
            budget.spawn_refill(move || {
                info!(
                    completed = progress.completed(),
                    total = progress.total(),
                    attributed = progress.attributed(),
                    "attribution progress"
                );
            })
        };

        let mut workers = JoinSet::new();
        for signature in signatures {
            let client = client.clone();
            let progress = Arc::clone(&progress);
            let in_flight = in_flight.clone();
            workers.spawn(async move {
                let _permit = match in_flight {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                let lookup = client.lookup_counted(&signature).await;
                progress.record(&lookup.result);
                (signature, lookup)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((signature, Lookup { result, attempts })) => {
                    set.add_attempts(u64::from(attempts));
                    if !set.record(signature.clone(), result) {
                        error!(%signature, "duplicate attribution result dropped");
                    }
                }
                Err(e) => error!(error = %e, "attribution worker failed"),
            }
        }
        drop(refill);

        let stats = set.stats();
        debug!(
            requested = stats.requested,
            attempts = stats.attempts,
            attributed = stats.attributed,
            rate_limited = stats.rate_limited,
            transport_errors = stats.transport_errors,
            refills = budget.refills(),
            "attribution batch complete"
        );
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;
    use tally_core::error::AttributionErrorKind;
    use tally_core::traits::HttpReply;
    use tokio::time::Instant;

    const WINDOW: Duration = Duration::from_millis(2_200);

    // ------------------------------------------------------------------
    // Mock: AttributionTransport
    // ------------------------------------------------------------------

    /// Answers per signature from a fixed table (404 when absent), after a
    /// fixed latency, and logs when each request started.
    struct TableTransport {
        replies: Mutex<HashMap<String, Vec<HttpReply>>>,
        latency: Duration,
        started: Mutex<Vec<(String, Instant)>>,
    }

    impl TableTransport {
        fn new(latency: Duration) -> Self {
            Self {
                replies: Mutex::new(HashMap::new()),
                latency,
                started: Mutex::new(Vec::new()),
            }
        }

        fn with(self, sig: &str, replies: Vec<HttpReply>) -> Self {
            self.replies.lock().insert(sig.to_string(), replies);
            self
        }

        fn calls_for(&self, sig: &str) -> usize {
            self.started.lock().iter().filter(|(s, _)| s == sig).count()
        }
    }

    #[async_trait]
    impl AttributionTransport for TableTransport {
        async fn get_bundles(&self, signature: &str) -> Result<HttpReply, String> {
            self.started.lock().push((signature.to_string(), Instant::now()));
            tokio::time::sleep(self.latency).await;
            let mut replies = self.replies.lock();
            match replies.get_mut(signature) {
                Some(queue) if queue.len() > 1 => Ok(queue.remove(0)),
                Some(queue) => Ok(queue[0].clone()),
                None => Ok(HttpReply::new(404, "")),
            }
        }
    }

    fn tx(sig: &str) -> Transaction {
        Transaction::new(vec![sig.to_string()], 5_000, vec![])
    }

    fn bundle(id: &str) -> HttpReply {
        HttpReply::new(200, format!(r#"[{{"bundle_id":"{id}"}}]"#))
    }

    fn config() -> AttributionConfig {
        AttributionConfig { window: WINDOW, ..AttributionConfig::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn one_terminal_result_per_signature() {
        let transport = Arc::new(
            TableTransport::new(Duration::from_millis(40))
                .with("a", vec![bundle("B1")])
                .with("b", vec![bundle("B1")])
                .with("c", vec![HttpReply::new(500, "")])
                .with("d", vec![HttpReply::new(429, "")]),
        );
        let coord = Coordinator::new(transport.clone(), config());
        let txs: Vec<Transaction> = ["a", "b", "c", "d", "e", "f"].iter().map(|s| tx(s)).collect();

        let set = coord.attribute(&txs, 20).await;
        assert_eq!(set.len(), 6);
        assert_eq!(set.get("a"), Some(&AttributionResult::Attributed("B1".into())));
        assert_eq!(set.get("b"), Some(&AttributionResult::Attributed("B1".into())));
        assert_eq!(set.get("c"), Some(&AttributionResult::Error(AttributionErrorKind::Transport)));
        assert_eq!(set.get("d"), Some(&AttributionResult::Error(AttributionErrorKind::RateLimited)));
        assert_eq!(set.get("e"), Some(&AttributionResult::NotAttributed));

        assert_eq!(transport.calls_for("d"), 5, "retry bound respected");
        assert_eq!(transport.calls_for("c"), 1);
        let stats = set.stats();
        assert_eq!(stats.attempts, 5 + 5);
        assert_eq!(stats.attributed, 2);
        assert_eq!(set.bundle_ids().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_per_window_never_exceed_capacity() {
        let transport = Arc::new(TableTransport::new(Duration::from_millis(150)));
        let coord = Coordinator::new(transport.clone(), config());
        let txs: Vec<Transaction> = (0..47).map(|i| tx(&format!("s{i}"))).collect();

        let start = Instant::now();
        let set = coord.attribute(&txs, 10).await;
        assert_eq!(set.len(), 47);

        let mut per_window = BTreeMap::<u128, usize>::new();
        for (_, at) in transport.started.lock().iter() {
            let w = at.duration_since(start).as_nanos() / WINDOW.as_nanos();
            *per_window.entry(w).or_default() += 1;
        }
        assert!(per_window.values().all(|&n| n <= 10), "budget overdrawn: {per_window:?}");
        assert_eq!(per_window.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_signatures_are_looked_up_once() {
        let transport = Arc::new(TableTransport::new(Duration::ZERO).with("a", vec![bundle("B")]));
        let coord = Coordinator::new(transport.clone(), config());
        let set = coord.attribute(&[tx("a"), tx("a"), tx("b")], 20).await;
        assert_eq!(set.len(), 2);
        assert_eq!(transport.calls_for("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unsigned_transactions_are_skipped() {
        let transport = Arc::new(TableTransport::new(Duration::ZERO));
        let coord = Coordinator::new(transport.clone(), config());
        let set = coord.attribute(&[Transaction::default(), tx("a")], 20).await;
        assert_eq!(set.len(), 1);
        assert_eq!(transport.started.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_returns_immediately() {
        let transport = Arc::new(TableTransport::new(Duration::ZERO));
        let coord = Coordinator::new(transport, config());
        let start = Instant::now();
        let set = coord.attribute(&Vec::<Transaction>::new(), 20).await;
        assert!(set.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_cap_preserves_results() {
        let transport = Arc::new(
            TableTransport::new(Duration::from_millis(100)).with("s3", vec![bundle("B3")]),
        );
        let coord = Coordinator::new(
            transport.clone(),
            AttributionConfig { max_in_flight: Some(2), ..config() },
        );
        let txs: Vec<Transaction> = (0..8).map(|i| tx(&format!("s{i}"))).collect();
        let progress = Arc::new(Progress::default());
        let set = coord.attribute_with_progress(&txs, 100, Arc::clone(&progress)).await;

        assert_eq!(set.len(), 8);
        assert_eq!(set.get("s3"), Some(&AttributionResult::Attributed("B3".into())));
        assert_eq!(progress.completed(), 8);
        assert_eq!(progress.total(), 8);
        assert_eq!(progress.attributed(), 1);
    }
}
