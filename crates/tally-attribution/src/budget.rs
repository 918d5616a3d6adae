//! Shared request budget with periodic hard reset.
//!
//! A [`RateBudget`] holds `capacity` request permits. Every request consumes
//! one permit; nothing returns it. A refill task started with
//! [`RateBudget::spawn_refill`] resets the count to `capacity` once per
//! window. This is a fixed-window limiter, not a sliding one: at most
//! `capacity` requests start between two consecutive refills.
//!
//! # Design
//!
//! Workers may run on any runtime thread, so the counter is an atomic and the
//! decrement is a compare-and-swap that never goes below zero. Waiters park on
//! a [`Notify`] that the refill wakes. The waiter registers with the `Notify`
//! before re-checking the counter, so a refill landing between the failed
//! check and the park cannot be missed.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// Request permits shared by every worker of one batch.
#[derive(Debug)]
pub struct RateBudget {
    remaining: AtomicU32,
    capacity: u32,
    window: Duration,
    refills: AtomicU64,
    refilled: Notify,
}

impl RateBudget {
    /// Create a full budget.
    ///
    /// `capacity` is clamped to at least 1; a zero budget would park every
    /// worker forever.
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            remaining: AtomicU32::new(capacity),
            capacity,
            window,
            refills: AtomicU64::new(0),
            refilled: Notify::new(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Permits left in the current window.
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Number of refills performed so far.
    pub fn refills(&self) -> u64 {
        self.refills.load(Ordering::Acquire)
    }

    /// Take one permit if any is left.
    pub fn try_acquire(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
            .is_ok()
    }

    /// Take one permit, waiting for the next refill while the budget is empty.
    pub async fn acquire(&self) {
        loop {
            let notified = self.refilled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_acquire() {
                return;
            }
            notified.await;
        }
    }

    /// Reset to full capacity and wake every waiter.
    pub fn refill(&self) {
        self.remaining.store(self.capacity, Ordering::Release);
        let n = self.refills.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(refill = n, capacity = self.capacity, "rate budget refilled");
        self.refilled.notify_waiters();
    }

    /// Start the periodic refill task.
    ///
    /// The first refill happens one window from now; `on_refill` runs after
    /// each one. The task stops when the returned guard is dropped.
    pub fn spawn_refill<F>(self: &Arc<Self>, on_refill: F) -> RefillGuard
    where
        F: Fn() + Send + 'static,
    {
        let budget = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + budget.window, budget.window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                budget.refill();
                on_refill();
            }
        });
        RefillGuard { handle }
    }
}

/// Owns the refill task; aborts it on drop.
#[derive(Debug)]
pub struct RefillGuard {
    handle: JoinHandle<()>,
}

impl Drop for RefillGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
