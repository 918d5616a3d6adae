//! Attribution client configuration.

use std::time::Duration;

use tally_core::constants::{
    BUDGET_WINDOW, DEFAULT_BUNDLES_URL, LOOKUP_RETRY_BACKOFF, LOOKUP_TIMEOUT, MAX_LOOKUP_ATTEMPTS,
};

/// Settings for talking to the bundle attribution service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionConfig {
    /// Base URL of the bundle explorer API.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Requests per signature before a throttled lookup gives up.
    pub max_attempts: u32,
    /// Delay between throttled attempts.
    pub retry_backoff: Duration,
    /// Rate-budget refill period.
    pub window: Duration,
    /// Cap on concurrently running lookups. `None` spawns every lookup at
    /// once and lets the budget alone pace them.
    pub max_in_flight: Option<usize>,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BUNDLES_URL.to_string(),
            timeout: LOOKUP_TIMEOUT,
            max_attempts: MAX_LOOKUP_ATTEMPTS,
            retry_backoff: LOOKUP_RETRY_BACKOFF,
            window: BUDGET_WINDOW,
            max_in_flight: None,
        }
    }
}
