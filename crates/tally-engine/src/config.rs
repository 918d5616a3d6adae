//! Engine configuration.
//!
//! [`EngineConfig`] carries everything the slot pipeline and turn runner
//! need. Binaries build it from their own settings layer; tests use
//! [`Default`] with struct-update overrides.

use tally_attribution::AttributionConfig;
use tally_core::constants::{DEFAULT_REQUESTS_PER_WINDOW, NUM_CONSECUTIVE_LEADER_SLOTS};

/// Configuration for one tally run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attribution requests allowed per budget window.
    pub requests_per_window: u32,
    /// Consecutive slots grouped into one turn.
    pub turn_size: usize,
    /// Optional turn labels, in turn order. Turns past the end of the list
    /// are named `turn-<index>`.
    pub labels: Vec<String>,
    pub attribution: AttributionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            turn_size: NUM_CONSECUTIVE_LEADER_SLOTS,
            labels: Vec::new(),
            attribution: AttributionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Label of the turn at `index`.
    pub fn turn_label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .filter(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("turn-{index}"))
    }

    /// Turn size, never zero.
    pub fn effective_turn_size(&self) -> usize {
        self.turn_size.max(1)
    }
}
