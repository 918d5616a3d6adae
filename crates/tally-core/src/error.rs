//! Error types for bundle tallies.
use thiserror::Error;

/// Terminal failure of a single attribution lookup.
///
/// Carried inside [`AttributionResult::Error`](crate::types::AttributionResult)
/// rather than returned as `Err`: a failed lookup never aborts its batch.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionErrorKind {
    #[error("rate limited")] RateLimited,
    #[error("transport")] Transport,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockSourceError {
    #[error("block not available for slot {slot}: {message}")] NotAvailable { slot: u64, message: String },
    #[error("slot {slot} was skipped: {message}")] Skipped { slot: u64, message: String },
    #[error("rpc error {code} for slot {slot}: {message}")] Rpc { slot: u64, code: i32, message: String },
    #[error("transport error for slot {slot}: {message}")] Transport { slot: u64, message: String },
    #[error("malformed block for slot {slot}: {message}")] Malformed { slot: u64, message: String },
}

impl BlockSourceError {
    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotAvailable { .. } | Self::Transport { .. })
    }

    pub fn slot(&self) -> u64 {
        match self {
            Self::NotAvailable { slot, .. }
            | Self::Skipped { slot, .. }
            | Self::Rpc { slot, .. }
            | Self::Transport { slot, .. }
            | Self::Malformed { slot, .. } => *slot,
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("serialization: {0}")] Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TallyError {
    #[error(transparent)] BlockSource(#[from] BlockSourceError),
    #[error(transparent)] Sink(#[from] SinkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        let na = BlockSourceError::NotAvailable { slot: 1, message: "later".into() };
        let tr = BlockSourceError::Transport { slot: 1, message: "reset".into() };
        let sk = BlockSourceError::Skipped { slot: 1, message: "skipped".into() };
        let rpc = BlockSourceError::Rpc { slot: 1, code: -32602, message: "bad".into() };
        let bad = BlockSourceError::Malformed { slot: 1, message: "eof".into() };
        assert!(na.is_retryable());
        assert!(tr.is_retryable());
        assert!(!sk.is_retryable());
        assert!(!rpc.is_retryable());
        assert!(!bad.is_retryable());
    }

    #[test]
    fn slot_is_reported() {
        let e = BlockSourceError::Skipped { slot: 42, message: String::new() };
        assert_eq!(e.slot(), 42);
        assert!(e.to_string().contains("42"));
    }

    #[test]
    fn kind_display() {
        assert_eq!(AttributionErrorKind::RateLimited.to_string(), "rate limited");
        assert_eq!(AttributionErrorKind::Transport.to_string(), "transport");
    }
}
