//! Coordinator error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("participant list conflict: an existing document has a different participant list")]
    DuplicateKey,

    #[error("decision conflict: an existing document has a different decision already durable")]
    DecisionConflict,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("fan-out deadline exceeded before all participants responded")]
    DeadlineExceeded,

    #[error("operation cancelled")]
    Cancelled,

    /// A participant voted abort in response to `commitTransaction`, after the coordinator had
    /// already durably decided to commit. A participant that prepared successfully must commit
    /// when told to; this can only mean the participant's own state diverged from its prepare
    /// vote, and no further fan-out retry can fix that.
    #[error("participant {shard} voted abort during commit fan-out for an already-committed decision: {reason}")]
    InvariantViolation { shard: String, reason: String },
}

/// Errors a participant RPC can fail with. Named by behavioural kind rather than wire-level
/// status codes, so the coordinator's retry and voting logic only has to reason about a
/// handful of cases.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("participant shard not found")]
    ShardNotFound,

    #[error("no such transaction on participant")]
    NoSuchTransaction,

    #[error("participant voted to abort: {0}")]
    VoteAbort(String),

    #[error("retryable network error: {0}")]
    Retryable(String),

    #[error("non-retryable transport error: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Retryable(_))
    }

    /// An unreachable participant (`ShardNotFound`) is an abort-safe vote during prepare.
    pub fn is_abort_safe_vote(&self) -> bool {
        matches!(self, TransportError::ShardNotFound | TransportError::NoSuchTransaction | TransportError::VoteAbort(_))
    }

    /// `NoSuchTransaction` during commit/abort fan-out means the shard already completed
    /// the transaction one way or another, so it counts as an acknowledgement regardless of
    /// which decision the coordinator reached. `VoteAbort` is only ack-equivalent when the
    /// coordinator's own decision is also abort — see [`is_ack_equivalent_for`].
    pub fn is_ack_equivalent(&self) -> bool {
        matches!(self, TransportError::NoSuchTransaction)
    }

    /// Whether this error, received while settling `decision`, represents the participant
    /// having already reached the same outcome the coordinator decided (and so needs no
    /// further retry). A `VoteAbort` received while settling a `Commit` decision is NOT
    /// ack-equivalent: it means the participant disagrees with a decision the coordinator has
    /// already made durable, which is an invariant violation rather than a race to tolerate.
    pub fn is_ack_equivalent_for(&self, decision: &crate::types::Decision) -> bool {
        match self {
            TransportError::NoSuchTransaction => true,
            TransportError::VoteAbort(_) => matches!(decision, crate::types::Decision::Abort { .. }),
            _ => false,
        }
    }
}
