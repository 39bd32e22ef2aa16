//! Transaction identity and the persistent transaction document shape.

use chrono::{DateTime, Utc};
use meridian_core::ShardId;
use uuid::Uuid;

/// A logical session id, scoping a sequence of transaction numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalSessionId(pub Uuid);

/// `(logical-session-id, transaction-number)`: the coordinator's persistent document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId {
    pub session: LogicalSessionId,
    pub txn_number: i64,
}

impl TxnId {
    pub fn new(session: LogicalSessionId, txn_number: i64) -> Self {
        Self { session, txn_number }
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.session.0, self.txn_number)
    }
}

/// The coordinator's final word on a transaction. Written once and never changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Commit { commit_timestamp: DateTime<Utc> },
    Abort { reason: String },
}

/// The persistent document keyed by `(session, txn_number)`. `participants` is frozen the
/// moment it is first durable; `decision` is written at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDocument {
    pub id: TxnId,
    pub participants: Vec<ShardId>,
    pub decision: Option<Decision>,
    pub expire_at: Option<DateTime<Utc>>,
}

impl TransactionDocument {
    pub fn new(id: TxnId, participants: Vec<ShardId>) -> Self {
        Self { id, participants, decision: None, expire_at: None }
    }
}
