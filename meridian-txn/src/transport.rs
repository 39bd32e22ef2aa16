//! The narrow RPC interface the coordinator consumes to drive each participant shard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::ShardId;

use crate::error::TransportError;
use crate::types::TxnId;

/// A participant's vote in response to `prepareTransaction`.
#[derive(Debug, Clone, PartialEq)]
pub enum PrepareVote {
    Commit { prepare_timestamp: DateTime<Utc> },
    Abort { reason: String },
}

#[async_trait]
pub trait ShardTransport: Send + Sync {
    async fn prepare_transaction(&self, shard: &ShardId, txn: &TxnId) -> Result<PrepareVote, TransportError>;

    async fn commit_transaction(
        &self,
        shard: &ShardId,
        txn: &TxnId,
        commit_timestamp: DateTime<Utc>,
    ) -> Result<(), TransportError>;

    async fn abort_transaction(&self, shard: &ShardId, txn: &TxnId) -> Result<(), TransportError>;
}
