//! The narrow persistence interface the coordinator consumes. The real storage engine and
//! its TTL monitor on `expireAt` are outside this core's scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoordinatorError;
use crate::types::{Decision, TransactionDocument, TxnId};

#[async_trait]
pub trait CoordinatorRepository: Send + Sync {
    /// Upserts the participant list. Idempotent: succeeds both when no document exists yet
    /// and when one exists with an identical participant list; fails with
    /// [`CoordinatorError::DuplicateKey`] if an existing document's list differs.
    async fn upsert_participants(&self, doc: &TransactionDocument) -> Result<(), CoordinatorError>;

    async fn load(&self, id: &TxnId) -> Result<Option<TransactionDocument>, CoordinatorError>;

    /// Persists `decision`. Idempotent: succeeds when no decision is durable yet and when an
    /// identical decision is already durable; fails with
    /// [`CoordinatorError::DecisionConflict`] otherwise.
    async fn persist_decision(&self, id: &TxnId, decision: Decision) -> Result<(), CoordinatorError>;

    async fn set_expire_at(&self, id: &TxnId, expire_at: DateTime<Utc>) -> Result<(), CoordinatorError>;

    /// All documents, for the startup recovery sweep.
    async fn list_all(&self) -> Result<Vec<TransactionDocument>, CoordinatorError>;

    /// Ids whose `expireAt` has passed and whose decision is present, for the GC sweeper.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<TxnId>, CoordinatorError>;

    async fn delete(&self, id: &TxnId) -> Result<(), CoordinatorError>;
}
