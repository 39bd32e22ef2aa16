//! The garbage-collection sweeper: deletes transaction documents whose `expireAt` has passed
//! and whose decision is durable. Runs as a background loop independent of the coordinator's
//! per-transaction driving.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::repository::CoordinatorRepository;

pub async fn run_gc_sweeper(repo: Arc<dyn CoordinatorRepository>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("gc sweeper stopping on cancellation");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&repo).await {
                    warn!(error = %e, "gc sweep failed, will retry next tick");
                }
            }
        }
    }
}

async fn sweep_once(repo: &Arc<dyn CoordinatorRepository>) -> Result<(), crate::error::CoordinatorError> {
    let expired = repo.list_expired(Utc::now()).await?;
    for id in &expired {
        repo.delete(id).await?;
    }
    if !expired.is_empty() {
        debug!(count = expired.len(), "gc sweep deleted expired transaction documents");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordinatorError;
    use crate::types::{Decision, LogicalSessionId, TransactionDocument, TxnId};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::Mutex;

    struct FakeRepo {
        docs: Mutex<Vec<TransactionDocument>>,
    }

    #[async_trait]
    impl CoordinatorRepository for FakeRepo {
        async fn upsert_participants(&self, _doc: &TransactionDocument) -> Result<(), CoordinatorError> {
            Ok(())
        }
        async fn load(&self, id: &TxnId) -> Result<Option<TransactionDocument>, CoordinatorError> {
            Ok(self.docs.lock().unwrap().iter().find(|d| &d.id == id).cloned())
        }
        async fn persist_decision(&self, _id: &TxnId, _decision: Decision) -> Result<(), CoordinatorError> {
            Ok(())
        }
        async fn set_expire_at(&self, _id: &TxnId, _expire_at: DateTime<Utc>) -> Result<(), CoordinatorError> {
            Ok(())
        }
        async fn list_all(&self) -> Result<Vec<TransactionDocument>, CoordinatorError> {
            Ok(self.docs.lock().unwrap().clone())
        }
        async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<TxnId>, CoordinatorError> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.decision.is_some() && d.expire_at.map(|e| e <= now).unwrap_or(false))
                .map(|d| d.id)
                .collect())
        }
        async fn delete(&self, id: &TxnId) -> Result<(), CoordinatorError> {
            self.docs.lock().unwrap().retain(|d| &d.id != id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_decided_documents() {
        let id1 = TxnId::new(LogicalSessionId(uuid::Uuid::new_v4()), 1);
        let id2 = TxnId::new(LogicalSessionId(uuid::Uuid::new_v4()), 2);
        let mut doc1 = TransactionDocument::new(id1, vec![]);
        doc1.decision = Some(Decision::Commit { commit_timestamp: Utc::now() });
        doc1.expire_at = Some(Utc::now() - ChronoDuration::seconds(1));

        let mut doc2 = TransactionDocument::new(id2, vec![]);
        doc2.decision = Some(Decision::Commit { commit_timestamp: Utc::now() });
        doc2.expire_at = Some(Utc::now() + ChronoDuration::seconds(60));

        let repo = Arc::new(FakeRepo { docs: Mutex::new(vec![doc1, doc2]) });
        sweep_once(&(repo.clone() as Arc<dyn CoordinatorRepository>)).await.unwrap();

        let remaining = repo.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, id2);
    }
}
