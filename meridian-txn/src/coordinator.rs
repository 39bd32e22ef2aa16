//! The Transaction Coordinator: drives one cross-shard transaction from a participant list
//! to a durable global decision and its propagation.
//!
//! The linear two-phase-commit state machine is expressed here not as a tagged enum the
//! coordinator loops over in memory, but as a sequence of `async fn`s each gated on the
//! durable transition before it — the durable document *is* the state. [`TransactionCoordinator::recover`]
//! reconstructs exactly this same sequence from whatever subset of fields is durable after a restart.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::fanout::{decision_fanout, prepare_fanout};
use crate::repository::CoordinatorRepository;
use crate::transport::ShardTransport;
use crate::types::{Decision, TransactionDocument, TxnId};
use meridian_core::ShardId;

pub struct TransactionCoordinator {
    repo: Arc<dyn CoordinatorRepository>,
    transport: Arc<dyn ShardTransport>,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    pub fn new(
        repo: Arc<dyn CoordinatorRepository>,
        transport: Arc<dyn ShardTransport>,
        config: CoordinatorConfig,
    ) -> Self {
        Self { repo, transport, config }
    }

    /// Drives a fresh transaction end to end: persist participants, prepare, decide, persist
    /// decision, propagate, mark for GC. Every step is idempotent, so a caller that retries
    /// this whole call after a crash (or that calls [`Self::recover`] instead) converges on
    /// the same terminal decision.
    pub async fn run(
        &self,
        id: TxnId,
        participants: Vec<ShardId>,
        cancel: &CancellationToken,
    ) -> Result<Decision, CoordinatorError> {
        self.persist_participants(id, participants.clone()).await?;
        self.drive_from_prepare(id, participants, cancel).await
    }

    /// kUninitialized → kDataSync: upsert the participant list. Idempotent per
    /// [`CoordinatorRepository::upsert_participants`]'s contract.
    async fn persist_participants(&self, id: TxnId, participants: Vec<ShardId>) -> Result<(), CoordinatorError> {
        let doc = TransactionDocument::new(id, participants);
        self.repo.upsert_participants(&doc).await
    }

    /// kDataSync → (kBlocking | kAborted): prepare fan-out, then persist whichever decision
    /// resulted, then propagate it.
    async fn drive_from_prepare(
        &self,
        id: TxnId,
        participants: Vec<ShardId>,
        cancel: &CancellationToken,
    ) -> Result<Decision, CoordinatorError> {
        let decision = prepare_fanout(&self.transport, &id, &participants, &self.config, cancel).await;
        self.persist_decision(id, decision.clone()).await?;
        self.drive_from_decision(id, participants, decision, cancel).await
    }

    /// kBlocking/kAborted → committed/aborted + garbage-collectable: this is also the entry
    /// point recovery resumes at when a decision is already durable, since the fan-out here
    /// is idempotent at the shard side regardless of how many times it is re-driven.
    async fn drive_from_decision(
        &self,
        id: TxnId,
        participants: Vec<ShardId>,
        decision: Decision,
        cancel: &CancellationToken,
    ) -> Result<Decision, CoordinatorError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
            result = decision_fanout(&self.transport, &id, &participants, &decision, &self.config) => {
                result?;
            }
        }
        let expire_at = Utc::now() + ChronoDuration::seconds(self.config.gc_delay_secs);
        self.repo.set_expire_at(&id, expire_at).await?;
        info!(txn = %id, ?decision, "transaction settled and marked for garbage collection");
        Ok(decision)
    }

    /// Persists the decision. Idempotent per
    /// [`CoordinatorRepository::persist_decision`]'s contract: a retry of an identical
    /// decision is a no-op success.
    async fn persist_decision(&self, id: TxnId, decision: Decision) -> Result<(), CoordinatorError> {
        self.repo.persist_decision(&id, decision).await
    }

    /// Reads every persisted transaction document and re-drives each from the state implied
    /// by which fields are present: participants only ⇒ re-drive from prepare; decision
    /// present ⇒ re-drive the corresponding fan-out. Called once at process startup.
    pub async fn recover(&self, cancel: &CancellationToken) -> Result<Vec<TxnId>, CoordinatorError> {
        let docs = self.repo.list_all().await?;
        let mut recovered = Vec::with_capacity(docs.len());
        for doc in docs {
            if cancel.is_cancelled() {
                break;
            }
            let id = doc.id;
            self.recover_one(doc, cancel).await?;
            recovered.push(id);
        }
        Ok(recovered)
    }

    async fn recover_one(&self, doc: TransactionDocument, cancel: &CancellationToken) -> Result<(), CoordinatorError> {
        info!(txn = %doc.id, has_decision = doc.decision.is_some(), "recovering transaction after restart");
        match doc.decision {
            Some(decision) => {
                self.drive_from_decision(doc.id, doc.participants, decision, cancel).await?;
            }
            None => {
                self.drive_from_prepare(doc.id, doc.participants, cancel).await?;
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn CoordinatorRepository> {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PrepareVote;
    use crate::types::LogicalSessionId;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct InMemoryRepo {
        docs: StdMutex<HashMap<TxnId, TransactionDocument>>,
    }

    #[async_trait]
    impl CoordinatorRepository for InMemoryRepo {
        async fn upsert_participants(&self, doc: &TransactionDocument) -> Result<(), CoordinatorError> {
            let mut docs = self.docs.lock().unwrap();
            match docs.get(&doc.id) {
                None => {
                    docs.insert(doc.id, doc.clone());
                    Ok(())
                }
                Some(existing) if existing.participants == doc.participants => Ok(()),
                Some(_) => Err(CoordinatorError::DuplicateKey),
            }
        }

        async fn load(&self, id: &TxnId) -> Result<Option<TransactionDocument>, CoordinatorError> {
            Ok(self.docs.lock().unwrap().get(id).cloned())
        }

        async fn persist_decision(&self, id: &TxnId, decision: Decision) -> Result<(), CoordinatorError> {
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.get_mut(id).ok_or_else(|| CoordinatorError::NotFound(id.to_string()))?;
            match &doc.decision {
                None => {
                    doc.decision = Some(decision);
                    Ok(())
                }
                Some(existing) if *existing == decision => Ok(()),
                Some(_) => Err(CoordinatorError::DecisionConflict),
            }
        }

        async fn set_expire_at(&self, id: &TxnId, expire_at: DateTime<Utc>) -> Result<(), CoordinatorError> {
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.get_mut(id).ok_or_else(|| CoordinatorError::NotFound(id.to_string()))?;
            doc.expire_at = Some(expire_at);
            Ok(())
        }

        async fn list_all(&self) -> Result<Vec<TransactionDocument>, CoordinatorError> {
            Ok(self.docs.lock().unwrap().values().cloned().collect())
        }

        async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<TxnId>, CoordinatorError> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .values()
                .filter(|d| d.decision.is_some() && d.expire_at.map(|e| e <= now).unwrap_or(false))
                .map(|d| d.id)
                .collect())
        }

        async fn delete(&self, id: &TxnId) -> Result<(), CoordinatorError> {
            self.docs.lock().unwrap().remove(id);
            Ok(())
        }
    }

    struct ScriptedTransport {
        votes: HashMap<String, PrepareVote>,
        commits_received: StdMutex<Vec<String>>,
        aborts_received: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ShardTransport for ScriptedTransport {
        async fn prepare_transaction(&self, shard: &ShardId, _txn: &TxnId) -> Result<PrepareVote, crate::error::TransportError> {
            Ok(self.votes.get(&shard.0).cloned().expect("scripted vote for shard"))
        }

        async fn commit_transaction(&self, shard: &ShardId, _txn: &TxnId, _ts: DateTime<Utc>) -> Result<(), crate::error::TransportError> {
            self.commits_received.lock().unwrap().push(shard.0.clone());
            Ok(())
        }

        async fn abort_transaction(&self, shard: &ShardId, _txn: &TxnId) -> Result<(), crate::error::TransportError> {
            self.aborts_received.lock().unwrap().push(shard.0.clone());
            Ok(())
        }
    }

    fn participants(names: &[&str]) -> Vec<ShardId> {
        names.iter().map(|n| ShardId::new(*n)).collect()
    }

    fn txn_id() -> TxnId {
        TxnId::new(LogicalSessionId(Uuid::new_v4()), 1)
    }

    #[tokio::test]
    async fn abort_wins_prepare_and_reaches_all_participants() {
        let mut votes = HashMap::new();
        votes.insert("s1".to_string(), PrepareVote::Commit { prepare_timestamp: Utc::now() });
        votes.insert("s2".to_string(), PrepareVote::Abort { reason: "s2 says no".into() });
        votes.insert("s3".to_string(), PrepareVote::Commit { prepare_timestamp: Utc::now() });

        let transport = Arc::new(ScriptedTransport {
            votes,
            commits_received: StdMutex::new(vec![]),
            aborts_received: StdMutex::new(vec![]),
        });
        let repo = Arc::new(InMemoryRepo::default());
        let coordinator = TransactionCoordinator::new(repo.clone(), transport.clone(), CoordinatorConfig::default());

        let id = txn_id();
        let decision = coordinator.run(id, participants(&["s1", "s2", "s3"]), &CancellationToken::new()).await.unwrap();
        assert!(matches!(decision, Decision::Abort { .. }));

        let mut aborted: Vec<String> = transport.aborts_received.lock().unwrap().clone();
        aborted.sort();
        assert_eq!(aborted, vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]);

        let doc = repo.load(&id).await.unwrap().unwrap();
        assert!(matches!(doc.decision, Some(Decision::Abort { .. })));
    }

    #[tokio::test]
    async fn all_commit_votes_decide_commit_at_max_timestamp() {
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(5);
        let mut votes = HashMap::new();
        votes.insert("s1".to_string(), PrepareVote::Commit { prepare_timestamp: t1 });
        votes.insert("s2".to_string(), PrepareVote::Commit { prepare_timestamp: t2 });

        let transport = Arc::new(ScriptedTransport {
            votes,
            commits_received: StdMutex::new(vec![]),
            aborts_received: StdMutex::new(vec![]),
        });
        let repo = Arc::new(InMemoryRepo::default());
        let coordinator = TransactionCoordinator::new(repo.clone(), transport.clone(), CoordinatorConfig::default());

        let id = txn_id();
        let decision = coordinator.run(id, participants(&["s1", "s2"]), &CancellationToken::new()).await.unwrap();
        match decision {
            Decision::Commit { commit_timestamp } => assert_eq!(commit_timestamp, t2),
            Decision::Abort { .. } => panic!("expected commit"),
        }
        let mut committed: Vec<String> = transport.commits_received.lock().unwrap().clone();
        committed.sort();
        assert_eq!(committed, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[tokio::test]
    async fn recovery_redrives_from_durable_decision_without_reconsulting_votes() {
        let mut votes = HashMap::new();
        // If recovery were to re-run prepare instead of re-driving from the durable decision,
        // these abort votes would flip the outcome; the durable commit decision must win.
        votes.insert("s1".to_string(), PrepareVote::Abort { reason: "should never be consulted".into() });

        let transport = Arc::new(ScriptedTransport {
            votes,
            commits_received: StdMutex::new(vec![]),
            aborts_received: StdMutex::new(vec![]),
        });
        let repo = Arc::new(InMemoryRepo::default());
        let id = txn_id();
        let commit_ts = Utc::now();
        repo.docs.lock().unwrap().insert(
            id,
            TransactionDocument {
                id,
                participants: participants(&["s1"]),
                decision: Some(Decision::Commit { commit_timestamp: commit_ts }),
                expire_at: None,
            },
        );

        let coordinator = TransactionCoordinator::new(repo.clone(), transport.clone(), CoordinatorConfig::default());
        coordinator.recover(&CancellationToken::new()).await.unwrap();

        assert_eq!(transport.commits_received.lock().unwrap().clone(), vec!["s1".to_string()]);
        let doc = repo.load(&id).await.unwrap().unwrap();
        assert!(doc.expire_at.is_some());
    }

    struct FaultyCommitTransport {
        vote_abort_on_commit: String,
    }

    #[async_trait]
    impl ShardTransport for FaultyCommitTransport {
        async fn prepare_transaction(&self, _shard: &ShardId, _txn: &TxnId) -> Result<PrepareVote, crate::error::TransportError> {
            Ok(PrepareVote::Commit { prepare_timestamp: Utc::now() })
        }

        async fn commit_transaction(&self, shard: &ShardId, _txn: &TxnId, _ts: DateTime<Utc>) -> Result<(), crate::error::TransportError> {
            if shard.0 == self.vote_abort_on_commit {
                Err(crate::error::TransportError::VoteAbort("diverged participant state".into()))
            } else {
                Ok(())
            }
        }

        async fn abort_transaction(&self, _shard: &ShardId, _txn: &TxnId) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn vote_abort_during_commit_fanout_surfaces_as_invariant_violation() {
        let transport = Arc::new(FaultyCommitTransport { vote_abort_on_commit: "s2".to_string() });
        let repo = Arc::new(InMemoryRepo::default());
        let coordinator = TransactionCoordinator::new(repo.clone(), transport.clone(), CoordinatorConfig::default());

        let id = txn_id();
        let result = coordinator.run(id, participants(&["s1", "s2"]), &CancellationToken::new()).await;
        assert!(matches!(result, Err(CoordinatorError::InvariantViolation { .. })));

        // The decision itself is still durable even though propagation to s2 failed.
        let doc = repo.load(&id).await.unwrap().unwrap();
        assert!(matches!(doc.decision, Some(Decision::Commit { .. })));
    }

    #[tokio::test]
    async fn idempotent_participant_persistence_accepts_identical_retry() {
        let repo = Arc::new(InMemoryRepo::default());
        let id = txn_id();
        let doc = TransactionDocument::new(id, participants(&["s1", "s2"]));
        repo.upsert_participants(&doc).await.unwrap();
        repo.upsert_participants(&doc).await.unwrap();

        let mut different = doc.clone();
        different.participants = participants(&["s1", "s3"]);
        assert!(matches!(repo.upsert_participants(&different).await, Err(CoordinatorError::DuplicateKey)));
    }
}
