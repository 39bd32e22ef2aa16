//! Process-lifecycle facade: wires the shard registry, catalog cache, and transaction
//! coordinator into one handle a command layer can share via `Arc`, and owns starting and
//! stopping the coordinator's background garbage-collection sweeper.
//!
//! Mirrors the construct-then-`start`-then-`stop` lifecycle every subsystem in this codebase
//! follows: build every collaborator up front from its pluggable configuration source, bring
//! up background work explicitly, and tear it down on an explicit signal rather than `Drop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meridian_catalog::{CatalogCache, CatalogConfigSource};
use meridian_core::{ShardConfigSource, ShardRegistry};
use meridian_txn::{run_gc_sweeper, CoordinatorConfig, CoordinatorRepository, ShardTransport, TransactionCoordinator};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod config;
mod error;

pub use config::MeridianServerConfig;
pub use error::MeridianServerError;

/// Shared, `Arc`-wrapped handle to the three core components and their lifecycle.
///
/// `init` performs no background work by itself; call [`MeridianCore::start`] once the handle
/// is in place to recover any in-flight transactions and begin the garbage-collection sweeper.
pub struct MeridianCore {
    pub registry: Arc<ShardRegistry>,
    pub catalog: Arc<CatalogCache>,
    pub coordinator: Arc<TransactionCoordinator>,
    config: MeridianServerConfig,
    shutdown: CancellationToken,
    gc_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl MeridianCore {
    /// Builds every component from its configuration source but starts no background tasks.
    /// Callers that only need synchronous routing/lookup (no recovery, no GC) can stop here.
    pub fn init(
        shard_source: Arc<dyn ShardConfigSource>,
        catalog_source: Arc<dyn CatalogConfigSource>,
        coordinator_repo: Arc<dyn CoordinatorRepository>,
        transport: Arc<dyn ShardTransport>,
        config: MeridianServerConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(ShardRegistry::new(shard_source));
        let catalog = Arc::new(CatalogCache::new(catalog_source));
        let coordinator = Arc::new(TransactionCoordinator::new(
            coordinator_repo,
            transport,
            config.coordinator.clone(),
        ));

        Arc::new(Self {
            registry,
            catalog,
            coordinator,
            config,
            shutdown: CancellationToken::new(),
            gc_task: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    /// Recovers any transactions left mid-flight by a prior process and starts the
    /// garbage-collection sweeper. Idempotent: a second call is a no-op.
    pub async fn start(&self) -> Result<(), MeridianServerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("recovering in-flight transactions");
        self.coordinator
            .recover(&self.shutdown)
            .await
            .map_err(MeridianServerError::Recovery)?;

        let repo = self.coordinator.repository().clone();
        let interval = Duration::from_secs(self.config.gc_sweep_interval_secs);
        let cancel = self.shutdown.clone();
        let handle = tokio::spawn(run_gc_sweeper(repo, interval, cancel));
        *self.gc_task.lock().await = Some(handle);

        info!("meridian core started");
        Ok(())
    }

    /// Cancels the garbage-collection sweeper and any in-flight fan-out still respecting the
    /// shutdown token, then waits for the sweeper task to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.gc_task.lock().await.take() {
            let _ = handle.await;
        }
        info!("meridian core shut down");
    }

    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use meridian_catalog::{CatalogError, Chunk, ChunkVersion, CollectionRecord, DatabaseRecord, Namespace};
    use meridian_core::{ShardDescriptor, ShardId, ShardRegistryError};
    use meridian_txn::{CoordinatorError, Decision, PrepareVote, TransactionDocument, TransportError, TxnId};
    use std::sync::Mutex as StdMutex;

    struct NoopShardSource;
    #[async_trait]
    impl ShardConfigSource for NoopShardSource {
        async fn load_shards(&self) -> Result<Vec<ShardDescriptor>, ShardRegistryError> {
            Ok(vec![])
        }
    }

    struct NoopCatalogSource;
    #[async_trait]
    impl CatalogConfigSource for NoopCatalogSource {
        async fn get_database(&self, _db: &str) -> Result<Option<DatabaseRecord>, CatalogError> {
            Ok(None)
        }
        async fn get_collection(&self, _nss: &Namespace) -> Result<Option<CollectionRecord>, CatalogError> {
            Ok(None)
        }
        async fn list_chunks(&self, _nss: &Namespace, _epoch: uuid::Uuid) -> Result<Vec<Chunk>, CatalogError> {
            Ok(vec![])
        }
        async fn list_chunks_since(
            &self,
            _nss: &Namespace,
            _epoch: uuid::Uuid,
            _since: ChunkVersion,
        ) -> Result<Vec<Chunk>, CatalogError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct InMemoryRepo {
        docs: StdMutex<Vec<TransactionDocument>>,
    }
    #[async_trait]
    impl CoordinatorRepository for InMemoryRepo {
        async fn upsert_participants(&self, doc: &TransactionDocument) -> Result<(), CoordinatorError> {
            self.docs.lock().unwrap().push(doc.clone());
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
        async fn list_expired(&self, _now: DateTime<Utc>) -> Result<Vec<TxnId>, CoordinatorError> {
            Ok(vec![])
        }
        async fn delete(&self, _id: &TxnId) -> Result<(), CoordinatorError> {
            Ok(())
        }
    }

    struct NoopTransport;
    #[async_trait]
    impl ShardTransport for NoopTransport {
        async fn prepare_transaction(&self, _shard: &ShardId, _txn: &TxnId) -> Result<PrepareVote, TransportError> {
            Ok(PrepareVote::Commit { prepare_timestamp: Utc::now() })
        }
        async fn commit_transaction(&self, _shard: &ShardId, _txn: &TxnId, _ts: DateTime<Utc>) -> Result<(), TransportError> {
            Ok(())
        }
        async fn abort_transaction(&self, _shard: &ShardId, _txn: &TxnId) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn build() -> Arc<MeridianCore> {
        MeridianCore::init(
            Arc::new(NoopShardSource),
            Arc::new(NoopCatalogSource),
            Arc::new(InMemoryRepo::default()),
            Arc::new(NoopTransport),
            MeridianServerConfig { gc_sweep_interval_secs: 1, ..Default::default() },
        )
    }

    #[tokio::test]
    async fn start_is_idempotent_and_shutdown_stops_the_sweeper() {
        let core = build();
        core.start().await.unwrap();
        core.start().await.unwrap();
        core.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_without_start_does_not_hang() {
        let core = build();
        core.shutdown().await;
    }
}
