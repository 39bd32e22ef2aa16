//! Stand-alone process bring-up: file-backed configuration sources and an in-process
//! transaction repository/transport, so `meridiandb` is runnable without an external
//! configuration store or real inter-shard RPC layer. Both of those are explicitly external
//! to the core (see [`meridian_core::registry::ShardConfigSource`] and
//! [`meridian_catalog::CatalogConfigSource`]'s doc comments); this module is the minimal,
//! concrete stand-in a deployment replaces with its real configuration store and wire
//! protocol.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_catalog::{
    CatalogConfigSource, CatalogError, Chunk, ChunkVersion, CollectionRecord, DatabaseRecord, Namespace,
};
use meridian_core::{ShardConfigSource, ShardDescriptor, ShardId, ShardRegistryError};
use meridian_txn::{CoordinatorError, CoordinatorRepository, Decision, PrepareVote, ShardTransport, TransactionDocument, TransportError, TxnId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// On-disk shape of the cluster's static bootstrap configuration: which shards exist, and
/// which databases route to which shard as their primary. Sharded collections are not
/// representable here; an operator wanting a sharded collection configures it through the
/// real configuration store this module stands in for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    pub shards: Vec<ShardEntry>,
    pub databases: Vec<DatabaseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardEntry {
    pub id: String,
    pub connection_string: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseEntry {
    pub name: String,
    pub primary: String,
    #[serde(default)]
    pub sharded: bool,
}

/// Serves [`ShardConfigSource`] and [`CatalogConfigSource`] from a [`ClusterConfig`] loaded
/// once at startup. Collections are always reported unsharded (routed to their database's
/// primary): this loader carries no chunk-configuration format, so every namespace resolves
/// via [`meridian_catalog::routing_table::RoutingTable::Unsharded`].
pub struct StaticClusterSource {
    config: ClusterConfig,
}

impl StaticClusterSource {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ShardConfigSource for StaticClusterSource {
    async fn load_shards(&self) -> Result<Vec<ShardDescriptor>, ShardRegistryError> {
        Ok(self
            .config
            .shards
            .iter()
            .map(|s| ShardDescriptor {
                id: ShardId::new(s.id.clone()),
                connection_string: s.connection_string.clone(),
                tags: s.tags.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl CatalogConfigSource for StaticClusterSource {
    async fn get_database(&self, db_name: &str) -> Result<Option<DatabaseRecord>, CatalogError> {
        Ok(self.config.databases.iter().find(|d| d.name == db_name).map(|d| DatabaseRecord {
            name: d.name.clone(),
            primary: ShardId::new(d.primary.clone()),
            sharded: d.sharded,
        }))
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

/// In-process transaction log. Survives for the life of the running process only; a
/// deployment wanting durability across restarts backs [`CoordinatorRepository`] with its
/// real document store instead.
#[derive(Default)]
pub struct InProcessCoordinatorRepository {
    docs: Mutex<HashMap<TxnId, TransactionDocument>>,
}

#[async_trait]
impl CoordinatorRepository for InProcessCoordinatorRepository {
    async fn upsert_participants(&self, doc: &TransactionDocument) -> Result<(), CoordinatorError> {
        let mut docs = self.docs.lock().await;
        match docs.get(&doc.id) {
            Some(existing) if existing.participants != doc.participants => Err(CoordinatorError::DuplicateKey),
            Some(_) => Ok(()),
            None => {
                docs.insert(doc.id, doc.clone());
                Ok(())
            }
        }
    }

    async fn load(&self, id: &TxnId) -> Result<Option<TransactionDocument>, CoordinatorError> {
        Ok(self.docs.lock().await.get(id).cloned())
    }

    async fn persist_decision(&self, id: &TxnId, decision: Decision) -> Result<(), CoordinatorError> {
        let mut docs = self.docs.lock().await;
        let doc = docs.get_mut(id).ok_or_else(|| CoordinatorError::NotFound(id.to_string()))?;
        match &doc.decision {
            Some(existing) if existing != &decision => Err(CoordinatorError::DecisionConflict),
            Some(_) => Ok(()),
            None => {
                doc.decision = Some(decision);
                Ok(())
            }
        }
    }

    async fn set_expire_at(&self, id: &TxnId, expire_at: DateTime<Utc>) -> Result<(), CoordinatorError> {
        let mut docs = self.docs.lock().await;
        let doc = docs.get_mut(id).ok_or_else(|| CoordinatorError::NotFound(id.to_string()))?;
        doc.expire_at = Some(expire_at);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<TransactionDocument>, CoordinatorError> {
        Ok(self.docs.lock().await.values().cloned().collect())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<TxnId>, CoordinatorError> {
        Ok(self
            .docs
            .lock()
            .await
            .values()
            .filter(|d| d.decision.is_some() && d.expire_at.map(|t| t <= now).unwrap_or(false))
            .map(|d| d.id)
            .collect())
    }

    async fn delete(&self, id: &TxnId) -> Result<(), CoordinatorError> {
        self.docs.lock().await.remove(id);
        Ok(())
    }
}

/// Always votes and acknowledges commit. Stands in for the real inter-shard RPC wire
/// protocol, which this core depends on only through [`ShardTransport`]; a single-process
/// deployment has no participants to disagree with it.
pub struct LoopbackShardTransport;

#[async_trait]
impl ShardTransport for LoopbackShardTransport {
    async fn prepare_transaction(&self, _shard: &ShardId, _txn: &TxnId) -> Result<PrepareVote, TransportError> {
        Ok(PrepareVote::Commit { prepare_timestamp: Utc::now() })
    }

    async fn commit_transaction(&self, _shard: &ShardId, _txn: &TxnId, _commit_timestamp: DateTime<Utc>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn abort_transaction(&self, _shard: &ShardId, _txn: &TxnId) -> Result<(), TransportError> {
        Ok(())
    }
}
