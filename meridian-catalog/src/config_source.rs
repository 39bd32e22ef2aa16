//! The narrow interface the catalog cache consumes to read the `databases`, `collections`,
//! and `chunks` configuration collections. The real storage and replication of those
//! collections is outside this core's scope; it depends only on this trait.

use async_trait::async_trait;
use meridian_core::{ShardId, ShardKeyPattern};

use crate::chunk::{Chunk, ChunkVersion, Epoch};
use crate::error::CatalogError;
use crate::namespace::Namespace;
use crate::routing_table::ReshardingMetadata;

/// A database's entry in the `databases` configuration collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRecord {
    pub name: String,
    pub primary: ShardId,
    pub sharded: bool,
}

/// A collection's entry in the `collections` configuration collection. Absence of this
/// record (but presence of the database) means the collection is unsharded.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRecord {
    pub namespace: Namespace,
    pub epoch: Epoch,
    pub shard_key: ShardKeyPattern,
    pub resharding: Option<ReshardingMetadata>,
}

#[async_trait]
pub trait CatalogConfigSource: Send + Sync {
    async fn get_database(&self, db_name: &str) -> Result<Option<DatabaseRecord>, CatalogError>;

    async fn get_collection(&self, nss: &Namespace) -> Result<Option<CollectionRecord>, CatalogError>;

    /// All chunks for `nss` at `epoch` — used by the full-load path.
    async fn list_chunks(&self, nss: &Namespace, epoch: Epoch) -> Result<Vec<Chunk>, CatalogError>;

    /// Chunks for `nss` at `epoch` whose version is `>= since` — the differential query used
    /// by the incremental-load path.
    async fn list_chunks_since(
        &self,
        nss: &Namespace,
        epoch: Epoch,
        since: ChunkVersion,
    ) -> Result<Vec<Chunk>, CatalogError>;
}
