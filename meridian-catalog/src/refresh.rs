//! Full and incremental refresh algorithms. Both are pure functions of the config source and
//! (for incremental) the previously cached table; the cache module owns coalescing and
//! mutation of the cached entry, this module owns only what a single refresh attempt does.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config_source::CatalogConfigSource;
use crate::error::CatalogError;
use crate::namespace::Namespace;
use crate::retry::with_retry;
use crate::routing_table::{RoutingTable, ShardedRoutingTable};

const MAX_MERGE_RETRIES: u32 = 3;

/// Full load: used when no prior state exists for the namespace.
pub async fn full_load(
    source: &Arc<dyn CatalogConfigSource>,
    nss: &Namespace,
    cancel: &CancellationToken,
) -> Result<RoutingTable, CatalogError> {
    let database = with_retry(cancel, || source.get_database(nss.db())).await?;
    let database = database.ok_or_else(|| CatalogError::NamespaceNotFound(nss.db().to_string()))?;

    let collection = with_retry(cancel, || source.get_collection(nss)).await?;
    let Some(collection) = collection else {
        return Ok(RoutingTable::Unsharded { primary: database.primary });
    };

    let chunks = with_retry(cancel, || source.list_chunks(nss, collection.epoch)).await?;
    let table = ShardedRoutingTable::build(
        collection.epoch,
        collection.shard_key.clone(),
        chunks,
        collection.resharding.clone(),
    )?;
    Ok(RoutingTable::Sharded(table))
}

/// Incremental load: used to update an existing sharded table. Falls back to a full load if
/// the collection's epoch has moved on since the cached table was built.
pub async fn incremental_load(
    source: &Arc<dyn CatalogConfigSource>,
    nss: &Namespace,
    cached: &ShardedRoutingTable,
    cancel: &CancellationToken,
) -> Result<RoutingTable, CatalogError> {
    let collection = with_retry(cancel, || source.get_collection(nss)).await?;
    let Some(collection) = collection else {
        return Err(CatalogError::NamespaceNotFound(nss.to_string()));
    };

    if collection.epoch != cached.epoch {
        return full_load(source, nss, cancel).await;
    }

    let since = cached.collection_version();
    let mut table = cached.clone();
    let mut attempt = 0;
    loop {
        let fresh = with_retry(cancel, || source.list_chunks_since(nss, collection.epoch, since)).await?;
        match table.merge(fresh) {
            Ok(()) => return Ok(RoutingTable::Sharded(table)),
            Err(e) if attempt < MAX_MERGE_RETRIES => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    namespace = %nss,
                    error = %e,
                    "chunk merge violated partition invariant, retrying incremental refresh"
                );
                table = cached.clone();
            }
            Err(e) => return Err(e),
        }
    }
}
