//! # Shard Registry
//!
//! Name resolution from shard id to connection descriptor. This is the simplest of the
//! core's coordinators, but every other component depends on it: the chunk router stamps
//! owner ids it never resolves itself, and the transaction coordinator resolves a
//! participant id to a descriptor immediately before every fan-out RPC.
//!
//! ## Concurrency
//!
//! Reads never block on other reads: the registry is backed by a [`DashMap`], so concurrent
//! `lookup`/`list` calls proceed independently. `reload()` replaces the whole map and is the
//! only writer-serialising operation; it is cheap enough (a handful of shards, reloaded on a
//! cache miss) that a simple "clear and re-insert under the same map" is sufficient, with no
//! separate writer lock needed beyond what `DashMap` already provides per-shard.
//!
//! A reader that observes [`ShardRegistryError::ShardNotFound`] may have raced with a
//! concurrent removal or a stale `reload`; callers must treat this as retryable, not fatal —
//! [`ShardRegistry::resolve`] embodies that retry policy directly.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Unique identifier for a shard within the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(pub String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the core needs to address a shard; the actual connection machinery (wire
/// protocol, pooling, auth) is external to this core and consumes only this descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub id: ShardId,
    pub connection_string: String,
    pub tags: Vec<String>,
}

/// Errors surfaced by the shard registry.
#[derive(Debug, Error)]
pub enum ShardRegistryError {
    #[error("shard not found: {0}")]
    ShardNotFound(ShardId),

    #[error("failed to reload shard registry from configuration store: {0}")]
    ReloadFailed(String),
}

/// The narrow collaborator interface the registry consumes to refresh its membership view.
/// The real implementation reads the `shards` configuration collection; this core only
/// depends on the trait.
#[async_trait::async_trait]
pub trait ShardConfigSource: Send + Sync {
    async fn load_shards(&self) -> Result<Vec<ShardDescriptor>, ShardRegistryError>;
}

/// Tracks shard id → connection descriptor, refreshed from an external configuration store.
pub struct ShardRegistry {
    shards: DashMap<ShardId, ShardDescriptor>,
    config_source: Arc<dyn ShardConfigSource>,
    /// Bumped only when a `reload()` actually changes the observed shard set, so a burst of
    /// lazy reloads triggered by concurrent `ShardNotFound` misses doesn't spam `info!` logs
    /// or fool callers comparing generations into thinking membership churned.
    generation: AtomicU64,
    /// Fingerprint of the last-loaded shard set, used to detect a no-op reload.
    fingerprint: Mutex<Option<[u8; 32]>>,
}

impl ShardRegistry {
    pub fn new(config_source: Arc<dyn ShardConfigSource>) -> Self {
        Self {
            shards: DashMap::new(),
            config_source,
            generation: AtomicU64::new(0),
            fingerprint: Mutex::new(None),
        }
    }

    /// Exact lookup; does not trigger a reload on miss. See [`Self::resolve`] for the
    /// reload-on-miss convenience wrapper most callers want.
    pub fn lookup(&self, id: &ShardId) -> Result<ShardDescriptor, ShardRegistryError> {
        self.shards
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ShardRegistryError::ShardNotFound(id.clone()))
    }

    pub fn add(&self, descriptor: ShardDescriptor) {
        debug!(shard = %descriptor.id, "adding shard to registry");
        self.shards.insert(descriptor.id.clone(), descriptor);
    }

    pub fn remove(&self, id: &ShardId) {
        debug!(shard = %id, "removing shard from registry");
        self.shards.remove(id);
    }

    pub fn list(&self) -> Vec<ShardDescriptor> {
        self.shards.iter().map(|e| e.value().clone()).collect()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(AtomicOrdering::Acquire)
    }

    /// Look up a shard, transparently performing exactly one reload-and-retry if the shard
    /// is initially unknown. This is the policy callers should use for anything triggered by
    /// routing a live request; [`Self::lookup`] alone is for call sites that already know
    /// reload is someone else's job (e.g. a background sweep).
    pub async fn resolve(&self, id: &ShardId) -> Result<ShardDescriptor, ShardRegistryError> {
        match self.lookup(id) {
            Ok(descriptor) => Ok(descriptor),
            Err(ShardRegistryError::ShardNotFound(_)) => {
                self.reload().await?;
                self.lookup(id)
            }
            Err(other) => Err(other),
        }
    }

    /// Refresh shard membership from the configuration store. Returns whether the observed
    /// shard set actually changed.
    pub async fn reload(&self) -> Result<bool, ShardRegistryError> {
        let loaded = self.config_source.load_shards().await?;

        let fingerprint = fingerprint_of(&loaded);
        let mut last = self.fingerprint.lock().await;
        if *last == Some(fingerprint) {
            debug!("shard registry reload observed no membership change");
            return Ok(false);
        }

        self.shards.clear();
        for descriptor in loaded {
            self.shards.insert(descriptor.id.clone(), descriptor);
        }
        *last = Some(fingerprint);
        drop(last);

        let gen = self.generation.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        info!(generation = gen, shard_count = self.shards.len(), "shard registry membership changed");
        Ok(true)
    }
}

fn fingerprint_of(shards: &[ShardDescriptor]) -> [u8; 32] {
    let mut sorted: Vec<&ShardDescriptor> = shards.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = blake3::Hasher::new();
    for descriptor in sorted {
        hasher.update(descriptor.id.0.as_bytes());
        hasher.update(b"\0");
        hasher.update(descriptor.connection_string.as_bytes());
        hasher.update(b"\0");
        for tag in &descriptor.tags {
            hasher.update(tag.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"\n");
    }
    *hasher.finalize().as_bytes()
}
