//! Catalog cache and chunk router error types.

use thiserror::Error;

use crate::chunk::ChunkVersion;

#[derive(Debug, Error, Clone)]
pub enum CatalogError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("conflicting operation in progress: {0}")]
    ConflictingOperationInProgress(String),

    #[error("transport error talking to configuration store: {0}")]
    Transport(String),

    #[error("refresh was cancelled")]
    Cancelled,
}

impl CatalogError {
    /// Whether this failure is safe to retry with back-off: only transient transport
    /// conditions recover locally, invariant violations propagate to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Transport(_))
    }
}

/// Errors surfaced by the chunk router, constructed purely from a routing table already in
/// hand — the router performs no I/O, so these never need a retry policy of their own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("predicate does not fully specify the shard key")]
    ShardKeyNotFound,

    #[error("collection is not sharded")]
    NotSharded,
}

/// What a caller should do after a shard reports a stale-version error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleVersionAction {
    /// `reported.epoch != cached.epoch`: discard and perform a full refresh.
    FullRefresh,
    /// `reported > cached` within the same epoch: an incremental refresh suffices.
    IncrementalRefresh,
    /// `reported <= cached`: the reply is stale relative to what we already have; no refresh
    /// needed, just retry with the version we already hold.
    NoRefreshNeeded,
}

pub fn classify_stale_reply(cached: ChunkVersion, reported: ChunkVersion) -> StaleVersionAction {
    match cached.same_epoch_cmp(&reported) {
        None => StaleVersionAction::FullRefresh,
        Some(std::cmp::Ordering::Less) => StaleVersionAction::IncrementalRefresh,
        Some(_) => StaleVersionAction::NoRefreshNeeded,
    }
}
