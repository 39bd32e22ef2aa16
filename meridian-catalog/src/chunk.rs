//! Chunk and chunk-version types: the unit the catalog cache partitions a sharded
//! collection's key space into.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use meridian_core::{ShardId, ShardKeyTuple};
use uuid::Uuid;

/// Identifies a collection's incarnation. Changes only across drop/recreate; stable across
/// ordinary chunk splits, merges, and moves.
pub type Epoch = Uuid;

/// `(major, minor, epoch, timestamp)`. Ordering between two versions is only meaningful
/// within the same epoch — comparing across epochs is a caller bug the type does not try to
/// prevent, since the whole point of an epoch change is that versions become incomparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkVersion {
    pub major: u64,
    pub minor: u64,
    pub epoch: Epoch,
    pub timestamp: DateTime<Utc>,
}

impl ChunkVersion {
    pub fn new(major: u64, minor: u64, epoch: Epoch, timestamp: DateTime<Utc>) -> Self {
        Self { major, minor, epoch, timestamp }
    }

    /// Ordering of the `(major, minor)` pair alone, ignoring epoch. Callers must have
    /// already established both versions share an epoch; see [`ChunkVersion::same_epoch_cmp`].
    fn major_minor(&self) -> (u64, u64) {
        (self.major, self.minor)
    }

    /// Compares two versions known to share an epoch. Returns `None` if they do not — this
    /// is the epoch-change case the catalog cache must treat as "incomparable, re-resolve".
    pub fn same_epoch_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.epoch != other.epoch {
            return None;
        }
        Some(self.major_minor().cmp(&other.major_minor()))
    }
}

/// A half-open range `[min, max)` over shard-key tuples, owned by exactly one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub min: ShardKeyTuple,
    pub max: ShardKeyTuple,
    pub owner: ShardId,
    pub version: ChunkVersion,
}

impl Chunk {
    pub fn new(min: ShardKeyTuple, max: ShardKeyTuple, owner: ShardId, version: ChunkVersion) -> Self {
        Self { min, max, owner, version }
    }

    /// Whether `key` falls within this chunk's half-open range.
    pub fn contains(&self, key: &ShardKeyTuple) -> bool {
        key >= &self.min && key < &self.max
    }
}
