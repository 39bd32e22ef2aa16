//! The routing table: a versioned chunk index for one sharded collection, plus the
//! unsharded case (a namespace anchored at a single primary shard).

use std::collections::{BTreeMap, HashMap};

use meridian_core::{ShardId, ShardKeyPattern, ShardKeyTuple};

use crate::chunk::{Chunk, ChunkVersion, Epoch};
use crate::error::CatalogError;

/// Identifier the in-progress-resharding metadata carries; opaque to routing decisions.
pub type ReshardingId = uuid::Uuid;

/// Temporary target topology recorded while a collection is mid-resharding. The core does
/// not drive resharding itself; it only carries this metadata so callers know one is
/// underway and can route to the temporary collection if they choose to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReshardingMetadata {
    pub resharding_id: ReshardingId,
    pub temp_collection: String,
    pub new_shard_key: ShardKeyPattern,
}

/// The routing table for a single sharded collection: an ordered chunk index keyed by each
/// chunk's `max`, supporting `lower_bound` in O(log n).
#[derive(Debug, Clone)]
pub struct ShardedRoutingTable {
    pub epoch: Epoch,
    pub shard_key: ShardKeyPattern,
    /// Keyed by chunk `max` so `range(Excluded(key)..)` yields the chunk owning `key` first.
    chunks: BTreeMap<ShardKeyTuple, Chunk>,
    per_shard_version: HashMap<ShardId, ChunkVersion>,
    pub resharding: Option<ReshardingMetadata>,
}

impl ShardedRoutingTable {
    /// Builds a table from an unordered chunk list, validating the total-partition invariant.
    /// All chunks must share `epoch`; the caller (the refresh algorithm) is responsible for
    /// having already filtered to a single epoch.
    pub fn build(
        epoch: Epoch,
        shard_key: ShardKeyPattern,
        chunks: Vec<Chunk>,
        resharding: Option<ReshardingMetadata>,
    ) -> Result<Self, CatalogError> {
        let mut index = BTreeMap::new();
        let mut per_shard_version: HashMap<ShardId, ChunkVersion> = HashMap::new();
        for chunk in chunks {
            if chunk.version.epoch != epoch {
                return Err(CatalogError::ConflictingOperationInProgress(
                    "chunk epoch does not match collection epoch".to_string(),
                ));
            }
            bump_shard_version(&mut per_shard_version, &chunk);
            if index.insert(chunk.max.clone(), chunk).is_some() {
                return Err(CatalogError::ConflictingOperationInProgress(
                    "duplicate chunk max in refresh result".to_string(),
                ));
            }
        }
        let table = Self { epoch, shard_key, chunks: index, per_shard_version, resharding };
        table.validate_partition()?;
        Ok(table)
    }

    /// Total-partition invariant: `min(first) = -∞`, `max(last) = +∞`, and every adjacent
    /// pair's boundary matches exactly.
    pub fn validate_partition(&self) -> Result<(), CatalogError> {
        if self.chunks.is_empty() {
            return Err(CatalogError::ConflictingOperationInProgress(
                "routing table has no chunks".to_string(),
            ));
        }
        let expected_min = ShardKeyTuple::min_for(&self.shard_key);
        let expected_max = ShardKeyTuple::max_for(&self.shard_key);

        let mut prev_max: Option<&ShardKeyTuple> = None;
        for (max_key, chunk) in self.chunks.iter() {
            debug_assert_eq!(max_key, &chunk.max);
            match prev_max {
                None => {
                    if chunk.min != expected_min {
                        return Err(CatalogError::ConflictingOperationInProgress(
                            "first chunk does not start at the minimum key".to_string(),
                        ));
                    }
                }
                Some(prev) => {
                    if chunk.min != *prev {
                        return Err(CatalogError::ConflictingOperationInProgress(format!(
                            "chunk gap or overlap at boundary {:?}",
                            prev
                        )));
                    }
                }
            }
            prev_max = Some(&chunk.max);
        }
        if prev_max != Some(&expected_max) {
            return Err(CatalogError::ConflictingOperationInProgress(
                "last chunk does not end at the maximum key".to_string(),
            ));
        }
        Ok(())
    }

    /// Merges freshly-fetched chunks into this table in place: every incoming chunk
    /// overwrites any cached chunk whose range overlaps it, then the partition invariant is
    /// re-checked. Used by the incremental refresh path.
    pub fn merge(&mut self, incoming: Vec<Chunk>) -> Result<(), CatalogError> {
        for chunk in incoming {
            if chunk.version.epoch != self.epoch {
                return Err(CatalogError::ConflictingOperationInProgress(
                    "incremental refresh observed a chunk from a different epoch".to_string(),
                ));
            }
            let overlapping: Vec<ShardKeyTuple> = self
                .chunks
                .range(..)
                .filter(|(_, existing)| ranges_overlap(existing, &chunk))
                .map(|(k, _)| k.clone())
                .collect();
            for key in overlapping {
                self.chunks.remove(&key);
            }
            bump_shard_version(&mut self.per_shard_version, &chunk);
            self.chunks.insert(chunk.max.clone(), chunk);
        }
        self.validate_partition()
    }

    /// The chunk owning `key`, found by `lower_bound` over chunk `max` values.
    pub fn lower_bound(&self, key: &ShardKeyTuple) -> Option<&Chunk> {
        self.chunks
            .range((std::ops::Bound::Excluded(key.clone()), std::ops::Bound::Unbounded))
            .next()
            .map(|(_, chunk)| chunk)
    }

    /// All chunks whose range intersects `[low, high]` (closed on both ends — a query
    /// predicate that straddles a boundary includes the later chunk, per the router's
    /// documented tie-break).
    pub fn chunks_intersecting(&self, low: &ShardKeyTuple, high: &ShardKeyTuple) -> Vec<&Chunk> {
        self.chunks
            .range((std::ops::Bound::Excluded(low.clone()), std::ops::Bound::Unbounded))
            .map(|(_, chunk)| chunk)
            .take_while(|chunk| &chunk.min <= high)
            .collect()
    }

    pub fn all_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// `max(chunk.version)` across all chunks: the collection version stamped on outbound
    /// requests and compared against incremental-refresh starting points.
    pub fn collection_version(&self) -> ChunkVersion {
        self.chunks
            .values()
            .map(|c| c.version)
            .max_by_key(|v| (v.major, v.minor))
            .expect("a validated routing table always has at least one chunk")
    }

    pub fn shard_version(&self, shard: &ShardId) -> Option<ChunkVersion> {
        self.per_shard_version.get(shard).copied()
    }
}

fn bump_shard_version(per_shard: &mut HashMap<ShardId, ChunkVersion>, chunk: &Chunk) {
    per_shard
        .entry(chunk.owner.clone())
        .and_modify(|existing| {
            if (chunk.version.major, chunk.version.minor) > (existing.major, existing.minor) {
                *existing = chunk.version;
            }
        })
        .or_insert(chunk.version);
}

fn ranges_overlap(a: &Chunk, b: &Chunk) -> bool {
    a.min < b.max && b.min < a.max
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use meridian_core::{BsonValue, ShardKeyValue};
    use uuid::Uuid;

    use super::*;

    fn pattern() -> ShardKeyPattern {
        ShardKeyPattern::new(vec!["k".to_string()])
    }

    fn bound(v: i32) -> ShardKeyTuple {
        ShardKeyTuple(vec![ShardKeyValue::Value(BsonValue::Int32(v))])
    }

    fn chunk(epoch: Epoch, min: ShardKeyTuple, max: ShardKeyTuple, owner: &str, major: u64) -> Chunk {
        Chunk::new(min, max, ShardId::new(owner), ChunkVersion::new(major, 0, epoch, Utc::now()))
    }

    fn total_partition(epoch: Epoch) -> Vec<Chunk> {
        vec![
            chunk(epoch, ShardKeyTuple::min_for(&pattern()), bound(0), "s0", 1),
            chunk(epoch, bound(0), bound(10), "s1", 1),
            chunk(epoch, bound(10), ShardKeyTuple::max_for(&pattern()), "s2", 1),
        ]
    }

    #[test]
    fn build_accepts_a_total_partition() {
        let epoch = Uuid::new_v4();
        let table = ShardedRoutingTable::build(epoch, pattern(), total_partition(epoch), None).unwrap();
        assert_eq!(table.chunk_count(), 3);
    }

    #[test]
    fn build_rejects_a_gap_between_chunks() {
        let epoch = Uuid::new_v4();
        let mut chunks = total_partition(epoch);
        chunks[1] = chunk(epoch, bound(1), bound(10), "s1", 1); // leaves [0, 1) uncovered
        let err = ShardedRoutingTable::build(epoch, pattern(), chunks, None).unwrap_err();
        assert!(matches!(err, CatalogError::ConflictingOperationInProgress(_)));
    }

    #[test]
    fn build_rejects_a_chunk_from_a_different_epoch() {
        let epoch = Uuid::new_v4();
        let mut chunks = total_partition(epoch);
        chunks[0] = chunk(Uuid::new_v4(), ShardKeyTuple::min_for(&pattern()), bound(0), "s0", 1);
        let err = ShardedRoutingTable::build(epoch, pattern(), chunks, None).unwrap_err();
        assert!(matches!(err, CatalogError::ConflictingOperationInProgress(_)));
    }

    #[test]
    fn build_rejects_duplicate_chunk_max() {
        let epoch = Uuid::new_v4();
        let mut chunks = total_partition(epoch);
        let dup_max = chunks[0].max.clone();
        chunks.push(chunk(epoch, bound(0), dup_max, "s3", 1));
        let err = ShardedRoutingTable::build(epoch, pattern(), chunks, None).unwrap_err();
        assert!(matches!(err, CatalogError::ConflictingOperationInProgress(_)));
    }

    #[test]
    fn merge_replaces_overlapping_chunks_and_keeps_the_partition_total() {
        let epoch = Uuid::new_v4();
        let mut table = ShardedRoutingTable::build(epoch, pattern(), total_partition(epoch), None).unwrap();

        // Split [0, 10) owned by s1 into [0, 5) and [5, 10), both now owned by s3.
        let incoming = vec![
            chunk(epoch, bound(0), bound(5), "s3", 2),
            chunk(epoch, bound(5), bound(10), "s3", 2),
        ];
        table.merge(incoming).unwrap();

        assert_eq!(table.chunk_count(), 4);
        let mid = table.lower_bound(&bound(3)).unwrap();
        assert_eq!(mid.owner, ShardId::new("s3"));
        table.validate_partition().unwrap();
    }

    #[test]
    fn merge_rejects_a_chunk_from_a_different_epoch() {
        let epoch = Uuid::new_v4();
        let mut table = ShardedRoutingTable::build(epoch, pattern(), total_partition(epoch), None).unwrap();
        let err = table.merge(vec![chunk(Uuid::new_v4(), bound(0), bound(10), "s1", 2)]).unwrap_err();
        assert!(matches!(err, CatalogError::ConflictingOperationInProgress(_)));
    }

    #[test]
    fn lower_bound_finds_the_chunk_owning_a_key() {
        let epoch = Uuid::new_v4();
        let table = ShardedRoutingTable::build(epoch, pattern(), total_partition(epoch), None).unwrap();
        assert_eq!(table.lower_bound(&bound(-5)).unwrap().owner, ShardId::new("s0"));
        assert_eq!(table.lower_bound(&bound(0)).unwrap().owner, ShardId::new("s1"));
        assert_eq!(table.lower_bound(&bound(9)).unwrap().owner, ShardId::new("s1"));
        assert_eq!(table.lower_bound(&bound(10)).unwrap().owner, ShardId::new("s2"));
    }

    #[test]
    fn chunks_intersecting_includes_the_later_chunk_on_a_boundary_straddle() {
        let epoch = Uuid::new_v4();
        let table = ShardedRoutingTable::build(epoch, pattern(), total_partition(epoch), None).unwrap();

        // A query range ending exactly at a chunk boundary (10) must include the chunk that
        // boundary starts, per the router's documented tie-break.
        let hits: Vec<_> = table.chunks_intersecting(&bound(5), &bound(10)).into_iter().map(|c| &c.owner).collect();
        assert_eq!(hits, vec![&ShardId::new("s1"), &ShardId::new("s2")]);
    }

    #[test]
    fn shard_version_tracks_the_highest_version_seen_per_shard() {
        let epoch = Uuid::new_v4();
        let mut table = ShardedRoutingTable::build(epoch, pattern(), total_partition(epoch), None).unwrap();
        assert_eq!(table.shard_version(&ShardId::new("s1")).unwrap().major, 1);

        table.merge(vec![chunk(epoch, bound(0), bound(10), "s1", 5)]).unwrap();
        assert_eq!(table.shard_version(&ShardId::new("s1")).unwrap().major, 5);

        // A lower-versioned chunk for the same shard never regresses the tracked version.
        table.merge(vec![chunk(epoch, bound(0), bound(10), "s1", 3)]).unwrap();
        assert_eq!(table.shard_version(&ShardId::new("s1")).unwrap().major, 5);
    }

    #[test]
    fn collection_version_is_the_maximum_chunk_version() {
        let epoch = Uuid::new_v4();
        let table = ShardedRoutingTable::build(epoch, pattern(), total_partition(epoch), None).unwrap();
        assert_eq!(table.collection_version().major, 1);
    }
}

/// Per-namespace routing state: either unsharded (anchored at a primary shard) or sharded
/// with a full chunk index.
#[derive(Debug, Clone)]
pub enum RoutingTable {
    Unsharded { primary: ShardId },
    Sharded(ShardedRoutingTable),
}

impl RoutingTable {
    pub fn is_sharded(&self) -> bool {
        matches!(self, RoutingTable::Sharded(_))
    }

    pub fn as_sharded(&self) -> Option<&ShardedRoutingTable> {
        match self {
            RoutingTable::Sharded(t) => Some(t),
            RoutingTable::Unsharded { .. } => None,
        }
    }
}
