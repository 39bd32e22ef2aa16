//! The Chunk Router: a pure function of a routing table and a predicate, returning the
//! minimal shard set that may own matching documents. Performs no I/O and never mutates the
//! table it borrows.

use std::collections::BTreeSet;

use meridian_core::{ShardId, ShardKeyValue};

use crate::chunk::{Chunk, ChunkVersion};
use crate::error::RouterError;
use crate::predicate::{FieldConstraint, Predicate};
use crate::routing_table::ShardedRoutingTable;

pub struct ChunkRouter<'a> {
    table: &'a ShardedRoutingTable,
}

impl<'a> ChunkRouter<'a> {
    pub fn new(table: &'a ShardedRoutingTable) -> Self {
        Self { table }
    }

    /// Exact lower-bound lookup, defined only when `predicate` equality-constrains every
    /// shard-key field.
    pub fn find_chunk(&self, predicate: &Predicate) -> Result<&'a Chunk, RouterError> {
        let tuple_values = self.exact_tuple(predicate).ok_or(RouterError::ShardKeyNotFound)?;
        self.table
            .lower_bound(&meridian_core::ShardKeyTuple(tuple_values))
            .ok_or(RouterError::ShardKeyNotFound)
    }

    /// The minimal shard set that may own documents matching `predicate`.
    pub fn get_shards_for_query(&self, predicate: &Predicate) -> BTreeSet<ShardId> {
        if let Some(values) = self.exact_tuple(predicate) {
            return match self.table.lower_bound(&meridian_core::ShardKeyTuple(values)) {
                Some(chunk) => std::iter::once(chunk.owner.clone()).collect(),
                None => BTreeSet::new(),
            };
        }

        let (low, high) = self.range_bounds(predicate);
        self.table
            .chunks_intersecting(&low, &high)
            .into_iter()
            .map(|c| c.owner.clone())
            .collect()
    }

    pub fn get_all_shards(&self) -> BTreeSet<ShardId> {
        self.table.all_chunks().map(|c| c.owner.clone()).collect()
    }

    pub fn get_version(&self) -> ChunkVersion {
        self.table.collection_version()
    }

    pub fn get_version_for_shard(&self, shard: &ShardId) -> Option<ChunkVersion> {
        self.table.shard_version(shard)
    }

    /// A full `ShardKeyTuple` if `predicate` equality-constrains every field in pattern
    /// order; `None` otherwise (including when fields are present but out of order or a
    /// range/missing constraint appears before the pattern is exhausted).
    fn exact_tuple(&self, predicate: &Predicate) -> Option<Vec<ShardKeyValue>> {
        let mut values = Vec::with_capacity(self.table.shard_key.len());
        for path in self.table.shard_key.paths() {
            match predicate.get(path) {
                Some(FieldConstraint::Equals(v)) => values.push(ShardKeyValue::Value(v.clone())),
                _ => return None,
            }
        }
        Some(values)
    }

    /// Builds the `[low, high]` range implied by a prefix of equality constraints followed
    /// by (at most) one range or unconstrained field; remaining fields are filled with the
    /// min/max sentinels, which collapses to "every shard" when the very first field is
    /// unconstrained.
    fn range_bounds(
        &self,
        predicate: &Predicate,
    ) -> (meridian_core::ShardKeyTuple, meridian_core::ShardKeyTuple) {
        let paths = self.table.shard_key.paths();
        let mut low = Vec::with_capacity(paths.len());
        let mut high = Vec::with_capacity(paths.len());

        for path in paths {
            match predicate.get(path) {
                Some(FieldConstraint::Equals(v)) => {
                    low.push(ShardKeyValue::Value(v.clone()));
                    high.push(ShardKeyValue::Value(v.clone()));
                }
                Some(FieldConstraint::Range { min, max }) => {
                    low.push(min.as_ref().map(|b| ShardKeyValue::Value(b.value.clone())).unwrap_or(ShardKeyValue::MinKey));
                    high.push(max.as_ref().map(|b| ShardKeyValue::Value(b.value.clone())).unwrap_or(ShardKeyValue::MaxKey));
                    break;
                }
                None => {
                    low.push(ShardKeyValue::MinKey);
                    high.push(ShardKeyValue::MaxKey);
                    break;
                }
            }
        }
        while low.len() < paths.len() {
            low.push(ShardKeyValue::MinKey);
            high.push(ShardKeyValue::MaxKey);
        }
        (meridian_core::ShardKeyTuple(low), meridian_core::ShardKeyTuple(high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkVersion};
    use crate::routing_table::ShardedRoutingTable;
    use chrono::Utc;
    use meridian_core::{BsonValue, ShardKeyPattern, ShardKeyTuple};
    use uuid::Uuid;

    fn two_chunk_table() -> (ShardedRoutingTable, Uuid) {
        let epoch = Uuid::new_v4();
        let pattern = ShardKeyPattern::new(vec!["x".to_string()]);
        let v = ChunkVersion::new(1, 0, epoch, Utc::now());
        let mid = ShardKeyTuple(vec![ShardKeyValue::Value(BsonValue::Int32(0))]);
        let chunks = vec![
            Chunk::new(ShardKeyTuple::min_for(&pattern), mid.clone(), ShardId::new("shardA"), v),
            Chunk::new(mid, ShardKeyTuple::max_for(&pattern), ShardId::new("shardB"), v),
        ];
        (ShardedRoutingTable::build(epoch, pattern, chunks, None).unwrap(), epoch)
    }

    #[test]
    fn equality_routes_to_single_owner() {
        let (table, _) = two_chunk_table();
        let router = ChunkRouter::new(&table);
        let predicate = Predicate::new().equals("x", BsonValue::Int32(5));
        let shards = router.get_shards_for_query(&predicate);
        assert_eq!(shards.into_iter().collect::<Vec<_>>(), vec![ShardId::new("shardB")]);
    }

    #[test]
    fn unconstrained_predicate_routes_to_all_shards() {
        let (table, _) = two_chunk_table();
        let router = ChunkRouter::new(&table);
        let shards = router.get_shards_for_query(&Predicate::new());
        assert_eq!(shards, router.get_all_shards());
        assert_eq!(shards.len(), 2);
    }

    #[test]
    fn range_spanning_boundary_includes_both_owners() {
        let (table, _) = two_chunk_table();
        let router = ChunkRouter::new(&table);
        let predicate = Predicate::new().range(
            "x",
            Some(crate::predicate::Bound { value: BsonValue::Int32(-5), inclusive: true }),
            Some(crate::predicate::Bound { value: BsonValue::Int32(5), inclusive: true }),
        );
        let shards = router.get_shards_for_query(&predicate);
        assert_eq!(shards.len(), 2);
    }

    #[test]
    fn find_chunk_requires_full_equality() {
        let (table, _) = two_chunk_table();
        let router = ChunkRouter::new(&table);
        assert!(router.find_chunk(&Predicate::new()).is_err());
        let predicate = Predicate::new().equals("x", BsonValue::Int32(-10));
        assert_eq!(router.find_chunk(&predicate).unwrap().owner, ShardId::new("shardA"));
    }
}
