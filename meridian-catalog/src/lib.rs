//! # Catalog Cache & Chunk Router
//!
//! Resolves a logical namespace to the set of shards that hold matching data. Two
//! collaborating pieces:
//!
//! - [`CatalogCache`] owns, per namespace, the authoritative [`RoutingTable`] this process
//!   has observed, with coalesced refresh and stale-version invalidation.
//! - [`ChunkRouter`] is a pure function over a routing table already in hand: given a
//!   predicate, it returns the minimal shard set. It performs no I/O and never mutates the
//!   table it is built from.

pub mod cache;
pub mod chunk;
pub mod config_source;
pub mod error;
pub mod namespace;
pub mod predicate;
pub mod refresh;
pub mod retry;
pub mod router;
pub mod routing_table;

pub use cache::{CatalogCache, DatabaseRouting, NamespaceRefreshStats};
pub use chunk::{Chunk, ChunkVersion, Epoch};
pub use config_source::{CatalogConfigSource, CollectionRecord, DatabaseRecord};
pub use error::{classify_stale_reply, CatalogError, RouterError, StaleVersionAction};
pub use namespace::Namespace;
pub use predicate::{Bound, FieldConstraint, Predicate};
pub use router::ChunkRouter;
pub use routing_table::{ReshardingId, ReshardingMetadata, RoutingTable, ShardedRoutingTable};
