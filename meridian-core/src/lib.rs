//! # MeridianDB Core Primitives
//!
//! Shared foundation for the sharded document database's data plane: the document value
//! model consumed by the catalog and the codec, the shard-key ordering used to position
//! keys within chunk ranges, the shard registry, and the configuration-loading convention
//! every other component follows.
//!
//! This crate intentionally has no knowledge of routing tables, transactions, or the
//! BSONColumn wire format — those live in `meridian-catalog`, `meridian-txn`, and
//! `meridian-bsoncolumn` respectively, each depending on this crate rather than the reverse.

pub mod config;
pub mod document;
pub mod registry;
pub mod shard_key;

pub use document::{BsonType, BsonValue, Decimal128, Document, ObjectId, UtcMillis};
pub use registry::{ShardConfigSource, ShardDescriptor, ShardId, ShardRegistry, ShardRegistryError};
pub use shard_key::{compare_bson_values, ShardKeyPattern, ShardKeyTuple, ShardKeyValue};
