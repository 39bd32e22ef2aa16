//! Self-describing document value model shared by the catalog, the transaction
//! coordinator, and the BSONColumn codec.
//!
//! A [`Document`] is an ordered sequence of `(field name, value)` pairs, mirroring the
//! on-the-wire shape of a BSON object: field order is significant and preserved exactly,
//! duplicate field names are permitted (the first lookup wins), and values are typed
//! through [`BsonValue`].

use std::collections::BTreeMap;
use std::fmt;

/// Opaque 12-byte identifier, analogous to a BSON ObjectId.
///
/// The first four bytes are conventionally a big-endian UNIX timestamp and the remaining
/// eight bytes a per-process unique counter, but this type does not interpret them; it only
/// stores and orders the 12 raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// 128-bit decimal value, stored as its raw little-endian IEEE 754-2008 representation.
///
/// MeridianDB does not perform decimal arithmetic in the core; the representation is
/// preserved opaquely so the BSONColumn codec can delta-encode it as a 128-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal128(pub u128);

/// UTC timestamp with millisecond resolution, matching BSON's `UTCDatetime` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcMillis(pub i64);

/// The type tag carried alongside every value in a [`Document`].
///
/// This is the closed set of scalar and compound types the core's data model supports; it
/// intentionally omits legacy BSON types (DBPointer, JavaScript code, etc.) that no
/// component in this core consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsonType {
    Int32,
    Int64,
    Double,
    Boolean,
    DateTime,
    ObjectId,
    String,
    Binary,
    Decimal128,
    Document,
    Array,
}

/// A single typed value in a document.
#[derive(Debug, Clone, PartialEq)]
pub enum BsonValue {
    Int32(i32),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    DateTime(UtcMillis),
    ObjectId(ObjectId),
    String(String),
    Binary(Vec<u8>),
    Decimal128(Decimal128),
    Document(Document),
    Array(Vec<BsonValue>),
}

impl BsonValue {
    pub fn bson_type(&self) -> BsonType {
        match self {
            BsonValue::Int32(_) => BsonType::Int32,
            BsonValue::Int64(_) => BsonType::Int64,
            BsonValue::Double(_) => BsonType::Double,
            BsonValue::Boolean(_) => BsonType::Boolean,
            BsonValue::DateTime(_) => BsonType::DateTime,
            BsonValue::ObjectId(_) => BsonType::ObjectId,
            BsonValue::String(_) => BsonType::String,
            BsonValue::Binary(_) => BsonType::Binary,
            BsonValue::Decimal128(_) => BsonType::Decimal128,
            BsonValue::Document(_) => BsonType::Document,
            BsonValue::Array(_) => BsonType::Array,
        }
    }
}

/// An ordered, field-named sequence of values.
///
/// Internally this keeps both the ordered `(name, value)` vector (the canonical
/// representation used for encoding and equality) and a lazily-unnecessary index is
/// deliberately avoided: documents in this core are small routing/metadata objects, not bulk
/// user payloads, so linear field lookup is fine and keeps `Document` trivially `Clone`-able
/// and comparable by field order, matching actual BSON semantics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, BsonValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: BsonValue) -> &mut Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, BsonValue)> {
        self.fields.iter()
    }

    /// Direct, non-nested field lookup by exact name.
    pub fn get(&self, name: &str) -> Option<&BsonValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Look up a dotted field path (e.g. `"address.zip"`), descending into nested documents.
    ///
    /// Returns `None` both when the path is entirely absent and when an intermediate segment
    /// resolves to a non-document value; both cases are "no value at this path" for the
    /// purposes of shard-key projection, which the caller maps to a logical null.
    pub fn get_path(&self, path: &str) -> Option<&BsonValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.get(first)?;
        for segment in segments {
            match current {
                BsonValue::Document(doc) => {
                    current = doc.get(segment)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }

    /// Build a document from an insertion-ordered map, useful in tests where field order is
    /// irrelevant to the assertion being made.
    pub fn from_ordered_map(map: BTreeMap<String, BsonValue>) -> Self {
        Self {
            fields: map.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a (String, BsonValue);
    type IntoIter = std::slice::Iter<'a, (String, BsonValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
