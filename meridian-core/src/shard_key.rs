//! Shard-key projection and the total order used to position keys within a chunk's
//! `[min, max)` range.
//!
//! A shard key is an ordered sequence of field paths. Projecting a document through a
//! pattern yields a [`ShardKeyTuple`], one value (or logical null) per path, compared
//! lexicographically. Chunk boundaries additionally need sentinel values below every
//! possible tuple and above every possible tuple; [`ShardKeyValue::MinKey`] and
//! [`ShardKeyValue::MaxKey`] serve that role so `[-∞, +∞)` can be represented as ordinary
//! values instead of a special-cased `Option`.

use std::cmp::Ordering;

use crate::document::{BsonType, BsonValue, Document};

/// An ordered list of field paths that projects a document to a totally ordered key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardKeyPattern {
    paths: Vec<String>,
}

impl ShardKeyPattern {
    pub fn new(paths: Vec<String>) -> Self {
        assert!(!paths.is_empty(), "shard key pattern must have at least one field");
        Self { paths }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Project a document to its shard-key tuple. A document with no value at a path is
    /// treated as null, per the data model's invariant.
    pub fn extract(&self, doc: &Document) -> ShardKeyTuple {
        let values = self
            .paths
            .iter()
            .map(|path| match doc.get_path(path) {
                Some(v) => ShardKeyValue::Value(v.clone()),
                None => ShardKeyValue::Null,
            })
            .collect();
        ShardKeyTuple(values)
    }
}

/// A single component of a [`ShardKeyTuple`]: either a concrete value, an explicit null (no
/// value present at that path), or one of the two chunk-range sentinels.
#[derive(Debug, Clone)]
pub enum ShardKeyValue {
    /// Sentinel ordered below every other value; used only as a chunk-range boundary.
    MinKey,
    /// Absence of a value at the path, per the "missing is null" invariant.
    Null,
    Value(BsonValue),
    /// Sentinel ordered above every other value; used only as a chunk-range boundary.
    MaxKey,
}

impl ShardKeyValue {
    fn type_rank(&self) -> u8 {
        match self {
            ShardKeyValue::MinKey => 0,
            ShardKeyValue::Null => 1,
            ShardKeyValue::Value(v) => 2 + bson_type_rank(v.bson_type()),
            ShardKeyValue::MaxKey => u8::MAX,
        }
    }
}

/// Canonical cross-type ordering used when two values of different BSON types are compared
/// within the same shard-key field. This does not need to match any particular database's
/// exact type-order table; it only needs to be total and stable for the lifetime of a
/// routing table.
fn bson_type_rank(t: BsonType) -> u8 {
    match t {
        BsonType::Double => 0,
        BsonType::Int32 => 0,
        BsonType::Int64 => 0,
        BsonType::Decimal128 => 0,
        BsonType::String => 1,
        BsonType::Document => 2,
        BsonType::Array => 3,
        BsonType::Binary => 4,
        BsonType::ObjectId => 5,
        BsonType::Boolean => 6,
        BsonType::DateTime => 7,
    }
}

fn cmp_numeric(a: &BsonValue, b: &BsonValue) -> Option<Ordering> {
    fn as_f64(v: &BsonValue) -> Option<f64> {
        match v {
            BsonValue::Int32(i) => Some(*i as f64),
            BsonValue::Int64(i) => Some(*i as f64),
            BsonValue::Double(d) => Some(*d),
            BsonValue::Decimal128(d) => Some(d.0 as f64),
            _ => None,
        }
    }
    as_f64(a).zip(as_f64(b)).and_then(|(x, y)| x.partial_cmp(&y))
}

/// Compares two values, applying numeric cross-type comparison (so `Int32(1)` and
/// `Double(1.0)` compare equal) and falling back to type-rank ordering otherwise.
pub fn compare_bson_values(a: &BsonValue, b: &BsonValue) -> Ordering {
    use BsonValue::*;
    match (a, b) {
        (Int32(_) | Int64(_) | Double(_) | Decimal128(_), Int32(_) | Int64(_) | Double(_) | Decimal128(_)) => {
            cmp_numeric(a, b).unwrap_or(Ordering::Equal)
        }
        (String(x), String(y)) => x.cmp(y),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        (DateTime(x), DateTime(y)) => x.cmp(y),
        (ObjectId(x), ObjectId(y)) => x.cmp(y),
        (Binary(x), Binary(y)) => x.cmp(y),
        (Array(x), Array(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let ord = compare_bson_values(xi, yi);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Document(x), Document(y)) => {
            for ((xn, xv), (yn, yv)) in x.iter().zip(y.iter()) {
                let name_ord = xn.cmp(yn);
                if name_ord != Ordering::Equal {
                    return name_ord;
                }
                let ord = compare_bson_values(xv, yv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => bson_type_rank(a.bson_type()).cmp(&bson_type_rank(b.bson_type())),
    }
}

impl PartialEq for ShardKeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ShardKeyValue {}

impl PartialOrd for ShardKeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShardKeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ShardKeyValue::Value(a), ShardKeyValue::Value(b)) => compare_bson_values(a, b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

/// A document projected through a [`ShardKeyPattern`]; compared field-by-field in pattern
/// order, matching the half-open chunk ranges the catalog cache builds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardKeyTuple(pub Vec<ShardKeyValue>);

impl ShardKeyTuple {
    /// The tuple consisting entirely of [`ShardKeyValue::MinKey`], used as the lower bound of
    /// the first chunk in a collection.
    pub fn min_for(pattern: &ShardKeyPattern) -> Self {
        Self(vec![ShardKeyValue::MinKey; pattern.len()])
    }

    /// The tuple consisting entirely of [`ShardKeyValue::MaxKey`], used as the upper bound of
    /// the last chunk in a collection.
    pub fn max_for(pattern: &ShardKeyPattern) -> Self {
        Self(vec![ShardKeyValue::MaxKey; pattern.len()])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(path: &str, value: BsonValue) -> Document {
        let mut d = Document::new();
        d.push(path, value);
        d
    }

    #[test]
    fn extracts_flat_key() {
        let pattern = ShardKeyPattern::new(vec!["user_id".to_string()]);
        let doc = doc_with("user_id", BsonValue::Int32(42));
        let tuple = pattern.extract(&doc);
        assert_eq!(tuple, ShardKeyTuple(vec![ShardKeyValue::Value(BsonValue::Int32(42))]));
    }

    #[test]
    fn missing_field_is_null() {
        let pattern = ShardKeyPattern::new(vec!["user_id".to_string()]);
        let doc = Document::new();
        let tuple = pattern.extract(&doc);
        assert_eq!(tuple, ShardKeyTuple(vec![ShardKeyValue::Null]));
    }

    #[test]
    fn min_key_orders_below_everything() {
        let pattern = ShardKeyPattern::new(vec!["x".to_string()]);
        let min = ShardKeyTuple::min_for(&pattern);
        let max = ShardKeyTuple::max_for(&pattern);
        let doc = doc_with("x", BsonValue::Int32(-1_000_000));
        let tuple = pattern.extract(&doc);
        assert!(min < tuple);
        assert!(tuple < max);
    }

    #[test]
    fn numeric_cross_type_equal() {
        assert_eq!(
            compare_bson_values(&BsonValue::Int32(5), &BsonValue::Double(5.0)),
            Ordering::Equal
        );
    }

    #[test]
    fn lexicographic_multi_field_order() {
        let pattern = ShardKeyPattern::new(vec!["a".to_string(), "b".to_string()]);
        let mut d1 = Document::new();
        d1.push("a", BsonValue::Int32(1));
        d1.push("b", BsonValue::Int32(2));
        let mut d2 = Document::new();
        d2.push("a", BsonValue::Int32(1));
        d2.push("b", BsonValue::Int32(3));
        assert!(pattern.extract(&d1) < pattern.extract(&d2));
    }
}
