//! Predicate shape the chunk router consumes. This is intentionally narrow: a map from
//! shard-key field path to an equality or range constraint, enough to express routing
//! decisions without dragging in full query-language parsing.

use std::collections::HashMap;

use meridian_core::BsonValue;

#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: BsonValue,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldConstraint {
    Equals(BsonValue),
    Range { min: Option<Bound>, max: Option<Bound> },
}

/// An unordered map of shard-key field path to constraint. The router consults it in
/// shard-key pattern order, not insertion order — field order only matters through the
/// pattern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate(HashMap<String, FieldConstraint>);

impl Predicate {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn equals(mut self, path: impl Into<String>, value: BsonValue) -> Self {
        self.0.insert(path.into(), FieldConstraint::Equals(value));
        self
    }

    pub fn range(mut self, path: impl Into<String>, min: Option<Bound>, max: Option<Bound>) -> Self {
        self.0.insert(path.into(), FieldConstraint::Range { min, max });
        self
    }

    pub fn get(&self, path: &str) -> Option<&FieldConstraint> {
        self.0.get(path)
    }
}
