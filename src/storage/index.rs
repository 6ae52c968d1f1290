//! Hash indexes for ramdb
//!
//! An index maps the values of an attribute subset to the rows holding
//! them, and reports whether (and at what cost) it can serve as the
//! source of a query predicate.

use std::collections::HashMap;

use crate::query::Predicate;
use crate::storage::relation::RowId;
use crate::storage::{Tuple, Value};

/// Cost of a hash-equality probe. Costs order sources engine-wide;
/// smaller is better, and a sequential scan costs the relation's row
/// count.
pub const HASH_PROBE_COST: u64 = 1;

/// Associative lookup from an attribute subset to rows
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    relation: String,
    /// Indexed attribute names, aligned with `positions`
    attributes: Vec<String>,
    /// Positions of the indexed attributes in the relation's order
    positions: Vec<usize>,
    unique: bool,
    entries: HashMap<Vec<Value>, Vec<RowId>>,
}

impl Index {
    pub fn new(
        name: impl Into<String>,
        relation: impl Into<String>,
        attributes: Vec<String>,
        positions: Vec<usize>,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            relation: relation.into(),
            attributes,
            positions,
            unique,
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Indexed attribute names in index order
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Extract this index's key from a tuple
    pub fn key_of(&self, tuple: &Tuple) -> Vec<Value> {
        self.positions
            .iter()
            .map(|&p| tuple.get(p).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Register a tuple under its key
    pub fn add(&mut self, tuple: &Tuple, id: RowId) {
        self.entries.entry(self.key_of(tuple)).or_default().push(id);
    }

    /// Remove a tuple's registration
    pub fn remove(&mut self, tuple: &Tuple, id: RowId) {
        let key = self.key_of(tuple);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Drop every entry
    pub fn truncate(&mut self) {
        self.entries.clear();
    }

    /// Rows registered under the given key
    pub fn lookup(&self, key: &[Value]) -> &[RowId] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any row is registered under the given key
    pub fn contains(&self, key: &[Value]) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Report whether this index can source the given predicate.
    ///
    /// A hash index applies when the predicate contains, reachable
    /// through AND conjuncts only, an equality leaf on every indexed
    /// attribute of this index's relation. Returns the probe cost and
    /// the raw probe key (leaf values in index order, not yet coerced
    /// to the column domains).
    pub fn can_source_with(&self, predicate: &Predicate) -> Option<(u64, Vec<Value>)> {
        let leaves = predicate.conjunct_eq_leaves();
        let mut key = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            let leaf = leaves
                .iter()
                .find(|l| l.relation == self.relation && &l.attribute == attr)?;
            key.push(leaf.value()?.clone());
        }
        Some((HASH_PROBE_COST, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Index {
        Index::new(
            "pk_public_champion",
            "champion",
            vec!["user_id".to_string()],
            vec![0],
            true,
        )
    }

    fn row(id: i64, name: &str) -> Tuple {
        Tuple::new(vec![Value::Int(id), Value::Text(name.into())])
    }

    #[test]
    fn test_add_lookup_remove() {
        let mut idx = index();
        idx.add(&row(1, "zed"), RowId(10));
        idx.add(&row(1, "lux"), RowId(11));
        idx.add(&row(2, "lulu"), RowId(12));

        assert_eq!(idx.lookup(&[Value::Int(1)]).to_vec(), vec![RowId(10), RowId(11)]);
        assert!(idx.lookup(&[Value::Int(3)]).is_empty());

        idx.remove(&row(1, "zed"), RowId(10));
        assert_eq!(idx.lookup(&[Value::Int(1)]).to_vec(), vec![RowId(11)]);

        idx.truncate();
        assert!(idx.is_empty());
    }

    #[test]
    fn test_can_source_with_equality() {
        let idx = index();
        let p = Predicate::eq("champion", "user_id", 1);
        let (cost, key) = idx.can_source_with(&p).unwrap();
        assert_eq!(cost, HASH_PROBE_COST);
        assert_eq!(key, vec![Value::Int(1)]);
    }

    #[test]
    fn test_cannot_source_with_range_or_disjunction() {
        let idx = index();
        assert!(idx
            .can_source_with(&Predicate::gt("champion", "user_id", 1))
            .is_none());
        let p = Predicate::eq("champion", "user_id", 1)
            .or(Predicate::eq("champion", "user_id", 2));
        assert!(idx.can_source_with(&p).is_none());
        // equality on another relation's attribute does not apply
        assert!(idx
            .can_source_with(&Predicate::eq("account", "user_id", 1))
            .is_none());
    }

    #[test]
    fn test_source_with_conjunct() {
        let idx = index();
        let p = Predicate::like("champion", "name", "z%")
            .and(Predicate::eq("champion", "user_id", 7));
        let (_, key) = idx.can_source_with(&p).unwrap();
        assert_eq!(key, vec![Value::Int(7)]);
    }
}
