//! Relations: named ordered collections of tuples
//!
//! A relation owns its attribute schema, its rows in insertion order,
//! and its indexes. Row identity is a monotone `RowId` handle that is
//! never reused, so a change-log entry can undo exactly the right row
//! on rollback. The reader-writer lock guarding a relation lives one
//! level up, in the schema's `Arc<RwLock<Relation>>` map.

use std::collections::HashMap;
use std::fmt;

use crate::catalog::Attribute;
use crate::error::{Error, Result};
use crate::storage::index::Index;
use crate::storage::{Tuple, Value};

/// Stable row handle within one relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId(pub(crate) u64);

#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub(crate) id: RowId,
    pub(crate) tuple: Tuple,
}

/// In-memory representation of a table
pub struct Relation {
    name: String,
    schema: String,
    attributes: Vec<Attribute>,
    attr_index: HashMap<String, usize>,
    /// Positions of the primary-key attributes
    pk: Vec<usize>,
    rows: Vec<Row>,
    indexes: Vec<Index>,
    next_row_id: u64,
}

impl Relation {
    /// Create a relation; a hash index is auto-created over the primary
    /// key (when declared) and over each unique attribute.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        attributes: Vec<Attribute>,
        pk: &[&str],
    ) -> Result<Self> {
        let schema = schema.into();
        let name = name.into();

        let mut attr_index = HashMap::new();
        for (i, a) in attributes.iter().enumerate() {
            attr_index.insert(a.name().to_string(), i);
        }

        let mut pk_positions = Vec::with_capacity(pk.len());
        for key in pk {
            let pos = attr_index
                .get(*key)
                .copied()
                .ok_or_else(|| Error::AttributeMissing {
                    attribute: key.to_string(),
                    relation: name.clone(),
                })?;
            pk_positions.push(pos);
        }

        let mut indexes = Vec::new();
        if !pk_positions.is_empty() {
            indexes.push(Index::new(
                format!("pk_{}_{}", schema, name),
                &name,
                pk.iter().map(|k| k.to_string()).collect(),
                pk_positions.clone(),
                true,
            ));
        }
        for (i, a) in attributes.iter().enumerate() {
            if a.is_unique() {
                indexes.push(Index::new(
                    format!("unique_{}_{}_{}", schema, name, a.name()),
                    &name,
                    vec![a.name().to_string()],
                    vec![i],
                    true,
                ));
            }
        }

        Ok(Self {
            name,
            schema,
            attributes,
            attr_index,
            pk: pk_positions,
            rows: Vec::new(),
            indexes,
            next_row_id: 1,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Position and metadata of a named attribute
    pub fn attribute(&self, name: &str) -> Result<(usize, &Attribute)> {
        match self.attr_index.get(name) {
            Some(&pos) => Ok((pos, &self.attributes[pos])),
            None => Err(Error::AttributeMissing {
                attribute: name.to_string(),
                relation: self.name.clone(),
            }),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Positions of the primary-key attributes
    pub fn primary_key(&self) -> &[usize] {
        &self.pk
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Ordinal of a hash index covering exactly the given attribute
    pub fn hash_index_on(&self, attribute: &str) -> Option<usize> {
        self.indexes
            .iter()
            .position(|idx| idx.attributes().len() == 1 && idx.attributes()[0] == attribute)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Tuples in insertion order
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.rows.iter().map(|r| &r.tuple)
    }

    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The tuple held by a row handle
    pub fn tuple(&self, id: RowId) -> Option<&Tuple> {
        self.rows.iter().find(|r| r.id == id).map(|r| &r.tuple)
    }

    fn position_of(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    /// Build a tuple from a value map following the insert column
    /// policy: supplied value (converted), else default, else
    /// autoincrement, else error. A supplied key that matches no
    /// attribute fails the build before anything else is checked.
    pub(crate) fn build_tuple(&mut self, mut values: HashMap<String, Value>) -> Result<Tuple> {
        if let Some(unknown) = values.keys().find(|k| !self.attr_index.contains_key(*k)) {
            return Err(Error::AttributeMissing {
                attribute: unknown.clone(),
                relation: self.name.clone(),
            });
        }

        let mut tuple = Tuple::empty();
        for i in 0..self.attributes.len() {
            let attr = &self.attributes[i];
            let column = format!("{}.{}", self.name, attr.name());
            if let Some(value) = values.remove(attr.name()) {
                let converted =
                    value
                        .coerce(attr.domain())
                        .ok_or_else(|| Error::DomainMismatch {
                            kind: value.kind(),
                            column: column.clone(),
                            domain: attr.domain(),
                        })?;
                tuple.push(converted);
                continue;
            }
            if let Some(value) = attr.default_value() {
                tuple.push(value);
                continue;
            }
            if attr.is_auto_increment() {
                let next = self.attributes[i].take_next_value();
                tuple.push(Value::Int(next));
                continue;
            }
            return Err(Error::MissingValue { column });
        }

        Ok(tuple)
    }

    /// Reject a tuple whose key collides in a unique or primary-key
    /// index. Keys containing NULL are not constrained.
    fn check_unique(&self, tuple: &Tuple) -> Result<()> {
        for idx in &self.indexes {
            if !idx.is_unique() {
                continue;
            }
            let key = idx.key_of(tuple);
            if key.iter().any(Value::is_null) {
                continue;
            }
            if idx.contains(&key) {
                return Err(Error::Duplicate {
                    index: idx.name().to_string(),
                    relation: self.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Append a row and feed every index
    pub(crate) fn insert_row(&mut self, tuple: Tuple) -> Result<RowId> {
        debug_assert_eq!(tuple.len(), self.attributes.len());
        self.check_unique(&tuple)?;

        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        for idx in &mut self.indexes {
            idx.add(&tuple, id);
        }
        self.rows.push(Row { id, tuple });
        Ok(id)
    }

    /// Remove a row, returning its position and tuple
    pub(crate) fn remove_row(&mut self, id: RowId) -> Option<(usize, Tuple)> {
        let pos = self.position_of(id)?;
        let row = self.rows.remove(pos);
        for idx in &mut self.indexes {
            idx.remove(&row.tuple, id);
        }
        Some((pos, row.tuple))
    }

    /// Reinsert a removed row at its recorded position with its
    /// original handle (rollback path).
    pub(crate) fn restore_row(&mut self, position: usize, id: RowId, tuple: Tuple) {
        for idx in &mut self.indexes {
            idx.add(&tuple, id);
        }
        let position = position.min(self.rows.len());
        self.rows.insert(position, Row { id, tuple });
    }

    /// Replace a row's tuple in place, keeping indexes synchronized;
    /// fails on a unique collision with another row.
    pub(crate) fn replace_row(&mut self, id: RowId, tuple: Tuple) -> Result<Tuple> {
        debug_assert_eq!(tuple.len(), self.attributes.len());
        let pos = self
            .position_of(id)
            .ok_or_else(|| Error::Internal(format!("row vanished from relation '{}'", self.name)))?;

        for idx in &self.indexes {
            if !idx.is_unique() {
                continue;
            }
            let new_key = idx.key_of(&tuple);
            if new_key.iter().any(Value::is_null) {
                continue;
            }
            let old_key = idx.key_of(&self.rows[pos].tuple);
            if new_key != old_key && idx.contains(&new_key) {
                return Err(Error::Duplicate {
                    index: idx.name().to_string(),
                    relation: self.name.clone(),
                });
            }
        }

        let old = std::mem::replace(&mut self.rows[pos].tuple, tuple);
        let new = self.rows[pos].tuple.clone();
        for idx in &mut self.indexes {
            idx.remove(&old, id);
            idx.add(&new, id);
        }
        Ok(old)
    }

    /// Replace without unique checks (rollback path)
    pub(crate) fn replace_row_unchecked(&mut self, id: RowId, tuple: Tuple) {
        if let Some(pos) = self.position_of(id) {
            let old = std::mem::replace(&mut self.rows[pos].tuple, tuple);
            let new = self.rows[pos].tuple.clone();
            for idx in &mut self.indexes {
                idx.remove(&old, id);
                idx.add(&new, id);
            }
        }
    }

    /// Drop all rows and truncate every index
    pub fn truncate(&mut self) {
        for idx in &mut self.indexes {
            idx.truncate();
        }
        self.rows.clear();
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("attributes", &self.attributes.len())
            .field("rows", &self.rows.len())
            .field("indexes", &self.indexes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Domain;

    fn champion() -> Relation {
        Relation::new(
            "public",
            "champion",
            vec![
                Attribute::new("user_id", Domain::Int),
                Attribute::new("name", Domain::Text),
            ],
            &[],
        )
        .unwrap()
    }

    fn values(id: i64, name: &str) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("user_id".to_string(), Value::Int(id));
        m.insert("name".to_string(), Value::Text(name.into()));
        m
    }

    #[test]
    fn test_auto_indexes() {
        let rel = Relation::new(
            "public",
            "account",
            vec![
                Attribute::new("id", Domain::Int),
                Attribute::new("email", Domain::Text).unique(),
            ],
            &["id"],
        )
        .unwrap();

        let names: Vec<_> = rel.indexes().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["pk_public_account", "unique_public_account_email"]);
    }

    #[test]
    fn test_insert_and_indexes() {
        let mut rel = champion();
        // no pk, no unique: no indexes
        assert!(rel.indexes().is_empty());

        let tuple = rel.build_tuple(values(1, "zed")).unwrap();
        let id = rel.insert_row(tuple).unwrap();
        assert_eq!(rel.len(), 1);
        assert_eq!(rel.tuple(id).unwrap().get(1), Some(&Value::Text("zed".into())));
    }

    #[test]
    fn test_build_tuple_unknown_attribute() {
        let mut rel = champion();
        let mut vals = HashMap::new();
        vals.insert("user_id".to_string(), Value::Int(1));
        vals.insert("nonexisting_attribute".to_string(), Value::Text("x".into()));
        vals.insert("name".to_string(), Value::Text("zed".into()));

        let err = rel.build_tuple(vals).unwrap_err();
        assert!(matches!(err, Error::AttributeMissing { .. }));
        assert!(rel.is_empty());
    }

    #[test]
    fn test_build_tuple_missing_value() {
        let mut rel = champion();
        let mut vals = HashMap::new();
        vals.insert("user_id".to_string(), Value::Int(1));
        let err = rel.build_tuple(vals).unwrap_err();
        assert!(matches!(err, Error::MissingValue { .. }));
    }

    #[test]
    fn test_build_tuple_domain_mismatch() {
        let mut rel = champion();
        let mut vals = values(1, "zed");
        vals.insert("user_id".to_string(), Value::Text("not-a-number".into()));
        let err = rel.build_tuple(vals).unwrap_err();
        assert!(matches!(err, Error::DomainMismatch { .. }));
    }

    #[test]
    fn test_autoincrement_and_default() {
        let mut rel = Relation::new(
            "public",
            "account",
            vec![
                Attribute::new("id", Domain::Int).auto_increment(),
                Attribute::new("status", Domain::Text)
                    .with_default_value(Value::Text("new".into())),
            ],
            &[],
        )
        .unwrap();

        let t = rel.build_tuple(HashMap::new()).unwrap();
        assert_eq!(t.get(0), Some(&Value::Int(1)));
        assert_eq!(t.get(1), Some(&Value::Text("new".into())));

        let t = rel.build_tuple(HashMap::new()).unwrap();
        assert_eq!(t.get(0), Some(&Value::Int(2)));
    }

    #[test]
    fn test_unique_violation() {
        let mut rel = Relation::new(
            "public",
            "account",
            vec![
                Attribute::new("id", Domain::Int),
                Attribute::new("email", Domain::Text).unique(),
            ],
            &["id"],
        )
        .unwrap();

        let mut vals = HashMap::new();
        vals.insert("id".to_string(), Value::Int(1));
        vals.insert("email".to_string(), Value::Text("foo@bar.com".into()));
        let t = rel.build_tuple(vals).unwrap();
        rel.insert_row(t).unwrap();

        // same email, different pk
        let mut vals = HashMap::new();
        vals.insert("id".to_string(), Value::Int(2));
        vals.insert("email".to_string(), Value::Text("foo@bar.com".into()));
        let t = rel.build_tuple(vals).unwrap();
        let err = rel.insert_row(t).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert_eq!(rel.len(), 1);
    }

    #[test]
    fn test_remove_restore_preserves_order() {
        let mut rel = champion();
        let mut ids = Vec::new();
        for (i, name) in ["zed", "lulu", "thresh"].iter().enumerate() {
            let t = rel.build_tuple(values(i as i64, name)).unwrap();
            ids.push(rel.insert_row(t).unwrap());
        }

        let (pos, tuple) = rel.remove_row(ids[1]).unwrap();
        assert_eq!(pos, 1);
        assert_eq!(rel.len(), 2);

        rel.restore_row(pos, ids[1], tuple);
        let names: Vec<_> = rel
            .tuples()
            .map(|t| t.get(1).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["zed", "lulu", "thresh"]);
    }

    #[test]
    fn test_truncate() {
        let mut rel = Relation::new(
            "public",
            "account",
            vec![Attribute::new("id", Domain::Int)],
            &["id"],
        )
        .unwrap();
        let mut vals = HashMap::new();
        vals.insert("id".to_string(), Value::Int(1));
        let t = rel.build_tuple(vals).unwrap();
        rel.insert_row(t).unwrap();

        rel.truncate();
        assert!(rel.is_empty());
        assert!(rel.indexes()[0].is_empty());
    }
}
