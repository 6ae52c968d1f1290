//! Schemas: named namespaces of relations

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::Attribute;
use crate::error::{Error, Result};
use crate::storage::Relation;

/// Shared handle to a relation and its reader-writer lock
pub type RelationRef = Arc<RwLock<Relation>>;

/// A named namespace of relations
#[derive(Debug)]
pub struct Schema {
    name: String,
    relations: HashMap<String, RelationRef>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a relation by name
    pub fn relation(&self, name: &str) -> Result<RelationRef> {
        self.relations
            .get(name)
            .cloned()
            .ok_or_else(|| Error::RelationMissing(name.to_string()))
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// List relation names (unordered)
    pub fn relation_names(&self) -> Vec<String> {
        self.relations.keys().cloned().collect()
    }

    pub(crate) fn create_relation(
        &mut self,
        name: &str,
        attributes: Vec<Attribute>,
        pk: &[&str],
    ) -> Result<RelationRef> {
        if self.relations.contains_key(name) {
            return Err(Error::DuplicateRelation(name.to_string()));
        }
        let relation = Relation::new(&self.name, name, attributes, pk)?;
        let handle = Arc::new(RwLock::new(relation));
        self.relations.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub(crate) fn drop_relation(&mut self, name: &str) -> Result<RelationRef> {
        self.relations
            .remove(name)
            .ok_or_else(|| Error::RelationMissing(name.to_string()))
    }

    /// Re-register a dropped relation (rollback path)
    pub(crate) fn restore_relation(&mut self, name: &str, relation: RelationRef) {
        self.relations.insert(name.to_string(), relation);
    }
}
