//! Engines: process-wide collections of schemas
//!
//! An engine is the root of one in-memory database. Multiple engines
//! may coexist in a process, keyed by datasource name in the
//! [`Registry`](crate::catalog::Registry).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::registry::LogLevel;
use crate::catalog::schema::{RelationRef, Schema};
use crate::catalog::Attribute;
use crate::error::{Error, Result};
use crate::transaction::Transaction;

/// Name of the schema every engine starts with
pub const DEFAULT_SCHEMA: &str = "public";

/// A collection of schemas forming one volatile database
#[derive(Debug)]
pub struct Engine {
    schemas: RwLock<HashMap<String, Schema>>,
    log_level: LogLevel,
}

impl Engine {
    /// Create an engine holding the default `public` schema
    pub fn new() -> Self {
        Self::with_log_level(LogLevel::Info)
    }

    /// Create an engine with the given diagnostics verbosity
    pub fn with_log_level(log_level: LogLevel) -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(DEFAULT_SCHEMA.to_string(), Schema::new(DEFAULT_SCHEMA));
        Self {
            schemas: RwLock::new(schemas),
            log_level,
        }
    }

    /// Whether plan-level diagnostics are enabled
    pub(crate) fn verbose(&self) -> bool {
        self.log_level == LogLevel::Debug
    }

    /// Begin a new transaction against this engine
    pub fn begin(self: &Arc<Self>) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Create a schema
    pub fn create_schema(&self, name: &str) -> Result<()> {
        let mut schemas = self.schemas.write();
        if schemas.contains_key(name) {
            return Err(Error::DuplicateSchema(name.to_string()));
        }
        schemas.insert(name.to_string(), Schema::new(name));
        Ok(())
    }

    /// Drop a schema and everything in it
    pub fn drop_schema(&self, name: &str) -> Result<()> {
        self.remove_schema(name).map(|_| ())
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.read().contains_key(name)
    }

    /// List schema names (unordered)
    pub fn schema_names(&self) -> Vec<String> {
        self.schemas.read().keys().cloned().collect()
    }

    /// Resolve a relation handle
    pub fn relation(&self, schema: &str, name: &str) -> Result<RelationRef> {
        let schemas = self.schemas.read();
        let s = schemas
            .get(schema)
            .ok_or_else(|| Error::SchemaMissing(schema.to_string()))?;
        s.relation(name)
    }

    /// Whether `schema.name` resolves to a relation
    pub fn check_relation(&self, schema: &str, name: &str) -> bool {
        self.relation(schema, name).is_ok()
    }

    pub(crate) fn create_relation(
        &self,
        schema: &str,
        name: &str,
        attributes: Vec<Attribute>,
        pk: &[&str],
    ) -> Result<RelationRef> {
        let mut schemas = self.schemas.write();
        let s = schemas
            .get_mut(schema)
            .ok_or_else(|| Error::SchemaMissing(schema.to_string()))?;
        s.create_relation(name, attributes, pk)
    }

    pub(crate) fn drop_relation(&self, schema: &str, name: &str) -> Result<RelationRef> {
        let mut schemas = self.schemas.write();
        let s = schemas
            .get_mut(schema)
            .ok_or_else(|| Error::SchemaMissing(schema.to_string()))?;
        s.drop_relation(name)
    }

    pub(crate) fn restore_relation(&self, schema: &str, name: &str, relation: RelationRef) {
        let mut schemas = self.schemas.write();
        if let Some(s) = schemas.get_mut(schema) {
            s.restore_relation(name, relation);
        }
    }

    pub(crate) fn remove_schema(&self, name: &str) -> Result<Schema> {
        self.schemas
            .write()
            .remove(name)
            .ok_or_else(|| Error::SchemaMissing(name.to_string()))
    }

    pub(crate) fn restore_schema(&self, schema: Schema) {
        self.schemas
            .write()
            .insert(schema.name().to_string(), schema);
    }

    /// Drop every schema. Transactions still running against this
    /// engine fail on their next relation resolution.
    pub fn teardown(&self) {
        self.schemas.write().clear();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Domain;

    #[test]
    fn test_default_schema() {
        let engine = Engine::new();
        assert!(engine.has_schema(DEFAULT_SCHEMA));
    }

    #[test]
    fn test_schema_lifecycle() {
        let engine = Engine::new();
        engine.create_schema("app").unwrap();
        assert!(engine.has_schema("app"));

        let err = engine.create_schema("app").unwrap_err();
        assert!(matches!(err, Error::DuplicateSchema(_)));

        engine.drop_schema("app").unwrap();
        assert!(!engine.has_schema("app"));
        assert!(matches!(
            engine.drop_schema("app").unwrap_err(),
            Error::SchemaMissing(_)
        ));
    }

    #[test]
    fn test_relation_resolution() {
        let engine = Engine::new();
        engine
            .create_relation(
                DEFAULT_SCHEMA,
                "account",
                vec![Attribute::new("id", Domain::Int)],
                &[],
            )
            .unwrap();

        assert!(engine.check_relation(DEFAULT_SCHEMA, "account"));
        assert!(!engine.check_relation(DEFAULT_SCHEMA, "champion"));
        assert!(matches!(
            engine.relation("nope", "account").unwrap_err(),
            Error::SchemaMissing(_)
        ));
    }

    #[test]
    fn test_teardown() {
        let engine = Engine::new();
        engine
            .create_relation(
                DEFAULT_SCHEMA,
                "account",
                vec![Attribute::new("id", Domain::Int)],
                &[],
            )
            .unwrap();

        engine.teardown();
        assert!(!engine.has_schema(DEFAULT_SCHEMA));
        assert!(matches!(
            engine.relation(DEFAULT_SCHEMA, "account").unwrap_err(),
            Error::SchemaMissing(_)
        ));
    }
}
