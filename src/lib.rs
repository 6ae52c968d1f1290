//! ramdb - an in-memory relational engine usable as a SQL test double
//!
//! This library provides the core components of a transactional query
//! engine over volatile tables:
//! - Catalog (attributes, schemas, engine registry)
//! - Storage (values, tuples, relations, hash indexes)
//! - Query algebra (predicates, selectors, joiners)
//! - Query execution (planner, pull-based executor)
//! - Transactions (per-relation locking, reversible change log)
//!
//! There is no persistence and no SQL parser here: a driver adapter is
//! expected to translate SQL text into the algebraic surface exposed by
//! [`Transaction`].

pub mod catalog;
pub mod error;
pub mod executor;
pub mod query;
pub mod storage;
pub mod transaction;

pub use catalog::{
    open, Attribute, Connection, Domain, Engine, LogLevel, Options, Registry, Schema,
    DEFAULT_SCHEMA,
};
pub use error::{Error, Result};
pub use query::{CompareOp, Joiner, Predicate, Selector};
pub use storage::{Relation, RowId, Tuple, Value};
pub use transaction::Transaction;
