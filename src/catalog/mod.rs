//! Catalog module
//!
//! Column metadata, schema namespaces, engines, and the datasource
//! registry consumed by driver adapters.

pub mod attribute;
pub mod engine;
pub mod registry;
pub mod schema;

pub use attribute::{Attribute, DefaultProvider, Domain, ForeignKey};
pub use engine::{Engine, DEFAULT_SCHEMA};
pub use registry::{global, open, teardown, Connection, LogLevel, Options, Registry};
pub use schema::{RelationRef, Schema};
