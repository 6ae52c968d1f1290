//! Column metadata for ramdb
//!
//! This module defines the value domains and per-column metadata
//! (defaults, autoincrement, uniqueness, foreign-key hints).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::storage::Value;

/// Value domains supported by the engine
///
/// A domain is a type-kind tag: enough to decide whether an incoming
/// value is convertible to a column, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Boolean
    Bool,
    /// Integer (64-bit)
    Int,
    /// Floating point (64-bit)
    Float,
    /// Text
    Text,
    /// Timestamp (milliseconds since epoch)
    Timestamp,
    /// Binary data
    Bytes,
}

impl Domain {
    /// Check if this domain is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, Domain::Int | Domain::Float)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Bool => write!(f, "BOOL"),
            Domain::Int => write!(f, "INT"),
            Domain::Float => write!(f, "FLOAT"),
            Domain::Text => write!(f, "TEXT"),
            Domain::Timestamp => write!(f, "TIMESTAMP"),
            Domain::Bytes => write!(f, "BYTES"),
        }
    }
}

/// Nullary default value provider evaluated at insert time
pub type DefaultProvider = Arc<dyn Fn() -> Value + Send + Sync>;

/// Foreign-key hint: the column this attribute references
///
/// Recorded as metadata only; the engine does not enforce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub schema: String,
    pub relation: String,
    pub attribute: String,
}

/// A named, typed column of a relation
#[derive(Clone)]
pub struct Attribute {
    name: String,
    domain: Domain,
    default: Option<DefaultProvider>,
    auto_increment: bool,
    next_value: i64,
    unique: bool,
    references: Option<ForeignKey>,
}

impl Attribute {
    /// Create a new attribute with the given name and domain
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
            default: None,
            auto_increment: false,
            next_value: 1,
            unique: false,
            references: None,
        }
    }

    /// Set a default value provider
    pub fn with_default(mut self, provider: DefaultProvider) -> Self {
        self.default = Some(provider);
        self
    }

    /// Set a constant default value
    pub fn with_default_value(self, value: Value) -> Self {
        self.with_default(Arc::new(move || value.clone()))
    }

    /// Mark this attribute as autoincremented
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Mark this attribute as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Record a foreign-key hint to `schema.relation.attribute`
    pub fn references(
        mut self,
        schema: impl Into<String>,
        relation: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        self.references = Some(ForeignKey {
            schema: schema.into(),
            relation: relation.into(),
            attribute: attribute.into(),
        });
        self
    }

    /// Get the attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the attribute domain
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Get the default provider, if any
    pub fn default_provider(&self) -> Option<&DefaultProvider> {
        self.default.as_ref()
    }

    /// Evaluate the default provider, if any
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(|provider| (provider.as_ref())())
    }

    /// Check the autoincrement flag
    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Check the unique flag
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Get the foreign-key hint, if any
    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.references.as_ref()
    }

    /// Take the next autoincrement value and advance the counter.
    ///
    /// The counter is strictly increasing across the relation's
    /// lifetime; transaction rollback does not restore it, so a rolled
    /// back insert never re-uses its id.
    pub(crate) fn take_next_value(&mut self) -> i64 {
        let v = self.next_value;
        self.next_value += 1;
        v
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("default", &self.default.as_ref().map(|_| "<fn>"))
            .field("auto_increment", &self.auto_increment)
            .field("next_value", &self.next_value)
            .field("unique", &self.unique)
            .field("references", &self.references)
            .finish()
    }
}
