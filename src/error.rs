//! Error types for ramdb
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

use crate::catalog::Domain;

/// The main error type for ramdb
///
/// The enum is `Clone` so a terminated transaction can latch the error
/// that killed it and return it verbatim from every later operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("schema '{0}' does not exist")]
    SchemaMissing(String),

    #[error("schema '{0}' already exists")]
    DuplicateSchema(String),

    #[error("relation '{0}' does not exist")]
    RelationMissing(String),

    #[error("relation '{0}' already exists")]
    DuplicateRelation(String),

    #[error("attribute '{attribute}' does not exist in relation '{relation}'")]
    AttributeMissing { attribute: String, relation: String },

    // ========== Value Errors ==========
    #[error("cannot assign {kind} value to '{column}' (domain {domain})")]
    DomainMismatch {
        kind: &'static str,
        column: String,
        domain: Domain,
    },

    #[error("duplicate value for index '{index}' on relation '{relation}'")]
    Duplicate { index: String, relation: String },

    #[error("no value for '{column}'")]
    MissingValue { column: String },

    // ========== Planning Errors ==========
    #[error("planning error: {0}")]
    PlanningError(String),

    // ========== Internal Errors ==========
    #[error("internal error: {0}")]
    Internal(String),

    // ========== Transaction Errors ==========
    #[error("transaction terminated: {reason}")]
    TransactionTerminated {
        reason: String,
        #[source]
        cause: Option<Box<Error>>,
    },
}

impl Error {
    /// Wrap the cause that aborted a transaction; every later operation
    /// on that transaction returns this error unchanged.
    pub(crate) fn terminated_by(cause: &Error) -> Error {
        Error::TransactionTerminated {
            reason: cause.to_string(),
            cause: Some(Box::new(cause.clone())),
        }
    }

    /// Plain termination after a commit or rollback; there is no
    /// underlying failure to wrap.
    pub(crate) fn terminated(reason: &str) -> Error {
        Error::TransactionTerminated {
            reason: reason.to_string(),
            cause: None,
        }
    }
}

/// Result type alias for ramdb operations
pub type Result<T> = std::result::Result<T, Error>;
