//! Reversible change entries
//!
//! Every mutation a transaction applies pushes one entry; rollback
//! consumes the entries from the tail and undoes each one. Row entries
//! identify rows by their stable handle plus, for deletes, the
//! position at removal time, so reverse-order undo restores the exact
//! pre-transaction row sequence.

use crate::catalog::schema::{RelationRef, Schema};
use crate::storage::{RowId, Tuple};

/// One reversible mutation
#[derive(Debug)]
pub(crate) enum Change {
    Value(ValueChange),
    Relation(RelationChange),
    Schema(SchemaChange),
}

/// A row-level mutation
#[derive(Debug)]
pub(crate) enum ValueChange {
    /// Undo removes the row again
    Inserted {
        schema: String,
        relation: String,
        row: RowId,
    },
    /// Undo reinserts the tuple at its recorded position
    Deleted {
        schema: String,
        relation: String,
        row: RowId,
        position: usize,
        tuple: Tuple,
    },
    /// Undo restores the old tuple in place
    Updated {
        schema: String,
        relation: String,
        row: RowId,
        old: Tuple,
    },
}

/// A relation created (`dropped: None`) or dropped (`dropped: Some`)
#[derive(Debug)]
pub(crate) struct RelationChange {
    pub schema: String,
    pub relation: String,
    pub dropped: Option<RelationRef>,
}

/// A schema created (`dropped: None`) or dropped (`dropped: Some`)
#[derive(Debug)]
pub(crate) struct SchemaChange {
    pub name: String,
    pub dropped: Option<Schema>,
}
