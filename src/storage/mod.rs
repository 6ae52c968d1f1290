//! Storage module
//!
//! In-memory row storage: values and tuples, relations with stable row
//! handles, and hash indexes.

pub mod index;
pub mod relation;
pub mod tuple;

pub use index::Index;
pub use relation::{Relation, RowId};
pub use tuple::{Tuple, Value};
