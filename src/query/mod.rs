//! Query algebra module
//!
//! Pure descriptions of a query: filter trees, projection lists, and
//! join pairs. Execution state lives in the executor, not here.

pub mod joiner;
pub mod predicate;
pub mod selector;

pub use joiner::Joiner;
pub use predicate::{CompareOp, Predicate, PredicateLeaf};
pub use selector::{CountArg, Selector, SelectorTarget};
