//! Transaction module
//!
//! Transaction lifecycle, per-relation locking, and the reversible
//! change log behind rollback.

pub(crate) mod changelog;
pub mod transaction;

pub use transaction::Transaction;
