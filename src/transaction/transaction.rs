//! Transactions
//!
//! A transaction is the entry point for every mutation and query. It
//! holds one write guard per touched relation (acquired once, released
//! together on commit or rollback), a reversible change log, and an
//! error latch: the first failing operation rolls the log back and
//! every later call returns the latched cause.

use parking_lot::{ArcRwLockWriteGuard, RawRwLock};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{Attribute, Engine};
use crate::error::{Error, Result};
use crate::executor::node::PlanContext;
use crate::executor::{explain, planner};
use crate::query::{Joiner, Predicate, Selector};
use crate::storage::{Relation, Tuple, Value};
use crate::transaction::changelog::{Change, RelationChange, SchemaChange, ValueChange};

type LockKey = (String, String);
type RelationGuard = ArcRwLockWriteGuard<RawRwLock, Relation>;

/// Transaction lifecycle state
#[derive(Debug)]
enum TransactionState {
    Active,
    /// An operation failed; the log was rolled back and the cause
    /// latched.
    Aborted(Error),
    /// Committed or rolled back.
    Terminated(&'static str),
}

/// A unit of work against one engine
///
/// Locking discipline: relations are write-locked on first touch, in
/// statement order (for a query: the predicate tree in recursion
/// order, then the selectors). There is no global lock ordering and no
/// deadlock detection; two transactions locking the same relations in
/// opposite orders will deadlock, so callers must order their
/// statements. Lock acquisition blocks indefinitely.
pub struct Transaction {
    engine: Arc<Engine>,
    locks: HashMap<LockKey, RelationGuard>,
    log: Vec<Change>,
    state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            locks: HashMap::new(),
            log: Vec::new(),
            state: TransactionState::Active,
        }
    }

    /// The error that terminated this transaction, if any
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            TransactionState::Aborted(e) => Some(e),
            _ => None,
        }
    }

    fn ensure_active(&self) -> Result<()> {
        match &self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Aborted(cause) => Err(Error::terminated_by(cause)),
            TransactionState::Terminated(reason) => Err(Error::terminated(reason)),
        }
    }

    /// Roll the log back, release every lock, and latch the cause.
    fn abort(&mut self, cause: Error) -> Error {
        self.undo_log();
        self.locks.clear();
        self.state = TransactionState::Aborted(cause.clone());
        cause
    }

    /// Write-lock a relation; idempotent per transaction.
    fn lock_relation(&mut self, schema: &str, relation: &str) -> Result<()> {
        let key = (schema.to_string(), relation.to_string());
        if self.locks.contains_key(&key) {
            return Ok(());
        }
        let handle = self.engine.relation(schema, relation)?;
        if self.engine.verbose() {
            debug!(schema, relation, "locking relation");
        }
        let guard = handle.write_arc();
        self.locks.insert(key, guard);
        Ok(())
    }

    // ========== Schema mutations ==========

    /// Create a schema; reversible until commit.
    pub fn create_schema(&mut self, name: &str) -> Result<()> {
        self.ensure_active()?;
        match self.engine.create_schema(name) {
            Ok(()) => {
                self.log.push(Change::Schema(SchemaChange {
                    name: name.to_string(),
                    dropped: None,
                }));
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Drop a schema with everything in it; reversible until commit.
    pub fn drop_schema(&mut self, name: &str) -> Result<()> {
        self.ensure_active()?;
        match self.engine.remove_schema(name) {
            Ok(dropped) => {
                self.log.push(Change::Schema(SchemaChange {
                    name: name.to_string(),
                    dropped: Some(dropped),
                }));
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Create a relation and lock it immediately.
    pub fn create_relation(
        &mut self,
        schema: &str,
        relation: &str,
        attributes: Vec<Attribute>,
        pk: &[&str],
    ) -> Result<()> {
        self.ensure_active()?;
        match self.try_create_relation(schema, relation, attributes, pk) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.abort(e)),
        }
    }

    fn try_create_relation(
        &mut self,
        schema: &str,
        relation: &str,
        attributes: Vec<Attribute>,
        pk: &[&str],
    ) -> Result<()> {
        let handle = self
            .engine
            .create_relation(schema, relation, attributes, pk)?;
        self.log.push(Change::Relation(RelationChange {
            schema: schema.to_string(),
            relation: relation.to_string(),
            dropped: None,
        }));
        let guard = handle.write_arc();
        self.locks
            .insert((schema.to_string(), relation.to_string()), guard);
        Ok(())
    }

    /// Drop a relation; reversible until commit.
    pub fn drop_relation(&mut self, schema: &str, relation: &str) -> Result<()> {
        self.ensure_active()?;
        match self.try_drop_relation(schema, relation) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.abort(e)),
        }
    }

    fn try_drop_relation(&mut self, schema: &str, relation: &str) -> Result<()> {
        // hold the lock so running statements drain before the
        // relation leaves the namespace, and so rollback can still
        // reach the rows
        self.lock_relation(schema, relation)?;
        let dropped = self.engine.drop_relation(schema, relation)?;
        self.log.push(Change::Relation(RelationChange {
            schema: schema.to_string(),
            relation: relation.to_string(),
            dropped: Some(dropped),
        }));
        Ok(())
    }

    // ========== Row mutations ==========

    /// Insert one row built from the value map.
    ///
    /// For each attribute in declaration order: a supplied value is
    /// converted to the column domain (error otherwise), else the
    /// default provider runs, else autoincrement takes the counter,
    /// else the insert fails. Supplied keys matching no attribute fail
    /// the insert.
    pub fn insert(
        &mut self,
        schema: &str,
        relation: &str,
        values: HashMap<String, Value>,
    ) -> Result<Tuple> {
        self.ensure_active()?;
        match self.try_insert(schema, relation, values) {
            Ok(t) => Ok(t),
            Err(e) => Err(self.abort(e)),
        }
    }

    fn try_insert(
        &mut self,
        schema: &str,
        relation: &str,
        values: HashMap<String, Value>,
    ) -> Result<Tuple> {
        self.lock_relation(schema, relation)?;
        let rel = self
            .locks
            .get_mut(&(schema.to_string(), relation.to_string()))
            .ok_or_else(|| Error::Internal(format!("lock for '{}' vanished", relation)))?;
        let tuple = rel.build_tuple(values)?;
        let row = rel.insert_row(tuple.clone())?;
        self.log.push(Change::Value(ValueChange::Inserted {
            schema: schema.to_string(),
            relation: relation.to_string(),
            row,
        }));
        Ok(tuple)
    }

    /// Delete matching rows (all rows when no predicate); returns the
    /// number removed.
    pub fn delete(
        &mut self,
        schema: &str,
        relation: &str,
        predicate: Option<&Predicate>,
    ) -> Result<usize> {
        self.ensure_active()?;
        match self.try_delete(schema, relation, predicate) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.abort(e)),
        }
    }

    fn try_delete(
        &mut self,
        schema: &str,
        relation: &str,
        predicate: Option<&Predicate>,
    ) -> Result<usize> {
        self.lock_relation(schema, relation)?;
        let rel = self
            .locks
            .get_mut(&(schema.to_string(), relation.to_string()))
            .ok_or_else(|| Error::Internal(format!("lock for '{}' vanished", relation)))?;
        if let Some(p) = predicate {
            p.check_attributes(rel)?;
        }

        let mut matching = Vec::new();
        for row in rel.rows() {
            let hit = match predicate {
                Some(p) => p.eval(rel, &row.tuple)?,
                None => true,
            };
            if hit {
                matching.push(row.id);
            }
        }

        let mut count = 0;
        for id in matching {
            if let Some((position, tuple)) = rel.remove_row(id) {
                self.log.push(Change::Value(ValueChange::Deleted {
                    schema: schema.to_string(),
                    relation: relation.to_string(),
                    row: id,
                    position,
                    tuple,
                }));
                count += 1;
            }
        }
        Ok(count)
    }

    /// Replace the assigned columns of matching rows in place; returns
    /// the number updated.
    pub fn update(
        &mut self,
        schema: &str,
        relation: &str,
        assignments: &[(String, Value)],
        predicate: Option<&Predicate>,
    ) -> Result<usize> {
        self.ensure_active()?;
        match self.try_update(schema, relation, assignments, predicate) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.abort(e)),
        }
    }

    fn try_update(
        &mut self,
        schema: &str,
        relation: &str,
        assignments: &[(String, Value)],
        predicate: Option<&Predicate>,
    ) -> Result<usize> {
        self.lock_relation(schema, relation)?;
        let rel = self
            .locks
            .get_mut(&(schema.to_string(), relation.to_string()))
            .ok_or_else(|| Error::Internal(format!("lock for '{}' vanished", relation)))?;
        if let Some(p) = predicate {
            p.check_attributes(rel)?;
        }

        let mut sets = Vec::with_capacity(assignments.len());
        for (attr, value) in assignments {
            let (position, meta) = rel.attribute(attr)?;
            let domain = meta.domain();
            let converted = value.coerce(domain).ok_or_else(|| Error::DomainMismatch {
                kind: value.kind(),
                column: format!("{}.{}", relation, attr),
                domain,
            })?;
            sets.push((position, converted));
        }

        let mut matching = Vec::new();
        for row in rel.rows() {
            let hit = match predicate {
                Some(p) => p.eval(rel, &row.tuple)?,
                None => true,
            };
            if hit {
                matching.push((row.id, row.tuple.clone()));
            }
        }

        let mut count = 0;
        for (id, tuple) in matching {
            let mut updated = tuple;
            for (position, value) in &sets {
                updated.set(*position, value.clone());
            }
            let old = rel.replace_row(id, updated)?;
            self.log.push(Change::Value(ValueChange::Updated {
                schema: schema.to_string(),
                relation: relation.to_string(),
                row: id,
                old,
            }));
            count += 1;
        }
        Ok(count)
    }

    // ========== Queries ==========

    /// Plan and execute a query, returning output columns and rows.
    ///
    /// A query requires a predicate; a statement with no filter at all
    /// is rejected at planning.
    pub fn query(
        &mut self,
        schema: &str,
        selectors: &[Selector],
        predicate: Option<&Predicate>,
        joiners: &[Joiner],
    ) -> Result<(Vec<String>, Vec<Tuple>)> {
        self.query_with_plan(schema, selectors, predicate, joiners, |_| {})
    }

    /// Like [`query`](Self::query), additionally feeding each rendered
    /// plan line to the printer callback.
    pub fn query_with_plan(
        &mut self,
        schema: &str,
        selectors: &[Selector],
        predicate: Option<&Predicate>,
        joiners: &[Joiner],
        mut printer: impl FnMut(&str),
    ) -> Result<(Vec<String>, Vec<Tuple>)> {
        self.ensure_active()?;
        match self.run_query(schema, selectors, predicate, joiners, &mut printer) {
            Ok(r) => Ok(r),
            Err(e) => Err(self.abort(e)),
        }
    }

    fn run_query(
        &mut self,
        schema: &str,
        selectors: &[Selector],
        predicate: Option<&Predicate>,
        joiners: &[Joiner],
        printer: &mut dyn FnMut(&str),
    ) -> Result<(Vec<String>, Vec<Tuple>)> {
        let predicate = predicate
            .ok_or_else(|| Error::PlanningError("query requires a predicate".to_string()))?;

        let names = planner::lock_order(predicate, selectors);
        if names.is_empty() {
            return Err(Error::PlanningError(
                "query touches no relation".to_string(),
            ));
        }
        for name in &names {
            self.lock_relation(schema, name)?;
        }

        let verbose = self.engine.verbose();
        let mut ctx = PlanContext::new(verbose);
        for name in &names {
            if let Some(guard) = self.locks.get(&(schema.to_string(), name.clone())) {
                ctx.add(name, guard);
            }
        }

        let plan = planner::build(&ctx, selectors, predicate, joiners)?;
        for line in explain::render(&plan) {
            if verbose {
                debug!("{}", line);
            }
            printer(&line);
        }

        let result = plan.exec(&ctx)?;
        Ok((result.columns, result.rows))
    }

    // ========== Metadata probes ==========

    /// Position and metadata of an attribute; does not abort on error.
    pub fn relation_attribute(
        &self,
        schema: &str,
        relation: &str,
        attribute: &str,
    ) -> Result<(usize, Attribute)> {
        self.ensure_active()?;
        if let Some(guard) = self.locks.get(&(schema.to_string(), relation.to_string())) {
            let (position, attr) = guard.attribute(attribute)?;
            return Ok((position, attr.clone()));
        }
        let handle = self.engine.relation(schema, relation)?;
        let guard = handle.read();
        let (position, attr) = guard.attribute(attribute)?;
        Ok((position, attr.clone()))
    }

    /// Whether `schema.relation` resolves; false on a terminated
    /// transaction.
    pub fn check_relation(&self, schema: &str, relation: &str) -> bool {
        if !matches!(self.state, TransactionState::Active) {
            return false;
        }
        self.engine.check_relation(schema, relation)
    }

    // ========== Lifecycle ==========

    /// Commit: drop the change log, release every lock, terminate.
    /// Returns the number of change entries the transaction applied.
    pub fn commit(&mut self) -> Result<usize> {
        self.ensure_active()?;
        let changed = self.log.len();
        self.log.clear();
        self.locks.clear();
        self.state = TransactionState::Terminated("transaction committed");
        Ok(changed)
    }

    /// Roll back: undo the change log in reverse insertion order,
    /// release every lock, terminate. A rollback on a terminated or
    /// aborted transaction is a no-op.
    pub fn rollback(&mut self) {
        if !matches!(self.state, TransactionState::Active) {
            return;
        }
        self.undo_log();
        self.locks.clear();
        self.state = TransactionState::Terminated("transaction rolled back");
    }

    fn undo_log(&mut self) {
        while let Some(change) = self.log.pop() {
            self.undo(change);
        }
    }

    fn undo(&mut self, change: Change) {
        match change {
            Change::Value(ValueChange::Inserted {
                schema,
                relation,
                row,
            }) => {
                if let Some(rel) = self.locks.get_mut(&(schema, relation)) {
                    rel.remove_row(row);
                }
            }
            Change::Value(ValueChange::Deleted {
                schema,
                relation,
                row,
                position,
                tuple,
            }) => {
                if let Some(rel) = self.locks.get_mut(&(schema, relation)) {
                    rel.restore_row(position, row, tuple);
                }
            }
            Change::Value(ValueChange::Updated {
                schema,
                relation,
                row,
                old,
            }) => {
                if let Some(rel) = self.locks.get_mut(&(schema, relation)) {
                    rel.replace_row_unchecked(row, old);
                }
            }
            Change::Relation(RelationChange {
                schema,
                relation,
                dropped: None,
            }) => {
                self.locks.remove(&(schema.clone(), relation.clone()));
                let _ = self.engine.drop_relation(&schema, &relation);
            }
            Change::Relation(RelationChange {
                schema,
                relation,
                dropped: Some(handle),
            }) => {
                self.engine.restore_relation(&schema, &relation, handle);
            }
            Change::Schema(SchemaChange {
                name,
                dropped: None,
            }) => {
                let _ = self.engine.remove_schema(&name);
            }
            Change::Schema(SchemaChange {
                dropped: Some(schema),
                ..
            }) => {
                self.engine.restore_schema(schema);
            }
        }
    }
}

/// Dropping an active transaction rolls it back, so a test double
/// never leaks half-applied statements when a test panics early.
impl Drop for Transaction {
    fn drop(&mut self) {
        self.rollback();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("locks", &self.locks.keys().collect::<Vec<_>>())
            .field("changes", &self.log.len())
            .finish()
    }
}
