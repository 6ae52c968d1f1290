//! Execution tree nodes
//!
//! Evaluation is pull-based and single-threaded per query: each node
//! materializes its child output, applies its own operator, and hands
//! columns plus rows upward. Output columns are qualified as
//! `relation.attribute` until the projection renders the final names.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::query::{CountArg, Joiner, PredicateLeaf, Selector, SelectorTarget};
use crate::storage::{Relation, Tuple, Value};

/// Relation views available to one query, borrowed from the
/// transaction's held write guards.
pub(crate) struct PlanContext<'a> {
    relations: HashMap<String, &'a Relation>,
    pub(crate) verbose: bool,
}

impl<'a> PlanContext<'a> {
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            relations: HashMap::new(),
            verbose,
        }
    }

    pub(crate) fn add(&mut self, name: &str, relation: &'a Relation) {
        self.relations.insert(name.to_string(), relation);
    }

    pub(crate) fn relation(&self, name: &str) -> Result<&'a Relation> {
        self.relations
            .get(name)
            .copied()
            .ok_or_else(|| Error::PlanningError(format!("relation '{}' is not part of the plan", name)))
    }

    pub(crate) fn relation_names(&self) -> Vec<&String> {
        let mut names: Vec<_> = self.relations.keys().collect();
        names.sort();
        names
    }
}

/// Columns and rows produced by a node
#[derive(Debug, Clone)]
pub(crate) struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Tuple>,
}

/// Physical row producer for one relation
#[derive(Debug, Clone)]
pub(crate) enum Source {
    /// Probe one hash index with a fixed key
    HashEq {
        index: usize,
        index_name: String,
        key: Vec<Value>,
    },
    /// Walk the whole row list
    SeqScan,
}

/// Filtering node over one relation's source
#[derive(Debug, Clone)]
pub(crate) struct Scanner {
    pub relation: String,
    pub source: Source,
    /// Leaf conjunction applied to every candidate row
    pub filters: Vec<PredicateLeaf>,
    pub estimate: u64,
}

impl Scanner {
    fn columns(&self, relation: &Relation) -> Vec<String> {
        relation
            .attributes()
            .iter()
            .map(|a| format!("{}.{}", self.relation, a.name()))
            .collect()
    }

    fn matches(&self, relation: &Relation, tuple: &Tuple) -> Result<bool> {
        for leaf in &self.filters {
            if !leaf.eval(relation, tuple)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn exec(&self, ctx: &PlanContext) -> Result<ResultSet> {
        let relation = ctx.relation(&self.relation)?;
        let mut rows = Vec::new();
        match &self.source {
            Source::HashEq { index, key, .. } => {
                for &id in relation.indexes()[*index].lookup(key) {
                    if let Some(tuple) = relation.tuple(id) {
                        if self.matches(relation, tuple)? {
                            rows.push(tuple.clone());
                        }
                    }
                }
            }
            Source::SeqScan => {
                for tuple in relation.tuples() {
                    if self.matches(relation, tuple)? {
                        rows.push(tuple.clone());
                    }
                }
            }
        }
        Ok(ResultSet {
            columns: self.columns(relation),
            rows,
        })
    }
}

/// Nested-loop equality join over two children
#[derive(Debug, Clone)]
pub(crate) struct JoinNode {
    pub left: Node,
    pub right: Node,
    pub on: Joiner,
    pub estimate: u64,
}

impl JoinNode {
    fn exec(&self, ctx: &PlanContext) -> Result<ResultSet> {
        let left = self.left.exec(ctx)?;
        let left_pos = find_column(&left.columns, &self.on.left_relation, &self.on.left_attribute)?;

        // Equality joins short-circuit through a hash index on the
        // right side: probe per left row instead of scanning, applying
        // the right scanner's own filter conjunction to every probed
        // row.
        if let Node::Scan(scanner) = &self.right {
            let relation = ctx.relation(&scanner.relation)?;
            if let Some(ordinal) = relation.hash_index_on(&self.on.right_attribute) {
                let (_, attr) = relation.attribute(&self.on.right_attribute)?;
                let domain = attr.domain();
                let index = &relation.indexes()[ordinal];
                let mut columns = left.columns;
                columns.extend(scanner.columns(relation));
                let mut rows = Vec::new();
                for lrow in &left.rows {
                    let probe = lrow.get(left_pos).unwrap_or(&Value::Null);
                    let probe = match probe.coerce(domain) {
                        Some(v) if !v.is_null() => v,
                        _ => continue,
                    };
                    for &id in index.lookup(&[probe.clone()]) {
                        if let Some(tuple) = relation.tuple(id) {
                            if scanner.matches(relation, tuple)? {
                                rows.push(lrow.concat(tuple));
                            }
                        }
                    }
                }
                return Ok(ResultSet { columns, rows });
            }
        }

        let right = self.right.exec(ctx)?;
        let right_pos =
            find_column(&right.columns, &self.on.right_relation, &self.on.right_attribute)?;

        let mut columns = left.columns;
        columns.extend(right.columns);
        let mut rows = Vec::new();
        for lrow in &left.rows {
            let lval = lrow.get(left_pos).unwrap_or(&Value::Null);
            if lval.is_null() {
                continue;
            }
            for rrow in &right.rows {
                let rval = rrow.get(right_pos).unwrap_or(&Value::Null);
                if lval.compare(rval) == Some(Ordering::Equal) && !rval.is_null() {
                    rows.push(lrow.concat(rrow));
                }
            }
        }
        Ok(ResultSet { columns, rows })
    }
}

/// Projection and aggregation over the tree root
#[derive(Debug, Clone)]
pub(crate) struct Projection {
    pub selectors: Vec<Selector>,
    pub input: Node,
    pub estimate: u64,
}

impl Projection {
    fn exec(&self, ctx: &PlanContext) -> Result<ResultSet> {
        let input = self.input.exec(ctx)?;
        if self.selectors.is_empty() {
            return Ok(input);
        }

        if self.selectors.iter().any(|s| s.target.is_aggregate()) {
            return self.fold(&input);
        }

        let mut columns = Vec::new();
        let mut positions = Vec::new();
        for sel in &self.selectors {
            match &sel.target {
                SelectorTarget::Star => {
                    let prefix = format!("{}.", sel.relation);
                    let mut any = false;
                    for (i, col) in input.columns.iter().enumerate() {
                        if let Some(bare) = col.strip_prefix(&prefix) {
                            columns.push(bare.to_string());
                            positions.push(i);
                            any = true;
                        }
                    }
                    if !any {
                        return Err(Error::PlanningError(format!(
                            "relation '{}' is not part of the plan",
                            sel.relation
                        )));
                    }
                }
                SelectorTarget::Attribute(attr) => {
                    positions.push(find_column(&input.columns, &sel.relation, attr)?);
                    columns.push(sel.output_name());
                }
                _ => unreachable!(),
            }
        }

        let rows = input
            .rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|&p| row.get(p).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(ResultSet { columns, rows })
    }

    /// Fold the whole input into one row of aggregates; a plain
    /// attribute mixed in projects the first input row's value.
    fn fold(&self, input: &ResultSet) -> Result<ResultSet> {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for sel in &self.selectors {
            let value = match &sel.target {
                SelectorTarget::Count(CountArg::Star) => Value::Int(input.rows.len() as i64),
                SelectorTarget::Count(CountArg::Attribute(attr)) => {
                    let pos = find_column(&input.columns, &sel.relation, attr)?;
                    let n = input
                        .rows
                        .iter()
                        .filter(|row| !row.get(pos).unwrap_or(&Value::Null).is_null())
                        .count();
                    Value::Int(n as i64)
                }
                SelectorTarget::Sum(attr) => {
                    let pos = find_column(&input.columns, &sel.relation, attr)?;
                    fold_sum(&input.rows, pos)
                }
                SelectorTarget::Avg(attr) => {
                    let pos = find_column(&input.columns, &sel.relation, attr)?;
                    fold_avg(&input.rows, pos)
                }
                SelectorTarget::Min(attr) => {
                    let pos = find_column(&input.columns, &sel.relation, attr)?;
                    fold_extreme(&input.rows, pos, Ordering::Less)
                }
                SelectorTarget::Max(attr) => {
                    let pos = find_column(&input.columns, &sel.relation, attr)?;
                    fold_extreme(&input.rows, pos, Ordering::Greater)
                }
                SelectorTarget::Attribute(attr) => {
                    let pos = find_column(&input.columns, &sel.relation, attr)?;
                    input
                        .rows
                        .first()
                        .and_then(|row| row.get(pos).cloned())
                        .unwrap_or(Value::Null)
                }
                SelectorTarget::Star => {
                    return Err(Error::PlanningError(
                        "cannot mix * with aggregates".to_string(),
                    ));
                }
            };
            columns.push(sel.output_name());
            values.push(value);
        }
        Ok(ResultSet {
            columns,
            rows: vec![Tuple::new(values)],
        })
    }
}

fn fold_sum(rows: &[Tuple], pos: usize) -> Value {
    let mut int_sum: i64 = 0;
    let mut float_sum: f64 = 0.0;
    let mut saw_float = false;
    let mut saw_any = false;
    for row in rows {
        match row.get(pos).unwrap_or(&Value::Null) {
            Value::Null => {}
            Value::Int(i) => {
                int_sum += i;
                float_sum += *i as f64;
                saw_any = true;
            }
            Value::Float(f) => {
                float_sum += f;
                saw_float = true;
                saw_any = true;
            }
            _ => {}
        }
    }
    if !saw_any {
        Value::Null
    } else if saw_float {
        Value::Float(float_sum)
    } else {
        Value::Int(int_sum)
    }
}

fn fold_avg(rows: &[Tuple], pos: usize) -> Value {
    let mut sum = 0.0;
    let mut count = 0usize;
    for row in rows {
        if let Some(f) = row.get(pos).and_then(Value::as_f64) {
            sum += f;
            count += 1;
        }
    }
    if count == 0 {
        Value::Null
    } else {
        Value::Float(sum / count as f64)
    }
}

fn fold_extreme(rows: &[Tuple], pos: usize, keep: Ordering) -> Value {
    let mut best: Option<Value> = None;
    for row in rows {
        let v = row.get(pos).unwrap_or(&Value::Null);
        if v.is_null() {
            continue;
        }
        match &best {
            None => best = Some(v.clone()),
            Some(b) => {
                if v.compare(b) == Some(keep) {
                    best = Some(v.clone());
                }
            }
        }
    }
    best.unwrap_or(Value::Null)
}

/// Resolve a `relation.attribute` pair against qualified columns.
pub(crate) fn find_column(columns: &[String], relation: &str, attribute: &str) -> Result<usize> {
    let qualified = format!("{}.{}", relation, attribute);
    if let Some(pos) = columns.iter().position(|c| c == &qualified) {
        return Ok(pos);
    }
    let prefix = format!("{}.", relation);
    if columns.iter().any(|c| c.starts_with(&prefix)) {
        Err(Error::AttributeMissing {
            attribute: attribute.to_string(),
            relation: relation.to_string(),
        })
    } else {
        Err(Error::PlanningError(format!(
            "relation '{}' is not part of the plan",
            relation
        )))
    }
}

/// One node of the execution tree
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Scan(Scanner),
    Join(Box<JoinNode>),
    Project(Box<Projection>),
}

impl Node {
    /// Run the subtree, producing columns and rows
    pub(crate) fn exec(&self, ctx: &PlanContext) -> Result<ResultSet> {
        match self {
            Node::Scan(s) => s.exec(ctx),
            Node::Join(j) => j.exec(ctx),
            Node::Project(p) => p.exec(ctx),
        }
    }

    /// Estimated row count, fixed at plan time
    pub(crate) fn estimated_cardinality(&self) -> u64 {
        match self {
            Node::Scan(s) => s.estimate,
            Node::Join(j) => j.estimate,
            Node::Project(p) => p.estimate,
        }
    }

    pub(crate) fn children(&self) -> Vec<&Node> {
        match self {
            Node::Scan(_) => Vec::new(),
            Node::Join(j) => vec![&j.left, &j.right],
            Node::Project(p) => vec![&p.input],
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Scan(s) => match &s.source {
                Source::HashEq { index_name, .. } => {
                    write!(f, "Scanner({}, hash {})", s.relation, index_name)
                }
                Source::SeqScan => write!(f, "Scanner({}, seq)", s.relation),
            },
            Node::Join(j) => write!(f, "Joiner({})", j.on),
            Node::Project(p) => {
                let names: Vec<_> = p.selectors.iter().map(|s| s.output_name()).collect();
                write!(f, "Projection({})", names.join(", "))
            }
        }
    }
}
