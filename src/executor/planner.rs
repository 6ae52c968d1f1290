//! Query planner
//!
//! Builds an execution tree from the algebraic description of a query:
//! pick a source per relation, wrap it in a scanner carrying that
//! relation's predicate leaves, order the joins by estimated
//! cardinality, and top the tree with a projection. The planner is a
//! pure function of its inputs and the relation state: identical
//! inputs produce identical trees.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::node::{JoinNode, Node, PlanContext, Projection, Scanner, Source};
use crate::query::{Joiner, Predicate, Selector};
use crate::storage::{Relation, Value};

/// Equality-join selection factor used for cardinality estimates
const JOIN_SELECTIVITY_DIV: u64 = 10;

/// Relation names a statement must lock, in acquisition order: the
/// predicate tree in recursion order, then the selectors in list
/// order. Duplicates keep their first occurrence.
pub(crate) fn lock_order(predicate: &Predicate, selectors: &[Selector]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };
    predicate.walk(&mut |node| {
        if let Some(rel) = node.relation() {
            push(rel);
        }
    });
    for sel in selectors {
        push(&sel.relation);
    }
    names
}

/// Build the execution tree for one query.
pub(crate) fn build(
    ctx: &PlanContext,
    selectors: &[Selector],
    predicate: &Predicate,
    joiners: &[Joiner],
) -> Result<Node> {
    let mut scanners = build_scanners(ctx, predicate)?;

    let root = if joiners.is_empty() {
        if scanners.len() != 1 {
            return Err(Error::PlanningError(format!(
                "no join, but got {} scans",
                scanners.len()
            )));
        }
        scanners.into_values().next().unwrap()
    } else {
        build_join_tree(&mut scanners, joiners)?
    };

    let estimate = root.estimated_cardinality();
    Ok(Node::Project(Box::new(Projection {
        selectors: selectors.to_vec(),
        input: root,
        estimate,
    })))
}

/// Source choice and scanner construction, one scanner per relation of
/// the plan, visited in name order for determinism.
fn build_scanners(ctx: &PlanContext, predicate: &Predicate) -> Result<HashMap<String, Node>> {
    let mut scanners = HashMap::new();
    for name in ctx.relation_names() {
        let relation = ctx.relation(name)?;

        let source = choose_source(ctx, relation, predicate);
        let estimate = match &source {
            Source::HashEq { .. } => 1,
            Source::SeqScan => relation.len() as u64,
        };

        // every leaf on this relation becomes part of the scanner's
        // conjunction; resolve the attributes now so an unknown column
        // fails the statement even over an empty relation
        let mut filters = Vec::new();
        for leaf in predicate.leaves_for(name) {
            relation.attribute(&leaf.attribute)?;
            filters.push(leaf.clone());
        }

        scanners.insert(
            name.clone(),
            Node::Scan(Scanner {
                relation: name.clone(),
                source,
                filters,
                estimate,
            }),
        );
    }
    Ok(scanners)
}

/// Probe every index of the relation against the full predicate and
/// keep the cheapest applicable one; ties go to the first-declared
/// index. No applicable index means a sequential scan.
fn choose_source(ctx: &PlanContext, relation: &Relation, predicate: &Predicate) -> Source {
    let mut best: Option<(u64, usize, Vec<Value>)> = None;
    for (ordinal, index) in relation.indexes().iter().enumerate() {
        let Some((cost, raw_key)) = index.can_source_with(predicate) else {
            continue;
        };
        let Some(key) = coerce_key(relation, index.attributes(), raw_key) else {
            continue;
        };
        if ctx.verbose {
            debug!(
                relation = %relation,
                index = index.name(),
                cost,
                "index can source predicate"
            );
        }
        if best.as_ref().map_or(true, |(c, _, _)| cost < *c) {
            best = Some((cost, ordinal, key));
        }
    }
    match best {
        Some((_, ordinal, key)) => {
            let index_name = relation.indexes()[ordinal].name().to_string();
            if ctx.verbose {
                debug!(relation = %relation, index = %index_name, "chosen as source");
            }
            Source::HashEq {
                index: ordinal,
                index_name,
                key,
            }
        }
        None => {
            if ctx.verbose {
                debug!(relation = %relation, "no suitable index, using seq scan");
            }
            Source::SeqScan
        }
    }
}

/// Convert the raw probe values into the indexed columns' domains so
/// hash lookup compares converted value against converted value.
fn coerce_key(relation: &Relation, attributes: &[String], raw: Vec<Value>) -> Option<Vec<Value>> {
    let mut key = Vec::with_capacity(raw.len());
    for (attr, value) in attributes.iter().zip(raw) {
        let (_, a) = relation.attribute(attr).ok()?;
        key.push(value.coerce(a.domain())?);
    }
    Some(key)
}

/// Fold the joiners, sorted by ascending cardinality estimate, into a
/// single tree. Each relation belongs to at most one connected group;
/// a joiner whose side is already grouped replaces that side with the
/// group's subtree. The group of the last sorted joiner is the root.
fn build_join_tree(scanners: &mut HashMap<String, Node>, joiners: &[Joiner]) -> Result<Node> {
    let scanner_estimate = |name: &str, scanners: &HashMap<String, Node>| -> Result<u64> {
        scanners
            .get(name)
            .map(Node::estimated_cardinality)
            .ok_or_else(|| {
                Error::PlanningError(format!("cannot join, scanner for '{}' not found", name))
            })
    };

    let mut sorted: Vec<(u64, &Joiner)> = Vec::with_capacity(joiners.len());
    for joiner in joiners {
        let left = scanner_estimate(&joiner.left_relation, scanners)?;
        let right = scanner_estimate(&joiner.right_relation, scanners)?;
        sorted.push((left.saturating_mul(right) / JOIN_SELECTIVITY_DIV, joiner));
    }
    sorted.sort_by_key(|(estimate, _)| *estimate);

    let mut group_of: HashMap<String, usize> = HashMap::new();
    let mut groups: HashMap<usize, (Node, Vec<String>)> = HashMap::new();
    let mut last_group = 0;

    for (gid, (_, joiner)) in sorted.into_iter().enumerate() {
        let lg = group_of.get(&joiner.left_relation).copied();
        let rg = group_of.get(&joiner.right_relation).copied();
        if lg.is_some() && lg == rg {
            return Err(Error::PlanningError(format!(
                "joiner {} closes a cycle",
                joiner
            )));
        }

        let (left, mut members) = take_side(&joiner.left_relation, lg, scanners, &mut groups)?;
        let (right, right_members) = take_side(&joiner.right_relation, rg, scanners, &mut groups)?;
        members.extend(right_members);

        let estimate = left
            .estimated_cardinality()
            .saturating_mul(right.estimated_cardinality())
            / JOIN_SELECTIVITY_DIV;
        let node = Node::Join(Box::new(JoinNode {
            left,
            right,
            on: joiner.clone(),
            estimate,
        }));

        for member in &members {
            group_of.insert(member.clone(), gid);
        }
        groups.insert(gid, (node, members));
        last_group = gid;
    }

    let (root, _) = groups.remove(&last_group).expect("join fold left no root");
    Ok(root)
}

/// Detach one join side: the subtree of the group it already belongs
/// to, or its scanner.
fn take_side(
    name: &str,
    group: Option<usize>,
    scanners: &mut HashMap<String, Node>,
    groups: &mut HashMap<usize, (Node, Vec<String>)>,
) -> Result<(Node, Vec<String>)> {
    match group {
        Some(gid) => Ok(groups.remove(&gid).expect("group vanished")),
        None => {
            let node = scanners.remove(name).ok_or_else(|| {
                Error::PlanningError(format!("cannot join, scanner for '{}' not found", name))
            })?;
            Ok((node, vec![name.to_string()]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Predicate;
    use crate::query::Selector;

    #[test]
    fn test_lock_order_is_recursion_then_selectors() {
        let p = Predicate::eq("b", "x", 1).and(Predicate::eq("a", "y", 2));
        let selectors = vec![Selector::attr("c", "z"), Selector::attr("b", "x")];
        assert_eq!(lock_order(&p, &selectors), vec!["b", "a", "c"]);
    }
}
