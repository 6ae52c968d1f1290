//! Predicate trees for ramdb
//!
//! A predicate is a pure algebraic description of a row filter. Leaves
//! compare one attribute of one relation against literal values;
//! internal nodes combine children with AND/OR/NOT.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::storage::{Relation, Tuple, Value};

/// Comparison operator carried by a predicate leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    In,
    Like,
    IsNull,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Leq => "<=",
            CompareOp::Gt => ">",
            CompareOp::Geq => ">=",
            CompareOp::In => "IN",
            CompareOp::Like => "LIKE",
            CompareOp::IsNull => "IS NULL",
        };
        write!(f, "{}", s)
    }
}

/// A single comparison on one relation's attribute
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateLeaf {
    pub relation: String,
    pub attribute: String,
    pub op: CompareOp,
    /// Comparison operands: one value for binary operators, the value
    /// list for `In`, empty for `IsNull`.
    pub values: Vec<Value>,
}

impl PredicateLeaf {
    /// The single operand of a binary comparison
    pub fn value(&self) -> Option<&Value> {
        self.values.first()
    }

    /// Evaluate this leaf against a tuple of the given relation.
    ///
    /// The attribute is resolved by name; an unknown attribute aborts
    /// the whole statement with `AttributeMissing`.
    pub fn eval(&self, relation: &Relation, tuple: &Tuple) -> Result<bool> {
        let (pos, _) = relation.attribute(&self.attribute)?;
        let candidate = tuple.get(pos).unwrap_or(&Value::Null);

        match self.op {
            CompareOp::IsNull => Ok(candidate.is_null()),
            CompareOp::In => Ok(self
                .values
                .iter()
                .any(|v| candidate.compare(v) == Some(Ordering::Equal))),
            CompareOp::Like => {
                let pattern = self.value().and_then(Value::as_text).unwrap_or("");
                Ok(candidate
                    .as_text()
                    .map(|text| like_match(pattern.as_bytes(), text.as_bytes()))
                    .unwrap_or(false))
            }
            op => {
                if candidate.is_null() {
                    return Ok(false);
                }
                let rhs = match self.value() {
                    Some(v) => v,
                    None => return Ok(false),
                };
                let ord = match candidate.compare(rhs) {
                    Some(ord) => ord,
                    None => return Ok(false),
                };
                Ok(match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::Neq => ord != Ordering::Equal,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Leq => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Geq => ord != Ordering::Less,
                    _ => unreachable!(),
                })
            }
        }
    }
}

impl fmt::Display for PredicateLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            CompareOp::IsNull => write!(f, "{}.{} IS NULL", self.relation, self.attribute),
            CompareOp::In => write!(
                f,
                "{}.{} IN ({} values)",
                self.relation,
                self.attribute,
                self.values.len()
            ),
            op => write!(
                f,
                "{}.{} {} {}",
                self.relation,
                self.attribute,
                op,
                self.value().unwrap_or(&Value::Null)
            ),
        }
    }
}

/// SQL LIKE with `%` (any run) and `_` (any single byte)
fn like_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(b'%'), _) => {
            like_match(&pattern[1..], text)
                || (!text.is_empty() && like_match(pattern, &text[1..]))
        }
        (Some(b'_'), Some(_)) => like_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) => p == t && like_match(&pattern[1..], &text[1..]),
        (Some(_), None) => false,
    }
}

/// Algebraic predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Leaf(PredicateLeaf),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    fn leaf(relation: &str, attribute: &str, op: CompareOp, values: Vec<Value>) -> Predicate {
        Predicate::Leaf(PredicateLeaf {
            relation: relation.to_string(),
            attribute: attribute.to_string(),
            op,
            values,
        })
    }

    pub fn eq(relation: &str, attribute: &str, value: impl Into<Value>) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::Eq, vec![value.into()])
    }

    pub fn neq(relation: &str, attribute: &str, value: impl Into<Value>) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::Neq, vec![value.into()])
    }

    pub fn lt(relation: &str, attribute: &str, value: impl Into<Value>) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::Lt, vec![value.into()])
    }

    pub fn leq(relation: &str, attribute: &str, value: impl Into<Value>) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::Leq, vec![value.into()])
    }

    pub fn gt(relation: &str, attribute: &str, value: impl Into<Value>) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::Gt, vec![value.into()])
    }

    pub fn geq(relation: &str, attribute: &str, value: impl Into<Value>) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::Geq, vec![value.into()])
    }

    pub fn is_in(relation: &str, attribute: &str, values: Vec<Value>) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::In, values)
    }

    pub fn like(relation: &str, attribute: &str, pattern: &str) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::Like, vec![pattern.into()])
    }

    pub fn is_null(relation: &str, attribute: &str) -> Predicate {
        Self::leaf(relation, attribute, CompareOp::IsNull, Vec::new())
    }

    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// The relation a leaf constrains; internal nodes constrain none
    /// directly.
    pub fn relation(&self) -> Option<&str> {
        match self {
            Predicate::Leaf(leaf) => Some(&leaf.relation),
            _ => None,
        }
    }

    /// Structural children of this node
    pub fn children(&self) -> (Option<&Predicate>, Option<&Predicate>) {
        match self {
            Predicate::Leaf(_) => (None, None),
            Predicate::And(l, r) | Predicate::Or(l, r) => (Some(l), Some(r)),
            Predicate::Not(p) => (Some(p), None),
        }
    }

    /// Visit every node in recursion order: self, then left, then right.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Predicate)) {
        visit(self);
        let (l, r) = self.children();
        if let Some(l) = l {
            l.walk(visit);
        }
        if let Some(r) = r {
            r.walk(visit);
        }
    }

    /// Collect every leaf constraining the given relation, in recursion
    /// order.
    pub fn leaves_for<'a>(&'a self, relation: &str) -> Vec<&'a PredicateLeaf> {
        let mut leaves = Vec::new();
        self.walk(&mut |node| {
            if let Predicate::Leaf(leaf) = node {
                if leaf.relation == relation {
                    leaves.push(leaf);
                }
            }
        });
        leaves
    }

    /// Collect the equality leaves reachable through AND conjuncts
    /// only. Leaves under OR or NOT cannot narrow an index probe.
    pub fn conjunct_eq_leaves(&self) -> Vec<&PredicateLeaf> {
        let mut leaves = Vec::new();
        self.collect_conjuncts(&mut leaves);
        leaves
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a PredicateLeaf>) {
        match self {
            Predicate::Leaf(leaf) if leaf.op == CompareOp::Eq => out.push(leaf),
            Predicate::And(l, r) => {
                l.collect_conjuncts(out);
                r.collect_conjuncts(out);
            }
            _ => {}
        }
    }

    /// Evaluate the full tree against a tuple of the given relation.
    pub fn eval(&self, relation: &Relation, tuple: &Tuple) -> Result<bool> {
        match self {
            Predicate::Leaf(leaf) => leaf.eval(relation, tuple),
            Predicate::And(l, r) => Ok(l.eval(relation, tuple)? && r.eval(relation, tuple)?),
            Predicate::Or(l, r) => Ok(l.eval(relation, tuple)? || r.eval(relation, tuple)?),
            Predicate::Not(p) => Ok(!p.eval(relation, tuple)?),
        }
    }

    /// Resolve every leaf of this tree against the given relation,
    /// failing on the first unknown attribute. Used by mutations so an
    /// unknown column fails the statement even over an empty relation.
    pub(crate) fn check_attributes(&self, relation: &Relation) -> Result<()> {
        let mut missing = None;
        self.walk(&mut |node| {
            if missing.is_some() {
                return;
            }
            if let Predicate::Leaf(leaf) = node {
                if let Err(e) = relation.attribute(&leaf.attribute) {
                    missing = Some(e);
                }
            }
        });
        match missing {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Leaf(leaf) => write!(f, "{}", leaf),
            Predicate::And(l, r) => write!(f, "({} AND {})", l, r),
            Predicate::Or(l, r) => write!(f, "({} OR {})", l, r),
            Predicate::Not(p) => write!(f, "NOT {}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Attribute, Domain};

    fn champion() -> Relation {
        Relation::new(
            "public",
            "champion",
            vec![
                Attribute::new("user_id", Domain::Int),
                Attribute::new("name", Domain::Text),
            ],
            &[],
        )
        .unwrap()
    }

    fn row(id: i64, name: &str) -> Tuple {
        Tuple::new(vec![Value::Int(id), Value::Text(name.into())])
    }

    #[test]
    fn test_leaf_eval() {
        let rel = champion();
        let p = Predicate::eq("champion", "user_id", 1);
        assert!(p.eval(&rel, &row(1, "zed")).unwrap());
        assert!(!p.eval(&rel, &row(2, "lulu")).unwrap());
    }

    #[test]
    fn test_unknown_attribute_fails() {
        let rel = champion();
        let p = Predicate::eq("champion", "nonexisting_attribute", 2);
        let err = p.eval(&rel, &row(1, "zed")).unwrap_err();
        assert!(matches!(err, Error::AttributeMissing { .. }));
    }

    #[test]
    fn test_combinators() {
        let rel = champion();
        let p = Predicate::eq("champion", "user_id", 1)
            .and(Predicate::like("champion", "name", "z%"));
        assert!(p.eval(&rel, &row(1, "zed")).unwrap());
        assert!(!p.eval(&rel, &row(1, "lux")).unwrap());

        let p = Predicate::eq("champion", "user_id", 2).or(Predicate::eq("champion", "name", "lux"));
        assert!(p.eval(&rel, &row(1, "lux")).unwrap());

        let p = Predicate::eq("champion", "user_id", 1).not();
        assert!(p.eval(&rel, &row(2, "lulu")).unwrap());
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_match(b"z%", b"zed"));
        assert!(like_match(b"%ed", b"zed"));
        assert!(like_match(b"l_lu", b"lulu"));
        assert!(like_match(b"%", b""));
        assert!(!like_match(b"z%", b"lux"));
        assert!(!like_match(b"l_lu", b"lulux"));
    }

    #[test]
    fn test_in_and_null() {
        let rel = champion();
        let p = Predicate::is_in(
            "champion",
            "user_id",
            vec![Value::Int(1), Value::Int(3)],
        );
        assert!(p.eval(&rel, &row(1, "zed")).unwrap());
        assert!(!p.eval(&rel, &row(2, "lulu")).unwrap());

        let p = Predicate::is_null("champion", "name");
        let mut t = row(1, "zed");
        assert!(!p.eval(&rel, &t).unwrap());
        t.set(1, Value::Null);
        assert!(p.eval(&rel, &t).unwrap());
    }

    #[test]
    fn test_conjunct_eq_leaves() {
        let p = Predicate::eq("a", "x", 1)
            .and(Predicate::gt("a", "y", 2))
            .and(Predicate::eq("b", "z", 3));
        let leaves = p.conjunct_eq_leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].attribute, "x");
        assert_eq!(leaves[1].attribute, "z");

        // equality under OR must not leak into index probes
        let p = Predicate::eq("a", "x", 1).or(Predicate::eq("a", "y", 2));
        assert!(p.conjunct_eq_leaves().is_empty());
    }
}
