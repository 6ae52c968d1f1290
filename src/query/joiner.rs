//! Join descriptors
//!
//! A joiner is a pure two-relation equality-join description. The
//! execution tree it participates in is built by the planner; the
//! descriptor itself carries no execution state.

use std::fmt;

/// Equality join between two relations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joiner {
    pub left_relation: String,
    pub left_attribute: String,
    pub right_relation: String,
    pub right_attribute: String,
}

impl Joiner {
    /// Join `left.left_attr = right.right_attr`
    pub fn on(
        left_relation: &str,
        left_attribute: &str,
        right_relation: &str,
        right_attribute: &str,
    ) -> Joiner {
        Joiner {
            left_relation: left_relation.to_string(),
            left_attribute: left_attribute.to_string(),
            right_relation: right_relation.to_string(),
            right_attribute: right_attribute.to_string(),
        }
    }
}

impl fmt::Display for Joiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = {}.{}",
            self.left_relation, self.left_attribute, self.right_relation, self.right_attribute
        )
    }
}
