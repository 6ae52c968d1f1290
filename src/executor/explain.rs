//! Query-plan rendering
//!
//! Produces the depth-indented plan emitted through `tracing` and
//! handed to a caller-supplied printer callback.

use crate::executor::node::Node;

/// Render one line per node, children indented four spaces per level:
/// `|-> <NodeName> (|A| = <estimatedCardinality>)`
pub(crate) fn render(node: &Node) -> Vec<String> {
    let mut lines = Vec::new();
    render_into(node, 0, &mut lines);
    lines
}

fn render_into(node: &Node, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!(
        "{}|-> {} (|A| = {})",
        "    ".repeat(depth),
        node,
        node.estimated_cardinality()
    ));
    for child in node.children() {
        render_into(child, depth + 1, lines);
    }
}
