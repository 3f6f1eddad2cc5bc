use tree_sitter::Node;

use crate::language::ResolvedValue;

use super::{Candidates, Context, Strategy};

/// Expressions that forward one of their operands: parentheses,
/// `a if cond else b`, `a or b`, keyword arguments and `await`.
pub struct CompositeStrategy;

impl CompositeStrategy {
    fn branches<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        match node.kind() {
            "parenthesized_expression" | "await" => node.named_child(0).into_iter().collect(),
            "keyword_argument" => node.child_by_field_name("value").into_iter().collect(),
            // named children are [consequence, condition, alternative]
            "conditional_expression" => [node.named_child(0), node.named_child(2)]
                .into_iter()
                .flatten()
                .collect(),
            "boolean_operator" => [
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ]
            .into_iter()
            .flatten()
            .collect(),
            _ => Vec::new(),
        }
    }
}

impl Strategy for CompositeStrategy {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn can_handle(&self, node: &Node) -> bool {
        matches!(
            node.kind(),
            "parenthesized_expression"
                | "await"
                | "keyword_argument"
                | "conditional_expression"
                | "boolean_operator"
        )
    }

    fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let candidates = ctx.resolve_all(self.branches(node));
        if candidates.is_empty() {
            vec![ResolvedValue::unresolved(node)]
        } else {
            candidates
        }
    }
}
