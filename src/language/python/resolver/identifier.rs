use tree_sitter::Node;

use crate::language::python::syntax::{assignments_to, enclosing_function, owning_class, parameters};
use crate::language::{FunctionRef, ResolvedValue, Resolution};

use super::{Candidates, Context, Strategy};

/// Traces a name to the assignments that reach it: local assignments before
/// the use, then the enclosing function's parameters, then module-level
/// assignments.
pub struct IdentifierStrategy;

impl IdentifierStrategy {
    fn parameter<'t>(&self, function: Node<'t>, node: Node<'t>, name: &str, ctx: &Context<'t>) -> Option<Candidates<'t>> {
        let parameter = parameters(function, ctx.source())
            .into_iter()
            .find(|parameter| parameter.name == name)?;
        let function_name = function
            .child_by_field_name("name")
            .map(|n| ctx.text(&n).to_string())?;
        let owner = owning_class(function)
            .and_then(|class| class.child_by_field_name("name"))
            .map(|class| ctx.text(&class).to_string());

        let mut out = vec![ResolvedValue {
            value: Resolution::FunctionParameter {
                function: FunctionRef {
                    name: function_name,
                    owner,
                    definition: Some(function.start_byte()),
                },
                index: parameter.index,
                name: Some(parameter.name),
            },
            tree: node,
        }];
        if let Some(default) = parameter.default {
            for candidate in ctx.resolve(default) {
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        Some(out)
    }
}

impl Strategy for IdentifierStrategy {
    fn name(&self) -> &'static str {
        "identifier"
    }

    fn can_handle(&self, node: &Node) -> bool {
        node.kind() == "identifier"
    }

    fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let name = ctx.text(&node);
        let function = enclosing_function(node);
        let scope = function
            .and_then(|f| f.child_by_field_name("body"))
            .unwrap_or_else(|| ctx.root());

        let local = assignments_to(scope, name, node.start_byte(), ctx.source());
        if !local.is_empty() {
            return ctx.resolve_all(local);
        }

        let Some(function) = function else {
            return vec![ResolvedValue::unresolved(node)];
        };
        if let Some(candidates) = self.parameter(function, node, name, ctx) {
            return candidates;
        }

        let root = ctx.root();
        let module = assignments_to(root, name, root.end_byte(), ctx.source());
        if module.is_empty() {
            vec![ResolvedValue::unresolved(node)]
        } else {
            ctx.resolve_all(module)
        }
    }
}
