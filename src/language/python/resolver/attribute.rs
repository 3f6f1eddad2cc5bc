use tree_sitter::Node;

use crate::language::python::syntax::{enclosing_class, is_constant_name, member_assignments};
use crate::language::ResolvedValue;
use crate::model::Literal;

use super::{Candidates, Context, Strategy};

/// `self.field` follows the assignments made to the field in the class.
/// Upper-case members (`Encoding.PEM`, `hashes.SHA256`) and members of
/// imported modules (`hashlib.sha256`) resolve to their own name.
pub struct AttributeStrategy;

impl Strategy for AttributeStrategy {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn can_handle(&self, node: &Node) -> bool {
        node.kind() == "attribute"
    }

    fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let (Some(object), Some(attribute)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("attribute"),
        ) else {
            return vec![ResolvedValue::unresolved(node)];
        };
        let member = ctx.text(&attribute);

        if object.kind() == "identifier" && ctx.text(&object) == "self" {
            let assigned = enclosing_class(node)
                .map(|class| member_assignments(class, member, ctx.source()))
                .unwrap_or_default();
            if !assigned.is_empty() {
                return ctx.resolve_all(assigned);
            }
        }

        let names_symbol = is_constant_name(member)
            || ctx.imports().qualify(&object, ctx.source().as_bytes()).is_some();
        if names_symbol {
            vec![ResolvedValue::literal(Literal::Str(member.to_string()), node)]
        } else {
            vec![ResolvedValue::unresolved(node)]
        }
    }
}
