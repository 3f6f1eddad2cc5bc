use tree_sitter::Node;

use crate::language::python::syntax::{parse_int_literal, parse_string_literal};
use crate::language::ResolvedValue;
use crate::model::Literal;

use super::{Candidates, Context, Strategy};

pub struct LiteralStrategy;

impl LiteralStrategy {
    fn concatenated(&self, node: &Node, ctx: &Context) -> Option<Literal> {
        let mut cursor = node.walk();
        let parts: Vec<Literal> = node
            .named_children(&mut cursor)
            .map(|part| parse_string_literal(ctx.text(&part)))
            .collect::<Option<_>>()?;

        let mut parts = parts.into_iter();
        let mut joined = parts.next()?;
        for part in parts {
            joined = match (joined, part) {
                (Literal::Str(mut a), Literal::Str(b)) => {
                    a.push_str(&b);
                    Literal::Str(a)
                }
                (Literal::Bytes(mut a), Literal::Bytes(b)) => {
                    a.extend(b);
                    Literal::Bytes(a)
                }
                _ => return None,
            };
        }
        Some(joined)
    }

    fn float(&self, raw: &str) -> Option<Literal> {
        let cleaned = raw.replace('_', "");
        let value = cleaned.parse::<f64>().ok()?;
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
            Some(Literal::Int(value as i64))
        } else {
            Some(Literal::Str(cleaned))
        }
    }
}

impl Strategy for LiteralStrategy {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn can_handle(&self, node: &Node) -> bool {
        matches!(
            node.kind(),
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false" | "none"
        )
    }

    fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let literal = match node.kind() {
            "string" => parse_string_literal(ctx.text(&node)),
            "concatenated_string" => self.concatenated(&node, ctx),
            "integer" => parse_int_literal(ctx.text(&node)),
            "float" => self.float(ctx.text(&node)),
            "true" => Some(Literal::Str("True".to_string())),
            "false" => Some(Literal::Str("False".to_string())),
            _ => None,
        };
        match literal {
            Some(literal) => vec![ResolvedValue::literal(literal, node)],
            None => vec![ResolvedValue::unresolved(node)],
        }
    }
}
