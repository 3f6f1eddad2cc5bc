use tree_sitter::Node;

use crate::language::python::syntax::{function_definitions, return_values, MAX_SYNTHETIC_BYTES};
use crate::language::ResolvedValue;
use crate::model::Literal;

use super::{Candidates, Context, Strategy};

/// Calls whose result is a fresh buffer of the requested length.
const RANDOM_BYTE_SOURCES: &[&str] = &[
    "os.urandom",
    "secrets.token_bytes",
    "Crypto.Random.get_random_bytes",
    "Cryptodome.Random.get_random_bytes",
    "bytes",
    "bytearray",
];

pub struct CallStrategy;

impl CallStrategy {
    /// `os.urandom(16)` and friends become a 16-byte placeholder, so size
    /// factories can measure them.
    fn sized_buffer<'t>(&self, node: Node<'t>, function: Node<'t>, ctx: &Context<'t>) -> Option<Candidates<'t>> {
        let callee = ctx
            .imports()
            .qualify(&function, ctx.source().as_bytes())
            .unwrap_or_else(|| ctx.text(&function).to_string());
        if !RANDOM_BYTE_SOURCES.contains(&callee.as_str()) {
            return None;
        }

        let length = first_argument(node)?;
        let sizes: Candidates<'t> = ctx
            .resolve(length)
            .into_iter()
            .filter_map(|candidate| match candidate.literal_value() {
                Some(Literal::Int(n)) if (0..=MAX_SYNTHETIC_BYTES).contains(n) => {
                    let n = usize::try_from(*n).ok()?;
                    Some(ResolvedValue::literal(Literal::Bytes(vec![0; n]), node))
                }
                _ => None,
            })
            .collect();
        Some(sizes)
    }

    /// `"secret".encode()` is the UTF-8 bytes of the string.
    fn encoded<'t>(&self, node: Node<'t>, function: Node<'t>, ctx: &Context<'t>) -> Option<Candidates<'t>> {
        if function.kind() != "attribute" {
            return None;
        }
        let attribute = function.child_by_field_name("attribute")?;
        if ctx.text(&attribute) != "encode" {
            return None;
        }
        let object = function.child_by_field_name("object")?;
        let encoded = ctx
            .resolve(object)
            .into_iter()
            .filter_map(|candidate| match candidate.literal_value() {
                Some(Literal::Str(s)) => Some(ResolvedValue::literal(
                    Literal::Bytes(s.clone().into_bytes()),
                    node,
                )),
                _ => None,
            })
            .collect();
        Some(encoded)
    }

    /// Calls to functions defined in the same module resolve to what they
    /// return.
    fn local_function<'t>(&self, function: Node<'t>, ctx: &Context<'t>) -> Option<Candidates<'t>> {
        let name = match function.kind() {
            "identifier" => ctx.text(&function),
            "attribute" => {
                let object = function.child_by_field_name("object")?;
                if !matches!(ctx.text(&object), "self" | "cls") {
                    return None;
                }
                ctx.text(&function.child_by_field_name("attribute")?)
            }
            _ => return None,
        };
        let definitions = function_definitions(ctx.root(), name, ctx.source());
        if definitions.is_empty() {
            return None;
        }
        Some(ctx.resolve_all(definitions.into_iter().flat_map(return_values)))
    }
}

fn first_argument(call: Node) -> Option<Node> {
    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let first = arguments
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    Some(first)
}

impl Strategy for CallStrategy {
    fn name(&self) -> &'static str {
        "call"
    }

    fn can_handle(&self, node: &Node) -> bool {
        node.kind() == "call"
    }

    fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let Some(function) = node.child_by_field_name("function") else {
            return vec![ResolvedValue::unresolved(node)];
        };

        let candidates = self
            .sized_buffer(node, function, ctx)
            .or_else(|| self.encoded(node, function, ctx))
            .or_else(|| self.local_function(function, ctx))
            .unwrap_or_default();
        if candidates.is_empty() {
            vec![ResolvedValue::unresolved(node)]
        } else {
            candidates
        }
    }
}
