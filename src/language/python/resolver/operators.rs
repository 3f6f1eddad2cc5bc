use tree_sitter::Node;

use crate::language::python::syntax::MAX_SYNTHETIC_BYTES;
use crate::language::ResolvedValue;
use crate::model::Literal;

use super::{Candidates, Context, Strategy, MAX_CANDIDATES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
    Pow,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "//" => Some(Self::FloorDiv),
            "%" => Some(Self::Mod),
            "**" => Some(Self::Pow),
            "<<" => Some(Self::ShiftLeft),
            ">>" => Some(Self::ShiftRight),
            "&" => Some(Self::BitAnd),
            "|" => Some(Self::BitOr),
            "^" => Some(Self::BitXor),
            _ => None,
        }
    }

    pub fn apply(&self, left: &Literal, right: &Literal) -> Option<Literal> {
        match (left, right) {
            (Literal::Int(a), Literal::Int(b)) => self.apply_int(*a, *b).map(Literal::Int),
            (Literal::Str(a), Literal::Str(b)) if *self == Self::Add => Some(Literal::Str(format!("{a}{b}"))),
            (Literal::Bytes(a), Literal::Bytes(b)) if *self == Self::Add => {
                Some(Literal::Bytes([a.as_slice(), b.as_slice()].concat()))
            }
            (Literal::Bytes(bytes), Literal::Int(n)) | (Literal::Int(n), Literal::Bytes(bytes))
                if *self == Self::Mul =>
            {
                let count = usize::try_from(*n).ok()?;
                let total = i64::try_from(bytes.len().checked_mul(count)?).ok()?;
                (total <= MAX_SYNTHETIC_BYTES).then(|| Literal::Bytes(bytes.repeat(count)))
            }
            _ => None,
        }
    }

    fn apply_int(&self, a: i64, b: i64) -> Option<i64> {
        match self {
            Self::Add => a.checked_add(b),
            Self::Sub => a.checked_sub(b),
            Self::Mul => a.checked_mul(b),
            Self::FloorDiv => (b != 0).then(|| a.div_euclid(b)),
            Self::Mod => (b != 0).then(|| a.rem_euclid(b)),
            Self::Pow => a.checked_pow(u32::try_from(b).ok()?),
            Self::ShiftLeft => a.checked_shl(u32::try_from(b).ok()?),
            Self::ShiftRight => a.checked_shr(u32::try_from(b).ok()?),
            Self::BitAnd => Some(a & b),
            Self::BitOr => Some(a | b),
            Self::BitXor => Some(a ^ b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
}

impl UnaryOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "-" => Some(Self::Neg),
            "+" => Some(Self::Pos),
            "~" => Some(Self::Invert),
            _ => None,
        }
    }

    pub fn apply(&self, operand: &Literal) -> Option<Literal> {
        let Literal::Int(value) = operand else {
            return None;
        };
        match self {
            Self::Neg => value.checked_neg().map(Literal::Int),
            Self::Pos => Some(Literal::Int(*value)),
            Self::Invert => Some(Literal::Int(!value)),
        }
    }
}

/// Folds `binary_operator` and `unary_operator` nodes over the literal
/// candidates of their operands.
pub struct OperatorStrategy;

impl OperatorStrategy {
    fn binary<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let op = node
            .child_by_field_name("operator")
            .and_then(|op| BinaryOp::parse(ctx.text(&op)));
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");
        let (Some(op), Some(left), Some(right)) = (op, left, right) else {
            return vec![ResolvedValue::unresolved(node)];
        };

        let lefts = literals_of(ctx.resolve(left));
        let rights = literals_of(ctx.resolve(right));
        let mut out = Candidates::new();
        for a in &lefts {
            for b in &rights {
                if let Some(folded) = op.apply(a, b) {
                    let candidate = ResolvedValue::literal(folded, node);
                    if out.len() < MAX_CANDIDATES && !out.contains(&candidate) {
                        out.push(candidate);
                    }
                }
            }
        }
        if out.is_empty() {
            out.push(ResolvedValue::unresolved(node));
        }
        out
    }

    fn unary<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let op = node
            .child_by_field_name("operator")
            .and_then(|op| UnaryOp::parse(ctx.text(&op)));
        let (Some(op), Some(operand)) = (op, node.child_by_field_name("argument")) else {
            return vec![ResolvedValue::unresolved(node)];
        };

        let mut out: Candidates<'t> = literals_of(ctx.resolve(operand))
            .iter()
            .filter_map(|literal| op.apply(literal))
            .map(|literal| ResolvedValue::literal(literal, node))
            .collect();
        out.dedup();
        if out.is_empty() {
            out.push(ResolvedValue::unresolved(node));
        }
        out
    }
}

fn literals_of(candidates: Candidates) -> Vec<Literal> {
    candidates
        .into_iter()
        .filter_map(|candidate| candidate.literal_value().cloned())
        .collect()
}

impl Strategy for OperatorStrategy {
    fn name(&self) -> &'static str {
        "operator"
    }

    fn can_handle(&self, node: &Node) -> bool {
        matches!(node.kind(), "binary_operator" | "unary_operator")
    }

    fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        match node.kind() {
            "binary_operator" => self.binary(node, ctx),
            _ => self.unary(node, ctx),
        }
    }
}
