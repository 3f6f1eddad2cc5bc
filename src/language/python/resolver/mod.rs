//! Value resolution for Python expressions.
//!
//! A chain of strategies, each handling one family of syntax nodes, traces
//! an expression back to its candidate definitions. Strategies recurse
//! through `Context::resolve`, which carries cycle detection and the depth
//! cap for the whole trace.

mod attribute;
mod call;
mod composite;
mod identifier;
mod literal;
mod operators;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use tree_sitter::Node;

use crate::language::ResolvedValue;

use super::imports::ImportMap;
use super::syntax::text;

pub use attribute::AttributeStrategy;
pub use call::CallStrategy;
pub use composite::CompositeStrategy;
pub use identifier::IdentifierStrategy;
pub use literal::LiteralStrategy;
pub use operators::OperatorStrategy;

const DEFAULT_MAX_DEPTH: usize = 32;

/// Upper bound on candidates per expression; operator products grow fast.
pub const MAX_CANDIDATES: usize = 16;

pub type Candidates<'t> = Vec<ResolvedValue<Node<'t>>>;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_handle(&self, node: &Node) -> bool;
    fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t>;
}

pub struct Context<'t> {
    source: &'t str,
    root: Node<'t>,
    imports: &'t ImportMap,
    resolver: &'t Resolver,
    visited: RefCell<HashSet<usize>>,
    depth: Cell<usize>,
}

impl<'t> Context<'t> {
    pub fn new(source: &'t str, root: Node<'t>, imports: &'t ImportMap, resolver: &'t Resolver) -> Self {
        Self {
            source,
            root,
            imports,
            resolver,
            visited: RefCell::new(HashSet::new()),
            depth: Cell::new(0),
        }
    }

    pub fn source(&self) -> &'t str {
        self.source
    }

    pub fn root(&self) -> Node<'t> {
        self.root
    }

    pub fn imports(&self) -> &'t ImportMap {
        self.imports
    }

    pub fn text(&self, node: &Node) -> &'t str {
        text(node, self.source)
    }

    /// Resolves a subexpression. Empty when `node` is already being resolved
    /// further up or the depth cap is reached.
    pub fn resolve(&self, node: Node<'t>) -> Candidates<'t> {
        self.resolver.resolve_in(node, self)
    }

    /// Resolves every node and merges the candidates in order.
    pub fn resolve_all(&self, nodes: impl IntoIterator<Item = Node<'t>>) -> Candidates<'t> {
        let mut out = Candidates::new();
        for node in nodes {
            for candidate in self.resolve(node) {
                if out.len() >= MAX_CANDIDATES {
                    return out;
                }
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }
}

pub struct Resolver {
    strategies: Vec<Box<dyn Strategy>>,
    max_depth: usize,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            strategies: Self::default_strategies(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    fn default_strategies() -> Vec<Box<dyn Strategy>> {
        vec![
            Box::new(LiteralStrategy),
            Box::new(OperatorStrategy),
            Box::new(IdentifierStrategy),
            Box::new(AttributeStrategy),
            Box::new(CallStrategy),
            Box::new(CompositeStrategy),
        ]
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Entry point: never empty, an untraceable expression yields one
    /// unresolved candidate rooted at itself.
    pub fn resolve<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        let candidates = self.resolve_in(node, ctx);
        if candidates.is_empty() {
            vec![ResolvedValue::unresolved(node)]
        } else {
            candidates
        }
    }

    fn resolve_in<'t>(&self, node: Node<'t>, ctx: &Context<'t>) -> Candidates<'t> {
        if ctx.depth.get() >= self.max_depth {
            return Candidates::new();
        }
        if !ctx.visited.borrow_mut().insert(node.id()) {
            return Candidates::new();
        }
        ctx.depth.set(ctx.depth.get() + 1);

        let result = match self.strategies.iter().find(|s| s.can_handle(&node)) {
            Some(strategy) => strategy.resolve(node, ctx),
            None => vec![ResolvedValue::unresolved(node)],
        };

        ctx.depth.set(ctx.depth.get() - 1);
        ctx.visited.borrow_mut().remove(&node.id());
        result
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
