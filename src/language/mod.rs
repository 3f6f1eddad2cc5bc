//! Host front-end interface.
//!
//! The detection engine never looks at syntax itself. A host supplies a
//! node handle type and answers narrow questions about call sites: what is
//! invoked, on which type, with which arguments, and what an argument
//! expression can be traced back to. Every capability answers "absent"
//! instead of failing, so a host that cannot tell simply produces fewer
//! detections.

pub mod memory;
pub mod python;

use std::fmt;
use std::hash::Hash;

use serde::Serialize;

use crate::hooks::{EnumConstant, HookTrigger};
use crate::model::Literal;

/// Answers subtype questions for object-type and parameter-type matching.
pub trait TypeHierarchy {
    fn is_subtype_of(&self, ty: &str, supertype: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument<N> {
    pub keyword: Option<String>,
    pub value: N,
}

impl<N> Argument<N> {
    pub fn positional(value: N) -> Self {
        Self {
            keyword: None,
            value,
        }
    }

    pub fn keyword(name: impl Into<String>, value: N) -> Self {
        Self {
            keyword: Some(name.into()),
            value,
        }
    }
}

/// A function definition, as precisely as the host can name it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionRef {
    pub name: String,
    /// Type the function is a member of; `None` for free functions.
    pub owner: Option<String>,
    /// Host key telling same-named definitions apart, when it has one.
    pub definition: Option<usize>,
}

impl FunctionRef {
    pub fn free(name: impl Into<String>, definition: Option<usize>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            definition,
        }
    }

    pub fn member(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: Some(owner.into()),
            definition: None,
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{owner}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// What an expression was traced back to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    Literal(Literal),
    Unresolved,
    /// The expression is the `index`-th positional parameter (named `name`)
    /// of the enclosing `function`; its value is only known at call sites.
    FunctionParameter {
        function: FunctionRef,
        index: usize,
        name: Option<String>,
    },
}

/// One candidate definition of an expression: the resolution and the node
/// that defines it (the literal, the defining call, or the expression itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedValue<N> {
    pub value: Resolution,
    pub tree: N,
}

impl<N> ResolvedValue<N> {
    pub fn literal(literal: Literal, tree: N) -> Self {
        Self {
            value: Resolution::Literal(literal),
            tree,
        }
    }

    pub fn unresolved(tree: N) -> Self {
        Self {
            value: Resolution::Unresolved,
            tree,
        }
    }

    pub fn literal_value(&self) -> Option<&Literal> {
        match &self.value {
            Resolution::Literal(literal) => Some(literal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

pub trait LanguageSupport: TypeHierarchy + Send + Sync {
    type Node: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Invoked member name; for constructions, the simple class name.
    fn method_name(&self, site: &Self::Node) -> Option<String>;

    /// Statically resolved type of the receiver, or of the constructed object.
    fn invoked_object_type(&self, site: &Self::Node) -> Option<String>;

    fn is_constructor(&self, site: &Self::Node) -> bool;

    /// Arguments in source order. Empty for nodes that are not call sites.
    fn arguments(&self, site: &Self::Node) -> Vec<Argument<Self::Node>>;

    fn argument_type(&self, argument: &Self::Node) -> Option<String>;

    /// Every candidate definition the expression can be traced to within the
    /// reachable call stack. Never empty for a valid node: an expression that
    /// cannot be traced yields one `Unresolved` candidate rooted at itself.
    fn resolve(&self, expression: &Self::Node) -> Vec<ResolvedValue<Self::Node>>;

    fn enum_constant(&self, expression: &Self::Node) -> Option<EnumConstant>;

    /// Call sites whose receiver is the value produced by `site`
    /// (`c = Cipher(..); c.init(..)` or `Cipher(..).init(..)`).
    fn result_usages(&self, site: &Self::Node) -> Vec<Self::Node>;

    fn source_location(&self, node: &Self::Node) -> Option<SourceLocation>;

    /// Whether `site` calls exactly `function`, not merely something with
    /// the same name.
    fn calls_function(&self, site: &Self::Node, function: &FunctionRef) -> bool;

    fn describe(&self, node: &Self::Node) -> String {
        self.source_location(node)
            .map(|location| location.to_string())
            .unwrap_or_else(|| format!("{node:?}"))
    }

    /// The node at which `site` satisfies `trigger`, if it does.
    fn matches_trigger(&self, trigger: &HookTrigger, site: &Self::Node) -> Option<Self::Node> {
        match trigger {
            HookTrigger::Invocation { method } => {
                let name = self.method_name(site)?;
                (&name == method).then(|| site.clone())
            }
            HookTrigger::Call(function) => self.calls_function(site, function).then(|| site.clone()),
            HookTrigger::EnumConstant(constant) => self
                .arguments(site)
                .into_iter()
                .map(|argument| argument.value)
                .find(|value| {
                    self.enum_constant(value)
                        .is_some_and(|found| constant.matches(&found))
                }),
        }
    }
}
