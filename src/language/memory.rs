//! Programmatic host: a program assembled node by node.
//!
//! Useful for embedding the engine behind a front end that already has its
//! own semantic model, and for exercising rules without a parser. Nodes are
//! identified by `NodeId`; every node sits on its own line, in creation
//! order.

use std::collections::{HashMap, HashSet};

use crate::hooks::EnumConstant;
use crate::model::Literal;

use super::{
    Argument, FunctionRef, LanguageSupport, ResolvedValue, Resolution, SourceLocation, TypeHierarchy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Call {
        object_type: String,
        method: String,
        constructor: bool,
        arguments: Vec<Argument<NodeId>>,
    },
    Literal {
        literal: Literal,
        ty: String,
    },
    Reference {
        ty: Option<String>,
        definitions: Vec<NodeId>,
    },
    Parameter {
        function: FunctionRef,
        index: usize,
        ty: Option<String>,
    },
    EnumConstant {
        class_name: String,
        identifier: String,
    },
    Opaque {
        ty: Option<String>,
    },
}

#[derive(Debug, Default)]
pub struct MemoryProgram {
    file: String,
    nodes: Vec<NodeKind>,
    supertypes: HashMap<String, Vec<String>>,
    usages: HashMap<NodeId, Vec<NodeId>>,
}

impl MemoryProgram {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(kind);
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: &NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0)
    }

    pub fn declare_subtype(&mut self, ty: impl Into<String>, supertype: impl Into<String>) {
        self.supertypes
            .entry(ty.into())
            .or_default()
            .push(supertype.into());
    }

    pub fn literal(&mut self, literal: Literal, ty: impl Into<String>) -> NodeId {
        self.push(NodeKind::Literal {
            literal,
            ty: ty.into(),
        })
    }

    pub fn string(&mut self, value: impl Into<String>) -> NodeId {
        self.literal(Literal::Str(value.into()), "java.lang.String")
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.literal(Literal::Int(value), "int")
    }

    /// A variable whose value comes from any of `definitions`.
    pub fn reference(&mut self, ty: Option<&str>, definitions: &[NodeId]) -> NodeId {
        self.push(NodeKind::Reference {
            ty: ty.map(str::to_string),
            definitions: definitions.to_vec(),
        })
    }

    /// The `index`-th parameter of method `function` of `owner`, as seen
    /// inside its body.
    pub fn parameter(
        &mut self,
        owner: impl Into<String>,
        function: impl Into<String>,
        index: usize,
        ty: Option<&str>,
    ) -> NodeId {
        self.push(NodeKind::Parameter {
            function: FunctionRef::member(owner, function),
            index,
            ty: ty.map(str::to_string),
        })
    }

    pub fn enum_constant(&mut self, class_name: impl Into<String>, identifier: impl Into<String>) -> NodeId {
        self.push(NodeKind::EnumConstant {
            class_name: class_name.into(),
            identifier: identifier.into(),
        })
    }

    pub fn opaque(&mut self, ty: Option<&str>) -> NodeId {
        self.push(NodeKind::Opaque {
            ty: ty.map(str::to_string),
        })
    }

    pub fn call(&mut self, object_type: impl Into<String>, method: impl Into<String>, arguments: &[NodeId]) -> NodeId {
        let arguments = arguments.iter().copied().map(Argument::positional).collect();
        self.call_with(object_type, method, arguments)
    }

    pub fn call_with(
        &mut self,
        object_type: impl Into<String>,
        method: impl Into<String>,
        arguments: Vec<Argument<NodeId>>,
    ) -> NodeId {
        self.push(NodeKind::Call {
            object_type: object_type.into(),
            method: method.into(),
            constructor: false,
            arguments,
        })
    }

    pub fn construct(&mut self, object_type: impl Into<String>, arguments: &[NodeId]) -> NodeId {
        let object_type = object_type.into();
        let method = object_type
            .rsplit('.')
            .next()
            .unwrap_or(&object_type)
            .to_string();
        self.push(NodeKind::Call {
            object_type,
            method,
            constructor: true,
            arguments: arguments.iter().copied().map(Argument::positional).collect(),
        })
    }

    /// Records that `usage` is invoked on the value `site` produces.
    pub fn add_usage(&mut self, site: NodeId, usage: NodeId) {
        self.usages.entry(site).or_default().push(usage);
    }

    /// Call and construction sites in creation order.
    pub fn call_sites(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, kind)| matches!(kind, NodeKind::Call { .. }))
            .map(|(index, _)| NodeId(index))
            .collect()
    }

    fn resolve_into(
        &self,
        id: NodeId,
        seen: &mut HashSet<NodeId>,
        out: &mut Vec<ResolvedValue<NodeId>>,
    ) {
        if !seen.insert(id) {
            return;
        }
        let Some(kind) = self.node(&id) else {
            return;
        };

        let resolved = match kind {
            NodeKind::Literal { literal, .. } => ResolvedValue::literal(literal.clone(), id),
            NodeKind::EnumConstant { identifier, .. } => {
                ResolvedValue::literal(Literal::Str(identifier.clone()), id)
            }
            NodeKind::Parameter {
                function, index, ..
            } => ResolvedValue {
                value: Resolution::FunctionParameter {
                    function: function.clone(),
                    index: *index,
                    name: None,
                },
                tree: id,
            },
            NodeKind::Reference { definitions, .. } if !definitions.is_empty() => {
                for definition in definitions {
                    self.resolve_into(*definition, seen, out);
                }
                return;
            }
            _ => ResolvedValue::unresolved(id),
        };
        if !out.contains(&resolved) {
            out.push(resolved);
        }
    }
}

impl TypeHierarchy for MemoryProgram {
    fn is_subtype_of(&self, ty: &str, supertype: &str) -> bool {
        let mut pending = vec![ty];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if current == supertype {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(current) {
                pending.extend(parents.iter().map(String::as_str));
            }
        }
        false
    }
}

impl LanguageSupport for MemoryProgram {
    type Node = NodeId;

    fn method_name(&self, site: &NodeId) -> Option<String> {
        match self.node(site)? {
            NodeKind::Call { method, .. } => Some(method.clone()),
            _ => None,
        }
    }

    fn invoked_object_type(&self, site: &NodeId) -> Option<String> {
        match self.node(site)? {
            NodeKind::Call { object_type, .. } => Some(object_type.clone()),
            _ => None,
        }
    }

    fn is_constructor(&self, site: &NodeId) -> bool {
        matches!(
            self.node(site),
            Some(NodeKind::Call {
                constructor: true,
                ..
            })
        )
    }

    fn arguments(&self, site: &NodeId) -> Vec<Argument<NodeId>> {
        match self.node(site) {
            Some(NodeKind::Call { arguments, .. }) => arguments.clone(),
            _ => Vec::new(),
        }
    }

    fn argument_type(&self, argument: &NodeId) -> Option<String> {
        match self.node(argument)? {
            NodeKind::Literal { ty, .. } => Some(ty.clone()),
            NodeKind::EnumConstant { class_name, .. } => Some(class_name.clone()),
            NodeKind::Call {
                object_type,
                constructor: true,
                ..
            } => Some(object_type.clone()),
            NodeKind::Reference { ty, .. }
            | NodeKind::Parameter { ty, .. }
            | NodeKind::Opaque { ty } => ty.clone(),
            NodeKind::Call { .. } => None,
        }
    }

    fn resolve(&self, expression: &NodeId) -> Vec<ResolvedValue<NodeId>> {
        let mut out = Vec::new();
        self.resolve_into(*expression, &mut HashSet::new(), &mut out);
        if out.is_empty() {
            out.push(ResolvedValue::unresolved(*expression));
        }
        out
    }

    fn enum_constant(&self, expression: &NodeId) -> Option<EnumConstant> {
        match self.node(expression)? {
            NodeKind::EnumConstant {
                class_name,
                identifier,
            } => Some(EnumConstant::new(Some(class_name), identifier.clone())),
            _ => None,
        }
    }

    fn result_usages(&self, site: &NodeId) -> Vec<NodeId> {
        self.usages.get(site).cloned().unwrap_or_default()
    }

    fn source_location(&self, node: &NodeId) -> Option<SourceLocation> {
        self.node(node)?;
        Some(SourceLocation {
            file: self.file.clone(),
            line: node.0 + 1,
            column: 1,
        })
    }

    /// Members match by name on the owner or a subtype of it; free
    /// functions by name alone.
    fn calls_function(&self, site: &NodeId, function: &FunctionRef) -> bool {
        let Some(NodeKind::Call {
            object_type,
            method,
            constructor: false,
            ..
        }) = self.node(site)
        else {
            return false;
        };
        *method == function.name
            && function
                .owner
                .as_deref()
                .map_or(true, |owner| self.is_subtype_of(object_type, owner))
    }
}
