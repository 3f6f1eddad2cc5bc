//! Python host, backed by tree-sitter.
//!
//! Types are approximated from imports and constructor calls: a call on
//! `hashlib` has receiver type `hashlib`, `Cipher(...)` constructs
//! `cryptography.hazmat.primitives.ciphers.Cipher`, and a variable assigned
//! from a constructor has the constructed type. Anything else is unknown.

pub mod imports;
mod resolver;
mod syntax;

pub use imports::ImportMap;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::ParserError;
use crate::hooks::EnumConstant;

use self::resolver::{Context, Resolver};
use self::syntax::{
    assignments_to, calls_in, enclosing_class, enclosing_function, function_definitions,
    is_class_name, is_constant_name, owning_class, parameters, scope_of, text,
};
use super::{Argument, FunctionRef, LanguageSupport, ResolvedValue, SourceLocation, TypeHierarchy};

const MAX_TYPE_DEPTH: usize = 16;

/// Handle to a syntax node of a `PythonProgram`: its byte range and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyntaxRef {
    start: usize,
    end: usize,
    kind: &'static str,
}

impl SyntaxRef {
    fn of(node: &Node) -> Self {
        Self {
            start: node.start_byte(),
            end: node.end_byte(),
            kind: node.kind(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

pub struct PythonProgram {
    file: String,
    source: String,
    tree: Tree,
    imports: ImportMap,
    /// Locally defined classes and their base class paths.
    class_bases: HashMap<String, Vec<String>>,
    resolver: Resolver,
}

impl PythonProgram {
    pub fn parse(file: impl Into<String>, source: impl Into<String>) -> Result<Self, ParserError> {
        let file = file.into();
        let source = source.into();

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|_| ParserError::grammar_unavailable("python"))?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| ParserError::no_syntax_tree(&file))?;

        let imports = ImportMap::extract(&tree, source.as_bytes());
        let mut program = Self {
            file,
            source,
            tree,
            imports,
            class_bases: HashMap::new(),
            resolver: Resolver::new(),
        };
        program.class_bases = program.collect_class_bases();
        Ok(program)
    }

    pub fn is_python_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("py" | "pyi" | "pyw")
        )
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn imports(&self) -> &ImportMap {
        &self.imports
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Every call expression, in source order (outer calls before the calls
    /// nested in their arguments).
    pub fn call_sites(&self) -> Vec<SyntaxRef> {
        calls_in(self.tree.root_node())
            .iter()
            .map(SyntaxRef::of)
            .collect()
    }

    pub fn text_of(&self, node: &SyntaxRef) -> Option<&str> {
        self.source.get(node.byte_range())
    }

    fn node(&self, at: &SyntaxRef) -> Option<Node<'_>> {
        let mut node = self
            .tree
            .root_node()
            .descendant_for_byte_range(at.start, at.end)?;
        loop {
            if node.start_byte() != at.start || node.end_byte() != at.end {
                return None;
            }
            if node.kind() == at.kind {
                return Some(node);
            }
            node = node.parent()?;
        }
    }

    fn call(&self, site: &SyntaxRef) -> Option<Node<'_>> {
        self.node(site).filter(|node| node.kind() == "call")
    }

    fn text(&self, node: &Node) -> &str {
        text(node, &self.source)
    }

    fn collect_class_bases(&self) -> HashMap<String, Vec<String>> {
        let mut bases = HashMap::new();
        let mut pending = vec![self.tree.root_node()];
        while let Some(node) = pending.pop() {
            if node.kind() == "class_definition" {
                if let Some(name) = node.child_by_field_name("name") {
                    let parents = node
                        .child_by_field_name("superclasses")
                        .map(|list| {
                            let mut cursor = list.walk();
                            let parents: Vec<String> = list
                                .named_children(&mut cursor)
                                .filter(|base| matches!(base.kind(), "identifier" | "attribute"))
                                .map(|base| self.class_path(base))
                                .collect();
                            parents
                        })
                        .unwrap_or_default();
                    bases.insert(self.text(&name).to_string(), parents);
                }
            }
            let mut cursor = node.walk();
            pending.extend(node.named_children(&mut cursor));
        }
        bases
    }

    /// Import-qualified path of a class reference, or its text.
    fn class_path(&self, node: Node) -> String {
        let node = match node.kind() {
            "type" => node.named_child(0).unwrap_or(node),
            _ => node,
        };
        self.imports
            .qualify(&node, self.source.as_bytes())
            .unwrap_or_else(|| self.text(&node).to_string())
    }

    fn callee_name(&self, call: Node) -> Option<String> {
        let function = call.child_by_field_name("function")?;
        let name = match function.kind() {
            "identifier" => function,
            "attribute" => function.child_by_field_name("attribute")?,
            _ => return None,
        };
        Some(self.text(&name).to_string())
    }

    fn is_constructor_call(&self, call: Node) -> bool {
        self.callee_name(call).is_some_and(|name| is_class_name(&name))
    }

    fn expression_type(&self, node: Node, depth: usize) -> Option<String> {
        if depth > MAX_TYPE_DEPTH {
            return None;
        }
        match node.kind() {
            "string" | "concatenated_string" => {
                let raw = self.text(&node);
                let prefix: String = raw
                    .chars()
                    .take_while(|c| c.is_ascii_alphabetic())
                    .collect();
                let ty = if prefix.to_ascii_lowercase().contains('b') {
                    "bytes"
                } else {
                    "str"
                };
                Some(ty.to_string())
            }
            "integer" => Some("int".to_string()),
            "float" => Some("float".to_string()),
            "true" | "false" => Some("bool".to_string()),
            "list" | "list_comprehension" => Some("list".to_string()),
            "dictionary" | "dictionary_comprehension" => Some("dict".to_string()),
            "tuple" => Some("tuple".to_string()),
            "parenthesized_expression" => self.expression_type(node.named_child(0)?, depth + 1),
            "call" => {
                let function = node.child_by_field_name("function")?;
                self.is_constructor_call(node)
                    .then(|| self.class_path(function))
            }
            "attribute" => self.imports.qualify(&node, self.source.as_bytes()),
            "identifier" => self.identifier_type(node, depth),
            _ => None,
        }
    }

    fn identifier_type(&self, node: Node, depth: usize) -> Option<String> {
        let name = self.text(&node);
        if name == "self" {
            return enclosing_class(node)
                .and_then(|class| class.child_by_field_name("name"))
                .map(|class| self.text(&class).to_string());
        }
        let root = self.tree.root_node();
        let scope = scope_of(node, root);
        if let Some(last) = assignments_to(scope, name, node.start_byte(), &self.source).last() {
            return self.expression_type(*last, depth + 1);
        }
        if let Some(function) = enclosing_function(node) {
            if let Some(parameter) = parameters(function, &self.source)
                .into_iter()
                .find(|parameter| parameter.name == name)
            {
                return parameter.annotation.map(|annotation| self.class_path(annotation));
            }
        }
        self.imports
            .qualify(&node, self.source.as_bytes())
            .or_else(|| self.class_bases.contains_key(name).then(|| name.to_string()))
    }

    /// The module-level or nested `def` a bare name refers to at `reference`.
    /// The innermost scope defining the name wins; within it, the last
    /// definition before the reference, else the first one.
    fn visible_definition<'t>(&'t self, reference: Node<'t>) -> Option<Node<'t>> {
        let root = self.tree.root_node();
        let definitions: Vec<Node> = function_definitions(root, self.text(&reference), &self.source)
            .into_iter()
            .filter(|definition| owning_class(*definition).is_none())
            .collect();

        let mut scope = Some(scope_of(reference, root));
        while let Some(current) = scope {
            let in_scope: Vec<Node> = definitions
                .iter()
                .copied()
                .filter(|definition| scope_of(*definition, root) == current)
                .collect();
            if !in_scope.is_empty() {
                return in_scope
                    .iter()
                    .rev()
                    .find(|definition| definition.start_byte() < reference.start_byte())
                    .or_else(|| in_scope.first())
                    .copied();
            }
            // a function body's outer scope is the one holding the function
            scope = (current != root)
                .then(|| current.parent())
                .flatten()
                .map(|function| scope_of(function, root));
        }
        None
    }

    /// Calls made on the variable `call` is assigned to, up to the next
    /// assignment of that variable.
    fn calls_on_assigned<'t>(&'t self, call: Node<'t>) -> Vec<Node<'t>> {
        let Some(assignment) = call.parent().filter(|p| p.kind() == "assignment") else {
            return Vec::new();
        };
        let left = assignment.child_by_field_name("left");
        let right = assignment.child_by_field_name("right");
        let (Some(left), Some(right)) = (left, right) else {
            return Vec::new();
        };
        if right != call || left.kind() != "identifier" {
            return Vec::new();
        }

        let name = self.text(&left);
        let scope = scope_of(call, self.tree.root_node());
        let until = assignments_to(scope, name, usize::MAX, &self.source)
            .iter()
            .map(|rhs| rhs.start_byte())
            .find(|&start| start > assignment.end_byte())
            .unwrap_or(usize::MAX);

        calls_in(scope)
            .into_iter()
            .filter(|usage| usage.start_byte() >= assignment.end_byte() && usage.start_byte() < until)
            .filter(|usage| {
                usage
                    .child_by_field_name("function")
                    .filter(|f| f.kind() == "attribute")
                    .and_then(|f| f.child_by_field_name("object"))
                    .is_some_and(|object| object.kind() == "identifier" && self.text(&object) == name)
            })
            .collect()
    }
}

impl TypeHierarchy for PythonProgram {
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
            if let Some(parents) = self.class_bases.get(current) {
                pending.extend(parents.iter().map(String::as_str));
            }
        }
        false
    }
}

impl LanguageSupport for PythonProgram {
    type Node = SyntaxRef;

    fn method_name(&self, site: &SyntaxRef) -> Option<String> {
        self.callee_name(self.call(site)?)
    }

    fn invoked_object_type(&self, site: &SyntaxRef) -> Option<String> {
        let call = self.call(site)?;
        let function = call.child_by_field_name("function")?;
        if self.is_constructor_call(call) {
            return Some(self.class_path(function));
        }
        match function.kind() {
            "identifier" => {
                let qualified = self.imports.qualify(&function, self.source.as_bytes())?;
                qualified.rsplit_once('.').map(|(module, _)| module.to_string())
            }
            "attribute" => self.expression_type(function.child_by_field_name("object")?, 0),
            _ => None,
        }
    }

    fn is_constructor(&self, site: &SyntaxRef) -> bool {
        self.call(site)
            .is_some_and(|call| self.is_constructor_call(call))
    }

    fn arguments(&self, site: &SyntaxRef) -> Vec<Argument<SyntaxRef>> {
        let Some(arguments) = self
            .call(site)
            .and_then(|call| call.child_by_field_name("arguments"))
        else {
            return Vec::new();
        };
        if arguments.kind() == "generator_expression" {
            return vec![Argument::positional(SyntaxRef::of(&arguments))];
        }

        let mut out = Vec::new();
        let mut cursor = arguments.walk();
        for child in arguments.named_children(&mut cursor) {
            match child.kind() {
                "comment" => {}
                "keyword_argument" => {
                    let name = child.child_by_field_name("name");
                    let value = child.child_by_field_name("value");
                    if let (Some(name), Some(value)) = (name, value) {
                        out.push(Argument::keyword(self.text(&name), SyntaxRef::of(&value)));
                    }
                }
                _ => out.push(Argument::positional(SyntaxRef::of(&child))),
            }
        }
        out
    }

    fn argument_type(&self, argument: &SyntaxRef) -> Option<String> {
        self.expression_type(self.node(argument)?, 0)
    }

    fn resolve(&self, expression: &SyntaxRef) -> Vec<ResolvedValue<SyntaxRef>> {
        let Some(node) = self.node(expression) else {
            return vec![ResolvedValue::unresolved(*expression)];
        };
        let ctx = Context::new(&self.source, self.tree.root_node(), &self.imports, &self.resolver);
        let mut out: Vec<ResolvedValue<SyntaxRef>> = Vec::new();
        for candidate in self.resolver.resolve(node, &ctx) {
            let resolved = ResolvedValue {
                value: candidate.value,
                tree: SyntaxRef::of(&candidate.tree),
            };
            if !out.contains(&resolved) {
                out.push(resolved);
            }
        }
        out
    }

    fn enum_constant(&self, expression: &SyntaxRef) -> Option<EnumConstant> {
        let node = self.node(expression).filter(|n| n.kind() == "attribute")?;
        let member = self.text(&node.child_by_field_name("attribute")?);
        if !is_constant_name(member) {
            return None;
        }
        let object = node.child_by_field_name("object")?;
        if !matches!(object.kind(), "identifier" | "attribute") {
            return None;
        }
        let class_name = self.class_path(object);
        Some(EnumConstant::new(Some(&class_name), member))
    }

    fn result_usages(&self, site: &SyntaxRef) -> Vec<SyntaxRef> {
        let Some(call) = self.call(site) else {
            return Vec::new();
        };
        let mut out = Vec::new();

        // `Cipher(...).encryptor()`
        let chained = call
            .parent()
            .filter(|p| p.kind() == "attribute" && p.child_by_field_name("object") == Some(call))
            .and_then(|attribute| {
                attribute
                    .parent()
                    .filter(|p| p.kind() == "call" && p.child_by_field_name("function") == Some(attribute))
            });
        if let Some(usage) = chained {
            out.push(SyntaxRef::of(&usage));
        }

        out.extend(self.calls_on_assigned(call).iter().map(SyntaxRef::of));
        out
    }

    fn source_location(&self, node: &SyntaxRef) -> Option<SourceLocation> {
        let node = self.node(node)?;
        let position = node.start_position();
        Some(SourceLocation {
            file: self.file.clone(),
            line: position.row + 1,
            column: position.column + 1,
        })
    }

    /// Free functions: a bare-name call that resolves to the same `def`.
    /// Methods: an attribute call whose receiver is typed to the owner class
    /// or a subclass of it.
    fn calls_function(&self, site: &SyntaxRef, function: &FunctionRef) -> bool {
        let Some(callee) = self
            .call(site)
            .and_then(|call| call.child_by_field_name("function"))
        else {
            return false;
        };

        match (&function.owner, callee.kind()) {
            (None, "identifier") => {
                self.text(&callee) == function.name
                    && self
                        .visible_definition(callee)
                        .is_some_and(|definition| Some(definition.start_byte()) == function.definition)
            }
            (Some(owner), "attribute") => {
                let named = callee
                    .child_by_field_name("attribute")
                    .is_some_and(|attribute| self.text(&attribute) == function.name);
                named
                    && callee
                        .child_by_field_name("object")
                        .and_then(|object| self.expression_type(object, 0))
                        .is_some_and(|ty| self.is_subtype_of(&ty, owner))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Resolution;
    use crate::model::Literal;

    fn program(source: &str) -> PythonProgram {
        PythonProgram::parse("app.py", source).unwrap()
    }

    fn site(program: &PythonProgram, method: &str) -> SyntaxRef {
        program
            .call_sites()
            .into_iter()
            .find(|site| program.method_name(site).as_deref() == Some(method))
            .unwrap()
    }

    const CIPHER: &str = "\
from cryptography.hazmat.primitives.ciphers import Cipher, algorithms, modes
import hashlib

def encrypt(key, iv, data):
    cipher = Cipher(algorithms.AES(key), modes.CBC(iv))
    encryptor = cipher.encryptor()
    return encryptor.update(data) + encryptor.finalize()

digest = hashlib.sha256(b'abc').hexdigest()
";

    #[test]
    fn test_call_sites_in_source_order() {
        let program = program(CIPHER);
        let names: Vec<String> = program
            .call_sites()
            .iter()
            .filter_map(|site| program.method_name(site))
            .collect();
        assert_eq!(
            names,
            vec!["Cipher", "AES", "CBC", "encryptor", "update", "finalize", "hexdigest", "sha256"]
        );
    }

    #[test]
    fn test_receiver_types() {
        let program = program(CIPHER);
        let cipher = site(&program, "Cipher");
        assert!(program.is_constructor(&cipher));
        assert_eq!(
            program.invoked_object_type(&cipher).as_deref(),
            Some("cryptography.hazmat.primitives.ciphers.Cipher")
        );
        assert_eq!(
            program.invoked_object_type(&site(&program, "AES")).as_deref(),
            Some("cryptography.hazmat.primitives.ciphers.algorithms.AES")
        );
        assert_eq!(
            program.invoked_object_type(&site(&program, "encryptor")).as_deref(),
            Some("cryptography.hazmat.primitives.ciphers.Cipher")
        );
        assert_eq!(program.invoked_object_type(&site(&program, "update")), None);
        assert_eq!(
            program.invoked_object_type(&site(&program, "sha256")).as_deref(),
            Some("hashlib")
        );
    }

    #[test]
    fn test_result_usages() {
        let program = program(CIPHER);
        let cipher = site(&program, "Cipher");
        let usages: Vec<String> = program
            .result_usages(&cipher)
            .iter()
            .filter_map(|usage| program.method_name(usage))
            .collect();
        assert_eq!(usages, vec!["encryptor"]);

        let encryptor = site(&program, "encryptor");
        let usages: Vec<String> = program
            .result_usages(&encryptor)
            .iter()
            .filter_map(|usage| program.method_name(usage))
            .collect();
        assert_eq!(usages, vec!["update", "finalize"]);

        let sha = site(&program, "sha256");
        let usages: Vec<String> = program
            .result_usages(&sha)
            .iter()
            .filter_map(|usage| program.method_name(usage))
            .collect();
        assert_eq!(usages, vec!["hexdigest"]);
    }

    #[test]
    fn test_arguments_and_resolution() {
        let program = program("from hashlib import pbkdf2_hmac\nrounds = 600_000\npbkdf2_hmac('sha256', b'pw', salt=b'salt', iterations=rounds)\n");
        let call = site(&program, "pbkdf2_hmac");
        let arguments = program.arguments(&call);
        assert_eq!(arguments.len(), 4);
        assert_eq!(arguments[0].keyword, None);
        assert_eq!(arguments[3].keyword.as_deref(), Some("iterations"));
        assert_eq!(program.argument_type(&arguments[1].value).as_deref(), Some("bytes"));

        let resolved = program.resolve(&arguments[3].value);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].value, Resolution::Literal(Literal::Int(600_000)));
        assert_eq!(program.text_of(&resolved[0].tree), Some("600_000"));
        assert_eq!(
            program.source_location(&resolved[0].tree),
            Some(SourceLocation {
                file: "app.py".into(),
                line: 2,
                column: 10,
            })
        );
    }

    #[test]
    fn test_enum_constants() {
        let program = program("from cryptography.hazmat.primitives import serialization\nkey.private_bytes(serialization.Encoding.PEM)\n");
        let call = site(&program, "private_bytes");
        let argument = &program.arguments(&call)[0].value;
        assert_eq!(
            program.enum_constant(argument),
            Some(EnumConstant::new(
                Some("cryptography.hazmat.primitives.serialization.Encoding"),
                "PEM"
            ))
        );
    }

    #[test]
    fn test_local_subclass_hierarchy() {
        let program = program("from cryptography.hazmat.primitives.ciphers import Cipher\nclass Sealed(Cipher):\n    pass\nclass Strict(Sealed):\n    pass\n");
        assert!(program.is_subtype_of("Strict", "cryptography.hazmat.primitives.ciphers.Cipher"));
        assert!(!program.is_subtype_of("cryptography.hazmat.primitives.ciphers.Cipher", "Strict"));
    }

    #[test]
    fn test_parameter_annotation_types() {
        let program = program("from cryptography.hazmat.primitives.ciphers import Cipher\ndef run(c: Cipher):\n    c.encryptor()\n");
        assert_eq!(
            program.invoked_object_type(&site(&program, "encryptor")).as_deref(),
            Some("cryptography.hazmat.primitives.ciphers.Cipher")
        );
    }

    #[test]
    fn test_self_receiver_is_enclosing_class() {
        let program = program("class Vault:\n    def seal(self):\n        self.encrypt(b'x')\n");
        assert_eq!(
            program.invoked_object_type(&site(&program, "encrypt")).as_deref(),
            Some("Vault")
        );
    }

    fn sites_named(program: &PythonProgram, method: &str) -> Vec<SyntaxRef> {
        let mut sites: Vec<SyntaxRef> = program
            .call_sites()
            .into_iter()
            .filter(|site| program.method_name(site).as_deref() == Some(method))
            .collect();
        sites.sort_by_key(|site| site.start);
        sites
    }

    #[test]
    fn test_free_function_calls_follow_the_visible_definition() {
        let program = program(
            "def digest(name):\n    pass\n\ndigest('a')\nother.digest('b')\n\ndef helper():\n    def digest(name):\n        pass\n    digest('c')\n",
        );
        let function = FunctionRef::free("digest", Some(0));
        let calls: Vec<bool> = sites_named(&program, "digest")
            .iter()
            .map(|site| program.calls_function(site, &function))
            .collect();
        assert_eq!(calls, vec![true, false, false]);
    }

    #[test]
    fn test_method_calls_need_a_receiver_of_the_owner_type() {
        let program = program(
            "class Box:\n    def seal(self, data):\n        pass\n    def run(self):\n        self.seal(b'a')\n\nclass Tin:\n    def seal(self, data):\n        pass\n\nBox().seal(b'b')\nTin().seal(b'c')\nseal(b'd')\n",
        );
        let function = FunctionRef {
            name: "seal".to_string(),
            owner: Some("Box".to_string()),
            definition: Some(15),
        };
        let calls: Vec<bool> = sites_named(&program, "seal")
            .iter()
            .map(|site| program.calls_function(site, &function))
            .collect();
        assert_eq!(calls, vec![true, true, false, false]);
    }

    #[test]
    fn test_stale_reference_is_not_a_node() {
        let program = program("x = 1\n");
        let bogus = SyntaxRef {
            start: 0,
            end: 1,
            kind: "call",
        };
        assert_eq!(program.method_name(&bogus), None);
        assert_eq!(program.resolve(&bogus), vec![ResolvedValue::unresolved(bogus)]);
    }
}
