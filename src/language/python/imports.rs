//! Import bindings of a Python module.
//!
//! Maps every name an import statement binds to the dotted path it stands
//! for, so `algorithms.AES` can be qualified to
//! `cryptography.hazmat.primitives.ciphers.algorithms.AES`:
//! - `import hashlib` binds `hashlib`
//! - `import cryptography.hazmat.primitives.hashes` binds `cryptography` and `hashes`
//! - `import hashlib as hl` binds `hl`
//! - `from hashlib import sha256, md5 as m` binds `sha256` and `m`
//! - `from os import *` is remembered as a wildcard module

use std::collections::HashMap;

use tree_sitter::{Node, Tree};

use super::syntax::is_class_name;

#[derive(Debug, Clone, Default)]
pub struct ImportMap {
    bindings: HashMap<String, String>,
    wildcards: Vec<String>,
}

impl ImportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(tree: &Tree, source: &[u8]) -> Self {
        let mut imports = Self::new();
        imports.visit(tree.root_node(), source);
        imports
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.bindings.insert(name.into(), path.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// Modules imported with `from module import *`, in source order.
    pub fn wildcards(&self) -> &[String] {
        &self.wildcards
    }

    /// Dotted path an identifier or attribute chain stands for, when its
    /// root name is bound by an import. A class-like name under a single
    /// wildcard import is attributed to that module.
    pub fn qualify(&self, node: &Node, source: &[u8]) -> Option<String> {
        match node.kind() {
            "identifier" => {
                let name = text(node, source);
                if let Some(path) = self.get(name) {
                    return Some(path.to_string());
                }
                match self.wildcards.as_slice() {
                    [module] if is_class_name(name) => Some(format!("{module}.{name}")),
                    _ => None,
                }
            }
            "attribute" => {
                let object = node.child_by_field_name("object")?;
                let attribute = node.child_by_field_name("attribute")?;
                let base = self.qualify(&object, source)?;
                Some(format!("{base}.{}", text(&attribute, source)))
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.wildcards.is_empty()
    }

    fn visit(&mut self, node: Node, source: &[u8]) {
        match node.kind() {
            "import_statement" => self.import_statement(node, source),
            "import_from_statement" => self.from_import(node, source),
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.visit(child, source);
                }
            }
        }
    }

    fn import_statement(&mut self, node: Node, source: &[u8]) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let module = text(&child, source);
                    if let Some((root, _)) = module.split_once('.') {
                        self.insert(root, root);
                    }
                    self.insert(last_segment(module), module);
                }
                "aliased_import" => {
                    let module = child.child_by_field_name("name").map(|n| text(&n, source));
                    let alias = child.child_by_field_name("alias").map(|n| text(&n, source));
                    if let (Some(module), Some(alias)) = (module, alias) {
                        self.insert(alias, module);
                    }
                }
                _ => {}
            }
        }
    }

    fn from_import(&mut self, node: Node, source: &[u8]) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module = text(&module_node, source).to_string();

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.id() == module_node.id() {
                continue;
            }
            match child.kind() {
                "wildcard_import" => self.wildcards.push(module.clone()),
                "dotted_name" | "identifier" => {
                    let name = text(&child, source);
                    self.insert(name, format!("{module}.{name}"));
                }
                "aliased_import" => {
                    let name = child.child_by_field_name("name").map(|n| text(&n, source));
                    let alias = child.child_by_field_name("alias").map(|n| text(&n, source));
                    if let Some(name) = name {
                        self.insert(alias.unwrap_or(name), format!("{module}.{name}"));
                    }
                }
                _ => {}
            }
        }
    }
}

fn text<'s>(node: &Node, source: &'s [u8]) -> &'s str {
    node.utf8_text(source).unwrap_or("")
}

fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}
