//! Tree-sitter Python grammar helpers: literals, scopes and definitions.

use tree_sitter::Node;

use crate::model::Literal;

/// Byte buffers built from size hints (`os.urandom(n)`) are capped here.
pub(super) const MAX_SYNTHETIC_BYTES: i64 = 1 << 16;

pub(super) fn text<'s>(node: &Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub(super) fn is_class_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Upper-case member names such as `PEM`, `SHA256` or `TRADITIONAL_OPENSSL`.
pub(super) fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Decodes a string literal node's text. `None` for f-strings with
/// interpolations.
pub(super) fn parse_string_literal(raw: &str) -> Option<Literal> {
    let quote_at = raw.find(['"', '\''])?;
    let (prefix, quoted) = raw.split_at(quote_at);
    let prefix = prefix.to_ascii_lowercase();
    if prefix.contains('f') && quoted.contains('{') {
        return None;
    }

    let quote = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
        &quoted[..3]
    } else {
        &quoted[..1]
    };
    let body = quoted
        .strip_prefix(quote)
        .and_then(|rest| rest.strip_suffix(quote))?;

    let content = if prefix.contains('r') {
        body.to_string()
    } else {
        unescape(body)
    };

    if prefix.contains('b') {
        Some(Literal::Bytes(content.into_bytes()))
    } else {
        Some(Literal::Str(content))
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) => out.push(char::from(byte)),
                    Err(_) => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            Some('\n') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Integer literal text to a literal. Values beyond `i64` stay textual
/// (decimal or `0x` hex), which is what prime-size factories expect.
pub(super) fn parse_int_literal(raw: &str) -> Option<Literal> {
    let cleaned = raw.trim().replace('_', "").to_ascii_lowercase();
    let (radix, digits) = match cleaned.get(..2) {
        Some("0x") => (16, &cleaned[2..]),
        Some("0o") => (8, &cleaned[2..]),
        Some("0b") => (2, &cleaned[2..]),
        _ => (10, cleaned.as_str()),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    match i64::from_str_radix(digits, radix) {
        Ok(value) => Some(Literal::Int(value)),
        Err(_) => match radix {
            10 => Some(Literal::Str(digits.to_string())),
            16 => Some(Literal::Str(format!("0x{digits}"))),
            _ => None,
        },
    }
}

pub(super) fn enclosing_function<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut current = node.parent()?;
    loop {
        if current.kind() == "function_definition" {
            return Some(current);
        }
        current = current.parent()?;
    }
}

/// The body searched for definitions visible at `node`: the enclosing
/// function body, or the module.
pub(super) fn scope_of<'t>(node: Node<'t>, root: Node<'t>) -> Node<'t> {
    enclosing_function(node)
        .and_then(|function| function.child_by_field_name("body"))
        .unwrap_or(root)
}

#[derive(Debug, Clone)]
pub(super) struct ParameterInfo<'t> {
    pub name: String,
    /// Position as seen from a call site (`self`/`cls` excluded for methods).
    pub index: usize,
    pub default: Option<Node<'t>>,
    pub annotation: Option<Node<'t>>,
}

pub(super) fn parameters<'t>(function: Node<'t>, source: &str) -> Vec<ParameterInfo<'t>> {
    let Some(list) = function.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut position = 0usize;
    let mut cursor = list.walk();
    for child in list.named_children(&mut cursor) {
        let (name, default, annotation) = match child.kind() {
            "identifier" => (Some(child), None, None),
            "typed_parameter" => (
                child.named_child(0).filter(|n| n.kind() == "identifier"),
                None,
                child.child_by_field_name("type"),
            ),
            "default_parameter" => (
                child.child_by_field_name("name"),
                child.child_by_field_name("value"),
                None,
            ),
            "typed_default_parameter" => (
                child.child_by_field_name("name"),
                child.child_by_field_name("value"),
                child.child_by_field_name("type"),
            ),
            _ => continue,
        };
        let Some(name) = name else {
            continue;
        };
        out.push(ParameterInfo {
            name: text(&name, source).to_string(),
            index: position,
            default,
            annotation,
        });
        position += 1;
    }

    if is_method(function, source) {
        out.retain(|p| p.index > 0);
        for parameter in &mut out {
            parameter.index -= 1;
        }
    }
    out
}

/// Function defined directly in a class body and not a static method.
fn is_method(function: Node, source: &str) -> bool {
    let is_static = function
        .parent()
        .filter(|p| p.kind() == "decorated_definition")
        .is_some_and(|parent| {
            let mut cursor = parent.walk();
            let is_static = parent
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "decorator")
                .any(|c| text(&c, source).contains("staticmethod"));
            is_static
        });
    !is_static && owning_class(function).is_some()
}

/// The class whose body defines `function` directly, decorators allowed.
pub(super) fn owning_class(function: Node) -> Option<Node> {
    let holder = match function.parent() {
        Some(parent) if parent.kind() == "decorated_definition" => parent,
        _ => function,
    };
    holder
        .parent()
        .and_then(|block| block.parent())
        .filter(|owner| owner.kind() == "class_definition")
}

/// Right-hand sides of `name = ...` assignments inside `scope` that end
/// before `before`, skipping nested functions and classes.
pub(super) fn assignments_to<'t>(scope: Node<'t>, name: &str, before: usize, source: &str) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    collect_assignments(scope, name, before, source, &mut out);
    out
}

fn collect_assignments<'t>(node: Node<'t>, name: &str, before: usize, source: &str, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.start_byte() >= before {
            break;
        }
        match child.kind() {
            "function_definition" | "class_definition" | "decorated_definition" => {}
            "assignment" if child.end_byte() <= before => {
                let left = child.child_by_field_name("left");
                let right = child.child_by_field_name("right");
                if let (Some(left), Some(right)) = (left, right) {
                    if left.kind() == "identifier" && text(&left, source) == name {
                        out.push(right);
                    }
                    // chained `a = b = value`
                    if right.kind() == "assignment" {
                        collect_assignments(child, name, before, source, out);
                    }
                }
            }
            _ => collect_assignments(child, name, before, source, out),
        }
    }
}

pub(super) fn enclosing_class<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut current = node.parent()?;
    loop {
        if current.kind() == "class_definition" {
            return Some(current);
        }
        current = current.parent()?;
    }
}

/// Values assigned to `self.name` anywhere in `class`, plus a class-level
/// `name = ...`.
pub(super) fn member_assignments<'t>(class: Node<'t>, name: &str, source: &str) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut pending = vec![class];
    while let Some(node) = pending.pop() {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "class_definition" {
                continue;
            }
            if child.kind() == "assignment" {
                let left = child.child_by_field_name("left");
                let right = child.child_by_field_name("right");
                if let (Some(left), Some(right)) = (left, right) {
                    let target = text(&left, source);
                    let is_member = target == format!("self.{name}");
                    let is_class_level = left.kind() == "identifier"
                        && target == name
                        && enclosing_function(child).map_or(true, |f| f.start_byte() < class.start_byte());
                    if is_member || is_class_level {
                        out.push(right);
                    }
                }
            }
            pending.push(child);
        }
    }
    out.sort_by_key(|n| n.start_byte());
    out
}

/// Every `def name(...)` in the module, including methods.
pub(super) fn function_definitions<'t>(root: Node<'t>, name: &str, source: &str) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "function_definition"
                && child
                    .child_by_field_name("name")
                    .is_some_and(|n| text(&n, source) == name)
            {
                out.push(child);
            }
            pending.push(child);
        }
    }
    out.sort_by_key(|n| n.start_byte());
    out
}

/// Expressions of the `return` statements belonging to `function`.
pub(super) fn return_values(function: Node) -> Vec<Node> {
    let mut out = Vec::new();
    if let Some(body) = function.child_by_field_name("body") {
        collect_returns(body, &mut out);
    }
    out
}

fn collect_returns<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" | "class_definition" | "lambda" => {}
            "return_statement" => {
                if let Some(value) = child.named_child(0) {
                    out.push(value);
                }
            }
            _ => collect_returns(child, out),
        }
    }
}

/// Call nodes under `node` in pre-order.
pub(super) fn calls_in(node: Node) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    let mut descending = true;
    loop {
        if descending && cursor.node().kind() == "call" {
            out.push(cursor.node());
        }
        if descending && cursor.goto_first_child() {
            continue;
        }
        if cursor.goto_next_sibling() {
            descending = true;
            continue;
        }
        if !cursor.goto_parent() || cursor.node().id() == node.id() {
            break;
        }
        descending = false;
    }
    out
}
