use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

const TYPE_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

const STATEMENT_KINDS: &[&str] = &[
    "expression_statement",
    "local_variable_declaration",
    "return_statement",
    "if_statement",
    "while_statement",
    "for_statement",
    "enhanced_for_statement",
    "do_statement",
    "throw_statement",
    "try_statement",
    "try_with_resources_statement",
    "switch_expression",
    "break_statement",
    "continue_statement",
    "yield_statement",
    "synchronized_statement",
    "labeled_statement",
    "assert_statement",
    "explicit_constructor_invocation",
];

const BLOCK_KINDS: &[&str] = &["block", "constructor_body"];

/// Source-level context for one mutated line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    pub package_name: String,
    pub method_start_line: usize,
    pub method_end_line: usize,
    pub statement_text: String,
    /// Pre-order index of the smallest enclosing block, -1 when unresolved.
    pub block_id: i64,
}

impl CodeContext {
    pub fn empty() -> Self {
        CodeContext {
            package_name: String::new(),
            method_start_line: 0,
            method_end_line: 0,
            statement_text: String::new(),
            block_id: -1,
        }
    }

    /// No statement was resolved, so there is nothing to mutate or diff.
    pub fn is_empty(&self) -> bool {
        self.statement_text.is_empty()
    }
}

impl Default for CodeContext {
    fn default() -> Self {
        CodeContext::empty()
    }
}

/// Context for `line_number` in `method_name` of `class_name`. Never fails:
/// an unreadable file gives an empty context, and a line the AST cannot
/// place falls back to the raw three lines around it.
pub fn extract(source_file: &Path, class_name: &str, method_name: &str, line_number: usize) -> CodeContext {
    match std::fs::read_to_string(source_file) {
        Ok(source) => extract_from_source(&source, class_name, method_name, line_number),
        Err(e) => {
            tracing::debug!("cannot read {}: {e}", source_file.display());
            CodeContext::empty()
        }
    }
}

pub fn extract_from_source(source: &str, class_name: &str, method_name: &str, line_number: usize) -> CodeContext {
    let mut ctx = resolve(source, class_name, method_name, line_number).unwrap_or_default();
    if ctx.statement_text.is_empty() {
        ctx.statement_text = line_window(source, line_number);
    }
    ctx
}

fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_java::LANGUAGE.into()).ok()?;
    parser.parse(source, None)
}

/// AST-only resolution, no raw-text fallback.
pub fn resolve(source: &str, class_name: &str, method_name: &str, line_number: usize) -> Option<CodeContext> {
    let tree = parse(source)?;
    let root = tree.root_node();
    let mut ctx = CodeContext::empty();
    ctx.package_name = package_name(root, source);

    let type_node = type_candidates(class_name)
        .iter()
        .find_map(|name| find_type(root, name, source))?;
    let method = find_method(type_node, method_name, line_number, source)?;
    ctx.method_start_line = method.start_position().row + 1;
    ctx.method_end_line = method.end_position().row + 1;

    let stmt = innermost_statement(method, line_number);
    if let Some(stmt) = stmt {
        ctx.statement_text = render_statement(stmt, source);
    }
    ctx.block_id = enclosing_block_id(method, line_number, stmt);
    Some(ctx)
}

fn node_text<'a>(node: Node<'a>, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

fn spans_line(node: Node, line: usize) -> bool {
    node.start_position().row + 1 <= line && line <= node.end_position().row + 1
}

fn package_name(root: Node, source: &str) -> String {
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "package_declaration" {
            let mut inner = child.walk();
            for name in child.named_children(&mut inner) {
                if matches!(name.kind(), "scoped_identifier" | "identifier") {
                    return node_text(name, source).to_string();
                }
            }
        }
    }
    String::new()
}

/// Simple names to try for a binary class name, innermost first.
/// `a.b.Outer$Inner` tries `Inner` then `Outer`; anonymous `$1` parts are skipped.
fn type_candidates(class_name: &str) -> Vec<&str> {
    let simple = class_name.rsplit('.').next().unwrap_or(class_name);
    simple
        .split('$')
        .filter(|part| !part.is_empty() && !part.chars().all(|c| c.is_ascii_digit()))
        .rev()
        .collect()
}

fn find_type<'a>(node: Node<'a>, name: &str, source: &str) -> Option<Node<'a>> {
    if TYPE_KINDS.contains(&node.kind()) {
        if let Some(name_node) = node.child_by_field_name("name") {
            if node_text(name_node, source) == name {
                return Some(node);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if let Some(found) = find_type(child, name, source) {
            return Some(found);
        }
    }
    None
}

/// `lambda$process$0` belongs to `process`.
fn source_method_name(method_name: &str) -> &str {
    match method_name.strip_prefix("lambda$") {
        Some(rest) => rest.split('$').next().unwrap_or(rest),
        None => method_name,
    }
}

fn find_method<'a>(type_node: Node<'a>, method_name: &str, line: usize, source: &str) -> Option<Node<'a>> {
    let wanted = source_method_name(method_name);
    let mut matches = Vec::new();
    collect_methods(type_node, wanted, source, &mut matches, true);
    matches
        .iter()
        .copied()
        .find(|m| spans_line(*m, line))
        .or_else(|| matches.first().copied())
}

fn collect_methods<'a>(node: Node<'a>, wanted: &str, source: &str, out: &mut Vec<Node<'a>>, top: bool) {
    // Members of nested types are reported under their own binary name.
    if !top && TYPE_KINDS.contains(&node.kind()) {
        return;
    }
    let hit = match node.kind() {
        "method_declaration" => node
            .child_by_field_name("name")
            .is_some_and(|n| node_text(n, source) == wanted),
        "constructor_declaration" | "compact_constructor_declaration" => wanted == "<init>",
        "static_initializer" => wanted == "<clinit>",
        _ => false,
    };
    if hit {
        out.push(node);
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_methods(child, wanted, source, out, false);
    }
}

/// Deepest statement whose line span contains `line`. Header parts of a
/// compound statement (a `for` initializer, an `if` condition) are not descended into.
fn innermost_statement(node: Node, line: usize) -> Option<Node> {
    let header_end = body_of(node).map(|body| body.start_byte());
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        if !spans_line(child, line) || header_end.is_some_and(|end| child.end_byte() <= end) {
            continue;
        }
        if let Some(deeper) = innermost_statement(child, line) {
            return Some(deeper);
        }
        if STATEMENT_KINDS.contains(&child.kind()) {
            return Some(child);
        }
    }
    None
}

fn body_of(stmt: Node) -> Option<Node> {
    let field = match stmt.kind() {
        "if_statement" => "consequence",
        "while_statement"
        | "for_statement"
        | "enhanced_for_statement"
        | "synchronized_statement"
        | "switch_expression" => "body",
        _ => return None,
    };
    stmt.child_by_field_name(field)
}

/// Compound statements render as their header (`if (a == b)`), the rest in full.
fn render_statement(stmt: Node, source: &str) -> String {
    let text = match body_of(stmt) {
        Some(body) => &source[stmt.start_byte()..body.start_byte()],
        None if matches!(stmt.kind(), "try_statement" | "try_with_resources_statement" | "do_statement") => {
            node_text(stmt, source).lines().next().unwrap_or_default()
        }
        None => node_text(stmt, source),
    };
    collapse_whitespace(text)
}

fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Innermost block holding `stmt`, or spanning `line` when no statement resolved.
/// On `} else {` both branches span the line, but only one holds the statement.
fn enclosing_block_id(method: Node, line: usize, stmt: Option<Node>) -> i64 {
    let target = stmt.map(|s| s.byte_range());
    let mut counter = 0i64;
    let mut found = -1i64;
    visit_blocks(method, line, target.as_ref(), &mut counter, &mut found);
    found
}

fn visit_blocks(
    node: Node,
    line: usize,
    target: Option<&Range<usize>>,
    counter: &mut i64,
    found: &mut i64,
) {
    if BLOCK_KINDS.contains(&node.kind()) {
        let holds = match target {
            Some(t) => {
                let own = node.byte_range();
                own != *t && own.start <= t.start && t.end <= own.end
            }
            None => spans_line(node, line),
        };
        // Pre-order: a later holding block is nested inside an earlier one.
        if holds {
            *found = *counter;
        }
        *counter += 1;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit_blocks(child, line, target, counter, found);
    }
}

/// The 1-based line plus one line either side, clamped to the file.
pub fn line_window(source: &str, line_number: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let idx = line_number.saturating_sub(1).min(lines.len() - 1);
    let start = idx.saturating_sub(1);
    let end = (idx + 2).min(lines.len());
    lines[start..end].join("\n")
}
