//! Enclosing-function lookup for Python source.
//!
//! Parses source text with tree-sitter and finds the innermost function
//! definition whose line range contains a target line. A function's range
//! starts at its `def` line (decorators are not part of it) and ends at the
//! last line reached by any token nested inside it, so trailing comments and
//! blank lines after the body are never included.
//!
//! The search walks the tree in document order with an explicit stack, so
//! generated code with very deep expressions cannot exhaust the thread
//! stack. Every function definition that contains the target line replaces
//! the current match, and because children are visited after their parent,
//! the most deeply nested match wins.
//!
//! Line breaks follow Python: `\n`, `\r\n` and a lone `\r` all end a line.
//!
//! The tree-sitter grammar also accepts Python 2 `print` and `exec`
//! statements, so such sources parse here where a Python 3 parser would
//! reject them.

use std::borrow::Cow;

use tree_sitter::{Node, Parser, Tree};

use crate::models::FunctionSpan;

const FUNCTION_KIND: &str = "function_definition";
const COMMENT_KIND: &str = "comment";

/// Return the source of the innermost function containing `target_line`
/// (1-based), or `None` if the source does not parse or no function
/// contains the line.
pub fn locate(source: &str, target_line: usize) -> Option<String> {
    let source = normalize_newlines(source);
    let tree = parse_python(&source)?;
    let span = innermost_function(tree.root_node(), target_line)?;
    Some(span_text(&source, span))
}

/// Rewrite `\r\n` and lone `\r` line breaks as `\n`.
fn normalize_newlines(source: &str) -> Cow<'_, str> {
    if source.contains('\r') {
        Cow::Owned(source.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(source)
    }
}

/// Parse Python source. Trees containing error or missing nodes are
/// rejected.
pub fn parse_python(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    if tree.root_node().has_error() {
        return None;
    }
    Some(tree)
}

/// Innermost function definition under `node` whose span contains
/// `target_line`. Later matches in document order replace earlier ones.
pub fn innermost_function(node: Node<'_>, target_line: usize) -> Option<FunctionSpan> {
    let mut found = None;
    let mut stack = Vec::new();
    push_children(&mut stack, node);

    while let Some(current) = stack.pop() {
        if current.kind() == FUNCTION_KIND {
            let span = function_span(current);
            if span.contains(target_line) {
                found = Some(span);
            }
        }
        push_children(&mut stack, current);
    }
    found
}

/// Push children in reverse so they pop in document order.
fn push_children<'t>(stack: &mut Vec<Node<'t>>, node: Node<'t>) {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    stack.extend(children.into_iter().rev());
}

/// Line span of a function definition node.
pub fn function_span(node: Node<'_>) -> FunctionSpan {
    let start_line = node.start_position().row + 1;
    FunctionSpan {
        start_line,
        end_line: last_line(node).max(start_line),
    }
}

/// Largest 1-based line reached by a token under `node`, ignoring comments.
fn last_line(node: Node<'_>) -> usize {
    let mut last = node.start_position().row + 1;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.child_count() == 0 {
            last = last.max(token_end_line(current));
            continue;
        }
        let mut cursor = current.walk();
        stack.extend(
            current
                .children(&mut cursor)
                .filter(|child| child.kind() != COMMENT_KIND),
        );
    }
    last
}

fn token_end_line(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    // A token ending at column 0 of a later row ends with a line break.
    if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    }
}

/// Lines `start_line..=end_line` of `source`, joined with `\n`.
pub fn span_text(source: &str, span: FunctionSpan) -> String {
    source
        .lines()
        .skip(span.start_line.saturating_sub(1))
        .take(span.end_line + 1 - span.start_line)
        .collect::<Vec<_>>()
        .join("\n")
}
