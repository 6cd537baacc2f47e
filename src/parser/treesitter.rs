//! Tree-sitter C backend.
//!
//! Parses normalized Pro*C (plain C at this point) with tree-sitter-c and copies the
//! result into an owned [`SyntaxTree`].

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use super::{FunctionUnit, Span, SyntaxNode, SyntaxTree, SyntaxTreeProvider, DECLARATOR_WRAPPERS};

/// Tree-sitter query for extracting includes.
const INCLUDE_QUERY: &str = r#"
; #include <header.h>
(preproc_include
  path: (system_lib_string) @system_include
)

; #include "header.h"
(preproc_include
  path: (string_literal) @local_include
)
"#;

/// tree-sitter-c provider.
pub struct TreeSitterC {
    language: Language,
}

impl TreeSitterC {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_c::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    fn extract_includes(&self, root: Node<'_>, source: &[u8]) -> anyhow::Result<Vec<String>> {
        let query = Query::new(&self.language, INCLUDE_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, source);

        let mut includes = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let text = capture.node.utf8_text(source).unwrap_or("");
                let path = match query.capture_names()[capture.index as usize] {
                    "system_include" => text.trim_start_matches('<').trim_end_matches('>'),
                    _ => text.trim_matches('"'),
                };
                if !path.is_empty() {
                    includes.push((capture.node.start_byte(), path.to_string()));
                }
            }
        }
        includes.sort();
        includes.dedup();
        Ok(includes.into_iter().map(|(_, path)| path).collect())
    }
}

impl Default for TreeSitterC {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxTreeProvider for TreeSitterC {
    fn language(&self) -> &str {
        "c"
    }

    fn parse(&self, source: &str) -> anyhow::Result<SyntaxTree> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse source"))?;
        let root = tree.root_node();
        let includes = self.extract_includes(root, source.as_bytes())?;
        Ok(SyntaxTree::new(source, build_tree(root), includes))
    }

    fn function_units<'t>(&self, tree: &'t SyntaxTree) -> Vec<FunctionUnit<'t>> {
        tree.root()
            .descendants()
            .filter(|n| n.kind == "function_definition")
            .filter_map(|node| function_unit(tree, node))
            .collect()
    }
}

fn span_of(node: Node<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: start.row + 1, // tree-sitter is 0-indexed
        start_col: start.column + 1,
        end_line: end.row + 1,
        end_col: end.column + 1,
    }
}

fn node_of(node: Node<'_>, field: Option<&'static str>) -> SyntaxNode {
    SyntaxNode {
        kind: node.kind(),
        named: node.is_named(),
        field,
        is_error: node.is_error() || node.is_missing(),
        span: span_of(node),
        children: Vec::new(),
    }
}

/// Copy a tree-sitter tree into owned nodes. Iterative, so deeply nested
/// expressions cannot exhaust the stack.
fn build_tree(root: Node<'_>) -> SyntaxNode {
    let mut cursor = root.walk();
    let mut stack = vec![node_of(root, None)];

    loop {
        if cursor.goto_first_child() {
            stack.push(node_of(cursor.node(), cursor.field_name()));
            continue;
        }
        loop {
            let Some(finished) = stack.pop() else {
                return node_of(root, None);
            };
            let has_sibling = cursor.goto_next_sibling();
            if !has_sibling && !cursor.goto_parent() {
                return finished;
            }
            match stack.last_mut() {
                Some(parent) => parent.children.push(finished),
                None => return finished,
            }
            if has_sibling {
                stack.push(node_of(cursor.node(), cursor.field_name()));
                break;
            }
        }
    }
}

fn function_unit<'t>(tree: &'t SyntaxTree, node: &'t SyntaxNode) -> Option<FunctionUnit<'t>> {
    let declarator = node.child_by_field("declarator")?;
    let function_declarator = find_function_declarator(declarator)?;
    let name = tree.declared_name(function_declarator.child_by_field("declarator")?)?;

    let parameters = function_declarator
        .child_by_field("parameters")
        .map(|list| {
            list.named_children()
                .filter(|p| p.kind == "parameter_declaration")
                .filter_map(|p| p.child_by_field("declarator"))
                .filter_map(|d| tree.declared_name(d))
                .collect()
        })
        .unwrap_or_default();

    let base_type = node
        .child_by_field("type")
        .map(|t| tree.text(t).trim().to_string())
        .unwrap_or_default();
    let return_type = match pointer_depth(declarator) {
        0 => base_type,
        depth => format!("{} {}", base_type, "*".repeat(depth)),
    };

    Some(FunctionUnit {
        name,
        parameters,
        return_type,
        span: node.span,
        node,
        has_errors: node.has_error(),
    })
}

fn find_function_declarator(node: &SyntaxNode) -> Option<&SyntaxNode> {
    if node.kind == "function_declarator" {
        return Some(node);
    }
    if DECLARATOR_WRAPPERS.contains(&node.kind) {
        return node
            .child_by_field("declarator")
            .or_else(|| node.named_children().next())
            .and_then(find_function_declarator);
    }
    None
}

/// Number of pointer declarators wrapped around the function declarator.
fn pointer_depth(node: &SyntaxNode) -> usize {
    let mut depth = 0;
    let mut current = Some(node);
    while let Some(n) = current {
        match n.kind {
            "pointer_declarator" => depth += 1,
            "function_declarator" => break,
            _ => {}
        }
        current = n.child_by_field("declarator");
    }
    depth
}
