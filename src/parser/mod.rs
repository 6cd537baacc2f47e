//! Backend-neutral syntax trees for normalized C source.
//!
//! This module provides:
//! - `SyntaxTreeProvider` trait: parses normalized text and extracts function units
//! - `SyntaxTree` / `SyntaxNode`: an owned tree, so metric engines and detectors never
//!   depend on a particular parser library
//! - `treesitter`: the tree-sitter-c backend

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod treesitter;

pub use treesitter::TreeSitterC;

/// Declarator wrappers that sit between a declaration and the declared name.
pub(crate) const DECLARATOR_WRAPPERS: &[&str] = &[
    "pointer_declarator",
    "array_declarator",
    "parenthesized_declarator",
    "attributed_declarator",
    "function_declarator",
    "init_declarator",
];

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed).
    pub end_col: usize,
}

impl Span {
    pub fn contains_byte(&self, offset: usize) -> bool {
        self.start_byte <= offset && offset < self.end_byte
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// One node of a parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    /// Grammar node kind (`if_statement`, `identifier`, `&&`, ...).
    pub kind: &'static str,
    /// False for anonymous tokens such as punctuation and keywords.
    pub named: bool,
    /// Field name this node occupies in its parent, if any.
    pub field: Option<&'static str>,
    /// Error or missing node inserted by parser recovery.
    pub is_error: bool,
    pub span: Span,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn child_by_field(&self, field: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.field == Some(field))
    }

    pub fn named_children(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.children.iter().filter(|c| c.named)
    }

    /// Whether an unnamed token of the given kind is a direct child (`"&&"`, `"case"`).
    pub fn has_token(&self, kind: &str) -> bool {
        self.children.iter().any(|c| !c.named && c.kind == kind)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Pre-order traversal of this node and all descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    pub fn has_error(&self) -> bool {
        self.descendants().any(|n| n.is_error)
    }

    pub fn first_error(&self) -> Option<&SyntaxNode> {
        self.descendants().find(|n| n.is_error)
    }
}

/// Iterator returned by [`SyntaxNode::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A parsed file: the source it was built from plus its root node.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    root: SyntaxNode,
    includes: Vec<String>,
}

impl SyntaxTree {
    pub fn new(source: impl Into<String>, root: SyntaxNode, includes: Vec<String>) -> Self {
        Self {
            source: source.into(),
            root,
            includes,
        }
    }

    pub fn root(&self) -> &SyntaxNode {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Text covered by a node; empty if the span is out of range.
    pub fn text(&self, node: &SyntaxNode) -> &str {
        self.source
            .get(node.span.start_byte..node.span.end_byte)
            .unwrap_or("")
    }

    /// `#include` targets in source order, without quotes or angle brackets.
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn has_errors(&self) -> bool {
        self.root.has_error()
    }

    pub fn first_error_line(&self) -> Option<usize> {
        self.root.first_error().map(|n| n.span.start_line)
    }

    /// Name declared by a (possibly wrapped) declarator: `*buf`, `ids[10]`, `f(void)`.
    pub fn declared_name(&self, declarator: &SyntaxNode) -> Option<String> {
        match declarator.kind {
            "identifier" | "field_identifier" | "type_identifier" => {
                Some(self.text(declarator).to_string())
            }
            kind if DECLARATOR_WRAPPERS.contains(&kind) => declarator
                .child_by_field("declarator")
                .or_else(|| declarator.named_children().next())
                .and_then(|inner| self.declared_name(inner)),
            _ => None,
        }
    }
}

/// A function definition found in a tree.
#[derive(Debug, Clone)]
pub struct FunctionUnit<'t> {
    pub name: String,
    pub parameters: Vec<String>,
    pub return_type: String,
    pub span: Span,
    /// The `function_definition` subtree.
    pub node: &'t SyntaxNode,
    pub has_errors: bool,
}

impl<'t> FunctionUnit<'t> {
    pub fn body(&self) -> Option<&'t SyntaxNode> {
        self.node.child_by_field("body")
    }

    pub fn start_line(&self) -> usize {
        self.span.start_line
    }

    pub fn end_line(&self) -> usize {
        self.span.end_line
    }

    pub fn line_count(&self) -> usize {
        self.span.end_line.saturating_sub(self.span.start_line) + 1
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.span.contains_line(line)
    }
}

/// Parser abstraction. Any backend that can produce a [`SyntaxTree`] using the C
/// grammar's node kinds can stand in for the tree-sitter one.
pub trait SyntaxTreeProvider: Send + Sync {
    /// Return the grammar this provider parses (e.g., "c").
    fn language(&self) -> &str;

    /// Parse normalized source. Recoverable syntax errors are kept in the tree as
    /// error nodes; only a total failure is an `Err`.
    fn parse(&self, source: &str) -> anyhow::Result<SyntaxTree>;

    /// Function definitions (not prototypes), nested ones included, in source order.
    fn function_units<'t>(&self, tree: &'t SyntaxTree) -> Vec<FunctionUnit<'t>>;
}

/// The provider used when none is configured.
pub fn default_provider() -> Box<dyn SyntaxTreeProvider> {
    Box::new(TreeSitterC::new())
}
