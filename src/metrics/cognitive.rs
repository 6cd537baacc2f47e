//! Cognitive complexity, following the SonarSource scheme.
//!
//! - `if`, `?:`, `switch`, `for`, `while`, `do`: +1 plus the current nesting level;
//!   their bodies are one level deeper.
//! - `else if` and `else`: +1 without the nesting penalty.
//! - `goto` and labelled `break`/`continue`: +1.
//! - each run of like boolean operators: +1, so `a && b || c` scores 2.
//! - direct self-recursion: +1 once per function.
//!
//! `case` labels add nothing and nested function definitions are scored on their own.

use super::{MetricEngine, MetricRecord};
use crate::parser::{FunctionUnit, SyntaxNode, SyntaxTree};

pub struct CognitiveCalculator;

impl MetricEngine for CognitiveCalculator {
    fn name(&self) -> &'static str {
        "cognitive"
    }

    fn measure(&self, unit: &FunctionUnit<'_>, tree: &SyntaxTree) -> MetricRecord {
        MetricRecord::Cognitive(cognitive_complexity(unit, tree))
    }
}

pub fn cognitive_complexity(unit: &FunctionUnit<'_>, tree: &SyntaxTree) -> u32 {
    let mut visitor = CognitiveVisitor {
        tree,
        function_name: &unit.name,
        complexity: 0,
        recursive: false,
    };
    if let Some(body) = unit.body() {
        visitor.visit(body, 0);
    }
    visitor.complexity + u32::from(visitor.recursive)
}

struct CognitiveVisitor<'a> {
    tree: &'a SyntaxTree,
    function_name: &'a str,
    complexity: u32,
    recursive: bool,
}

impl CognitiveVisitor<'_> {
    fn visit(&mut self, node: &SyntaxNode, nesting: u32) {
        match node.kind {
            "function_definition" => {}
            "if_statement" => self.visit_if(node, nesting, false),
            "for_statement" | "while_statement" | "do_statement" | "switch_statement" => {
                self.complexity += 1 + nesting;
                for child in &node.children {
                    let level = if child.field == Some("body") {
                        nesting + 1
                    } else {
                        nesting
                    };
                    self.visit(child, level);
                }
            }
            "conditional_expression" => {
                self.complexity += 1 + nesting;
                for child in &node.children {
                    let level = if child.field == Some("condition") {
                        nesting
                    } else {
                        nesting + 1
                    };
                    self.visit(child, level);
                }
            }
            "goto_statement" => self.complexity += 1,
            "break_statement" | "continue_statement" => {
                if node.named_children().next().is_some() {
                    self.complexity += 1;
                }
            }
            "binary_expression" if is_logical(node) => self.visit_logical(node, nesting),
            "call_expression" => {
                if let Some(callee) = node.child_by_field("function") {
                    if callee.kind == "identifier" && self.tree.text(callee) == self.function_name {
                        self.recursive = true;
                    }
                }
                self.visit_children(node, nesting);
            }
            _ => self.visit_children(node, nesting),
        }
    }

    fn visit_children(&mut self, node: &SyntaxNode, nesting: u32) {
        for child in &node.children {
            self.visit(child, nesting);
        }
    }

    fn visit_if(&mut self, node: &SyntaxNode, nesting: u32, else_if: bool) {
        self.complexity += if else_if { 1 } else { 1 + nesting };
        for child in &node.children {
            match child.field {
                Some("condition") => self.visit(child, nesting),
                Some("consequence") => self.visit(child, nesting + 1),
                Some("alternative") => self.visit_else(child, nesting),
                _ => {}
            }
        }
    }

    fn visit_else(&mut self, node: &SyntaxNode, nesting: u32) {
        let branch = if node.kind == "else_clause" {
            match node.named_children().next() {
                Some(inner) => inner,
                None => return,
            }
        } else {
            node
        };

        if branch.kind == "if_statement" {
            self.visit_if(branch, nesting, true);
        } else {
            self.complexity += 1;
            self.visit(branch, nesting + 1);
        }
    }

    fn visit_logical(&mut self, node: &SyntaxNode, nesting: u32) {
        let mut operators = Vec::new();
        let mut operands = Vec::new();
        flatten_logical(node, &mut operators, &mut operands);

        let changes = operators.windows(2).filter(|w| w[0] != w[1]).count() as u32;
        self.complexity += 1 + changes;
        for operand in operands {
            self.visit(operand, nesting);
        }
    }
}

fn is_logical(node: &SyntaxNode) -> bool {
    node.kind == "binary_expression" && (node.has_token("&&") || node.has_token("||"))
}

/// In-order operator sequence of one boolean expression. Parenthesized
/// sub-expressions are left as operands and scored separately.
fn flatten_logical<'a>(
    node: &'a SyntaxNode,
    operators: &mut Vec<&'static str>,
    operands: &mut Vec<&'a SyntaxNode>,
) {
    for child in &node.children {
        if !child.named && (child.kind == "&&" || child.kind == "||") {
            operators.push(child.kind);
        } else if is_logical(child) {
            flatten_logical(child, operators, operands);
        } else if child.named {
            operands.push(child);
        }
    }
}
