//! Halstead software science metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{MetricEngine, MetricRecord};
use crate::parser::{FunctionUnit, SyntaxNode, SyntaxTree};

/// Grouping punctuation that is not an operator on its own. Calls, subscripts
/// and casts are counted through their parent node instead.
const IGNORED_TOKENS: &[&str] = &["(", ")", "[", "]", "{", "}", ";", "\"", "'"];

/// Seconds per elementary mental discrimination (Stroud number).
const STROUD: f64 = 18.0;

/// Volume per delivered bug.
const BUG_VOLUME: f64 = 3000.0;

/// Halstead metrics for one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalsteadMetrics {
    /// n1
    pub distinct_operators: usize,
    /// n2
    pub distinct_operands: usize,
    /// N1
    pub total_operators: usize,
    /// N2
    pub total_operands: usize,
    pub vocabulary: usize,
    pub length: usize,
    pub volume: f64,
    pub difficulty: f64,
    pub effort: f64,
    pub time_seconds: f64,
    pub estimated_bugs: f64,
}

impl HalsteadMetrics {
    pub fn from_counts(n1: usize, n2: usize, big_n1: usize, big_n2: usize) -> Self {
        let vocabulary = n1 + n2;
        let length = big_n1 + big_n2;
        let volume = if vocabulary > 1 {
            length as f64 * (vocabulary as f64).log2()
        } else {
            0.0
        };
        let difficulty = if n2 > 0 {
            (n1 as f64 / 2.0) * (big_n2 as f64 / n2 as f64)
        } else {
            0.0
        };
        let effort = difficulty * volume;

        Self {
            distinct_operators: n1,
            distinct_operands: n2,
            total_operators: big_n1,
            total_operands: big_n2,
            vocabulary,
            length,
            volume,
            difficulty,
            effort,
            time_seconds: effort / STROUD,
            estimated_bugs: volume / BUG_VOLUME,
        }
    }
}

/// Operator and operand occurrence counts.
#[derive(Debug, Clone, Default)]
pub struct HalsteadCounts {
    pub operators: BTreeMap<String, usize>,
    pub operands: BTreeMap<String, usize>,
}

impl HalsteadCounts {
    fn operator(&mut self, token: &str) {
        *self.operators.entry(token.to_string()).or_insert(0) += 1;
    }

    fn operand(&mut self, token: &str) {
        *self.operands.entry(token.to_string()).or_insert(0) += 1;
    }

    pub fn metrics(&self) -> HalsteadMetrics {
        HalsteadMetrics::from_counts(
            self.operators.len(),
            self.operands.len(),
            self.operators.values().sum(),
            self.operands.values().sum(),
        )
    }
}

pub struct HalsteadCalculator;

impl MetricEngine for HalsteadCalculator {
    fn name(&self) -> &'static str {
        "halstead"
    }

    fn measure(&self, unit: &FunctionUnit<'_>, tree: &SyntaxTree) -> MetricRecord {
        MetricRecord::Halstead(count_tokens(unit.node, tree).metrics())
    }
}

/// Classify every token under a function definition.
pub fn count_tokens(function: &SyntaxNode, tree: &SyntaxTree) -> HalsteadCounts {
    let mut counts = HalsteadCounts::default();
    for child in &function.children {
        collect(child, None, tree, &mut counts);
    }
    counts
}

fn collect(node: &SyntaxNode, parent: Option<&str>, tree: &SyntaxTree, counts: &mut HalsteadCounts) {
    match node.kind {
        "function_definition" | "comment" => return,
        "string_literal" | "raw_string_literal" | "system_lib_string" => {
            counts.operand("<string>");
            return;
        }
        "char_literal" | "number_literal" | "true" | "false" | "null" => {
            counts.operand(tree.text(node));
            return;
        }
        "identifier" => {
            if parent == Some("call_expression") && node.field == Some("function") {
                counts.operator(tree.text(node));
            } else {
                counts.operand(tree.text(node));
            }
            return;
        }
        "primitive_type" => {
            counts.operator(tree.text(node));
            return;
        }
        "call_expression" => counts.operator("()"),
        "subscript_expression" => counts.operator("[]"),
        "cast_expression" => counts.operator("(cast)"),
        _ => {}
    }

    if node.is_leaf() {
        if !node.named {
            if !IGNORED_TOKENS.contains(&node.kind) {
                counts.operator(node.kind);
            }
        } else if !node.is_error {
            // field_identifier, type_identifier, statement_identifier, ...
            counts.operand(tree.text(node));
        }
        return;
    }

    for child in &node.children {
        collect(child, Some(node.kind), tree, counts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::with_first_function;

    #[test]
    fn test_minimal_function_counts() {
        let metrics = with_first_function("int f(void)\n{\n    return 0;\n}\n", |unit, tree| {
            count_tokens(unit.node, tree).metrics()
        });
        // operators: int, void, return; operands: f, 0
        assert_eq!(metrics.distinct_operators, 3);
        assert_eq!(metrics.distinct_operands, 2);
        assert_eq!(metrics.total_operators, 3);
        assert_eq!(metrics.total_operands, 2);
        assert_eq!(metrics.vocabulary, 5);
        assert_eq!(metrics.length, 5);
        assert!((metrics.volume - 5.0 * 5f64.log2()).abs() < 1e-9);
        assert!((metrics.difficulty - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_callee_is_an_operator() {
        let source = "void g(int x)\n{\n    printf(\"%d\\n\", x);\n    x = x + 1;\n}\n";
        let counts = with_first_function(source, |unit, tree| count_tokens(unit.node, tree));
        assert!(counts.operators.contains_key("printf"), "{:?}", counts.operators);
        assert!(counts.operators.contains_key("()"));
        assert!(counts.operators.contains_key(","));
        assert_eq!(counts.operators.get("="), Some(&1));
        assert_eq!(counts.operators.get("+"), Some(&1));
        assert!(!counts.operands.contains_key("printf"));
        assert_eq!(counts.operands.get("x"), Some(&4));
        assert_eq!(counts.operands.get("<string>"), Some(&1));
        assert!(!counts.operators.contains_key("("));
    }

    #[test]
    fn test_bugs_follow_volume() {
        let metrics = HalsteadMetrics::from_counts(10, 7, 40, 30);
        assert!(metrics.volume > 0.0);
        assert!((metrics.estimated_bugs - metrics.volume / 3000.0).abs() < 1e-12);
        assert!((metrics.time_seconds - metrics.effort / 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_counts_do_not_divide_by_zero() {
        let metrics = HalsteadMetrics::from_counts(1, 0, 3, 0);
        assert_eq!(metrics.volume, 0.0);
        assert_eq!(metrics.difficulty, 0.0);
        assert_eq!(metrics.effort, 0.0);
        assert_eq!(metrics.estimated_bugs, 0.0);
    }
}
