//! McCabe cyclomatic complexity.

use super::{MetricEngine, MetricRecord};
use crate::parser::{FunctionUnit, SyntaxNode, SyntaxTree};

/// Counts decision points: `if` (so `else if` too), loops, `case` labels,
/// ternaries and each `&&`/`||`. `switch` itself, `else` and `default` add nothing.
pub struct CyclomaticCalculator;

impl MetricEngine for CyclomaticCalculator {
    fn name(&self) -> &'static str {
        "cyclomatic"
    }

    fn measure(&self, unit: &FunctionUnit<'_>, _tree: &SyntaxTree) -> MetricRecord {
        MetricRecord::Cyclomatic(cyclomatic_complexity(unit.node))
    }
}

/// Complexity of a function subtree. Nested function definitions are skipped;
/// they are scored on their own.
pub fn cyclomatic_complexity(function: &SyntaxNode) -> u32 {
    let mut complexity = 1;
    let mut stack: Vec<&SyntaxNode> = function.children.iter().collect();

    while let Some(node) = stack.pop() {
        if node.kind == "function_definition" {
            continue;
        }
        if is_decision_point(node) {
            complexity += 1;
        }
        stack.extend(node.children.iter());
    }
    complexity
}

fn is_decision_point(node: &SyntaxNode) -> bool {
    match node.kind {
        "if_statement" | "while_statement" | "for_statement" | "do_statement"
        | "conditional_expression" => true,
        "case_statement" => node.has_token("case"),
        "binary_expression" => node.has_token("&&") || node.has_token("||"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::with_first_function;
    use indoc::indoc;

    fn complexity_of(source: &str) -> u32 {
        with_first_function(source, |unit, _| cyclomatic_complexity(unit.node))
    }

    #[test]
    fn test_straight_line_function() {
        let source = "int add(int a, int b)\n{\n    int c = a + b;\n    return c;\n}\n";
        assert_eq!(complexity_of(source), 1);
    }

    #[test]
    fn test_independent_ifs() {
        let source = indoc! {"
            int grade(int a)
            {
                int r = 0;
                if (a > 1) r++;
                if (a > 2) r++;
                if (a > 3) r++;
                if (a > 4) r++;
                return r;
            }
        "};
        assert_eq!(complexity_of(source), 5);
    }

    #[test]
    fn test_else_if_counts_but_else_does_not() {
        let source = indoc! {"
            int sign(int x)
            {
                if (x > 0) {
                    return 1;
                } else if (x < 0) {
                    return -1;
                } else {
                    return 0;
                }
            }
        "};
        assert_eq!(complexity_of(source), 3);
    }

    #[test]
    fn test_loops_and_boolean_operators() {
        let source = indoc! {"
            void scan(int *v, int n)
            {
                int i = 0;
                while (i < n && v[i] != 0) {
                    i++;
                }
                for (i = 0; i < n; i++) {
                    v[i] = v[i] > 0 || v[i] < -9 ? 1 : 0;
                }
                do {
                    n--;
                } while (n > 0);
            }
        "};
        // while, &&, for, ||, ?:, do
        assert_eq!(complexity_of(source), 7);
    }

    #[test]
    fn test_switch_counts_case_labels_only() {
        let source = indoc! {"
            int code(int c)
            {
                switch (c) {
                case 1:
                    return 10;
                case 2:
                    return 20;
                default:
                    return 0;
                }
            }
        "};
        assert_eq!(complexity_of(source), 3);
    }
}
