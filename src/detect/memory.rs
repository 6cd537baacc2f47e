//! Memory-safety heuristics over the syntax tree.
//!
//! These are scope patterns, not dataflow: variables are matched by name, a check
//! must appear in the allocating statement or the next few statements of the same
//! block, and there is no alias analysis.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;

use super::{DetectionContext, Detector, Issue, IssueRule, Severity};
use crate::config::{AnalyzerConfig, BoundCheck, Hazard, UnsafeFunction};
use crate::parser::{FunctionUnit, SyntaxNode, SyntaxTree};

lazy_static! {
    /// One printf/scanf conversion: flags, width, precision, length, conversion.
    static ref FORMAT_CONVERSION: Regex = Regex::new(
        r"%[-+ #0']*(\*|\d+)?(?:\.(\*|\d+))?(?:hh|h|ll|l|L|q|j|z|t)?([a-zA-Z%\[])"
    ).unwrap();

    static ref BARE_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_]\w*$").unwrap();
}

const ALLOCATORS: &[&str] = &["malloc", "calloc", "realloc", "strdup", "strndup"];

/// Start of a variable reference: not preceded by an identifier character or a
/// member access.
const REF_START: &str = r"(?:^|[^\w.>])";
/// End of a variable reference: not followed by more of an lvalue.
const REF_END: &str = r"(?:[^\w.\[\-]|$)";

#[derive(Debug)]
struct AllocationSite<'t> {
    call: &'t SyntaxNode,
    allocator: &'t str,
    /// Variable (or lvalue text) receiving the result; `None` when discarded.
    target: Option<String>,
    /// The allocation sits inside an `if`/`while`/`for` condition.
    in_condition: bool,
}

/// What one statement contributes, excluding nested blocks.
#[derive(Debug, Default)]
struct StatementParts<'t> {
    allocations: Vec<AllocationSite<'t>>,
    frees: Vec<&'t SyntaxNode>,
    blocks: Vec<&'t SyntaxNode>,
}

#[derive(Debug, Default)]
struct Findings {
    issues: Vec<Issue>,
    /// Named allocation targets with the line of their first allocation.
    allocated: Vec<(String, usize)>,
}

/// Detects unchecked allocations, leaks, dangling pointers, unsafe library calls
/// and `sizeof` applied to pointers.
pub struct MemoryAnalyzer {
    window: usize,
    unsafe_functions: HashMap<String, UnsafeFunction>,
}

impl MemoryAnalyzer {
    pub fn new(window: usize, unsafe_functions: &[UnsafeFunction]) -> Self {
        Self {
            window,
            unsafe_functions: unsafe_functions
                .iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect(),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.statement_window, &config.unsafe_functions)
    }

    fn check_function(
        &self,
        tree: &SyntaxTree,
        function: &FunctionUnit<'_>,
        file_pointers: &HashSet<String>,
        issues: &mut Vec<Issue>,
    ) {
        let mut findings = Findings::default();
        if let Some(body) = function.body() {
            self.scan_block(tree, body, &mut findings);
        }
        issues.append(&mut findings.issues);

        let nodes = scope_nodes(function.node);

        let freed: HashSet<String> = nodes
            .iter()
            .filter(|n| is_call_to(tree, n, "free"))
            .filter_map(|call| free_target(tree, call))
            .collect();
        let mut reported = HashSet::new();
        for (target, line) in findings.allocated {
            if freed.contains(&target) || !reported.insert(target.clone()) {
                continue;
            }
            issues.push(
                Issue::new(
                    IssueRule::AllocationNotFreed,
                    Severity::Warning,
                    line,
                    format!("memory assigned to '{}' is never freed in {}()", target, function.name),
                )
                .with_symbol(target),
            );
        }

        for call in nodes.iter().filter(|n| n.kind == "call_expression") {
            if let Some(issue) = self.check_unsafe_call(tree, call) {
                issues.push(issue);
            }
        }

        self.check_sizeof(tree, &nodes, file_pointers, issues);
    }

    /// Walk the statements of a compound statement, then its nested blocks.
    fn scan_block(&self, tree: &SyntaxTree, block: &SyntaxNode, findings: &mut Findings) {
        let statements: Vec<&SyntaxNode> =
            block.named_children().filter(|s| is_statement(s)).collect();

        for (i, statement) in statements.iter().enumerate() {
            let window_end = statements.len().min(i + 1 + self.window);
            let following = joined_text(tree, &statements[i + 1..window_end]);
            let parts = statement_parts(tree, statement);

            for site in parts.allocations {
                self.check_allocation(tree, statement, &following, site, findings);
            }
            for call in parts.frees {
                check_free(tree, statement, call, &following, findings);
            }
            for nested in parts.blocks {
                self.scan_block(tree, nested, findings);
            }
        }
    }

    fn check_allocation(
        &self,
        tree: &SyntaxTree,
        statement: &SyntaxNode,
        following: &str,
        site: AllocationSite<'_>,
        findings: &mut Findings,
    ) {
        let line = site.call.span.start_line;
        let checked = site.in_condition
            || match &site.target {
                None => false,
                Some(target) => null_check_pattern(target).map_or(true, |re| {
                    re.is_match(tree.text(statement)) || re.is_match(following)
                }),
            };

        if !checked {
            let (message, symbol) = match &site.target {
                Some(target) => (
                    format!("'{}' from {}() is not checked for NULL", target, site.allocator),
                    target.as_str(),
                ),
                None => (
                    format!("result of {}() is discarded and never checked", site.allocator),
                    site.allocator,
                ),
            };
            findings.issues.push(
                Issue::new(IssueRule::UncheckedAllocation, Severity::Error, line, message)
                    .with_symbol(symbol),
            );
        }

        if let Some(target) = site.target {
            findings.allocated.push((target, line));
        }
    }

    fn check_unsafe_call(&self, tree: &SyntaxTree, call: &SyntaxNode) -> Option<Issue> {
        let name = callee_name(tree, call)?;
        let entry = self.unsafe_functions.get(name)?;
        let args = arguments(call);

        let bounded = match entry.bound {
            BoundCheck::Never => false,
            BoundCheck::LiteralSource { arg } => args.get(arg).is_some_and(|a| is_string_literal(a)),
            BoundCheck::FormatWidth { arg } => args
                .get(arg)
                .filter(|a| is_string_literal(a))
                .is_some_and(|a| format_is_bounded(tree.text(a))),
            BoundCheck::NullArgument { arg } => {
                if args.get(arg).is_some_and(|a| is_null_literal(tree, a)) {
                    return None;
                }
                false
            }
        };

        let (severity, message) = match (bounded, entry.hazard) {
            (_, Hazard::Race) => (
                entry.unbounded_severity,
                format!(
                    "{}() returns a file name another process can claim first; use {}",
                    name, entry.replacement
                ),
            ),
            (true, Hazard::Overflow) => (
                Severity::Warning,
                format!("{}() is unsafe; prefer {}", name, entry.replacement),
            ),
            (false, Hazard::Overflow) => (
                entry.unbounded_severity,
                format!(
                    "{}() has no discernible bound and can overflow its buffer; use {}",
                    name, entry.replacement
                ),
            ),
        };
        Some(
            Issue::new(IssueRule::UnsafeFunction, severity, call.span.start_line, message)
                .with_symbol(name),
        )
    }

    fn check_sizeof(
        &self,
        tree: &SyntaxTree,
        nodes: &[&SyntaxNode],
        file_pointers: &HashSet<String>,
        issues: &mut Vec<Issue>,
    ) {
        let mut pointers = HashSet::new();
        let mut others = HashSet::new();
        collect_declarations(tree, nodes, &mut pointers, &mut others);

        for node in nodes.iter().filter(|n| n.kind == "sizeof_expression") {
            let operand = sizeof_operand(tree.text(node));
            if !BARE_IDENTIFIER.is_match(operand) {
                continue;
            }
            let is_pointer = pointers.contains(operand)
                || (file_pointers.contains(operand) && !others.contains(operand));
            if is_pointer {
                issues.push(
                    Issue::new(
                        IssueRule::SizeofPointer,
                        Severity::Error,
                        node.span.start_line,
                        format!(
                            "sizeof({}) is the size of a pointer, not of the buffer it points to",
                            operand
                        ),
                    )
                    .with_symbol(operand),
                );
            }
        }
    }
}

impl Detector for MemoryAnalyzer {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> anyhow::Result<Vec<Issue>> {
        let Some(tree) = ctx.tree else {
            return Ok(Vec::new());
        };

        let mut file_pointers = HashSet::new();
        collect_declarations(tree, &scope_nodes(tree.root()), &mut file_pointers, &mut HashSet::new());

        let mut issues = Vec::new();
        for function in ctx.functions {
            self.check_function(tree, function, &file_pointers, &mut issues);
        }
        issues.sort_by_key(|i| i.line);
        Ok(issues)
    }
}

fn check_free(
    tree: &SyntaxTree,
    statement: &SyntaxNode,
    call: &SyntaxNode,
    following: &str,
    findings: &mut Findings,
) {
    let Some(target) = free_target(tree, call) else {
        return;
    };
    let rest = tree
        .source()
        .get(call.span.end_byte..statement.span.end_byte)
        .unwrap_or("");
    let reset = null_reset_pattern(&target).map_or(true, |re| re.is_match(rest) || re.is_match(following));
    if !reset {
        findings.issues.push(
            Issue::new(
                IssueRule::DanglingPointer,
                Severity::Warning,
                call.span.start_line,
                format!("'{}' is freed but not set to NULL afterwards", target),
            )
            .with_symbol(target),
        );
    }
}

/// Nodes under `root` that are not inside a nested function definition.
fn scope_nodes(root: &SyntaxNode) -> Vec<&SyntaxNode> {
    let mut nodes = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        nodes.push(node);
        stack.extend(
            node.children
                .iter()
                .rev()
                .filter(|c| c.kind != "function_definition"),
        );
    }
    nodes
}

/// Comments and the empty statements left where embedded SQL was do not count.
fn is_statement(node: &SyntaxNode) -> bool {
    match node.kind {
        "comment" => false,
        "expression_statement" => node.named_children().next().is_some(),
        _ => true,
    }
}

fn joined_text(tree: &SyntaxTree, statements: &[&SyntaxNode]) -> String {
    statements
        .iter()
        .map(|s| tree.text(s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Allocations, frees and nested blocks of one statement, in source order.
fn statement_parts<'t>(tree: &'t SyntaxTree, statement: &'t SyntaxNode) -> StatementParts<'t> {
    let mut parts = StatementParts::default();
    let mut stack = vec![(statement, false)];

    while let Some((node, in_condition)) = stack.pop() {
        match node.kind {
            "compound_statement" => {
                parts.blocks.push(node);
                continue;
            }
            "function_definition" => continue,
            "expression_statement" => {
                let discarded = node.named_children().next().and_then(|e| allocator_call(tree, e));
                if let Some((call, allocator)) = discarded {
                    parts.allocations.push(AllocationSite {
                        call,
                        allocator,
                        target: None,
                        in_condition,
                    });
                    continue;
                }
            }
            "init_declarator" => {
                let value = node.child_by_field("value").and_then(|v| allocator_call(tree, v));
                if let Some((call, allocator)) = value {
                    parts.allocations.push(AllocationSite {
                        call,
                        allocator,
                        target: node.child_by_field("declarator").and_then(|d| tree.declared_name(d)),
                        in_condition,
                    });
                    continue;
                }
            }
            "assignment_expression" if node.has_token("=") => {
                let right = node.child_by_field("right").and_then(|r| allocator_call(tree, r));
                if let Some((call, allocator)) = right {
                    let target = node
                        .child_by_field("left")
                        .map(|l| tree.text(l).trim().to_string())
                        .filter(|t| !t.is_empty());
                    parts.allocations.push(AllocationSite {
                        call,
                        allocator,
                        target,
                        in_condition,
                    });
                    continue;
                }
            }
            "call_expression" if is_call_to(tree, node, "free") => parts.frees.push(node),
            _ => {}
        }

        let has_condition = matches!(
            node.kind,
            "if_statement" | "while_statement" | "for_statement" | "do_statement"
        );
        for child in node.children.iter().rev() {
            let condition = in_condition || (has_condition && child.field == Some("condition"));
            stack.push((child, condition));
        }
    }
    parts
}

/// Casts and parentheses around an expression do not change what it is.
fn strip_wrappers(mut node: &SyntaxNode) -> &SyntaxNode {
    loop {
        let inner = match node.kind {
            "cast_expression" => node.child_by_field("value"),
            "parenthesized_expression" => node.named_children().find(|c| c.kind != "comment"),
            _ => None,
        };
        match inner {
            Some(inner) => node = inner,
            None => return node,
        }
    }
}

fn allocator_call<'t>(tree: &'t SyntaxTree, expr: &'t SyntaxNode) -> Option<(&'t SyntaxNode, &'t str)> {
    let call = strip_wrappers(expr);
    let name = callee_name(tree, call)?;
    ALLOCATORS.contains(&name).then_some((call, name))
}

fn callee_name<'t>(tree: &'t SyntaxTree, call: &SyntaxNode) -> Option<&'t str> {
    if call.kind != "call_expression" {
        return None;
    }
    call.child_by_field("function")
        .filter(|f| f.kind == "identifier")
        .map(|f| tree.text(f))
}

fn is_call_to(tree: &SyntaxTree, node: &SyntaxNode, name: &str) -> bool {
    callee_name(tree, node) == Some(name)
}

fn arguments(call: &SyntaxNode) -> Vec<&SyntaxNode> {
    call.child_by_field("arguments")
        .map(|list| list.named_children().filter(|a| a.kind != "comment").collect())
        .unwrap_or_default()
}

fn free_target(tree: &SyntaxTree, call: &SyntaxNode) -> Option<String> {
    let arg = *arguments(call).first()?;
    let text = tree.text(strip_wrappers(arg)).trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn is_null_literal(tree: &SyntaxTree, node: &SyntaxNode) -> bool {
    matches!(tree.text(strip_wrappers(node)).trim(), "NULL" | "0")
}

fn is_string_literal(node: &SyntaxNode) -> bool {
    matches!(node.kind, "string_literal" | "concatenated_string")
}

/// Every `%s` and `%[` conversion of a literal format carries a width or precision.
fn format_is_bounded(format: &str) -> bool {
    FORMAT_CONVERSION.captures_iter(format).all(|caps| {
        let conversion = &caps[3];
        if conversion != "s" && conversion != "[" {
            return true;
        }
        caps.get(1).is_some() || caps.get(2).is_some()
    })
}

fn sizeof_operand(text: &str) -> &str {
    let operand = text.trim_start_matches("sizeof").trim();
    operand
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(operand)
        .trim()
}

/// Split declared names into pointers and everything else. Array parameters
/// decay to pointers.
fn collect_declarations(
    tree: &SyntaxTree,
    nodes: &[&SyntaxNode],
    pointers: &mut HashSet<String>,
    others: &mut HashSet<String>,
) {
    for node in nodes
        .iter()
        .filter(|n| n.kind == "declaration" || n.kind == "parameter_declaration")
    {
        let is_parameter = node.kind == "parameter_declaration";
        for declarator in node.children.iter().filter(|c| c.field == Some("declarator")) {
            let declarator = match declarator.kind {
                "init_declarator" => match declarator.child_by_field("declarator") {
                    Some(inner) => inner,
                    None => continue,
                },
                _ => declarator,
            };
            let Some(name) = tree.declared_name(declarator) else {
                continue;
            };
            let is_pointer = match innermost_wrapper(declarator) {
                Some("pointer_declarator") => true,
                Some("array_declarator") => is_parameter,
                _ => false,
            };
            if is_pointer {
                pointers.insert(name);
            } else {
                others.insert(name);
            }
        }
    }
}

/// Declarator wrapper closest to the declared name: `*names[10]` is an array of
/// pointers, `(*rows)[10]` a pointer to an array.
fn innermost_wrapper(declarator: &SyntaxNode) -> Option<&'static str> {
    let mut innermost = None;
    let mut current = declarator;
    loop {
        match current.kind {
            "pointer_declarator" | "array_declarator" | "function_declarator" => {
                innermost = Some(current.kind)
            }
            "parenthesized_declarator" | "attributed_declarator" => {}
            _ => return innermost,
        }
        current = match current
            .child_by_field("declarator")
            .or_else(|| current.named_children().next())
        {
            Some(inner) => inner,
            None => return innermost,
        };
    }
}

fn null_check_pattern(target: &str) -> Option<Regex> {
    let v = regex::escape(target);
    Regex::new(&format!(
        r"{start}{v}\s*[!=]=\s*(?:NULL|0)\b|\b(?:NULL|0)\s*[!=]=\s*{v}{end}|!\s*\(?\s*{v}{end}|\b(?:if|while)\s*\(\s*{v}\s*\)|\bassert\s*\(\s*{v}{end}",
        start = REF_START,
        end = REF_END,
        v = v,
    ))
    .ok()
}

fn null_reset_pattern(target: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"{start}{v}\s*=\s*(?:NULL|0|\(\s*void\s*\*\s*\)\s*0)\s*[;,)]",
        start = REF_START,
        v = regex::escape(target),
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SyntaxTreeProvider, TreeSitterC};
    use crate::source::SourceUnit;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn detect(raw: &str) -> Vec<Issue> {
        let unit = SourceUnit::new(raw);
        let provider = TreeSitterC::new();
        let tree = provider.parse(unit.normalized()).unwrap();
        let functions = provider.function_units(&tree);
        let ctx = DetectionContext {
            source: &unit,
            tree: Some(&tree),
            functions: &functions,
        };
        MemoryAnalyzer::from_config(&AnalyzerConfig::default())
            .detect(&ctx)
            .unwrap()
    }

    fn of_rule(issues: &[Issue], rule: IssueRule) -> Vec<&Issue> {
        issues.iter().filter(|i| i.rule == rule).collect()
    }

    #[test]
    fn test_checked_and_freed_is_clean() {
        let raw = indoc! {"
            #include <stdlib.h>

            int copy(int n)
            {
                char *p;
                p = malloc(n);
                if (p == NULL)
                    return -1;
                free(p);
                p = NULL;
                return 0;
            }
        "};
        let issues = detect(raw);
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_discarded_allocation_is_one_error() {
        let raw = indoc! {"
            void waste(int n)
            {
                malloc(n);
            }
        "};
        let issues = detect(raw);
        assert_eq!(issues.len(), 1, "{:?}", issues);
        assert_eq!(issues[0].rule, IssueRule::UncheckedAllocation);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].line, 3);
    }

    #[test]
    fn test_unchecked_and_unfreed() {
        let raw = indoc! {"
            char *make(int n)
            {
                char *buf = malloc(n);
                buf[0] = 0;
                return buf;
            }
        "};
        let issues = detect(raw);
        let unchecked = of_rule(&issues, IssueRule::UncheckedAllocation);
        assert_eq!(unchecked.len(), 1);
        assert_eq!(unchecked[0].symbol.as_deref(), Some("buf"));
        let leaks = of_rule(&issues, IssueRule::AllocationNotFreed);
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].severity, Severity::Warning);
        assert_eq!(leaks[0].line, 3);
    }

    #[test]
    fn test_check_forms() {
        let raw = indoc! {"
            void forms(int n)
            {
                char *a = malloc(n);
                if (!a) return;
                char *b = (char *) calloc(n, 1);
                if (NULL == b) return;
                char *c;
                if ((c = malloc(n)) == NULL) return;
                char *d = malloc(n);
                if (d) { d[0] = 0; }
                free(a); a = NULL;
                free(b); b = NULL;
                free(c); c = NULL;
                free(d); d = NULL;
            }
        "};
        let issues = detect(raw);
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_check_outside_window() {
        let raw = indoc! {"
            void late(int n)
            {
                char *p = malloc(n);
                n = 1;
                n = 2;
                n = 3;
                if (p == NULL) return;
                free(p);
                p = NULL;
            }
        "};
        let issues = detect(raw);
        let unchecked = of_rule(&issues, IssueRule::UncheckedAllocation);
        assert_eq!(unchecked.len(), 1, "{:?}", issues);
        assert_eq!(unchecked[0].line, 3);
    }

    #[test]
    fn test_leak_reported_once_per_variable() {
        let raw = indoc! {"
            void twice(int n)
            {
                char *p = malloc(n);
                if (!p) return;
                p = malloc(n);
                if (!p) return;
            }
        "};
        let issues = detect(raw);
        let leaks = of_rule(&issues, IssueRule::AllocationNotFreed);
        assert_eq!(leaks.len(), 1, "{:?}", issues);
        assert_eq!(leaks[0].line, 3);
    }

    #[test]
    fn test_free_without_reset() {
        let raw = indoc! {"
            void drop(char *p)
            {
                free(p);
                p[0] = 0;
            }
        "};
        let issues = detect(raw);
        assert_eq!(issues.len(), 1, "{:?}", issues);
        assert_eq!(issues[0].rule, IssueRule::DanglingPointer);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].line, 3);
    }

    #[test]
    fn test_unsafe_functions() {
        let raw = indoc! {r#"
            void io(char *dst, const char *src, char *line)
            {
                strcpy(dst, src);
                strcpy(dst, "fixed");
                sprintf(dst, "%s", src);
                sprintf(dst, "%.10s", src);
                gets(line);
            }
        "#};
        let issues = detect(raw);
        let severities: Vec<_> = of_rule(&issues, IssueRule::UnsafeFunction)
            .iter()
            .map(|i| (i.line, i.severity))
            .collect();
        assert_eq!(
            severities,
            vec![
                (3, Severity::Error),
                (4, Severity::Warning),
                (5, Severity::Error),
                (6, Severity::Warning),
                (7, Severity::Critical),
            ]
        );
        assert!(issues[0].message.contains("strncpy"));
    }

    #[test]
    fn test_string_duplicates_are_allocations() {
        let raw = indoc! {"
            void copy(const char *s)
            {
                char *p = strdup(s);
                p[0] = 0;
                char *q = strndup(s, 8);
                if (q == NULL)
                    return;
                free(q);
                q = NULL;
            }
        "};
        let issues = detect(raw);
        let found: Vec<_> = issues
            .iter()
            .map(|i| (i.rule, i.line, i.symbol.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            found,
            vec![
                (IssueRule::UncheckedAllocation, 3, "p".to_string()),
                (IssueRule::AllocationNotFreed, 3, "p".to_string()),
            ]
        );
        assert!(issues[0].message.contains("strdup()"));
    }

    #[test]
    fn test_temp_names_and_realpath() {
        let raw = indoc! {"
            void temp(char *path, char *buf)
            {
                mktemp(path);
                tmpnam(buf);
                tempnam(path, buf);
                realpath(path, buf);
                realpath(path, NULL);
            }
        "};
        let issues = detect(raw);
        let found: Vec<_> = of_rule(&issues, IssueRule::UnsafeFunction)
            .iter()
            .map(|i| (i.line, i.severity))
            .collect();
        assert_eq!(
            found,
            vec![
                (3, Severity::Warning),
                (4, Severity::Warning),
                (5, Severity::Warning),
                (6, Severity::Warning),
            ]
        );
        assert!(issues[0].message.contains("mkstemp"));
        assert!(issues[0].message.contains("another process"));
        assert!(issues[3].message.contains("overflow"));
    }

    #[test]
    fn test_sizeof_pointer() {
        let raw = indoc! {"
            static char *shared;

            void sizes(char *buf, char list[])
            {
                char local[16];
                int n = sizeof(buf);
                n = sizeof(local);
                n = sizeof(*buf);
                n = sizeof(list);
                n = sizeof shared;
            }
        "};
        let issues = detect(raw);
        let lines: Vec<_> = of_rule(&issues, IssueRule::SizeofPointer)
            .iter()
            .map(|i| (i.line, i.symbol.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            lines,
            vec![
                (6, "buf".to_string()),
                (9, "list".to_string()),
                (10, "shared".to_string()),
            ]
        );
    }

    #[test]
    fn test_sizeof_array_of_pointers() {
        let raw = indoc! {"
            void names(char *argv[])
            {
                char *names[10];
                char (*rows)[10] = 0;
                int n = sizeof(names);
                n = sizeof(rows);
                n = sizeof(argv);
            }
        "};
        let issues = detect(raw);
        let lines: Vec<_> = of_rule(&issues, IssueRule::SizeofPointer)
            .iter()
            .map(|i| (i.line, i.symbol.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            lines,
            vec![(6, "rows".to_string()), (7, "argv".to_string())]
        );
    }

    #[test]
    fn test_format_bounds() {
        assert!(format_is_bounded("\"%d items\""));
        assert!(format_is_bounded("\"%20s %.*s %%s\""));
        assert!(!format_is_bounded("\"%d %s\""));
        assert!(!format_is_bounded("\"%[^\\n]\""));
        assert!(format_is_bounded("\"%79[^\\n]\""));
    }

    #[test]
    fn test_no_tree_no_issues() {
        let unit = SourceUnit::new("int f(void) { malloc(1); }\n");
        let ctx = DetectionContext {
            source: &unit,
            tree: None,
            functions: &[],
        };
        let analyzer = MemoryAnalyzer::from_config(&AnalyzerConfig::default());
        assert!(analyzer.detect(&ctx).unwrap().is_empty());
    }
}
