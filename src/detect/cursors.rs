//! SQL cursor lifecycle checks.
//!
//! Each named cursor moves through `Declared -> Opened -> Fetched -> Closed`,
//! driven by the verbs of the embedded statements. The state is tracked per
//! enclosing function; cursor names are case-insensitive.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use super::{DetectionContext, Detector, Issue, IssueRule, Severity};
use crate::parser::{FunctionUnit, SyntaxNode};
use crate::source::{SqlBlock, SqlKind};

lazy_static! {
    static ref CURSOR_STATEMENT: Regex = Regex::new(
        r"(?is)^(?:AT\s+:?\w+\s+)?(?:FOR\s+:?\w+\s+)?(DECLARE|OPEN|FETCH|CLOSE)\b\s*(.*)$"
    ).unwrap();

    static ref DECLARED_NAME: Regex = Regex::new(r"(?is)^(\w+)\s+CURSOR\b").unwrap();

    static ref FETCH_TARGET: Regex = Regex::new(
        r"(?is)^(?:(?:NEXT|PRIOR|FIRST|LAST|CURRENT|(?:RELATIVE|ABSOLUTE)\s+:?\w+)\s+)?(?:FROM\s+)?:?(\w+)"
    ).unwrap();

    static ref CURSOR_TARGET: Regex = Regex::new(r"^:?(\w+)").unwrap();

    static ref WHENEVER_NOT_FOUND: Regex = Regex::new(r"(?is)^WHENEVER\s+NOT\s+FOUND\s+(.*)$").unwrap();

    /// Any reference to the SQL status fields counts as a check.
    static ref STATUS_CHECK: Regex = Regex::new(r"(?i)\b(SQLCODE|SQLSTATE)\b").unwrap();
}

const LOOP_KINDS: &[&str] = &["while_statement", "for_statement", "do_statement"];

/// Lifecycle state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Declared,
    Opened,
    Fetched,
    Closed,
}

impl CursorState {
    fn is_open(&self) -> bool {
        matches!(self, CursorState::Opened | CursorState::Fetched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Declare,
    Open,
    Fetch,
    Close,
}

/// A cursor statement of the file.
#[derive(Debug)]
struct CursorEvent<'a> {
    verb: Verb,
    /// Lowercased cursor name.
    name: String,
    block: &'a SqlBlock,
    block_index: usize,
    /// A `WHENEVER NOT FOUND` with a real action precedes this statement.
    not_found_handled: bool,
}

fn cursor_events(blocks: &[SqlBlock]) -> Vec<CursorEvent<'_>> {
    let mut events = Vec::new();
    let mut not_found_handled = false;

    for (block_index, block) in blocks.iter().enumerate() {
        let statement = block.statement();
        if block.kind == SqlKind::Whenever {
            if let Some(caps) = WHENEVER_NOT_FOUND.captures(statement) {
                not_found_handled = !caps[1].trim().to_uppercase().starts_with("CONTINUE");
            }
            continue;
        }

        let Some(caps) = CURSOR_STATEMENT.captures(statement) else {
            continue;
        };
        let rest = caps.get(2).map_or("", |m| m.as_str());
        let (verb, target) = match caps[1].to_uppercase().as_str() {
            "DECLARE" => (Verb::Declare, DECLARED_NAME.captures(rest)),
            "OPEN" => (Verb::Open, CURSOR_TARGET.captures(rest)),
            "FETCH" => (Verb::Fetch, FETCH_TARGET.captures(rest)),
            _ => (Verb::Close, CURSOR_TARGET.captures(rest)),
        };
        let Some(target) = target else {
            continue;
        };

        events.push(CursorEvent {
            verb,
            name: target[1].to_lowercase(),
            block,
            block_index,
            not_found_handled,
        });
    }
    events
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: CursorState,
    opened_line: usize,
}

/// Detects cursor lifecycle problems.
pub struct CursorAnalyzer;

impl CursorAnalyzer {
    fn check_function(
        &self,
        ctx: &DetectionContext<'_>,
        function: &FunctionUnit<'_>,
        events: &[&CursorEvent<'_>],
        issues: &mut Vec<Issue>,
    ) {
        let mut cursors: BTreeMap<&str, Tracked> = BTreeMap::new();

        for event in events {
            let line = event.block.start_line;
            match event.verb {
                Verb::Declare => {
                    cursors.entry(event.name.as_str()).or_insert(Tracked {
                        state: CursorState::Declared,
                        opened_line: 0,
                    });
                }
                Verb::Open => {
                    let tracked = cursors.entry(event.name.as_str()).or_insert(Tracked {
                        state: CursorState::Declared,
                        opened_line: 0,
                    });
                    if tracked.state.is_open() {
                        issues.push(
                            Issue::new(
                                IssueRule::CursorReopened,
                                Severity::Warning,
                                line,
                                format!(
                                    "cursor '{}' is opened again without being closed (previous OPEN on line {})",
                                    event.name, tracked.opened_line
                                ),
                            )
                            .with_symbol(event.name.as_str()),
                        );
                    }
                    tracked.state = CursorState::Opened;
                    tracked.opened_line = line;
                }
                Verb::Fetch => {
                    if let Some(tracked) = cursors.get_mut(event.name.as_str()) {
                        if tracked.state.is_open() {
                            tracked.state = CursorState::Fetched;
                        }
                    }
                    if let Some(issue) = self.check_fetch_status(ctx, function, event) {
                        issues.push(issue);
                    }
                }
                Verb::Close => {
                    if let Some(tracked) = cursors.get_mut(event.name.as_str()) {
                        tracked.state = CursorState::Closed;
                    }
                }
            }
        }

        let mut unclosed: Vec<_> = cursors
            .into_iter()
            .filter(|(_, t)| t.state.is_open())
            .collect();
        unclosed.sort_by_key(|(_, t)| t.opened_line);
        for (name, tracked) in unclosed {
            issues.push(
                Issue::new(
                    IssueRule::UnclosedCursor,
                    Severity::Error,
                    tracked.opened_line,
                    format!(
                        "cursor '{}' is opened but not closed before the end of {}()",
                        name, function.name
                    ),
                )
                .with_symbol(name),
            );
        }

        self.check_nested_loops(function, events, issues);
    }

    /// An OPEN inside a loop whose body also fetches from another cursor.
    fn check_nested_loops(
        &self,
        function: &FunctionUnit<'_>,
        events: &[&CursorEvent<'_>],
        issues: &mut Vec<Issue>,
    ) {
        let mut loops: Vec<&SyntaxNode> = function
            .node
            .descendants()
            .filter(|n| LOOP_KINDS.contains(&n.kind))
            .collect();
        loops.sort_by_key(|n| n.span.end_byte - n.span.start_byte);

        for open in events.iter().filter(|e| e.verb == Verb::Open) {
            let outer_fetch = loops
                .iter()
                .filter(|l| l.span.contains_byte(open.block.start))
                .find_map(|l| {
                    events.iter().find(|e| {
                        e.verb == Verb::Fetch
                            && e.name != open.name
                            && l.span.contains_byte(e.block.start)
                    })
                });

            if let Some(fetch) = outer_fetch {
                issues.push(
                    Issue::new(
                        IssueRule::NestedCursorInLoop,
                        Severity::Error,
                        open.block.start_line,
                        format!(
                            "cursor '{}' is opened inside a loop that fetches from cursor '{}'",
                            open.name, fetch.name
                        ),
                    )
                    .with_symbol(open.name.as_str()),
                );
            }
        }
    }

    /// The code between a FETCH and the next embedded statement (or the end of
    /// the function) must look at SQLCODE or SQLSTATE.
    fn check_fetch_status(
        &self,
        ctx: &DetectionContext<'_>,
        function: &FunctionUnit<'_>,
        event: &CursorEvent<'_>,
    ) -> Option<Issue> {
        if event.not_found_handled {
            return None;
        }
        let blocks = ctx.source.sql_blocks();
        let window_end = blocks
            .get(event.block_index + 1)
            .map_or(function.span.end_byte, |next| next.start.min(function.span.end_byte));
        let following = ctx
            .source
            .raw()
            .get(event.block.end..window_end)
            .unwrap_or("");
        if STATUS_CHECK.is_match(following) {
            return None;
        }

        Some(
            Issue::new(
                IssueRule::FetchWithoutStatusCheck,
                Severity::Warning,
                event.block.start_line,
                format!(
                    "FETCH from cursor '{}' is not followed by an SQLCODE/SQLSTATE check",
                    event.name
                ),
            )
            .with_symbol(event.name.as_str()),
        )
    }
}

impl Detector for CursorAnalyzer {
    fn name(&self) -> &'static str {
        "cursors"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> anyhow::Result<Vec<Issue>> {
        let events = cursor_events(ctx.source.sql_blocks());

        let mut by_function: BTreeMap<usize, Vec<&CursorEvent<'_>>> = BTreeMap::new();
        for event in &events {
            if let Some((index, _)) = ctx.function_at_line(event.block.start_line) {
                by_function.entry(index).or_default().push(event);
            }
        }

        let mut issues = Vec::new();
        for (index, events) in &by_function {
            self.check_function(ctx, &ctx.functions[*index], events, &mut issues);
        }
        issues.sort_by_key(|i| i.line);
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SyntaxTreeProvider, TreeSitterC};
    use crate::source::SourceUnit;
    use indoc::indoc;

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
        CursorAnalyzer.detect(&ctx).unwrap()
    }

    fn rules(issues: &[Issue]) -> Vec<IssueRule> {
        issues.iter().map(|i| i.rule).collect()
    }

    #[test]
    fn test_open_then_close_is_clean() {
        let raw = indoc! {"
            EXEC SQL DECLARE emp_cur CURSOR FOR SELECT id FROM emp;

            void touch(void)
            {
                EXEC SQL OPEN emp_cur;
                EXEC SQL CLOSE emp_cur;
            }
        "};
        assert!(detect(raw).is_empty(), "{:?}", detect(raw));
    }

    #[test]
    fn test_unclosed_cursor() {
        let raw = indoc! {"
            void leak(void)
            {
                EXEC SQL OPEN emp_cur;
                EXEC SQL FETCH emp_cur INTO :id;
                if (sqlca.sqlcode != 0)
                    return;
            }
        "};
        let issues = detect(raw);
        assert_eq!(rules(&issues), vec![IssueRule::UnclosedCursor]);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].line, 3);
        assert_eq!(issues[0].symbol.as_deref(), Some("emp_cur"));
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let raw = indoc! {"
            void mixed(void)
            {
                EXEC SQL OPEN Emp_Cur;
                exec sql close EMP_CUR;
            }
        "};
        assert!(detect(raw).is_empty());
    }

    #[test]
    fn test_nested_cursor_in_loop() {
        let raw = indoc! {"
            void report(void)
            {
                EXEC SQL OPEN dept_cur;
                while (1) {
                    EXEC SQL FETCH dept_cur INTO :dept;
                    if (sqlca.sqlcode == 1403) break;
                    EXEC SQL OPEN emp_cur;
                    EXEC SQL FETCH emp_cur INTO :emp;
                    if (sqlca.sqlcode != 0) break;
                    EXEC SQL CLOSE emp_cur;
                }
                EXEC SQL CLOSE dept_cur;
            }
        "};
        let issues = detect(raw);
        let nested: Vec<_> = issues
            .iter()
            .filter(|i| i.rule == IssueRule::NestedCursorInLoop)
            .collect();
        assert_eq!(nested.len(), 1, "{:?}", issues);
        assert_eq!(nested[0].severity, Severity::Error);
        assert_eq!(nested[0].line, 7);
        assert_eq!(nested[0].symbol.as_deref(), Some("emp_cur"));
        assert_eq!(issues.len(), 1, "{:?}", issues);
    }

    #[test]
    fn test_fetch_without_status_check() {
        let raw = indoc! {"
            void unchecked(void)
            {
                EXEC SQL OPEN c1;
                for (;;) {
                    EXEC SQL FETCH c1 INTO :v;
                    total += v;
                }
                EXEC SQL CLOSE c1;
            }
        "};
        let issues = detect(raw);
        assert_eq!(rules(&issues), vec![IssueRule::FetchWithoutStatusCheck]);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].line, 5);
    }

    #[test]
    fn test_whenever_not_found_counts_as_check() {
        let raw = indoc! {"
            void handled(void)
            {
                EXEC SQL WHENEVER NOT FOUND DO break;
                EXEC SQL OPEN c1;
                for (;;) {
                    EXEC SQL FETCH c1 INTO :v;
                    total += v;
                }
                EXEC SQL WHENEVER NOT FOUND CONTINUE;
                EXEC SQL CLOSE c1;
            }
        "};
        assert!(detect(raw).is_empty(), "{:?}", detect(raw));
    }

    #[test]
    fn test_whenever_reaches_across_functions() {
        let raw = indoc! {"
            EXEC SQL WHENEVER NOT FOUND DO break;

            void first(void)
            {
                EXEC SQL OPEN c1;
                for (;;) {
                    EXEC SQL FETCH c1 INTO :v;
                }
                EXEC SQL CLOSE c1;
                EXEC SQL WHENEVER NOT FOUND CONTINUE;
            }

            void second(void)
            {
                EXEC SQL OPEN c2;
                for (;;) {
                    EXEC SQL FETCH c2 INTO :v;
                }
                EXEC SQL CLOSE c2;
            }
        "};
        let issues = detect(raw);
        assert_eq!(rules(&issues), vec![IssueRule::FetchWithoutStatusCheck]);
        assert_eq!(issues[0].line, 17);
    }

    #[test]
    fn test_reopen_without_close() {
        let raw = indoc! {"
            void twice(void)
            {
                EXEC SQL OPEN c1;
                EXEC SQL OPEN c1;
                EXEC SQL CLOSE c1;
            }
        "};
        let issues = detect(raw);
        assert_eq!(rules(&issues), vec![IssueRule::CursorReopened]);
        assert_eq!(issues[0].line, 4);
    }

    #[test]
    fn test_scope_is_per_function() {
        let raw = indoc! {"
            void opener(void)
            {
                EXEC SQL OPEN c1;
            }

            void closer(void)
            {
                EXEC SQL CLOSE c1;
            }
        "};
        let issues = detect(raw);
        assert_eq!(rules(&issues), vec![IssueRule::UnclosedCursor]);
        assert!(issues[0].message.contains("opener()"), "{}", issues[0].message);
    }
}
