//! Integration tests for the full analysis pipeline.
//!
//! These tests run the analyzer against the testdata fixtures and check the
//! metrics and issues reported for each file.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use proc_analyzer::{Analyzer, AnalyzerConfig, FileMetrics, IssueKind, IssueRule, Severity};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn analyze_fixture(name: &str) -> FileMetrics {
    let analyzer = Analyzer::new(AnalyzerConfig::default()).expect("default config is valid");
    analyzer.analyze_path(&testdata_path().join(name))
}

/// (rule, line, severity) of every issue of a kind, sorted by line.
fn issues_of(metrics: &FileMetrics, kind: IssueKind) -> Vec<(IssueRule, usize, Severity)> {
    let mut issues: Vec<_> = metrics
        .issues
        .of_kind(kind)
        .iter()
        .map(|i| (i.rule, i.line, i.severity))
        .collect();
    issues.sort_by_key(|(_, line, _)| *line);
    issues
}

#[test]
fn test_clean_fixture_has_no_issues() {
    let metrics = analyze_fixture("clean.pc");
    assert!(metrics.issues.is_empty(), "unexpected issues: {:?}", metrics.issues);
    assert!(!metrics.parse_errors);
    assert_eq!(metrics.functions.len(), 1);
    assert_eq!(metrics.functions[0].name, "lookup_name");
    assert_eq!(metrics.functions[0].return_type, "char *");
}

#[test]
fn test_batch_structure() {
    let metrics = analyze_fixture("batch.pc");
    assert!(!metrics.parse_errors, "{:?}", metrics.issues.structural);

    let names: Vec<_> = metrics.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["apply_raise", "copy_name", "count_open", "main"]);

    assert_eq!(metrics.sql_blocks, 18);
    assert_eq!(metrics.sql_blocks_by_kind.get("open"), Some(&3));
    assert_eq!(metrics.sql_blocks_by_kind.get("fetch"), Some(&3));
    assert_eq!(metrics.sql_blocks_by_kind.get("declare_cursor"), Some(&2));
    assert_eq!(metrics.sql_includes, vec!["sqlca".to_string()]);
    assert_eq!(
        metrics.includes,
        vec!["stdio.h".to_string(), "stdlib.h".to_string(), "string.h".to_string()]
    );

    let header = metrics.module_header.as_ref().expect("fixture has a header");
    assert_eq!(header.summary, "Nightly payroll batch.");
    assert_eq!(header.metadata.get("author").map(String::as_str), Some("payroll team"));
    assert!(header.description.starts_with("Reads pending salary changes"));
}

#[test]
fn test_batch_metrics() {
    let metrics = analyze_fixture("batch.pc");
    let apply = &metrics.functions[0];
    assert_eq!(apply.cyclomatic, 5);
    assert_eq!(apply.cognitive, 8);
    assert_eq!(apply.sql_block_count, 8);
    assert_eq!(apply.parameter_count, 1);
    assert_eq!(apply.return_type, "int");

    let halstead = apply.halstead.as_ref().expect("halstead enabled by default");
    assert!(halstead.volume > 0.0);
    assert!((halstead.estimated_bugs - halstead.volume / 3000.0).abs() < 1e-9);

    let main = &metrics.functions[3];
    assert_eq!(main.cyclomatic, 1);
    assert_eq!(main.cognitive, 0);
    assert_eq!(main.sql_block_count, 3);
}

#[test]
fn test_batch_todos() {
    let metrics = analyze_fixture("batch.pc");
    assert_eq!(
        issues_of(&metrics, IssueKind::Todo),
        vec![
            (IssueRule::TodoMarker, 25, Severity::Warning),
            (IssueRule::TodoMarker, 54, Severity::Info),
        ]
    );
}

#[test]
fn test_batch_cursor_issues() {
    let metrics = analyze_fixture("batch.pc");
    assert_eq!(
        issues_of(&metrics, IssueKind::Cursor),
        vec![
            (IssueRule::NestedCursorInLoop, 36, Severity::Error),
            (IssueRule::UnclosedCursor, 66, Severity::Error),
            (IssueRule::FetchWithoutStatusCheck, 67, Severity::Warning),
        ]
    );
}

#[test]
fn test_batch_memory_issues() {
    let metrics = analyze_fixture("batch.pc");
    assert_eq!(
        issues_of(&metrics, IssueKind::Memory),
        vec![
            (IssueRule::UncheckedAllocation, 28, Severity::Error),
            (IssueRule::UnsafeFunction, 42, Severity::Error),
            (IssueRule::DanglingPointer, 50, Severity::Warning),
            (IssueRule::UnsafeFunction, 57, Severity::Error),
            (IssueRule::SizeofPointer, 58, Severity::Error),
        ]
    );
}

#[test]
fn test_unterminated_sql_is_structural() {
    let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
    let metrics = analyzer.analyze("int f(void)\n{\n    EXEC SQL COMMIT WORK\n}\n");
    let structural = &metrics.issues.structural;
    assert!(
        structural.iter().any(|i| i.rule == IssueRule::UnterminatedSql && i.line == 3),
        "{:?}",
        structural
    );
    assert_eq!(metrics.functions.len(), 1);
}

#[test]
fn test_unterminated_sql_keeps_following_code() {
    let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
    let metrics = analyzer.analyze(
        "void f(void)\n{\n    EXEC SQL COMMIT WORK\n    EXEC SQL OPEN c1;\n}\n\nvoid g(void)\n{\n    int x = 1;\n}\n",
    );

    let names: Vec<_> = metrics.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["f", "g"]);
    assert_eq!(metrics.sql_blocks, 2);
    assert_eq!(metrics.sql_blocks_by_kind.get("open"), Some(&1));

    let structural: Vec<_> = metrics.issues.structural.iter().map(|i| (i.rule, i.line)).collect();
    assert_eq!(structural, vec![(IssueRule::UnterminatedSql, 3)]);
    let cursors: Vec<_> = metrics.issues.cursor.iter().map(|i| (i.rule, i.line)).collect();
    assert_eq!(cursors, vec![(IssueRule::UnclosedCursor, 4)]);
}
