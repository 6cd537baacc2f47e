//! Integration tests for JSON and pretty output over the testdata fixtures.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use proc_analyzer::report::{write_json, write_pretty, JsonReport};
use proc_analyzer::{AnalysisReport, Analyzer, AnalyzerConfig, ComplexityLevel, Severity};

fn fixture_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("testdata/batch.pc"),
        PathBuf::from("testdata/clean.pc"),
    ]
}

fn analyze_with(config: AnalyzerConfig) -> AnalysisReport {
    let analyzer = Analyzer::new(config).expect("config should be valid");
    analyzer.analyze_paths(&fixture_paths())
}

fn strict_config() -> AnalyzerConfig {
    AnalyzerConfig::from_file("testdata/strict.yaml").expect("strict.yaml should load")
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_strict_config_loads() {
    let config = strict_config();
    assert_eq!(config.cyclomatic_threshold, 4);
    assert_eq!(config.cognitive_threshold, 6);
    assert!(!config.enable_halstead);
    assert!(config.validate().is_ok());
}

// =============================================================================
// JSON Output Tests
// =============================================================================

#[test]
fn test_json_output_parses() {
    let report = analyze_with(AnalyzerConfig::default());
    let mut out = Vec::new();
    write_json(&mut out, "testdata", &report).unwrap();

    let parsed: JsonReport = serde_json::from_slice(&out).expect("output should be valid JSON");
    assert_eq!(parsed.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(parsed.path, "testdata");
    assert_eq!(parsed.files.len(), 2);
    assert_eq!(parsed.summary.files, 2);
    assert_eq!(parsed.summary.functions, 5);
    assert!(parsed.hotspots.is_empty());
}

#[test]
fn test_json_output_fields() {
    let report = analyze_with(AnalyzerConfig::default());
    let mut out = Vec::new();
    write_json(&mut out, "testdata", &report).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let batch = &value["files"][0];
    assert_eq!(batch["filepath"], "testdata/batch.pc");
    assert_eq!(batch["functions"][0]["name"], "apply_raise");
    assert_eq!(batch["functions"][0]["cyclomatic"], 5);
    assert_eq!(batch["functions"][0]["cognitive"], 8);
    assert!(batch["functions"][0]["halstead"]["volume"].as_f64().unwrap() > 0.0);
    assert_eq!(value["thresholds"]["cyclomatic"], 10);
    assert_eq!(value["summary"]["sql_blocks_by_kind"]["fetch"], 4);
}

#[test]
fn test_json_with_strict_thresholds() {
    let report = analyze_with(strict_config());
    let mut out = Vec::new();
    write_json(&mut out, "testdata", &report).unwrap();

    let parsed: JsonReport = serde_json::from_slice(&out).unwrap();
    assert_eq!(parsed.thresholds.cyclomatic, 4);
    assert_eq!(parsed.hotspots.len(), 1);

    let hotspot = &parsed.hotspots[0];
    assert_eq!(hotspot.file, "testdata/batch.pc");
    assert_eq!(hotspot.function, "apply_raise");
    assert_eq!(hotspot.line, 26);
    assert_eq!(hotspot.level, ComplexityLevel::High);

    // Halstead disabled
    assert!(parsed.files[0].functions.iter().all(|f| f.halstead.is_none()));
}

#[test]
fn test_strict_todo_tags() {
    let report = analyze_with(strict_config());
    let batch = report.get("testdata/batch.pc").unwrap();
    let todos: Vec<(usize, Severity)> = batch
        .issues
        .iter()
        .filter(|i| i.rule.as_str() == "todo_marker")
        .map(|i| (i.line, i.severity))
        .collect();

    // TODO is no longer a configured tag
    assert_eq!(todos, vec![(25, Severity::Warning)]);
}

// =============================================================================
// Pretty Output Tests
// =============================================================================

#[test]
fn test_pretty_output_contents() {
    colored::control::set_override(false);
    let report = analyze_with(strict_config());
    let mut out = Vec::new();
    write_pretty(&mut out, "testdata", &report).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("proc-analyzer"));
    assert!(text.contains("Scanning: testdata"));
    assert!(text.contains("cyclomatic 4, cognitive 6"));
    assert!(text.contains("testdata/batch.pc"));
    assert!(text.contains("testdata/clean.pc"));
    assert!(text.contains("Nightly payroll batch."));
    assert!(text.contains("apply_raise"));
    assert!(text.contains("lookup_name"));
    assert!(text.contains("Hotspots (1):"));
    assert!(text.contains("nested_cursor"));
    assert!(text.contains("Summary:"));
}

#[test]
fn test_pretty_output_omits_empty_sections() {
    colored::control::set_override(false);
    let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
    let report = analyzer.analyze_paths(&[PathBuf::from("testdata/clean.pc")]);
    let mut out = Vec::new();
    write_pretty(&mut out, "testdata/clean.pc", &report).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(!text.contains("Hotspots"));
    assert!(!text.contains("Issues ("));
    assert!(!text.contains("parse errors"));
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_missing_file_is_reported() {
    let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
    let report = analyzer.analyze_paths(&[
        PathBuf::from("testdata/clean.pc"),
        PathBuf::from("testdata/does-not-exist.pc"),
    ]);

    assert_eq!(report.len(), 2);
    let missing = report.get("testdata/does-not-exist.pc").unwrap();
    assert!(missing.functions.is_empty());
    let issues: Vec<_> = missing.issues.iter().collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].rule.as_str(), "file_error");
    assert_eq!(report.summary().files_with_errors, 1);
}

#[test]
fn test_batch_order_does_not_change_summary() {
    let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
    let forward = analyzer.analyze_paths(&fixture_paths());
    let mut reversed_paths = fixture_paths();
    reversed_paths.reverse();
    let reversed = analyzer.analyze_paths(&reversed_paths);

    assert_eq!(forward.summary(), reversed.summary());
    assert_eq!(forward.hotspots(), reversed.hotspots());
}

#[test]
fn test_tempdir_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.pc");
    std::fs::write(&path, "int one(void)\n{\n    EXEC SQL COMMIT;\n    return 1;\n}\n").unwrap();

    let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
    let report = analyzer.analyze_paths(&[path.clone()]);
    let file = report.get(&path.to_string_lossy()).unwrap();
    assert_eq!(file.functions.len(), 1);
    assert_eq!(file.functions[0].sql_block_count, 1);
    assert!(file.issues.is_empty());
}
