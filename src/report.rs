//! Output formatting for analysis results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: the summary plus every file's metrics, for programmatic consumption

use std::io::Write;

use colored::*;
use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalysisReport, FileMetrics, Summary};
use crate::detect::{Issue, Severity};
use crate::metrics::FunctionMetrics;
use crate::score::{ComplexityLevel, Hotspot, Thresholds};

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON document.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    pub thresholds: Thresholds,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hotspots: Vec<Hotspot>,
    pub files: Vec<FileMetrics>,
}

impl JsonReport {
    pub fn new(path: &str, report: &AnalysisReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            path: path.to_string(),
            thresholds: report.thresholds(),
            summary: report.summary(),
            hotspots: report.hotspots(),
            files: report.files().to_vec(),
        }
    }
}

/// Write results in JSON format.
pub fn write_json<W: Write>(out: &mut W, path: &str, report: &AnalysisReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&JsonReport::new(path, report))?;
    writeln!(out, "{}", json)?;
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty<W: Write>(out: &mut W, path: &str, report: &AnalysisReport) -> std::io::Result<()> {
    let summary = report.summary();
    let thresholds = report.thresholds();

    // Header
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}",
        "proc-analyzer".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;
    writeln!(out, "  {}{}", "Scanning: ".dimmed(), path)?;
    writeln!(
        out,
        "  {}cyclomatic {}, cognitive {}",
        "Thresholds: ".dimmed(),
        thresholds.cyclomatic,
        thresholds.cognitive
    )?;
    writeln!(out)?;

    for file in report.files() {
        write_file(out, file, &thresholds)?;
    }

    let hotspots = report.hotspots();
    if !hotspots.is_empty() {
        write_hotspots(out, &hotspots)?;
        writeln!(out)?;
    }

    write_summary(out, &summary, &thresholds)?;
    writeln!(out)?;
    Ok(())
}

fn write_file<W: Write>(out: &mut W, file: &FileMetrics, thresholds: &Thresholds) -> std::io::Result<()> {
    write!(out, "  {}", file.filepath.blue().bold())?;
    write!(
        out,
        "{}",
        format!(
            "  {} lines, {} functions, {} SQL blocks",
            file.total_lines,
            file.functions.len(),
            file.sql_blocks
        )
        .dimmed()
    )?;
    if file.parse_errors {
        write!(out, "  {}", "(parse errors)".yellow())?;
    }
    writeln!(out)?;

    if let Some(header) = &file.module_header {
        writeln!(out, "    {}", header.summary.dimmed())?;
    }

    if !file.functions.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "    {:<28} {:>6} {:>5} {:>5} {:>9} {:>5}",
            "Function".bold(),
            "Line".bold(),
            "CC".bold(),
            "Cog".bold(),
            "Volume".bold(),
            "SQL".bold()
        )?;
        for function in &file.functions {
            write_function(out, function, thresholds)?;
        }
    }

    let issues: Vec<&Issue> = file.issues.iter().collect();
    if !issues.is_empty() {
        writeln!(out)?;
        writeln!(out, "    {} ({}):", "Issues".bold(), issues.len())?;
        let mut sorted = issues;
        sorted.sort_by_key(|i| i.line);
        for issue in sorted {
            write_issue(out, issue)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

fn write_function<W: Write>(out: &mut W, function: &FunctionMetrics, thresholds: &Thresholds) -> std::io::Result<()> {
    let volume = function
        .halstead
        .as_ref()
        .map(|h| format!("{:.1}", h.volume))
        .unwrap_or_else(|| "-".to_string());
    let name = if function.has_parse_errors {
        format!("{}*", function.name)
    } else {
        function.name.clone()
    };

    write!(out, "    {:<28} {:>6} ", name, function.start_line)?;
    write_colored_value(
        out,
        function.cyclomatic,
        ComplexityLevel::grade(function.cyclomatic, thresholds.cyclomatic),
        5,
    )?;
    write!(out, " ")?;
    write_colored_value(
        out,
        function.cognitive,
        ComplexityLevel::grade(function.cognitive, thresholds.cognitive),
        5,
    )?;
    writeln!(out, " {:>9} {:>5}", volume, function.sql_block_count)
}

fn write_colored_value<W: Write>(out: &mut W, value: u32, level: ComplexityLevel, width: usize) -> std::io::Result<()> {
    let text = format!("{:>width$}", value, width = width);
    match level {
        ComplexityLevel::Low => write!(out, "{}", text.green()),
        ComplexityLevel::Moderate => write!(out, "{}", text.yellow()),
        ComplexityLevel::High => write!(out, "{}", text.red()),
        ComplexityLevel::VeryHigh => write!(out, "{}", text.red().bold()),
    }
}

fn write_issue<W: Write>(out: &mut W, issue: &Issue) -> std::io::Result<()> {
    write_severity_tag(out, &issue.severity)?;
    write!(out, "  {:<26}", issue.rule.as_str().dimmed())?;
    if issue.line > 0 {
        write!(out, "{}", format!("line {}", issue.line).dimmed())?;
    }
    writeln!(out)?;
    writeln!(out, "              {}", issue.message)
}

fn write_severity_tag<W: Write>(out: &mut W, severity: &Severity) -> std::io::Result<()> {
    match severity {
        Severity::Critical => write!(out, "      {}", "CRIT ".red().bold()),
        Severity::Error => write!(out, "      {}", "ERROR".red()),
        Severity::Warning => write!(out, "      {}", "WARN ".yellow()),
        Severity::Info => write!(out, "      {}", "INFO ".blue()),
    }
}

fn write_hotspots<W: Write>(out: &mut W, hotspots: &[Hotspot]) -> std::io::Result<()> {
    writeln!(out, "  {} ({}):", "Hotspots".bold(), hotspots.len())?;
    for hotspot in hotspots {
        let level = match hotspot.level {
            ComplexityLevel::VeryHigh => hotspot.level.as_str().red().bold(),
            _ => hotspot.level.as_str().red(),
        };
        writeln!(
            out,
            "    {:<10} {}{} {}  {}",
            level,
            hotspot.file.blue(),
            format!(":{}", hotspot.line).dimmed(),
            hotspot.function,
            format!("(cc {}, cog {})", hotspot.cyclomatic, hotspot.cognitive).dimmed()
        )?;
    }
    Ok(())
}

fn write_summary<W: Write>(out: &mut W, summary: &Summary, thresholds: &Thresholds) -> std::io::Result<()> {
    writeln!(out, "  {}", "Summary:".bold())?;
    writeln!(
        out,
        "    {:<22} {} ({} non-empty lines)",
        "Files:",
        summary.files,
        summary.non_empty_lines
    )?;
    writeln!(out, "    {:<22} {}", "Functions:", summary.functions)?;
    writeln!(out, "    {:<22} {}", "SQL blocks:", summary.sql_blocks)?;
    if !summary.sql_blocks_by_kind.is_empty() {
        let kinds: Vec<String> = summary
            .sql_blocks_by_kind
            .iter()
            .map(|(kind, count)| format!("{} {}", kind, count))
            .collect();
        writeln!(out, "    {:<22} {}", "", kinds.join(", ").dimmed())?;
    }

    write!(out, "    {:<22} {:.2} avg, max ", "Cyclomatic:", summary.average_cyclomatic)?;
    write_colored_value(
        out,
        summary.max_cyclomatic,
        ComplexityLevel::grade(summary.max_cyclomatic, thresholds.cyclomatic),
        0,
    )?;
    writeln!(out)?;
    write!(out, "    {:<22} {:.2} avg, max ", "Cognitive:", summary.average_cognitive)?;
    write_colored_value(
        out,
        summary.max_cognitive,
        ComplexityLevel::grade(summary.max_cognitive, thresholds.cognitive),
        0,
    )?;
    writeln!(out)?;

    write!(out, "    {:<22} {}", "Issues:", summary.total_issues)?;
    for severity in [Severity::Critical, Severity::Error, Severity::Warning, Severity::Info] {
        let count = summary
            .issues_by_severity
            .get(severity.as_str())
            .copied()
            .unwrap_or(0);
        if count > 0 {
            write!(out, "  {}", format!("{} {}", count, severity).dimmed())?;
        }
    }
    writeln!(out)?;

    if summary.files_with_parse_errors > 0 {
        writeln!(
            out,
            "    {:<22} {}",
            "Files with parse errors:",
            summary.files_with_parse_errors.to_string().yellow()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::config::AnalyzerConfig;

    fn sample_report() -> AnalysisReport {
        let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
        analyzer.analyze_many(vec![
            ("a.pc", "// TODO: split\nint f(int a)\n{\n    if (a) return 1;\n    return 0;\n}\n"),
            ("b.pc", "void g(int n)\n{\n    malloc(n);\n}\n"),
        ])
    }

    #[test]
    fn test_json_round_trips_summary() {
        let report = sample_report();
        let mut out = Vec::new();
        write_json(&mut out, "src", &report).unwrap();

        let parsed: JsonReport = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.path, "src");
        assert_eq!(parsed.summary, report.summary());
        assert_eq!(parsed.files.len(), 2);
        assert_eq!(parsed.files[0].functions[0].name, "f");
    }

    #[test]
    fn test_json_uses_snake_case_rules() {
        let report = sample_report();
        let mut out = Vec::new();
        write_json(&mut out, "src", &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"unchecked_allocation\""));
        assert!(text.contains("\"todo_marker\""));
    }

    #[test]
    fn test_pretty_lists_files_and_issues() {
        colored::control::set_override(false);
        let report = sample_report();
        let mut out = Vec::new();
        write_pretty(&mut out, "src", &report).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("a.pc"));
        assert!(text.contains("b.pc"));
        assert!(text.contains("unchecked_allocation"));
        assert!(text.contains("Summary:"));
        assert!(text.contains("Functions:"));
    }
}
