//! Per-file pipeline and batch orchestration.
//!
//! One file goes through normalization, parsing, the metric engines and the
//! detectors, in that order, and comes out as a [`FileMetrics`]. Batches are
//! analyzed in parallel and folded into an [`AnalysisReport`] in input order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::detect::{
    parse_module_header, CommentAnalyzer, CursorAnalyzer, DetectionContext, Detector, Issue,
    IssueKind, IssueRule, IssuesByKind, MemoryAnalyzer, ModuleHeader, Severity,
};
use crate::error::{AnalysisError, ConfigError};
use crate::metrics::{default_engines, FunctionMetrics, MetricEngine};
use crate::parser::{default_provider, FunctionUnit, SyntaxTree, SyntaxTreeProvider};
use crate::score::{Hotspot, Thresholds};
use crate::source::{SourceUnit, SqlKind};

/// Path recorded for text analyzed without one.
pub const ANONYMOUS_SOURCE: &str = "<input>";

/// Everything measured and detected in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub filepath: String,
    pub total_lines: usize,
    pub non_empty_lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_header: Option<ModuleHeader>,
    /// `#include` targets.
    pub includes: Vec<String>,
    /// `EXEC SQL INCLUDE` targets.
    pub sql_includes: Vec<String>,
    pub sql_blocks: usize,
    pub sql_blocks_by_kind: BTreeMap<String, usize>,
    /// The parser reported errors; some metrics are best-effort.
    pub parse_errors: bool,
    pub functions: Vec<FunctionMetrics>,
    pub issues: IssuesByKind,
}

impl FileMetrics {
    fn empty(filepath: &str) -> Self {
        Self {
            filepath: filepath.to_string(),
            total_lines: 0,
            non_empty_lines: 0,
            module_header: None,
            includes: Vec::new(),
            sql_includes: Vec::new(),
            sql_blocks: 0,
            sql_blocks_by_kind: BTreeMap::new(),
            parse_errors: false,
            functions: Vec::new(),
            issues: IssuesByKind::new(),
        }
    }

    /// Metrics for a file that could not be read.
    fn unreadable(filepath: &str, error: &AnalysisError) -> Self {
        let mut metrics = Self::empty(filepath);
        metrics.issues.push(Issue::new(
            IssueRule::FileError,
            Severity::Error,
            0,
            error.to_string(),
        ));
        metrics
    }

    pub fn average_cyclomatic(&self) -> f64 {
        average(self.functions.iter().map(|f| u64::from(f.cyclomatic)).sum(), self.functions.len())
    }

    pub fn average_cognitive(&self) -> f64 {
        average(self.functions.iter().map(|f| u64::from(f.cognitive)).sum(), self.functions.len())
    }

    pub fn max_cyclomatic(&self) -> u32 {
        self.functions.iter().map(|f| f.cyclomatic).max().unwrap_or(0)
    }

    pub fn max_cognitive(&self) -> u32 {
        self.functions.iter().map(|f| f.cognitive).max().unwrap_or(0)
    }

    /// Functions graded over a threshold.
    pub fn hotspots(&self, thresholds: &Thresholds) -> Vec<Hotspot> {
        self.functions
            .iter()
            .filter_map(|f| Hotspot::from_function(&self.filepath, f, thresholds))
            .collect()
    }
}

fn average(sum: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

/// Aggregates over a report. Computed from integer totals only, so the values
/// do not depend on the order files were added in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub files: usize,
    pub functions: usize,
    pub total_lines: usize,
    pub non_empty_lines: usize,
    pub sql_blocks: usize,
    pub sql_blocks_by_kind: BTreeMap<String, usize>,
    pub average_cyclomatic: f64,
    pub average_cognitive: f64,
    pub max_cyclomatic: u32,
    pub max_cognitive: u32,
    pub total_issues: usize,
    pub issues_by_kind: BTreeMap<String, usize>,
    pub issues_by_severity: BTreeMap<String, usize>,
    /// Files with at least one error or critical issue.
    pub files_with_errors: usize,
    pub files_with_parse_errors: usize,
    pub hotspots: usize,
}

/// Results of a batch, keyed by file path in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    files: Vec<FileMetrics>,
    thresholds: Thresholds,
}

impl AnalysisReport {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            files: Vec::new(),
            thresholds,
        }
    }

    /// Append a file. Returns false, leaving the report unchanged, when the path is
    /// already present.
    pub fn insert(&mut self, metrics: FileMetrics) -> bool {
        if self.get(&metrics.filepath).is_some() {
            debug!(file = metrics.filepath.as_str(), "duplicate path ignored");
            return false;
        }
        self.files.push(metrics);
        true
    }

    pub fn get(&self, filepath: &str) -> Option<&FileMetrics> {
        self.files.iter().find(|f| f.filepath == filepath)
    }

    pub fn files(&self) -> &[FileMetrics] {
        &self.files
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// All issues with the file they belong to.
    pub fn issues(&self) -> impl Iterator<Item = (&str, &Issue)> {
        self.files
            .iter()
            .flat_map(|f| f.issues.iter().map(move |i| (f.filepath.as_str(), i)))
    }

    /// Number of issues at or above `severity`.
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.files.iter().map(|f| f.issues.count_at_least(severity)).sum()
    }

    /// Functions over a threshold, worst first.
    pub fn hotspots(&self) -> Vec<Hotspot> {
        let mut hotspots: Vec<Hotspot> = self
            .files
            .iter()
            .flat_map(|f| f.hotspots(&self.thresholds))
            .collect();
        hotspots.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then(b.cognitive.cmp(&a.cognitive))
                .then(b.cyclomatic.cmp(&a.cyclomatic))
                .then_with(|| a.file.cmp(&b.file))
                .then(a.line.cmp(&b.line))
        });
        hotspots
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            files: self.files.len(),
            ..Summary::default()
        };
        let mut cyclomatic_sum = 0u64;
        let mut cognitive_sum = 0u64;

        for file in &self.files {
            summary.functions += file.functions.len();
            summary.total_lines += file.total_lines;
            summary.non_empty_lines += file.non_empty_lines;
            summary.sql_blocks += file.sql_blocks;
            for (kind, count) in &file.sql_blocks_by_kind {
                *summary.sql_blocks_by_kind.entry(kind.clone()).or_insert(0) += count;
            }
            for function in &file.functions {
                cyclomatic_sum += u64::from(function.cyclomatic);
                cognitive_sum += u64::from(function.cognitive);
            }
            summary.max_cyclomatic = summary.max_cyclomatic.max(file.max_cyclomatic());
            summary.max_cognitive = summary.max_cognitive.max(file.max_cognitive());

            for issue in file.issues.iter() {
                summary.total_issues += 1;
                *summary
                    .issues_by_kind
                    .entry(issue.kind.as_str().to_string())
                    .or_insert(0) += 1;
                *summary
                    .issues_by_severity
                    .entry(issue.severity.as_str().to_string())
                    .or_insert(0) += 1;
            }
            if file.issues.has_errors() {
                summary.files_with_errors += 1;
            }
            if file.parse_errors {
                summary.files_with_parse_errors += 1;
            }
            summary.hotspots += file.hotspots(&self.thresholds).len();
        }

        summary.average_cyclomatic = average(cyclomatic_sum, summary.functions);
        summary.average_cognitive = average(cognitive_sum, summary.functions);
        summary
    }
}

/// Runs the metric engines and detectors over Pro*C sources.
pub struct Analyzer {
    config: AnalyzerConfig,
    provider: Box<dyn SyntaxTreeProvider>,
    engines: Vec<Box<dyn MetricEngine>>,
    detectors: Vec<Box<dyn Detector>>,
}

impl Analyzer {
    /// Build an analyzer with the tree-sitter backend. Fails on an invalid config.
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        Self::with_provider(config, default_provider())
    }

    pub fn with_provider(
        config: AnalyzerConfig,
        provider: Box<dyn SyntaxTreeProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
        if config.enable_todos {
            detectors.push(Box::new(CommentAnalyzer::from_config(&config)?));
        }
        if config.enable_cursors {
            detectors.push(Box::new(CursorAnalyzer));
        }
        if config.enable_memory {
            detectors.push(Box::new(MemoryAnalyzer::from_config(&config)));
        }

        debug!(
            backend = provider.language(),
            detectors = detectors.len(),
            "analyzer configured"
        );
        Ok(Self {
            engines: default_engines(config.enable_halstead),
            config,
            provider,
            detectors,
        })
    }

    /// Append a detector after the configured ones.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn thresholds(&self) -> Thresholds {
        self.config.thresholds()
    }

    pub fn analyze(&self, raw: &str) -> FileMetrics {
        self.analyze_source(ANONYMOUS_SOURCE, raw)
    }

    pub fn analyze_source(&self, filepath: &str, raw: &str) -> FileMetrics {
        debug!(file = filepath, "analyzing");
        let unit = SourceUnit::new(raw);
        debug!(file = filepath, sql_blocks = unit.sql_blocks().len(), "normalized");

        let mut metrics = FileMetrics {
            total_lines: unit.total_lines(),
            non_empty_lines: unit.non_empty_lines(),
            module_header: parse_module_header(raw),
            sql_includes: sql_includes(&unit),
            sql_blocks: unit.sql_blocks().len(),
            sql_blocks_by_kind: unit.kind_counts(),
            ..FileMetrics::empty(filepath)
        };
        let mut issues = IssuesByKind::new();
        issues.extend(unit.diagnostics().iter().cloned());

        let tree = match self.provider.parse(unit.normalized()) {
            Ok(tree) => Some(tree),
            Err(e) => {
                let error = AnalysisError::Parse(format!("{:#}", e));
                warn!(file = filepath, error = %error, "parse failed");
                metrics.parse_errors = true;
                issues.push(Issue::new(IssueRule::FileError, Severity::Error, 0, error.to_string()));
                None
            }
        };
        let functions = tree
            .as_ref()
            .map(|t| self.provider.function_units(t))
            .unwrap_or_default();

        if let Some(tree) = &tree {
            metrics.includes = tree.includes().to_vec();
            if let Some(line) = tree.first_error_line() {
                metrics.parse_errors = true;
                issues.push(Issue::new(
                    IssueRule::SyntaxError,
                    Severity::Warning,
                    line,
                    format!("syntax error at line {}; metrics near it are best-effort", line),
                ));
            }
            metrics.functions = functions
                .iter()
                .map(|function| self.measure(function, tree, &unit))
                .collect();
        }

        let ctx = DetectionContext {
            source: &unit,
            tree: tree.as_ref(),
            functions: &functions,
        };
        for detector in &self.detectors {
            match detector.detect(&ctx) {
                Ok(found) => issues.extend(found),
                Err(e) => {
                    warn!(file = filepath, detector = detector.name(), error = %e, "detector failed");
                    issues.push(
                        Issue::new(
                            IssueRule::DetectorFailure,
                            Severity::Error,
                            0,
                            format!("{} detector failed: {:#}", detector.name(), e),
                        )
                        .with_symbol(detector.name()),
                    );
                }
            }
        }
        metrics.issues = issues;

        debug!(
            file = filepath,
            functions = metrics.functions.len(),
            issues = metrics.issues.len(),
            "analyzed"
        );
        metrics
    }

    fn measure(&self, function: &FunctionUnit<'_>, tree: &SyntaxTree, unit: &SourceUnit) -> FunctionMetrics {
        let mut metrics = FunctionMetrics::for_unit(function);
        for engine in &self.engines {
            metrics.apply(engine.measure(function, tree));
        }
        metrics.sql_block_count = unit.blocks_in_lines(function.start_line(), function.end_line());
        metrics
    }

    /// Analyze in-memory sources in parallel. Results keep input order; when a path
    /// repeats, only its first occurrence is reported.
    pub fn analyze_many<I, P, S>(&self, inputs: I) -> AnalysisReport
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<String>,
        S: AsRef<str> + Sync,
    {
        let inputs: Vec<(String, S)> = inputs.into_iter().map(|(p, s)| (p.into(), s)).collect();
        let results: Vec<FileMetrics> = inputs
            .par_iter()
            .map(|(path, text)| self.analyze_source(path, text.as_ref()))
            .collect();
        self.fold(results)
    }

    /// Read and analyze files in parallel. Unreadable files become file-level issues.
    pub fn analyze_paths(&self, paths: &[PathBuf]) -> AnalysisReport {
        self.analyze_paths_with(paths, |_| {})
    }

    /// Like [`analyze_paths`](Self::analyze_paths), calling `on_file` as each
    /// file finishes (in completion order).
    pub fn analyze_paths_with<F>(&self, paths: &[PathBuf], on_file: F) -> AnalysisReport
    where
        F: Fn(&FileMetrics) + Sync,
    {
        let results: Vec<FileMetrics> = paths
            .par_iter()
            .map(|path| {
                let metrics = self.analyze_path(path);
                on_file(&metrics);
                metrics
            })
            .collect();
        self.fold(results)
    }

    pub fn analyze_path(&self, path: &Path) -> FileMetrics {
        let filepath = path.display().to_string();
        match fs::read(path) {
            Ok(bytes) => self.analyze_source(&filepath, &String::from_utf8_lossy(&bytes)),
            Err(source) => {
                let error = AnalysisError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                warn!(file = %filepath, error = %error, "cannot read file");
                FileMetrics::unreadable(&filepath, &error)
            }
        }
    }

    fn fold(&self, results: Vec<FileMetrics>) -> AnalysisReport {
        let mut report = AnalysisReport::new(self.thresholds());
        for metrics in results {
            report.insert(metrics);
        }
        info!(
            files = report.len(),
            issues = report.issues().count(),
            errors = report.count_at_least(Severity::Error),
            "analysis complete"
        );
        report
    }
}

/// Targets of `EXEC SQL INCLUDE`, in order.
fn sql_includes(unit: &SourceUnit) -> Vec<String> {
    unit.sql_blocks()
        .iter()
        .filter(|b| b.kind == SqlKind::Include)
        .filter_map(|b| b.statement().split_whitespace().nth(1))
        .map(|target| target.trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|target| !target.is_empty())
        .collect()
}

/// Issue counts per kind for one file, in kind order.
pub fn issue_counts(issues: &IssuesByKind) -> Vec<(IssueKind, usize)> {
    [
        IssueKind::Todo,
        IssueKind::Cursor,
        IssueKind::Memory,
        IssueKind::Structural,
    ]
    .into_iter()
    .map(|kind| (kind, issues.of_kind(kind).len()))
    .collect()
}
