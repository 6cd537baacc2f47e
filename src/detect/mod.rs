//! Issue detectors for Pro*C sources.
//!
//! Every detector sees the same [`DetectionContext`] and returns its issues in
//! detection order. Detectors are independent of each other.

pub mod comments;
pub mod cursors;
pub mod memory;
pub mod types;

pub use comments::{extract_comments, parse_module_header, CommentAnalyzer, ModuleHeader};
pub use cursors::CursorAnalyzer;
pub use memory::MemoryAnalyzer;
pub use types::{Issue, IssueKind, IssueRule, IssuesByKind, Severity};

use crate::parser::{FunctionUnit, SyntaxTree};
use crate::source::SourceUnit;

/// Everything known about one file when detectors run.
pub struct DetectionContext<'a> {
    pub source: &'a SourceUnit,
    /// Absent when the file could not be parsed at all.
    pub tree: Option<&'a SyntaxTree>,
    pub functions: &'a [FunctionUnit<'a>],
}

impl<'a> DetectionContext<'a> {
    /// Innermost function whose line span contains `line`.
    pub fn function_at_line(&self, line: usize) -> Option<(usize, &FunctionUnit<'a>)> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.contains_line(line))
            .min_by_key(|(_, f)| f.line_count())
    }
}

/// A heuristic check over one file.
pub trait Detector: Send + Sync {
    /// Short name used in logs and failure diagnostics.
    fn name(&self) -> &'static str;

    fn detect(&self, ctx: &DetectionContext<'_>) -> anyhow::Result<Vec<Issue>>;
}
