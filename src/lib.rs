//! proc-analyzer - static analysis for Pro*C (embedded SQL in C).
//!
//! Computes cyclomatic, cognitive and Halstead metrics per function and flags
//! work markers, SQL cursor lifecycle problems and memory-safety hazards.
//!
//! # Architecture
//!
//! A file flows through one pipeline:
//!
//! - `source`: blanks `EXEC SQL` regions out of the raw text (offsets and line
//!   numbers preserved) and records them as classified SQL blocks
//! - `parser`: parses the normalized text as C behind the `SyntaxTreeProvider`
//!   trait; tree-sitter-c is the default backend
//! - `metrics`: per-function metric engines
//! - `detect`: comment, cursor and memory detectors
//! - `analyzer`: runs the pipeline per file and folds batches into a report
//! - `score`: threshold grading and hotspots
//! - `report`: output formatting (pretty, JSON)
//!
//! ```no_run
//! use proc_analyzer::{Analyzer, AnalyzerConfig};
//!
//! let analyzer = Analyzer::new(AnalyzerConfig::default())?;
//! let metrics = analyzer.analyze("int main(void) { return 0; }\n");
//! assert_eq!(metrics.functions[0].cyclomatic, 1);
//! # Ok::<(), proc_analyzer::ConfigError>(())
//! ```

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod report;
pub mod score;
pub mod source;

pub use analyzer::{AnalysisReport, Analyzer, FileMetrics, Summary};
pub use config::AnalyzerConfig;
pub use detect::{Detector, Issue, IssueKind, IssueRule, IssuesByKind, Severity};
pub use error::{AnalysisError, ConfigError};
pub use metrics::{FunctionMetrics, HalsteadMetrics, MetricEngine};
pub use parser::{SyntaxTreeProvider, TreeSitterC};
pub use score::{ComplexityLevel, Hotspot, Thresholds};
pub use source::{normalize, SourceUnit, SqlBlock, SqlKind};
