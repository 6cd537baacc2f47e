//! Command-line interface for proc-analyzer.

use clap::{ArgAction, Parser, Subcommand};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::analyzer::Analyzer;
use crate::config::AnalyzerConfig;
use crate::detect::Severity;
use crate::report;
use crate::source::SourceUnit;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Default file patterns for directory scans.
pub const DEFAULT_PATTERNS: &str = "*.pc,*.c";

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", "target"];

const PROGRESS_TEMPLATE: &str = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} files {msg}";

/// Static analyzer for Pro*C (embedded SQL in C).
///
/// Reports cyclomatic, cognitive and Halstead metrics per function, plus TODO
/// markers, SQL cursor lifecycle problems and memory-safety hazards.
#[derive(Parser)]
#[command(name = "proc-analyzer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a file or directory
    Analyze(AnalyzeArgs),
    /// Print the normalized source of one file and its SQL blocks
    Preprocess(PreprocessArgs),
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Path to analyze (file or directory)
    pub path: PathBuf,

    /// Comma-separated file patterns for directory scans
    #[arg(short, long, default_value = DEFAULT_PATTERNS)]
    pub pattern: String,

    /// Only scan the top level of a directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Cyclomatic complexity alert threshold
    #[arg(long)]
    pub cyclomatic_threshold: Option<u32>,

    /// Cognitive complexity alert threshold
    #[arg(long)]
    pub cognitive_threshold: Option<u32>,

    /// Skip Halstead metrics
    #[arg(long)]
    pub no_halstead: bool,

    /// Skip TODO/FIXME marker detection
    #[arg(long)]
    pub no_todos: bool,

    /// Skip SQL cursor checks
    #[arg(long)]
    pub no_cursors: bool,

    /// Skip memory-safety checks
    #[arg(long)]
    pub no_memory: bool,

    /// Exit non-zero when an issue at or above this severity is found
    /// (info, warning, error, critical)
    #[arg(long)]
    pub fail_on: Option<String>,
}

/// Arguments for the preprocess command.
#[derive(Parser)]
pub struct PreprocessArgs {
    /// Pro*C source file
    pub file: PathBuf,

    /// Only print the SQL block table
    #[arg(long)]
    pub blocks_only: bool,
}

/// Resolve the configuration: explicit file, discovered file, or defaults,
/// then command-line overrides.
fn load_config(args: &AnalyzeArgs) -> anyhow::Result<AnalyzerConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => AnalyzerConfig::discover(&std::env::current_dir()?),
    };
    let mut config = match path {
        Some(path) => {
            info!(config = %path.display(), "loading configuration");
            AnalyzerConfig::from_file(&path)?
        }
        None => AnalyzerConfig::default(),
    };

    if let Some(threshold) = args.cyclomatic_threshold {
        config.cyclomatic_threshold = threshold;
    }
    if let Some(threshold) = args.cognitive_threshold {
        config.cognitive_threshold = threshold;
    }
    if args.no_halstead {
        config.enable_halstead = false;
    }
    if args.no_todos {
        config.enable_todos = false;
    }
    if args.no_cursors {
        config.enable_cursors = false;
    }
    if args.no_memory {
        config.enable_memory = false;
    }
    Ok(config)
}

/// Build a case-insensitive matcher from comma-separated glob patterns.
pub fn build_patterns(patterns: &str) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut count = 0;
    for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
        count += 1;
    }
    if count == 0 {
        anyhow::bail!("no file patterns given");
    }
    Ok(builder.build()?)
}

/// Collect files under `root` whose names match `patterns`, sorted by path.
pub fn collect_files(root: &Path, patterns: &GlobSet, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        // Skip hidden and vendored directories, but never the root itself
        if e.depth() > 0 && e.file_type().is_dir() {
            return !name.starts_with('.') && !SKIPPED_DIRS.iter().any(|d| name == *d);
        }
        true
    }) {
        let entry = entry?;
        if entry.file_type().is_file() && patterns.is_match(entry.file_name()) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn progress_bar(len: usize) -> ProgressBar {
    if len < 2 || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    match ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
        Ok(style) => bar.set_style(style.progress_chars("█▓▒░  ")),
        Err(e) => debug!(error = %e, "default progress style"),
    }
    bar
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    // Validate format
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let fail_on = match args.fail_on.as_deref().map(str::parse::<Severity>) {
        None => None,
        Some(Ok(severity)) => Some(severity),
        Some(Err(e)) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let config = match load_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    let analyzer = match Analyzer::new(config) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    // Check path exists
    let metadata = match std::fs::metadata(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };

    // Collect files to scan
    let files = if metadata.is_dir() {
        let patterns = match build_patterns(&args.pattern) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: invalid pattern {:?}: {}", args.pattern, e);
                return Ok(EXIT_ERROR);
            }
        };
        collect_files(&args.path, &patterns, !args.no_recursive)?
    } else {
        vec![args.path.clone()]
    };

    if files.is_empty() {
        eprintln!("Warning: no files to analyze");
        return Ok(EXIT_SUCCESS);
    }
    info!(files = files.len(), "collected files");

    let bar = if args.format == "pretty" {
        progress_bar(files.len())
    } else {
        ProgressBar::hidden()
    };
    let report = analyzer.analyze_paths_with(&files, |_| bar.inc(1));
    bar.finish_and_clear();

    // Output results
    let path_str = args.path.to_string_lossy().to_string();
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => {
            colored::control::set_override(false);
            Box::new(BufWriter::new(File::create(path)?))
        }
        None => Box::new(io::stdout().lock()),
    };
    match args.format.as_str() {
        "json" => report::write_json(&mut out, &path_str, &report)?,
        _ => report::write_pretty(&mut out, &path_str, &report)?,
    }
    out.flush()?;

    // Return appropriate exit code
    match fail_on {
        Some(severity) if report.count_at_least(severity) > 0 => Ok(EXIT_FAILED),
        _ => Ok(EXIT_SUCCESS),
    }
}

/// Run the preprocess command.
pub fn run_preprocess(args: &PreprocessArgs) -> anyhow::Result<i32> {
    let bytes = match std::fs::read(&args.file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", args.file.display(), e);
            return Ok(EXIT_ERROR);
        }
    };
    let unit = SourceUnit::new(String::from_utf8_lossy(&bytes));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if !args.blocks_only {
        write!(out, "{}", unit.normalized())?;
        if !unit.normalized().ends_with('\n') {
            writeln!(out)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{:>5}  {:>5}  {:<22} {}", "Start", "End", "Kind", "Statement")?;
    for block in unit.sql_blocks() {
        let statement: String = block.statement().split_whitespace().collect::<Vec<_>>().join(" ");
        let marker = if block.terminated { "" } else { "  (unterminated)" };
        writeln!(
            out,
            "{:>5}  {:>5}  {:<22} {}{}",
            block.start_line,
            block.end_line,
            block.kind.as_str(),
            truncate(&statement, 60),
            marker
        )?;
    }
    for diagnostic in unit.diagnostics() {
        writeln!(out, "line {}: {}", diagnostic.line, diagnostic.message)?;
    }
    Ok(EXIT_SUCCESS)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}
