//! Analyzer configuration.
//!
//! Every field has a default, so an empty YAML file (or none at all) is a valid
//! configuration. Example:
//!
//! ```yaml
//! cyclomatic_threshold: 12
//! enable_halstead: false
//! priority_keywords: [urgent, critical, blocker]
//! unsafe_functions:
//!   - name: strcpy
//!     replacement: strlcpy
//!     bound:
//!       kind: literal_source
//!       arg: 1
//!     unbounded_severity: error
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detect::types::Severity;
use crate::error::ConfigError;
use crate::score::Thresholds;

/// File names looked up in the working directory when no config is given.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["proc-analyzer.yaml", ".proc-analyzer.yaml"];

/// Priority of a work marker comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    Low,
    Medium,
    High,
}

impl TodoPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoPriority::Low => "low",
            TodoPriority::Medium => "medium",
            TodoPriority::High => "high",
        }
    }
}

static DEFAULT_TODO_TAGS: phf::Map<&'static str, TodoPriority> = phf::phf_map! {
    "FIXME" => TodoPriority::High,
    "XXX" => TodoPriority::High,
    "HACK" => TodoPriority::Medium,
    "TODO" => TodoPriority::Low,
};

const DEFAULT_PRIORITY_KEYWORDS: &[&str] = &["urgent", "critical", "asap", "security", "crash"];

/// A marker tag and its base priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoTag {
    pub tag: String,
    pub priority: TodoPriority,
}

/// How to tell whether a call to an unsafe function is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoundCheck {
    /// The function can never be bounded.
    Never,
    /// Bounded when argument `arg` (0-based) is a string literal.
    LiteralSource { arg: usize },
    /// Bounded when argument `arg` is a literal format whose `%s` conversions
    /// all carry a width or precision.
    FormatWidth { arg: usize },
    /// Safe, and not reported, when argument `arg` is `NULL`.
    NullArgument { arg: usize },
}

/// What goes wrong when an unsafe function is misused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hazard {
    #[default]
    Overflow,
    /// Temporary file names that another process can claim first.
    Race,
}

/// An entry of the unsafe-function table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsafeFunction {
    pub name: String,
    pub replacement: String,
    pub bound: BoundCheck,
    /// Severity when no bound is discernible; bounded calls are warnings.
    pub unbounded_severity: Severity,
    #[serde(default)]
    pub hazard: Hazard,
}

const DEFAULT_UNSAFE_FUNCTIONS: &[(&str, &str, BoundCheck, Severity, Hazard)] = &[
    ("gets", "fgets", BoundCheck::Never, Severity::Critical, Hazard::Overflow),
    ("strcpy", "strncpy or snprintf", BoundCheck::LiteralSource { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("strcat", "strncat", BoundCheck::LiteralSource { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("stpcpy", "stpncpy", BoundCheck::LiteralSource { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("wcscpy", "wcsncpy", BoundCheck::LiteralSource { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("wcscat", "wcsncat", BoundCheck::LiteralSource { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("sprintf", "snprintf", BoundCheck::FormatWidth { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("vsprintf", "vsnprintf", BoundCheck::FormatWidth { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("scanf", "fgets and sscanf with field widths", BoundCheck::FormatWidth { arg: 0 }, Severity::Error, Hazard::Overflow),
    ("fscanf", "fgets and sscanf with field widths", BoundCheck::FormatWidth { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("sscanf", "field widths on string conversions", BoundCheck::FormatWidth { arg: 1 }, Severity::Error, Hazard::Overflow),
    ("getwd", "getcwd", BoundCheck::Never, Severity::Error, Hazard::Overflow),
    ("realpath", "realpath(path, NULL)", BoundCheck::NullArgument { arg: 1 }, Severity::Warning, Hazard::Overflow),
    ("mktemp", "mkstemp", BoundCheck::Never, Severity::Warning, Hazard::Race),
    ("tmpnam", "mkstemp", BoundCheck::Never, Severity::Warning, Hazard::Race),
    ("tempnam", "mkstemp", BoundCheck::Never, Severity::Warning, Hazard::Race),
];

pub fn default_todo_tags() -> Vec<TodoTag> {
    let mut tags: Vec<TodoTag> = DEFAULT_TODO_TAGS
        .entries()
        .map(|(tag, priority)| TodoTag {
            tag: tag.to_string(),
            priority: *priority,
        })
        .collect();
    tags.sort_by(|a, b| a.tag.cmp(&b.tag));
    tags
}

pub fn default_priority_keywords() -> Vec<String> {
    DEFAULT_PRIORITY_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

pub fn default_unsafe_functions() -> Vec<UnsafeFunction> {
    DEFAULT_UNSAFE_FUNCTIONS
        .iter()
        .map(|(name, replacement, bound, severity, hazard)| UnsafeFunction {
            name: name.to_string(),
            replacement: replacement.to_string(),
            bound: *bound,
            unbounded_severity: *severity,
            hazard: *hazard,
        })
        .collect()
}

/// Options for an [`Analyzer`](crate::analyzer::Analyzer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub enable_halstead: bool,
    pub enable_todos: bool,
    pub enable_cursors: bool,
    pub enable_memory: bool,
    pub cyclomatic_threshold: u32,
    pub cognitive_threshold: u32,
    /// Statements after an allocation or `free` searched for the matching check.
    pub statement_window: usize,
    pub todo_tags: Vec<TodoTag>,
    /// Words that promote any marker to high priority.
    pub priority_keywords: Vec<String>,
    pub unsafe_functions: Vec<UnsafeFunction>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enable_halstead: true,
            enable_todos: true,
            enable_cursors: true,
            enable_memory: true,
            cyclomatic_threshold: 10,
            cognitive_threshold: 15,
            statement_window: 3,
            todo_tags: default_todo_tags(),
            priority_keywords: default_priority_keywords(),
            unsafe_functions: default_unsafe_functions(),
        }
    }
}

impl AnalyzerConfig {
    /// Parse a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Find a default config file in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            cyclomatic: self.cyclomatic_threshold,
            cognitive: self.cognitive_threshold,
        }
    }

    /// Reject configurations no analyzer should run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cyclomatic_threshold == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "cyclomatic_threshold",
                value: self.cyclomatic_threshold,
            });
        }
        if self.cognitive_threshold == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "cognitive_threshold",
                value: self.cognitive_threshold,
            });
        }
        if self.statement_window == 0 {
            return Err(ConfigError::InvalidWindow(self.statement_window));
        }

        check_entries("todo_tags", self.todo_tags.iter().map(|t| t.tag.as_str()))?;
        check_entries(
            "priority_keywords",
            self.priority_keywords.iter().map(String::as_str),
        )?;
        check_entries(
            "unsafe_functions",
            self.unsafe_functions.iter().map(|f| f.name.as_str()),
        )?;
        Ok(())
    }
}

/// Entries must be non-empty and unique (case-insensitive).
fn check_entries<'a>(
    table: &'static str,
    entries: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in entries {
        let key = entry.trim().to_lowercase();
        if key.is_empty() {
            return Err(ConfigError::EmptyEntry { table });
        }
        if !seen.insert(key) {
            return Err(ConfigError::DuplicateEntry {
                table,
                entry: entry.to_string(),
            });
        }
    }
    Ok(())
}
