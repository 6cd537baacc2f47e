//! Core types for detection results.

use serde::{Deserialize, Serialize};

/// Severity levels for issues, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Which detector family an issue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Todo,
    Cursor,
    Memory,
    Structural,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Todo => "todo",
            IssueKind::Cursor => "cursor",
            IssueKind::Memory => "memory",
            IssueKind::Structural => "structural",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rule names for the individual checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueRule {
    // Comment markers
    #[serde(rename = "todo_marker")]
    TodoMarker,
    // Cursor lifecycle
    #[serde(rename = "unclosed_cursor")]
    UnclosedCursor,
    #[serde(rename = "cursor_reopened")]
    CursorReopened,
    #[serde(rename = "nested_cursor_in_loop")]
    NestedCursorInLoop,
    #[serde(rename = "fetch_without_status_check")]
    FetchWithoutStatusCheck,
    // Memory hazards
    #[serde(rename = "unchecked_allocation")]
    UncheckedAllocation,
    #[serde(rename = "allocation_not_freed")]
    AllocationNotFreed,
    #[serde(rename = "dangling_pointer")]
    DanglingPointer,
    #[serde(rename = "unsafe_function")]
    UnsafeFunction,
    #[serde(rename = "sizeof_pointer")]
    SizeofPointer,
    // Structural problems
    #[serde(rename = "unterminated_sql")]
    UnterminatedSql,
    #[serde(rename = "syntax_error")]
    SyntaxError,
    #[serde(rename = "file_error")]
    FileError,
    #[serde(rename = "detector_failure")]
    DetectorFailure,
}

impl IssueRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueRule::TodoMarker => "todo_marker",
            IssueRule::UnclosedCursor => "unclosed_cursor",
            IssueRule::CursorReopened => "cursor_reopened",
            IssueRule::NestedCursorInLoop => "nested_cursor_in_loop",
            IssueRule::FetchWithoutStatusCheck => "fetch_without_status_check",
            IssueRule::UncheckedAllocation => "unchecked_allocation",
            IssueRule::AllocationNotFreed => "allocation_not_freed",
            IssueRule::DanglingPointer => "dangling_pointer",
            IssueRule::UnsafeFunction => "unsafe_function",
            IssueRule::SizeofPointer => "sizeof_pointer",
            IssueRule::UnterminatedSql => "unterminated_sql",
            IssueRule::SyntaxError => "syntax_error",
            IssueRule::FileError => "file_error",
            IssueRule::DetectorFailure => "detector_failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo_marker" => Some(IssueRule::TodoMarker),
            "unclosed_cursor" => Some(IssueRule::UnclosedCursor),
            "cursor_reopened" => Some(IssueRule::CursorReopened),
            "nested_cursor_in_loop" => Some(IssueRule::NestedCursorInLoop),
            "fetch_without_status_check" => Some(IssueRule::FetchWithoutStatusCheck),
            "unchecked_allocation" => Some(IssueRule::UncheckedAllocation),
            "allocation_not_freed" => Some(IssueRule::AllocationNotFreed),
            "dangling_pointer" => Some(IssueRule::DanglingPointer),
            "unsafe_function" => Some(IssueRule::UnsafeFunction),
            "sizeof_pointer" => Some(IssueRule::SizeofPointer),
            "unterminated_sql" => Some(IssueRule::UnterminatedSql),
            "syntax_error" => Some(IssueRule::SyntaxError),
            "file_error" => Some(IssueRule::FileError),
            "detector_failure" => Some(IssueRule::DetectorFailure),
            _ => None,
        }
    }

    /// The detector family this rule reports under.
    pub fn kind(&self) -> IssueKind {
        match self {
            IssueRule::TodoMarker => IssueKind::Todo,
            IssueRule::UnclosedCursor
            | IssueRule::CursorReopened
            | IssueRule::NestedCursorInLoop
            | IssueRule::FetchWithoutStatusCheck => IssueKind::Cursor,
            IssueRule::UncheckedAllocation
            | IssueRule::AllocationNotFreed
            | IssueRule::DanglingPointer
            | IssueRule::UnsafeFunction
            | IssueRule::SizeofPointer => IssueKind::Memory,
            IssueRule::UnterminatedSql
            | IssueRule::SyntaxError
            | IssueRule::FileError
            | IssueRule::DetectorFailure => IssueKind::Structural,
        }
    }
}

impl std::fmt::Display for IssueRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single detected issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub rule: IssueRule,
    pub severity: Severity,
    /// 1-indexed line in the original source (0 for file-level issues).
    pub line: usize,
    pub message: String,
    /// Cursor name, variable, function or marker tag the issue is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Issue {
    pub fn new(rule: IssueRule, severity: Severity, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind: rule.kind(),
            rule,
            severity,
            line,
            message: message.into(),
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

/// Issues of one file, grouped by detector family. Each group keeps detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuesByKind {
    pub todo: Vec<Issue>,
    pub cursor: Vec<Issue>,
    pub memory: Vec<Issue>,
    pub structural: Vec<Issue>,
}

impl IssuesByKind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        match issue.kind {
            IssueKind::Todo => self.todo.push(issue),
            IssueKind::Cursor => self.cursor.push(issue),
            IssueKind::Memory => self.memory.push(issue),
            IssueKind::Structural => self.structural.push(issue),
        }
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.push(issue);
        }
    }

    pub fn of_kind(&self, kind: IssueKind) -> &[Issue] {
        match kind {
            IssueKind::Todo => &self.todo,
            IssueKind::Cursor => &self.cursor,
            IssueKind::Memory => &self.memory,
            IssueKind::Structural => &self.structural,
        }
    }

    /// All issues, family by family.
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.todo
            .iter()
            .chain(self.cursor.iter())
            .chain(self.memory.iter())
            .chain(self.structural.iter())
    }

    pub fn len(&self) -> usize {
        self.todo.len() + self.cursor.len() + self.memory.len() + self.structural.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.iter().filter(|i| i.severity >= severity).count()
    }

    /// Check if there are any error-or-worse issues.
    pub fn has_errors(&self) -> bool {
        self.count_at_least(Severity::Error) > 0
    }
}
