//! Source normalization for Pro*C files.
//!
//! Embedded SQL (`EXEC SQL ... ;`) is not C, so a C grammar cannot parse it.
//! [`SourceUnit::new`] blanks every embedded SQL region with filler of the same
//! byte length, keeping every newline in place. Line and column numbers in the
//! normalized text are therefore identical to the raw text, and tree positions can
//! be reported against the original file without any offset mapping.
//!
//! Filler rules:
//! - newlines and carriage returns survive, every other byte becomes a space;
//! - inside a brace block the last filler byte becomes `;`, so the region still
//!   parses as one (empty) statement;
//! - at file scope the region is blank.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detect::types::{Issue, IssueRule, Severity};

lazy_static! {
    /// Start of an embedded statement. Anchored; applied at candidate offsets only.
    static ref EXEC_PREFIX: Regex = Regex::new(r"(?i)^EXEC\s+(SQL|ORACLE)\b").unwrap();

    /// Anonymous PL/SQL block, terminated by `END-EXEC;` instead of the first `;`.
    static ref PLSQL_BLOCK: Regex = Regex::new(r"(?i)^\s*EXECUTE\s+(BEGIN|DECLARE)\b").unwrap();

    static ref END_EXEC: Regex = Regex::new(r"(?i)END-EXEC\s*;").unwrap();

    static ref DECLARE_CURSOR: Regex = Regex::new(r"(?is)^DECLARE\s+\w+\s+CURSOR\b").unwrap();

    /// `AT :db` and `FOR :n` prefixes that precede the real verb.
    static ref STATEMENT_PREFIX: Regex =
        Regex::new(r"(?is)^(?:AT\s+:?\w+\s+|FOR\s+:?\w+\s+)+").unwrap();
}

/// Statement class of an embedded SQL block, taken from its leading verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlKind {
    Select,
    Insert,
    Update,
    Delete,
    DeclareCursor,
    Declare,
    BeginDeclareSection,
    EndDeclareSection,
    Open,
    Fetch,
    Close,
    Commit,
    Rollback,
    Connect,
    Include,
    Whenever,
    Execute,
    Prepare,
    Call,
    Oracle,
    Other,
}

impl SqlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlKind::Select => "select",
            SqlKind::Insert => "insert",
            SqlKind::Update => "update",
            SqlKind::Delete => "delete",
            SqlKind::DeclareCursor => "declare_cursor",
            SqlKind::Declare => "declare",
            SqlKind::BeginDeclareSection => "begin_declare_section",
            SqlKind::EndDeclareSection => "end_declare_section",
            SqlKind::Open => "open",
            SqlKind::Fetch => "fetch",
            SqlKind::Close => "close",
            SqlKind::Commit => "commit",
            SqlKind::Rollback => "rollback",
            SqlKind::Connect => "connect",
            SqlKind::Include => "include",
            SqlKind::Whenever => "whenever",
            SqlKind::Execute => "execute",
            SqlKind::Prepare => "prepare",
            SqlKind::Call => "call",
            SqlKind::Oracle => "oracle",
            SqlKind::Other => "other",
        }
    }

    /// Classify the statement text that follows `EXEC SQL`.
    pub fn classify(statement: &str) -> SqlKind {
        let statement = statement.trim_start();
        let statement = match STATEMENT_PREFIX.find(statement) {
            Some(m) => &statement[m.end()..],
            None => statement,
        };
        let mut words = statement
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_ascii_uppercase());
        let first = words.next().unwrap_or_default();
        let second = words.next().unwrap_or_default();

        match first.as_str() {
            "SELECT" => SqlKind::Select,
            "INSERT" => SqlKind::Insert,
            "UPDATE" => SqlKind::Update,
            "DELETE" => SqlKind::Delete,
            "DECLARE" if DECLARE_CURSOR.is_match(statement) => SqlKind::DeclareCursor,
            "DECLARE" => SqlKind::Declare,
            "BEGIN" if second == "DECLARE" => SqlKind::BeginDeclareSection,
            "END" if second == "DECLARE" => SqlKind::EndDeclareSection,
            "OPEN" => SqlKind::Open,
            "FETCH" => SqlKind::Fetch,
            "CLOSE" => SqlKind::Close,
            "COMMIT" => SqlKind::Commit,
            "ROLLBACK" => SqlKind::Rollback,
            "CONNECT" => SqlKind::Connect,
            "INCLUDE" => SqlKind::Include,
            "WHENEVER" => SqlKind::Whenever,
            "EXECUTE" => SqlKind::Execute,
            "PREPARE" => SqlKind::Prepare,
            "CALL" => SqlKind::Call,
            _ => SqlKind::Other,
        }
    }
}

impl std::fmt::Display for SqlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One embedded SQL region of the raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlBlock {
    /// Byte offset of the `EXEC` keyword.
    pub start: usize,
    /// Byte offset one past the terminator.
    pub end: usize,
    /// 1-indexed line of the `EXEC` keyword.
    pub start_line: usize,
    /// 1-indexed line of the last byte of the block.
    pub end_line: usize,
    /// Raw text of the region, `EXEC SQL` prefix and terminator included.
    pub text: String,
    pub kind: SqlKind,
    /// False when no terminator was found and the end was guessed.
    pub terminated: bool,
}

impl SqlBlock {
    /// Statement text without the `EXEC SQL` prefix and the trailing `;`.
    pub fn statement(&self) -> &str {
        let body = match EXEC_PREFIX.find(&self.text) {
            Some(m) => &self.text[m.end()..],
            None => self.text.as_str(),
        };
        body.trim().trim_end_matches(';').trim_end()
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// Maps byte offsets to 1-indexed line numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { starts }
    }

    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Byte offset where the given 1-indexed line starts.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        line.checked_sub(1).and_then(|idx| self.starts.get(idx).copied())
    }
}

/// One source file, raw and normalized. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    raw: String,
    normalized: String,
    blocks: Vec<SqlBlock>,
    diagnostics: Vec<Issue>,
    lines: LineIndex,
}

impl SourceUnit {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let lines = LineIndex::new(&raw);
        let Normalized {
            text,
            blocks,
            diagnostics,
        } = normalize_with_index(&raw, &lines);
        debug!(sql_blocks = blocks.len(), "normalized source");
        Self {
            raw,
            normalized: text,
            blocks,
            diagnostics,
            lines,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn sql_blocks(&self) -> &[SqlBlock] {
        &self.blocks
    }

    /// Structural problems found while normalizing.
    pub fn diagnostics(&self) -> &[Issue] {
        &self.diagnostics
    }

    pub fn line_of(&self, offset: usize) -> usize {
        self.lines.line_of(offset)
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.lines
    }

    pub fn total_lines(&self) -> usize {
        self.raw.lines().count()
    }

    pub fn non_empty_lines(&self) -> usize {
        self.raw.lines().filter(|l| !l.trim().is_empty()).count()
    }

    /// Number of SQL blocks starting within the given inclusive line range.
    pub fn blocks_in_lines(&self, start_line: usize, end_line: usize) -> usize {
        self.blocks
            .iter()
            .filter(|b| start_line <= b.start_line && b.start_line <= end_line)
            .count()
    }

    /// Block counts per statement class, keyed by [`SqlKind::as_str`].
    pub fn kind_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for block in &self.blocks {
            *counts.entry(block.kind.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Output of [`normalize`].
#[derive(Debug, Clone)]
pub struct Normalized {
    pub text: String,
    pub blocks: Vec<SqlBlock>,
    pub diagnostics: Vec<Issue>,
}

/// Blank embedded SQL out of `raw`. See the module docs for the filler rules.
pub fn normalize(raw: &str) -> Normalized {
    normalize_with_index(raw, &LineIndex::new(raw))
}

fn normalize_with_index(raw: &str, lines: &LineIndex) -> Normalized {
    let bytes = raw.as_bytes();
    let len = bytes.len();
    let mut text = String::with_capacity(len);
    let mut blocks = Vec::new();
    let mut diagnostics = Vec::new();

    // Start of the raw slice not yet copied into `text`.
    let mut copied = 0;
    let mut depth = 0usize;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'"' | b'\'' => i = skip_quoted(bytes, i, true),
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'E' | b'e' if at_word_start(bytes, i) => {
                let Some(prefix) = EXEC_PREFIX.captures(&raw[i..]) else {
                    i += 1;
                    continue;
                };
                let oracle = prefix[1].eq_ignore_ascii_case("ORACLE");
                let body_start = i + prefix[0].len();
                let (end, terminated) = find_block_end(raw, body_start);

                let start_line = lines.line_of(i);
                let block_text = &raw[i..end];
                let kind = if oracle {
                    SqlKind::Oracle
                } else {
                    SqlKind::classify(&raw[body_start..end])
                };

                if !terminated {
                    warn!(line = start_line, "unterminated embedded SQL block");
                    diagnostics.push(
                        Issue::new(
                            IssueRule::UnterminatedSql,
                            Severity::Error,
                            start_line,
                            format!(
                                "EXEC SQL statement starting on line {} has no terminating ';'",
                                start_line
                            ),
                        )
                        .with_symbol(kind.as_str()),
                    );
                }

                text.push_str(&raw[copied..i]);
                text.push_str(&filler(block_text, depth > 0));
                copied = end;

                blocks.push(SqlBlock {
                    start: i,
                    end,
                    start_line,
                    end_line: lines.line_of(end.saturating_sub(1).max(i)),
                    text: block_text.to_string(),
                    kind,
                    terminated,
                });
                i = end;
            }
            _ => i += 1,
        }
    }
    text.push_str(&raw[copied..]);

    Normalized {
        text,
        blocks,
        diagnostics,
    }
}

/// Same-length replacement for an SQL region.
fn filler(block: &str, statement_position: bool) -> String {
    let mut out = String::with_capacity(block.len());
    for ch in block.chars() {
        match ch {
            '\n' | '\r' => out.push(ch),
            _ => out.extend(std::iter::repeat(' ').take(ch.len_utf8())),
        }
    }
    if statement_position {
        if let Some(pos) = out.rfind(' ') {
            out.replace_range(pos..pos + 1, ";");
        }
    }
    out
}

/// End offset (exclusive) of the block whose statement begins at `body_start`,
/// and whether a real terminator was found.
fn find_block_end(raw: &str, body_start: usize) -> (usize, bool) {
    let bytes = raw.as_bytes();

    if PLSQL_BLOCK.is_match(&raw[body_start..]) {
        return match END_EXEC.find(&raw[body_start..]) {
            Some(m) => (body_start + m.end(), true),
            None => (unterminated_end(bytes, body_start, bytes.len()), false),
        };
    }

    let mut parens = 0usize;
    let mut j = body_start;
    while j < bytes.len() {
        match bytes[j] {
            b'\'' | b'"' => {
                j = skip_quoted(bytes, j, false);
                continue;
            }
            b'/' if bytes.get(j + 1) == Some(&b'*') => {
                j = skip_block_comment(bytes, j);
                continue;
            }
            b'-' if bytes.get(j + 1) == Some(&b'-') => {
                j = skip_line(bytes, j);
                continue;
            }
            b'(' => parens += 1,
            b')' => parens = parens.saturating_sub(1),
            b';' if parens == 0 => return (j + 1, true),
            // SQL never contains braces; reaching one means the C code resumed.
            b'{' | b'}' if parens == 0 => return (unterminated_end(bytes, body_start, j), false),
            b'E' | b'e' if at_word_start(bytes, j) && EXEC_PREFIX.is_match(&raw[j..]) => {
                return (unterminated_end(bytes, body_start, j), false);
            }
            _ => {}
        }
        j += 1;
    }
    (unterminated_end(bytes, body_start, bytes.len()), false)
}

/// End for an unterminated block: its first line, cut short at `stop`, without
/// trailing whitespace.
fn unterminated_end(bytes: &[u8], from: usize, stop: usize) -> usize {
    let mut end = skip_line(bytes, from).min(stop);
    while end > from && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    end
}

fn at_word_start(bytes: &[u8], i: usize) -> bool {
    i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_')
}

/// Offset of the newline ending the line that contains `i` (or end of input).
fn skip_line(bytes: &[u8], i: usize) -> usize {
    bytes[i..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| i + p)
}

fn skip_block_comment(bytes: &[u8], i: usize) -> usize {
    let mut j = i + 2;
    while j + 1 < bytes.len() {
        if bytes[j] == b'*' && bytes[j + 1] == b'/' {
            return j + 2;
        }
        j += 1;
    }
    bytes.len()
}

/// Skip a quoted literal starting at `i`. C literals honor backslash escapes and
/// stop at an unescaped newline; SQL literals run until the closing quote.
pub(crate) fn skip_quoted(bytes: &[u8], i: usize, c_literal: bool) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if c_literal => j += 2,
            b'\n' if c_literal => return j,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}
