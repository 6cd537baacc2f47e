//! Comment analysis: work markers and module headers.
//!
//! Markers are only looked for inside real comments. Quoted text is skipped,
//! both C literals and SQL literals inside embedded statements.
//!
//! Priorities come from the tag table (`FIXME`/`XXX` high, `HACK` medium, `TODO`
//! low by default). A priority keyword anywhere in the comment line (`urgent`,
//! `critical`, ...) promotes the marker to high.

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{DetectionContext, Detector, Issue, IssueRule, Severity};
use crate::config::{AnalyzerConfig, TodoPriority, TodoTag};
use crate::error::ConfigError;
use crate::source::{skip_quoted, LineIndex, SqlBlock};

lazy_static! {
    /// `key: value` metadata line of a module header.
    static ref KEY_VALUE: Regex =
        Regex::new(r"^([A-Za-z][A-Za-z0-9 _\-]{0,30}?)\s*:\s*(\S.*)$").unwrap();

    /// Rule lines such as `*****` or `-----`.
    static ref DECORATION: Regex = Regex::new(r"^[\s*=\-#~_+/]*$").unwrap();
}

/// One line of comment text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: usize,
    pub text: String,
}

/// Leading comment block of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleHeader {
    /// First line of the block.
    pub summary: String,
    /// Remaining free-text lines, joined with spaces.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// `key: value` lines, keys lowercased.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// A work marker found in a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    pub line: usize,
    /// Tag as configured (e.g. "FIXME").
    pub tag: String,
    pub priority: TodoPriority,
    pub message: String,
}

impl TodoItem {
    pub fn severity(&self) -> Severity {
        match self.priority {
            TodoPriority::High => Severity::Warning,
            TodoPriority::Medium | TodoPriority::Low => Severity::Info,
        }
    }

    fn into_issue(self) -> Issue {
        let message = if self.message.is_empty() {
            format!("{} ({}): no description", self.tag, self.priority.as_str())
        } else {
            format!("{} ({}): {}", self.tag, self.priority.as_str(), self.message)
        };
        Issue::new(IssueRule::TodoMarker, self.severity(), self.line, message).with_symbol(self.tag)
    }
}

/// Detects work markers in comments.
pub struct CommentAnalyzer {
    marker: Regex,
    priorities: HashMap<String, (String, TodoPriority)>,
    keywords: Option<Regex>,
}

impl CommentAnalyzer {
    pub fn new(tags: &[TodoTag], keywords: &[String]) -> Result<Self, ConfigError> {
        let alternatives: Vec<String> = tags.iter().map(|t| regex::escape(t.tag.trim())).collect();
        let marker = Regex::new(&format!(
            r"(?i)\b({})\b(?:\([^)]*\))?[\s:\-]*(.*)",
            alternatives.join("|")
        ))
        .map_err(|source| ConfigError::Pattern {
            table: "todo_tags",
            source,
        })?;

        let keywords = if keywords.is_empty() {
            None
        } else {
            let words: Vec<String> = keywords.iter().map(|k| regex::escape(k.trim())).collect();
            Some(
                Regex::new(&format!(r"(?i)\b({})\b", words.join("|"))).map_err(|source| {
                    ConfigError::Pattern {
                        table: "priority_keywords",
                        source,
                    }
                })?,
            )
        };

        let priorities = tags
            .iter()
            .map(|t| {
                let tag = t.tag.trim().to_string();
                (tag.to_uppercase(), (tag, t.priority))
            })
            .collect();

        Ok(Self {
            marker,
            priorities,
            keywords,
        })
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        Self::new(&config.todo_tags, &config.priority_keywords)
    }

    /// Markers in source order, at most one per comment line.
    pub fn scan(&self, raw: &str, blocks: &[SqlBlock]) -> Vec<TodoItem> {
        extract_comments(raw, blocks)
            .into_iter()
            .filter_map(|comment| self.marker_in(&comment))
            .collect()
    }

    fn marker_in(&self, comment: &Comment) -> Option<TodoItem> {
        let caps = self.marker.captures(&comment.text)?;
        let (tag, base) = self.priorities.get(&caps[1].to_uppercase())?.clone();
        let promoted = self
            .keywords
            .as_ref()
            .is_some_and(|k| k.is_match(&comment.text));
        let priority = if promoted { TodoPriority::High } else { base };
        let message = caps
            .get(2)
            .map(|m| m.as_str().trim().trim_end_matches("*/").trim().to_string())
            .unwrap_or_default();

        Some(TodoItem {
            line: comment.line,
            tag,
            priority,
            message,
        })
    }
}

impl Detector for CommentAnalyzer {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> anyhow::Result<Vec<Issue>> {
        Ok(self
            .scan(ctx.source.raw(), ctx.source.sql_blocks())
            .into_iter()
            .map(TodoItem::into_issue)
            .collect())
    }
}

/// Comment lines of `raw`, split per line with 1-indexed line numbers.
pub fn extract_comments(raw: &str, blocks: &[SqlBlock]) -> Vec<Comment> {
    let bytes = raw.as_bytes();
    let lines = LineIndex::new(raw);
    let mut comments = Vec::new();
    let mut next_block = 0;
    let mut i = 0;

    while i < bytes.len() {
        while next_block < blocks.len() && blocks[next_block].end <= i {
            next_block += 1;
        }
        let in_sql = blocks
            .get(next_block)
            .is_some_and(|b| b.start <= i && i < b.end);

        match bytes[i] {
            b'"' | b'\'' => i = skip_quoted(bytes, i, !in_sql),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
                comments.push(Comment {
                    line: lines.line_of(i),
                    text: raw[i + 2..end].trim_end_matches('\r').to_string(),
                });
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let (text_end, end) = match raw[i + 2..].find("*/") {
                    Some(p) => (i + 2 + p, i + 4 + p),
                    None => (bytes.len(), bytes.len()),
                };
                let first_line = lines.line_of(i);
                for (offset, text) in raw[i + 2..text_end].split('\n').enumerate() {
                    comments.push(Comment {
                        line: first_line + offset,
                        text: text.trim_end_matches('\r').to_string(),
                    });
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    comments
}

/// Parse the comment block at the very top of a file, if there is one.
pub fn parse_module_header(raw: &str) -> Option<ModuleHeader> {
    let text = raw.trim_start_matches('\u{feff}').trim_start();

    let body: Vec<&str> = if let Some(rest) = text.strip_prefix("/*") {
        let end = rest.find("*/").unwrap_or(rest.len());
        rest[..end].lines().collect()
    } else if text.starts_with("//") {
        text.lines()
            .take_while(|l| l.trim_start().starts_with("//"))
            .map(|l| l.trim_start().trim_start_matches('/'))
            .collect()
    } else {
        return None;
    };

    let mut cleaned = body
        .into_iter()
        .map(|l| {
            l.trim()
                .trim_start_matches(|c| c == '*' || c == '!')
                .trim_end_matches('*')
                .trim()
        })
        .filter(|l| !DECORATION.is_match(l));

    let mut header = ModuleHeader {
        summary: cleaned.next()?.to_string(),
        ..Default::default()
    };
    let mut description = Vec::new();
    for line in cleaned {
        match KEY_VALUE.captures(line) {
            Some(caps) if !caps[2].starts_with("//") => {
                header
                    .metadata
                    .insert(caps[1].trim().to_lowercase(), caps[2].trim().to_string());
            }
            _ => description.push(line),
        }
    }
    header.description = description.join(" ");
    Some(header)
}
