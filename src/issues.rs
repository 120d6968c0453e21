//! Diagnostics handed back with every parse.
//!
//! Issues are data, not errors: a failed parse is an `Ok` result without a
//! tree and with at least one error issue. Fatal conditions (cancellation,
//! runaway growth, bad options) are `Err(ParseError)` instead.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    Error,
    Warning,
    Information,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::Error => "error",
            IssueKind::Warning => "warning",
            IssueKind::Information => "info",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssuePhase {
    Parse,
}

/// Where an issue applies.
///
/// `position` and `length` are byte offsets; `line` and `column` are 1-based
/// and count characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceLocation {
    pub sentence_identity: Option<String>,
    pub position: usize,
    pub length: usize,
    pub line: usize,
    pub column: usize,
}

impl SentenceLocation {
    pub fn in_sentence(sentence: &str, position: usize, length: usize, identity: Option<String>) -> Self {
        let before = sentence.get(..position).unwrap_or(sentence);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        SentenceLocation { sentence_identity: identity, position, length, line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub phase: IssuePhase,
    pub location: SentenceLocation,
    pub message: String,
    /// Terminal tags that would have been accepted (errors only).
    pub expected: BTreeSet<String>,
}

impl Issue {
    pub fn error(location: SentenceLocation, message: impl Into<String>, expected: BTreeSet<String>) -> Self {
        Issue { kind: IssueKind::Error, phase: IssuePhase::Parse, location, message: message.into(), expected }
    }

    pub fn warning(location: SentenceLocation, message: impl Into<String>) -> Self {
        Issue {
            kind: IssueKind::Warning,
            phase: IssuePhase::Parse,
            location,
            message: message.into(),
            expected: BTreeSet::new(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}: {}", self.kind, self.location.line, self.location.column, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueCollection {
    issues: Vec<Issue>,
}

impl IssueCollection {
    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.issues.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.kind == IssueKind::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.kind == IssueKind::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl<'a> IntoIterator for &'a IssueCollection {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.iter()
    }
}

/// `<before>^<after>` with up to ten characters each side, line breaks escaped.
pub(crate) fn context_at(sentence: &str, position: usize) -> String {
    let split = sentence.get(..position).map_or(sentence.len(), |_| position);
    let (before, after) = sentence.split_at(split);
    let before: String = before.chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
    let after: String = after.chars().take(10).collect();
    format!("{}^{}", escape(&before), escape(&after))
}

fn escape(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n").replace('\t', "\\t")
}
