use crate::engine::{LeftCornerParser, ParseMetrics, Spine};
use crate::grammar::Grammar;
use crate::issues::IssueCollection;
use crate::sppt::SharedPackedParseTree;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Progress budget used when none is configured: how often a single node may
/// be grown before the parse is abandoned as non-terminating.
pub const DEFAULT_PROGRESS_BUDGET: u32 = 10_000;

/// Options that affect a single parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// When `false`, every parse fails with [`ParseError::Disabled`].
    pub enabled: bool,
    /// Rule to parse the whole sentence as. Required.
    pub goal_rule: Option<String>,
    /// Identity attached to issue locations, so callers can correlate issues
    /// with the document they came from.
    pub sentence_identity: Option<fn(&str) -> String>,
    pub report_errors: bool,
    /// Add a warning for every competing derivation kept at a reduction.
    pub report_grammar_ambiguities: bool,
    /// Reuse skip sub-parses per (position, lookahead).
    pub cache_skip: bool,
    pub progress_budget: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            enabled: true,
            goal_rule: None,
            sentence_identity: None,
            report_errors: true,
            report_grammar_ambiguities: false,
            cache_skip: true,
            progress_budget: DEFAULT_PROGRESS_BUDGET,
        }
    }
}

impl ParseOptions {
    pub fn for_goal(goal: impl Into<String>) -> Self {
        ParseOptions { goal_rule: Some(goal.into()), ..Self::default() }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn goal_rule(mut self, goal: impl Into<String>) -> Self {
        self.goal_rule = Some(goal.into());
        self
    }

    pub fn sentence_identity(mut self, identity: fn(&str) -> String) -> Self {
        self.sentence_identity = Some(identity);
        self
    }

    pub fn report_errors(mut self, report: bool) -> Self {
        self.report_errors = report;
        self
    }

    pub fn report_grammar_ambiguities(mut self, report: bool) -> Self {
        self.report_grammar_ambiguities = report;
        self
    }

    pub fn cache_skip(mut self, cache: bool) -> Self {
        self.cache_skip = cache;
        self
    }

    pub fn progress_budget(mut self, budget: u32) -> Self {
        self.progress_budget = budget;
        self
    }
}

/// Conditions that abort a parse.
///
/// A sentence that does not match the grammar is not one of them: that is an
/// `Ok` result without a tree and with an error issue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("parser terminated: {0}")]
    Terminated(String),
    #[error("parser won't stop: a node at position {position} was grown more than {budget} times")]
    WontStop { position: usize, budget: u32 },
    #[error("unknown goal rule '{0}'")]
    UnknownGoal(String),
    #[error("parsing is disabled")]
    Disabled,
    #[error("no goal rule given")]
    GoalRequired,
}

/// Result of [`LeftCornerParser::parse`].
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The packed tree, present only when the whole sentence matched.
    pub tree: Option<SharedPackedParseTree>,
    pub issues: IssueCollection,
    pub metrics: ParseMetrics,
}

impl ParseResult {
    pub fn is_success(&self) -> bool {
        self.tree.is_some()
    }
}

/// Result of [`LeftCornerParser::expected_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedAt {
    /// Position the continuations were computed for; the start of the word
    /// under the cursor when the cursor was inside one.
    pub used_position: usize,
    pub spines: BTreeSet<Spine>,
}

/// Parse `sentence` as `goal` with default options.
///
/// Builds the automaton on every call; hold a [`LeftCornerParser`] to parse
/// more than once.
///
/// # Example
/// ```
/// use leftcorner::{grammars, parse_for_goal};
///
/// let result = parse_for_goal(grammars::expression(), "S", "(a + b) / c").unwrap();
/// assert!(result.is_success());
/// ```
pub fn parse_for_goal(grammar: Arc<Grammar>, goal: &str, sentence: &str) -> Result<ParseResult, ParseError> {
    LeftCornerParser::new(grammar).parse_for_goal(goal, sentence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrammarBuilder;

    fn identity(_: &str) -> String {
        "memory://sentence".to_string()
    }

    #[test]
    fn options_default_and_setters() {
        let options = ParseOptions::default();
        assert!(options.enabled);
        assert!(options.goal_rule.is_none());
        assert!(options.report_errors);
        assert!(!options.report_grammar_ambiguities);
        assert!(options.cache_skip);
        assert_eq!(options.progress_budget, DEFAULT_PROGRESS_BUDGET);

        let options = ParseOptions::for_goal("S").cache_skip(false).progress_budget(3).report_grammar_ambiguities(true);
        assert_eq!(options.goal_rule.as_deref(), Some("S"));
        assert!(!options.cache_skip);
        assert_eq!(options.progress_budget, 3);
        assert!(options.report_grammar_ambiguities);
    }

    #[test]
    fn parse_for_goal_reports_identity_on_issues() {
        let grammar = GrammarBuilder::new("Word").pattern("W", "[a-z]+").build().unwrap();
        let parser = LeftCornerParser::new(Arc::new(grammar));

        let ok = parse_for_goal(parser.automaton().grammar().clone(), "W", "abc").unwrap();
        assert!(ok.is_success());

        let options = ParseOptions::for_goal("W").sentence_identity(identity);
        let failed = parser.parse("ab1", &options).unwrap();
        assert!(!failed.is_success());
        let error = failed.issues.errors().next().unwrap();
        assert_eq!(error.location.sentence_identity.as_deref(), Some("memory://sentence"));
        assert_eq!(error.location.position, 2);
    }

    #[test]
    fn errors_display() {
        assert_eq!(ParseError::Terminated("stop".into()).to_string(), "parser terminated: stop");
        assert_eq!(ParseError::UnknownGoal("x".into()).to_string(), "unknown goal rule 'x'");
        assert!(ParseError::WontStop { position: 3, budget: 10 }.to_string().contains("position 3"));
    }
}
