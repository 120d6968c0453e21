//! Failure reasons and the position-indexed failure tracker.
//!
//! Failures are data: recording one never stops a round. Every attempted
//! transition that does not produce a node leaves a `FailedParseReason` at the
//! input position where it gave up. The driver only looks at them when no
//! goal matched, picking the furthest position reached.
//!
//! Each reason can describe itself as a [`Spine`]: the rule being grown and
//! the terminals that would have let it continue. Spines are computed on first
//! use and cached in the reason.

use super::automaton::Automaton;
use super::lookahead::LookaheadSet;
use crate::TerminalId;
use once_cell::unsync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub(crate) const END_OF_TEXT_TAG: &str = "<EOT>";

/// A continuation that was live at a position: the rule being grown and the
/// terminal tags that would extend it (`<EOT>` for end of text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Spine {
    pub rule: String,
    pub position: usize,
    pub expected: BTreeSet<String>,
}

impl Spine {
    /// Expected terminal tags, without the end-of-text marker.
    pub fn expected_terminals(&self) -> impl Iterator<Item = &str> {
        self.expected.iter().map(String::as_str).filter(|t| *t != END_OF_TEXT_TAG)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FailureKind {
    /// The transition applied but what follows did not match its guard.
    Lookahead { expected: LookaheadSet },
    /// The scanner found no match for the terminal.
    WidthTargetNotFound { terminal: TerminalId },
    /// Skip content started but could not be completed, and the token cannot
    /// be followed without it.
    RequiredSkipMissing { skip: Vec<FailedParseReason> },
    /// A list count guard rejected the transition.
    GraftGuard { expected: LookaheadSet },
    /// The embedded grammar did not match.
    Embedded { grammar: Arc<str>, nested: Vec<FailedParseReason> },
}

#[derive(Debug, Clone)]
pub(crate) struct FailedParseReason {
    pub(crate) position: usize,
    /// Rule of the head that attempted the transition.
    pub(crate) rule: Arc<str>,
    /// Rule the transition led to.
    pub(crate) target: Arc<str>,
    pub(crate) kind: FailureKind,
    spine: OnceCell<Spine>,
}

impl FailedParseReason {
    pub(crate) fn new(position: usize, rule: Arc<str>, target: Arc<str>, kind: FailureKind) -> Self {
        FailedParseReason { position, rule, target, kind, spine: OnceCell::new() }
    }

    pub(crate) fn spine(&self, automaton: &Automaton) -> &Spine {
        self.spine.get_or_init(|| {
            let mut expected = BTreeSet::new();
            self.collect_expected(automaton, &mut expected);
            Spine { rule: self.rule.to_string(), position: self.position, expected }
        })
    }

    fn collect_expected(&self, automaton: &Automaton, into: &mut BTreeSet<String>) {
        match &self.kind {
            FailureKind::Lookahead { expected } | FailureKind::GraftGuard { expected } => {
                into.extend(expected.terminals().map(|t| automaton.terminal_tag(t).to_string()));
                if expected.includes_end_of_text() {
                    into.insert(END_OF_TEXT_TAG.to_string());
                }
            }
            FailureKind::WidthTargetNotFound { terminal } => {
                into.insert(automaton.terminal_tag(*terminal).to_string());
            }
            FailureKind::RequiredSkipMissing { skip: nested } | FailureKind::Embedded { nested, .. } => {
                for reason in nested {
                    into.extend(reason.spine(automaton).expected.iter().cloned());
                }
            }
        }
    }

    /// Leaf reasons of this failure together with the embedding chain that
    /// led to them, outermost first.
    pub(crate) fn flatten<'a>(&'a self, context: &mut Vec<Embedding<'a>>, out: &mut Vec<FlatFailure<'a>>) {
        match &self.kind {
            FailureKind::Embedded { grammar, nested } if !nested.is_empty() => {
                context.push(Embedding { host: &self.rule[..], rule: &self.target[..], grammar: &grammar[..] });
                for reason in nested {
                    reason.flatten(context, out);
                }
                context.pop();
            }
            _ => out.push(FlatFailure { reason: self, embedding: context.clone() }),
        }
    }
}

pub(crate) struct FlatFailure<'a> {
    pub(crate) reason: &'a FailedParseReason,
    /// Embeddings the reason sits in, outermost first.
    pub(crate) embedding: Vec<Embedding<'a>>,
}

/// One level of grammar embedding on the way to a nested failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Embedding<'a> {
    /// Host rule that tried the embedded rule.
    pub(crate) host: &'a str,
    pub(crate) rule: &'a str,
    pub(crate) grammar: &'a str,
}

/// Failures keyed by position, dropped once every head has moved past them.
#[derive(Debug, Default)]
pub(crate) struct FailureTracker {
    by_position: BTreeMap<usize, Vec<FailedParseReason>>,
}

impl FailureTracker {
    pub(crate) fn record(&mut self, reason: FailedParseReason) {
        self.by_position.entry(reason.position).or_default().push(reason);
    }

    pub(crate) fn clear_below(&mut self, position: usize) {
        self.by_position = self.by_position.split_off(&position);
    }

    /// Failures at the largest recorded position.
    pub(crate) fn furthest(&self) -> Option<(usize, &[FailedParseReason])> {
        self.by_position.iter().next_back().map(|(p, reasons)| (*p, reasons.as_slice()))
    }

    pub(crate) fn at(&self, position: usize) -> &[FailedParseReason] {
        self.by_position.get(&position).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(position: usize) -> FailedParseReason {
        FailedParseReason::new(
            position,
            Arc::from("expr"),
            Arc::from("NAME"),
            FailureKind::Lookahead { expected: LookaheadSet::end_of_text() },
        )
    }

    #[test]
    fn tracker_keeps_furthest_and_clears_below() {
        let mut tracker = FailureTracker::default();
        tracker.record(reason(1));
        tracker.record(reason(4));
        tracker.record(reason(4));

        let (position, reasons) = tracker.furthest().unwrap();
        assert_eq!(position, 4);
        assert_eq!(reasons.len(), 2);

        tracker.clear_below(4);
        assert!(tracker.at(1).is_empty());
        assert_eq!(tracker.at(4).len(), 2);

        tracker.clear_below(5);
        assert!(tracker.furthest().is_none());
    }

    #[test]
    fn embedded_failures_flatten_with_context() {
        let inner = reason(3);
        let outer = FailedParseReason::new(
            3,
            Arc::from("host"),
            Arc::from("guest"),
            FailureKind::Embedded { grammar: Arc::from("Guest"), nested: vec![inner] },
        );

        let mut flat = Vec::new();
        outer.flatten(&mut Vec::new(), &mut flat);
        assert_eq!(flat.len(), 1);
        assert_eq!(&*flat[0].reason.rule, "expr");
        assert_eq!(flat[0].embedding, vec![Embedding { host: "host", rule: "guest", grammar: "Guest" }]);
    }
}
