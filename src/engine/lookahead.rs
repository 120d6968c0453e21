//! Lookahead sets.
//!
//! A `LookaheadSet` is a set of terminals plus two placeholders:
//!
//! - `eot`: end of text is acceptable here. What "end of text" means is
//!   decided by the engine evaluating the set (sentence end, or the outer
//!   lookahead for an embedded grammar).
//! - `runtime`: "whatever may follow in the caller's context". Automaton
//!   sets are built with this placeholder and resolved against the lookahead
//!   of a concrete GSS node at parse time.
//!
//! Sets are values: every operation returns a new set.

use crate::TerminalId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct LookaheadSet {
    terminals: BTreeSet<TerminalId>,
    eot: bool,
    runtime: bool,
}

impl LookaheadSet {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn end_of_text() -> Self {
        LookaheadSet { terminals: BTreeSet::new(), eot: true, runtime: false }
    }

    pub(crate) fn runtime() -> Self {
        LookaheadSet { terminals: BTreeSet::new(), eot: false, runtime: true }
    }

    pub(crate) fn of(terminals: impl IntoIterator<Item = TerminalId>) -> Self {
        LookaheadSet { terminals: terminals.into_iter().collect(), eot: false, runtime: false }
    }

    pub(crate) fn terminals(&self) -> impl Iterator<Item = TerminalId> + '_ {
        self.terminals.iter().copied()
    }

    pub(crate) fn includes_end_of_text(&self) -> bool {
        self.eot
    }

    #[cfg(test)]
    pub(crate) fn includes_runtime(&self) -> bool {
        self.runtime
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, terminal: TerminalId) -> bool {
        self.terminals.contains(&terminal)
    }

    pub(crate) fn union(&self, other: &LookaheadSet) -> LookaheadSet {
        LookaheadSet {
            terminals: self.terminals.union(&other.terminals).copied().collect(),
            eot: self.eot || other.eot,
            runtime: self.runtime || other.runtime,
        }
    }

    /// Substitute the `runtime` placeholder with `context`.
    ///
    /// `context` may itself carry placeholders, which is how two levels of
    /// parameterized sets compose.
    pub(crate) fn resolve(&self, context: &LookaheadSet) -> LookaheadSet {
        if !self.runtime {
            return self.clone();
        }
        LookaheadSet {
            terminals: self.terminals.union(&context.terminals).copied().collect(),
            eot: self.eot || context.eot,
            runtime: context.runtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: u32) -> TerminalId {
        TerminalId(n)
    }

    #[test]
    fn resolve_substitutes_runtime_placeholder() {
        let parameterized = LookaheadSet::of([t(1)]).union(&LookaheadSet::runtime());
        let context = LookaheadSet::of([t(2)]).union(&LookaheadSet::end_of_text());

        let resolved = parameterized.resolve(&context);
        assert!(resolved.contains(t(1)));
        assert!(resolved.contains(t(2)));
        assert!(resolved.includes_end_of_text());
        assert!(!resolved.includes_runtime());
    }

    #[test]
    fn resolve_without_placeholder_ignores_context() {
        let fixed = LookaheadSet::of([t(1)]);
        let resolved = fixed.resolve(&LookaheadSet::end_of_text());
        assert_eq!(resolved, fixed);
    }

    #[test]
    fn resolve_composes_parameterized_contexts() {
        let inner = LookaheadSet::runtime();
        let middle = LookaheadSet::of([t(3)]).union(&LookaheadSet::runtime());
        let composed = inner.resolve(&middle);
        assert!(composed.includes_runtime());

        let outer = LookaheadSet::end_of_text();
        let resolved = composed.resolve(&outer);
        assert!(resolved.contains(t(3)));
        assert!(resolved.includes_end_of_text());
    }

    #[test]
    fn union_merges_terminals_and_flags() {
        let a = LookaheadSet::of([t(1), t(2)]).union(&LookaheadSet::end_of_text());
        let b = LookaheadSet::of([t(2), t(3)]).union(&LookaheadSet::runtime());
        let both = a.union(&b);
        assert_eq!(both.terminals().collect::<Vec<_>>(), vec![t(1), t(2), t(3)]);
        assert!(both.includes_end_of_text());
        assert!(both.includes_runtime());
    }
}
