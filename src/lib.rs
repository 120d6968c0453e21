extern crate self as leftcorner;

#[macro_use]
mod macros;
mod api;
mod engine;
pub mod grammar;
pub mod grammars;
mod issues;
mod scanner;
mod sppt;

pub use api::{DEFAULT_PROGRESS_BUDGET, ExpectedAt, ParseError, ParseOptions, ParseResult, parse_for_goal};
pub use engine::{ActionSet, Automaton, InterruptHandle, LeftCornerParser, ParseMetrics, RoundMetrics, Spine};
pub use grammar::{Associativity, Grammar, GrammarBuilder, GrammarError, Item, PrecedenceBuilder, Terminal};
pub use issues::{Issue, IssueCollection, IssueKind, IssuePhase, SentenceLocation};
pub use scanner::{RegexScanner, Scanner};
pub use sppt::{SharedPackedParseTree, SpptAlternative, SpptNode, SpptNodeId, SpptNodeKind};

// --- Core identifiers -------------------------------------------------------

/// Index of a rule inside its [`Grammar`].
///
/// Rule ids are only meaningful relative to the grammar that issued them;
/// embedded grammars have their own id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
    /// Pseudo rule used for the goal state of every automaton.
    pub(crate) const GOAL: RuleId = RuleId(u32::MAX);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Process-wide identity of a terminal.
///
/// Terminals keep their id when a grammar is embedded into another one, so
/// scanner caches and lookahead sets can mix terminals of several grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// Start byte index (inclusive).
    pub start: usize,
    /// End byte index (exclusive).
    pub end: usize,
}

impl Range {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A terminal matched by the scanner at a given range of the sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Leaf {
    pub terminal: TerminalId,
    pub range: Range,
}
