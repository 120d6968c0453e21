//! Parse metrics.
//!
//! Every parse collects a small amount of timing and growth data; nothing here
//! is needed for correctness. It exists to observe the engine:
//!
//! - how many rounds a sentence took and where they started;
//! - how wide the frontier got (concurrent heads, i.e. live derivations);
//! - which actions fired in each round.
//!
//! ## Design notes
//!
//! - Rounds are recorded for the top-level engine only; nested skip and
//!   embedded engines are part of the round that invoked them.

use super::automaton::ActionSet;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct ParseMetrics {
    /// Total elapsed time for the parse.
    pub total: Duration,
    /// Time spent growing the GSS.
    pub growth: Duration,
    /// Time spent materializing the packed tree.
    pub tree: Duration,
    pub rounds: Vec<RoundMetrics>,
    /// Largest frontier seen at the start of a round.
    pub max_heads: usize,
    /// Nodes in the GSS when growth stopped.
    pub nodes: usize,
}

impl ParseMetrics {
    /// Heads grown over all rounds.
    pub fn steps(&self) -> usize {
        self.rounds.iter().map(|r| r.steps).sum()
    }
}

/// One growth round.
#[derive(Debug, Clone)]
pub struct RoundMetrics {
    /// Input position of the round.
    pub position: usize,
    /// Frontier size when the round started.
    pub heads: usize,
    /// Heads grown during the round (including ones created by it).
    pub steps: usize,
    /// Actions that created or extended a node.
    pub actions: ActionSet,
    pub duration: Duration,
}
