//! Identity of growing nodes.
//!
//! The GSS is only finite (and the parse only terminates) if two derivations
//! that reach "the same place" share one node. This module defines `NodeKey`,
//! the hashable identity used by `Gss::upsert` for that.
//!
//! ## What counts as "the same node"
//!
//! - State (`rule`, `option`, `position`)
//! - Input span so far (`start`, `next`)
//! - The lookahead the node was created with
//! - The item count, for list rules only
//!
//! Two derivations with equal keys are merged: their previous-node edges are
//! unioned and their derivations are packed under one node. Keeping the
//! lookahead in the key means a node grown under a narrower lookahead is never
//! mistaken for one grown under a wider lookahead.
//!
//! ## Tradeoffs
//!
//! - `count` is always `0` for non-list rules, and saturates at the list's
//!   `count_cap`, above which the runtime guards cannot tell counts apart.

use super::automaton::RulePosition;
use super::lookahead::LookaheadSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pub(crate) state: RulePosition,
    pub(crate) start: usize,
    pub(crate) next: usize,
    pub(crate) lookahead: LookaheadSet,
    pub(crate) count: usize,
}

impl NodeKey {
    pub(crate) fn new(state: RulePosition, start: usize, next: usize, lookahead: LookaheadSet, count: usize) -> Self {
        NodeKey { state, start, next, lookahead, count }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state.is_complete()
    }
}
