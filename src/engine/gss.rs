//! Graph-structured stack.
//!
//! Nodes live in an arena and are addressed by `NodeId`. Each node keeps the
//! set of previous nodes it grew on; a node with several previous nodes is
//! where stacks of different derivations join.
//!
//! ## Frontier
//!
//! Nodes waiting to grow are kept in a min-heap ordered by input position
//! (then insertion order), so a round can pop every head at one position
//! without scanning the whole graph.
//!
//! ## Merging
//!
//! `upsert` is the only way nodes enter the graph. A key seen before returns
//! the existing node and adds the new previous edges to it. Edges gained late
//! must reach everything already derived from the node:
//!
//! - a complete node goes back on the frontier, so its reductions run for the
//!   new previous node;
//! - nodes grafted from it (which share its previous set) receive the same
//!   edge, transitively.
//!
//! Completed goal nodes are recorded instead of being queued.

use super::dedup::NodeKey;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) struct GrowingNode {
    pub(crate) key: NodeKey,
    pub(crate) previous: Vec<NodeId>,
    /// Number of times the node was popped as a head.
    pub(crate) grown: u32,
    queued: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Gss {
    nodes: Vec<GrowingNode>,
    index: HashMap<NodeKey, NodeId>,
    frontier: BinaryHeap<Reverse<(usize, u64, NodeId)>>,
    seq: u64,
    grafted_from: HashMap<NodeId, Vec<NodeId>>,
    goals: Vec<NodeId>,
}

impl Gss {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn node(&self, id: NodeId) -> &GrowingNode {
        &self.nodes[id.0]
    }

    pub(crate) fn key(&self, id: NodeId) -> &NodeKey {
        &self.nodes[id.0].key
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Completed goal nodes in creation order.
    pub(crate) fn goals(&self) -> &[NodeId] {
        &self.goals
    }

    pub(crate) fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub(crate) fn can_grow(&self) -> bool {
        !self.frontier.is_empty()
    }

    /// Position of the next head, if any.
    pub(crate) fn next_position(&self) -> Option<usize> {
        self.frontier.peek().map(|Reverse((position, _, _))| *position)
    }

    /// Pop the next head if it sits at or before `position`.
    pub(crate) fn pop_at_most(&mut self, position: usize) -> Option<NodeId> {
        match self.frontier.peek() {
            Some(Reverse((next, _, _))) if *next <= position => {}
            _ => return None,
        }
        let Reverse((_, _, id)) = self.frontier.pop()?;
        let node = &mut self.nodes[id.0];
        node.queued = false;
        node.grown += 1;
        Some(id)
    }

    /// Find or create the node for `key`, adding `previous` edges to it.
    ///
    /// Returns the node and whether it was created.
    pub(crate) fn upsert(&mut self, key: NodeKey, previous: &[NodeId]) -> (NodeId, bool) {
        if let Some(&id) = self.index.get(&key) {
            for prev in previous {
                self.add_edge(id, *prev);
            }
            return (id, false);
        }

        let id = NodeId(self.nodes.len());
        let is_goal = key.state.is_goal() && key.is_complete();
        self.index.insert(key.clone(), id);
        self.nodes.push(GrowingNode { key, previous: previous.to_vec(), grown: 0, queued: false });
        if is_goal {
            self.goals.push(id);
        } else {
            self.push(id);
        }
        (id, true)
    }

    /// Record that `grafted` was built by grafting onto `prefix` and so shares
    /// its previous nodes.
    pub(crate) fn link_graft(&mut self, prefix: NodeId, grafted: NodeId) {
        let linked = self.grafted_from.entry(prefix).or_default();
        if !linked.contains(&grafted) {
            linked.push(grafted);
        }
    }

    fn add_edge(&mut self, node: NodeId, previous: NodeId) {
        let mut work = vec![node];
        while let Some(id) = work.pop() {
            let target = &mut self.nodes[id.0];
            if target.previous.contains(&previous) {
                continue;
            }
            target.previous.push(previous);
            if target.key.is_complete() && !target.key.state.is_goal() {
                self.push(id);
            }
            if let Some(grafted) = self.grafted_from.get(&id) {
                work.extend(grafted.iter().copied());
            }
        }
    }

    fn push(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        if node.queued {
            return;
        }
        node.queued = true;
        self.seq += 1;
        self.frontier.push(Reverse((node.key.next, self.seq, id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleId;
    use crate::engine::automaton::RulePosition;
    use crate::engine::lookahead::LookaheadSet;

    fn key(rule: u32, position: u32, start: usize, next: usize) -> NodeKey {
        let state = RulePosition { rule: RuleId(rule), option: 0, position };
        NodeKey::new(state, start, next, LookaheadSet::end_of_text(), 0)
    }

    #[test]
    fn upsert_merges_equal_keys() {
        let mut gss = Gss::new();
        let (root, _) = gss.upsert(key(1, 0, 0, 0), &[]);
        let (other, _) = gss.upsert(key(2, 0, 0, 0), &[]);

        let (a, created_a) = gss.upsert(key(3, crate::engine::automaton::END, 0, 1), &[root]);
        let (b, created_b) = gss.upsert(key(3, crate::engine::automaton::END, 0, 1), &[other]);

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
        assert_eq!(gss.node(a).previous, vec![root, other]);
        assert_eq!(gss.len(), 3);
    }

    #[test]
    fn frontier_pops_in_position_order() {
        let mut gss = Gss::new();
        let (late, _) = gss.upsert(key(1, 0, 0, 5), &[]);
        let (early, _) = gss.upsert(key(2, 0, 0, 2), &[]);

        assert_eq!(gss.next_position(), Some(2));
        assert_eq!(gss.pop_at_most(1), None);
        assert_eq!(gss.pop_at_most(2), Some(early));
        assert_eq!(gss.pop_at_most(2), None);
        assert_eq!(gss.pop_at_most(5), Some(late));
        assert!(!gss.can_grow());
    }

    #[test]
    fn new_edges_reach_grafted_nodes_and_requeue_complete_ones() {
        let mut gss = Gss::new();
        let end = crate::engine::automaton::END;
        let (first_prev, _) = gss.upsert(key(1, 0, 0, 0), &[]);
        let (second_prev, _) = gss.upsert(key(2, 0, 0, 0), &[]);
        let (prefix, _) = gss.upsert(key(3, 1, 0, 1), &[first_prev]);
        let (grafted, _) = gss.upsert(key(3, end, 0, 2), &[first_prev]);
        gss.link_graft(prefix, grafted);
        while gss.pop_at_most(usize::MAX).is_some() {}

        gss.upsert(key(3, 1, 0, 1), &[second_prev]);

        assert_eq!(gss.node(grafted).previous, vec![first_prev, second_prev]);
        // the complete node must grow again for the new previous node
        assert_eq!(gss.pop_at_most(usize::MAX), Some(grafted));
    }

    #[test]
    fn completed_goals_are_recorded_not_queued() {
        let mut gss = Gss::new();
        let goal = NodeKey::new(RulePosition::end(RuleId::GOAL, 0), 0, 3, LookaheadSet::end_of_text(), 0);
        let (id, _) = gss.upsert(goal, &[]);
        assert_eq!(gss.goals(), &[id]);
        assert!(!gss.can_grow());
    }
}
