//! Derivation bookkeeping for the packed tree.
//!
//! The GSS only knows how nodes connect to what came *before* them. To build
//! the tree afterwards, every node also records how it was derived:
//!
//! - `Leaf`: a terminal matched by WIDTH (the leaf itself is in `leaves`).
//! - `Height { first }`: a rule started with the completed node `first`.
//! - `Graft { prefix, child }`: `prefix` advanced over the completed `child`.
//! - `Embedded`: the node was matched by a nested parse (tree in `embedded`).
//!
//! A node with several derivations is ambiguous; all of them are kept and
//! packed under one node.
//!
//! ## Materializing
//!
//! Only complete nodes become tree nodes. Their child lists are recovered by
//! walking GRAFT prefixes back to the HEIGHT that started the rule:
//!
//! ```text
//! (add,END) = Graft{ prefix: (add,2), child: expr }
//! (add,2)   = Graft{ prefix: (add,1), child: '+' }
//! (add,1)   = Height{ first: expr }
//!           => children [expr '+' expr]
//! ```
//!
//! Child lists are chains of links that share their GRAFT prefix; a list is
//! only copied out when its alternative is emitted. Both the prefix walk and
//! the descent into children use explicit stacks, so neither long lists nor
//! deep nesting grow the call stack.
//!
//! GSS nodes with the same rule and span (differing only by lookahead or by
//! option) share one tree node. Zero-width derivations can be cyclic; an
//! alternative that leads back into a node still being built is dropped.

use super::automaton::Automaton;
use super::gss::{Gss, NodeId};
use crate::sppt::{SharedPackedParseTree, SpptAlternative, SpptNode, SpptNodeId, SpptNodeKind};
use crate::{Leaf, RuleId};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Derivation {
    Leaf,
    Height { first: NodeId },
    Graft { prefix: NodeId, child: NodeId },
    Embedded,
}

#[derive(Debug, Default)]
pub(crate) struct TreeData {
    derivations: HashMap<NodeId, Vec<Derivation>>,
    leaves: HashMap<NodeId, Leaf>,
    embedded: HashMap<NodeId, Arc<SharedPackedParseTree>>,
    skip_after: HashMap<NodeId, Arc<SharedPackedParseTree>>,
    leading_skip: Option<Arc<SharedPackedParseTree>>,
}

impl TreeData {
    /// Returns `true` if the derivation is new for `node`.
    pub(crate) fn add_derivation(&mut self, node: NodeId, derivation: Derivation) -> bool {
        let known = self.derivations.entry(node).or_default();
        if known.contains(&derivation) {
            return false;
        }
        known.push(derivation);
        true
    }

    pub(crate) fn derivations(&self, node: NodeId) -> &[Derivation] {
        self.derivations.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn set_leaf(&mut self, node: NodeId, leaf: Leaf) {
        self.leaves.insert(node, leaf);
    }

    pub(crate) fn leaf(&self, node: NodeId) -> Option<&Leaf> {
        self.leaves.get(&node)
    }

    pub(crate) fn set_embedded(&mut self, node: NodeId, tree: Arc<SharedPackedParseTree>) {
        self.embedded.insert(node, tree);
    }

    pub(crate) fn embedded(&self, node: NodeId) -> Option<&Arc<SharedPackedParseTree>> {
        self.embedded.get(&node)
    }

    pub(crate) fn set_skip_after(&mut self, node: NodeId, skip: Arc<SharedPackedParseTree>) {
        self.skip_after.insert(node, skip);
    }

    pub(crate) fn skip_after(&self, node: NodeId) -> Option<&Arc<SharedPackedParseTree>> {
        self.skip_after.get(&node)
    }

    pub(crate) fn set_leading_skip(&mut self, skip: Option<Arc<SharedPackedParseTree>>) {
        self.leading_skip = skip;
    }

    pub(crate) fn leading_skip(&self) -> Option<&Arc<SharedPackedParseTree>> {
        self.leading_skip.as_ref()
    }
}

impl TreeData {
    /// Build the packed tree below the completed goal node `goal`.
    pub(crate) fn materialize(
        &self,
        gss: &Gss,
        automaton: &Automaton,
        sentence: Arc<str>,
        goal: NodeId,
    ) -> SharedPackedParseTree {
        let mut builder = Builder {
            gss,
            data: self,
            automaton,
            nodes: Vec::new(),
            by_span: HashMap::new(),
            done: HashSet::new(),
            in_progress: HashSet::new(),
            links: Vec::new(),
            tails: HashMap::new(),
            open_prefixes: HashSet::new(),
        };

        // Every derivation of the goal grafts a complete goal-rule node; they
        // share one span and so end up packed in one root.
        let mut root = None;
        for derivation in self.derivations(goal) {
            if let Derivation::Graft { child, .. } = derivation {
                if let Some(node) = builder.complete_node(*child) {
                    root.get_or_insert(node);
                }
            }
        }
        let root = root.unwrap_or_else(|| {
            let key = gss.key(goal);
            builder.push(SpptNode {
                name: Arc::from(automaton.rule_name(key.state.rule)),
                kind: SpptNodeKind::Branch,
                start: key.start,
                end: key.start,
                next: key.next,
                alternatives: Vec::new(),
                skip_after: None,
            })
        });

        SharedPackedParseTree::new(sentence, builder.nodes, root, self.leading_skip().cloned())
    }
}

struct Builder<'a> {
    gss: &'a Gss,
    data: &'a TreeData,
    automaton: &'a Automaton,
    nodes: Vec<SpptNode>,
    by_span: HashMap<(RuleId, usize, usize), SpptNodeId>,
    done: HashSet<NodeId>,
    in_progress: HashSet<SpptNodeId>,
    links: Vec<Link>,
    tails: HashMap<NodeId, Rc<Vec<usize>>>,
    open_prefixes: HashSet<NodeId>,
}

/// One child of a partial child list; the list is read by following `parent`
/// back to the child a HEIGHT started with.
#[derive(Debug, Clone, Copy)]
struct Link {
    parent: Option<usize>,
    child: NodeId,
}

/// A branch whose alternatives are being filled in.
struct Frame {
    out: SpptNodeId,
    option: u32,
    lists: Vec<Vec<NodeId>>,
    list: usize,
    children: Vec<SpptNodeId>,
}

enum Entered {
    Done(Option<SpptNodeId>),
    Open(Frame),
}

impl Builder<'_> {
    fn push(&mut self, node: SpptNode) -> SpptNodeId {
        let id = SpptNodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Tree node for the complete GSS node `id`, `None` if it is already being
    /// built further up (a cycle).
    ///
    /// Nesting is walked with an explicit stack of frames, so deep trees cost
    /// heap, not call stack.
    fn complete_node(&mut self, id: NodeId) -> Option<SpptNodeId> {
        let mut stack = match self.enter(id) {
            Entered::Done(out) => return out,
            Entered::Open(frame) => vec![frame],
        };
        let mut returned: Option<Option<SpptNodeId>> = None;

        while let Some(frame) = stack.last_mut() {
            match returned.take() {
                Some(Some(child)) => frame.children.push(child),
                Some(None) => {
                    frame.children.clear();
                    frame.list += 1;
                }
                None => {}
            }

            let Some(list) = frame.lists.get(frame.list) else {
                let out = frame.out;
                stack.pop();
                self.finish(out);
                returned = Some(Some(out));
                continue;
            };
            if let Some(child) = list.get(frame.children.len()).copied() {
                match self.enter(child) {
                    Entered::Done(out) => returned = Some(out),
                    Entered::Open(child_frame) => stack.push(child_frame),
                }
                continue;
            }

            let alternative = SpptAlternative { option: frame.option, children: std::mem::take(&mut frame.children) };
            frame.list += 1;
            let alternatives = &mut self.nodes[frame.out.0].alternatives;
            if !alternatives.contains(&alternative) {
                alternatives.push(alternative);
            }
        }
        returned.flatten()
    }

    fn enter(&mut self, id: NodeId) -> Entered {
        let data = self.data;
        let gss = self.gss;
        let key = gss.key(id);
        let span = (key.state.rule, key.start, key.next);
        let out = match self.by_span.get(&span) {
            Some(out) => *out,
            None => {
                let kind = match data.embedded(id) {
                    Some(tree) => SpptNodeKind::Embedded(tree.clone()),
                    None if data.leaf(id).is_some() => SpptNodeKind::Leaf,
                    None => SpptNodeKind::Branch,
                };
                let end = match (&kind, data.leaf(id)) {
                    (_, Some(leaf)) => leaf.range.end,
                    (SpptNodeKind::Embedded(tree), _) => tree.node(tree.root()).end,
                    _ => key.start,
                };
                let out = self.push(SpptNode {
                    name: Arc::from(self.automaton.rule_name(key.state.rule)),
                    kind,
                    start: key.start,
                    end,
                    next: key.next,
                    alternatives: Vec::new(),
                    skip_after: data.skip_after(id).cloned(),
                });
                self.by_span.insert(span, out);
                out
            }
        };

        if self.in_progress.contains(&out) {
            return Entered::Done(None);
        }
        if !self.done.insert(id) || !matches!(self.nodes[out.0].kind, SpptNodeKind::Branch) {
            return Entered::Done(Some(out));
        }

        self.in_progress.insert(out);
        let lists = self.child_lists(id);
        Entered::Open(Frame { out, option: key.state.option, lists, list: 0, children: Vec::new() })
    }

    /// Close a branch: its end is the end of the last child of the first alternative.
    fn finish(&mut self, out: SpptNodeId) {
        self.in_progress.remove(&out);
        let end = self.nodes[out.0]
            .alternatives
            .first()
            .and_then(|a| a.children.last())
            .map(|last| self.nodes[last.0].end);
        if let Some(end) = end {
            self.nodes[out.0].end = end;
        }
    }

    /// Every list of complete children leading to the complete node `id`.
    fn child_lists(&mut self, id: NodeId) -> Vec<Vec<NodeId>> {
        let tails = self.tails(id);
        let mut lists: Vec<Vec<NodeId>> = tails.iter().map(|tail| self.flatten(*tail)).collect();
        lists.dedup();
        lists
    }

    fn flatten(&self, tail: usize) -> Vec<NodeId> {
        let mut list = Vec::new();
        let mut at = Some(tail);
        while let Some(link) = at {
            list.push(self.links[link].child);
            at = self.links[link].parent;
        }
        list.reverse();
        list
    }

    /// Last links of every child list of the (possibly partial) node `id`.
    ///
    /// GRAFT prefixes are resolved before the nodes grafted onto them, each
    /// list sharing its prefix's links. A prefix reached again while still
    /// open is a zero-width cycle and contributes nothing.
    fn tails(&mut self, id: NodeId) -> Rc<Vec<usize>> {
        let data = self.data;
        let mut stack = vec![(id, false)];
        while let Some((node, expanded)) = stack.pop() {
            if self.tails.contains_key(&node) {
                continue;
            }
            if !expanded {
                if !self.open_prefixes.insert(node) {
                    continue;
                }
                stack.push((node, true));
                for derivation in data.derivations(node) {
                    if let Derivation::Graft { prefix, .. } = *derivation {
                        if !self.tails.contains_key(&prefix) && !self.open_prefixes.contains(&prefix) {
                            stack.push((prefix, false));
                        }
                    }
                }
                continue;
            }

            let mut tails = Vec::new();
            for derivation in data.derivations(node) {
                match *derivation {
                    Derivation::Height { first } => tails.push(self.link(None, first)),
                    Derivation::Graft { prefix, child } => {
                        let prefix_tails = self.tails.get(&prefix).cloned().unwrap_or_default();
                        for parent in prefix_tails.iter() {
                            tails.push(self.link(Some(*parent), child));
                        }
                    }
                    Derivation::Leaf | Derivation::Embedded => {}
                }
            }
            self.open_prefixes.remove(&node);
            self.tails.insert(node, Rc::new(tails));
        }
        self.tails.get(&id).cloned().unwrap_or_default()
    }

    fn link(&mut self, parent: Option<usize>, child: NodeId) -> usize {
        self.links.push(Link { parent, child });
        self.links.len() - 1
    }
}
