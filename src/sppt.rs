//! Shared packed parse tree.
//!
//! The tree is an arena of nodes. A branch node holds one or more
//! alternatives (an option of its rule plus the child nodes); more than one
//! alternative means the span was derived in several ways and the ambiguity is
//! packed at that node. Child nodes are shared between alternatives.
//!
//! Skip content (whitespace, comments) never appears among the children. It is
//! attached to the node it follows (`skip_after`) or, before the first token,
//! to the tree (`leading_skip`).
//!
//! Positions are byte offsets into the sentence. For every node,
//! `start <= end <= next`; `next - end` is the trailing skip.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpptNodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub enum SpptNodeKind {
    Leaf,
    Branch,
    /// Matched by another grammar; the nested tree shares this sentence.
    Embedded(Arc<SharedPackedParseTree>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpptAlternative {
    pub option: u32,
    pub children: Vec<SpptNodeId>,
}

#[derive(Debug, Clone)]
pub struct SpptNode {
    /// Rule name, or the terminal tag for leaves.
    pub name: Arc<str>,
    pub kind: SpptNodeKind,
    pub start: usize,
    pub end: usize,
    pub next: usize,
    pub alternatives: Vec<SpptAlternative>,
    pub skip_after: Option<Arc<SharedPackedParseTree>>,
}

impl SpptNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, SpptNodeKind::Leaf)
    }
}

#[derive(Debug, Clone)]
pub struct SharedPackedParseTree {
    sentence: Arc<str>,
    nodes: Vec<SpptNode>,
    root: SpptNodeId,
    leading_skip: Option<Arc<SharedPackedParseTree>>,
}

impl SharedPackedParseTree {
    pub(crate) fn new(
        sentence: Arc<str>,
        nodes: Vec<SpptNode>,
        root: SpptNodeId,
        leading_skip: Option<Arc<SharedPackedParseTree>>,
    ) -> Self {
        SharedPackedParseTree { sentence, nodes, root, leading_skip }
    }

    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    pub fn root(&self) -> SpptNodeId {
        self.root
    }

    pub fn node(&self, id: SpptNodeId) -> &SpptNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leading_skip(&self) -> Option<&SharedPackedParseTree> {
        self.leading_skip.as_deref()
    }

    /// Children of the first alternative.
    pub fn children(&self, id: SpptNodeId) -> &[SpptNodeId] {
        self.node(id).alternatives.first().map(|a| a.children.as_slice()).unwrap_or(&[])
    }

    pub fn alternatives(&self, id: SpptNodeId) -> &[SpptAlternative] {
        &self.node(id).alternatives
    }

    /// Text matched by a leaf, without trailing skip.
    pub fn text(&self, id: SpptNodeId) -> &str {
        let node = self.node(id);
        self.sentence.get(node.start..node.end).unwrap_or("")
    }

    pub fn is_ambiguous(&self) -> bool {
        self.nodes.iter().any(|n| {
            n.alternatives.len() > 1 || matches!(&n.kind, SpptNodeKind::Embedded(tree) if tree.is_ambiguous())
        })
    }

    /// Nodes named `name` reachable from the root, in pre-order.
    pub fn find_all(&self, name: &str) -> Vec<SpptNodeId> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.node(id);
            if &*node.name == name {
                found.push(id);
            }
            for alternative in node.alternatives.iter().rev() {
                stack.extend(alternative.children.iter().rev().copied());
            }
        }
        found
    }

    /// Compact rendering of the first alternative: leaves as `'text'`,
    /// branches as `name { children }`. Skip content is left out.
    pub fn to_tree_string(&self) -> String {
        let mut out = String::new();
        self.write_tree(self.root, &mut out);
        out
    }

    fn write_tree(&self, id: SpptNodeId, out: &mut String) {
        let mut stack = vec![Walk::Node(id)];
        while let Some(step) = stack.pop() {
            let id = match step {
                Walk::Node(id) => id,
                Walk::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                Walk::Skip(_) => continue,
            };
            let node = self.node(id);
            match &node.kind {
                SpptNodeKind::Leaf if node.start == node.end => out.push_str(&node.name),
                SpptNodeKind::Leaf => {
                    let _ = write!(out, "'{}'", self.text(id));
                }
                SpptNodeKind::Embedded(tree) => {
                    let _ = write!(out, "{} {{ ", node.name);
                    tree.write_tree(tree.root, out);
                    out.push_str(" }");
                }
                SpptNodeKind::Branch => {
                    let _ = write!(out, "{} {{", node.name);
                    stack.push(Walk::Text(" }"));
                    for child in self.children(id).iter().rev() {
                        stack.push(Walk::Node(*child));
                        stack.push(Walk::Text(" "));
                    }
                }
            }
        }
    }

    /// Text of every leaf under `id`, skip content excluded.
    pub fn non_skip_text(&self, id: SpptNodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, false, &mut out);
        out
    }

    /// The text the tree was parsed from, rebuilt from leaves and skip.
    pub fn matched_text(&self) -> String {
        let mut out = String::new();
        if let Some(skip) = &self.leading_skip {
            out.push_str(&skip.matched_text());
        }
        self.collect_text(self.root, true, &mut out);
        out
    }

    fn collect_text(&self, id: SpptNodeId, with_skip: bool, out: &mut String) {
        let mut stack = vec![Walk::Node(id)];
        while let Some(step) = stack.pop() {
            let id = match step {
                Walk::Node(id) => id,
                Walk::Skip(id) => {
                    if let Some(skip) = &self.node(id).skip_after {
                        out.push_str(&skip.matched_text());
                    }
                    continue;
                }
                Walk::Text(_) => continue,
            };
            if with_skip {
                stack.push(Walk::Skip(id));
            }
            match &self.node(id).kind {
                SpptNodeKind::Leaf => out.push_str(self.text(id)),
                SpptNodeKind::Embedded(tree) if with_skip => out.push_str(&tree.matched_text()),
                SpptNodeKind::Embedded(tree) => out.push_str(&tree.non_skip_text(tree.root)),
                SpptNodeKind::Branch => stack.extend(self.children(id).iter().rev().map(|c| Walk::Node(*c))),
            }
        }
    }
}

/// Pending step of an iterative tree walk.
enum Walk {
    Node(SpptNodeId),
    /// Trailing skip of a node whose subtree is already written.
    Skip(SpptNodeId),
    Text(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, start: usize, end: usize, next: usize) -> SpptNode {
        SpptNode {
            name: Arc::from(name),
            kind: SpptNodeKind::Leaf,
            start,
            end,
            next,
            alternatives: Vec::new(),
            skip_after: None,
        }
    }

    fn branch(name: &str, start: usize, end: usize, children: Vec<SpptAlternative>) -> SpptNode {
        SpptNode {
            name: Arc::from(name),
            kind: SpptNodeKind::Branch,
            start,
            end,
            next: end,
            alternatives: children,
            skip_after: None,
        }
    }

    fn alt(children: &[usize]) -> SpptAlternative {
        SpptAlternative { option: 0, children: children.iter().map(|c| SpptNodeId(*c)).collect() }
    }

    fn sample() -> SharedPackedParseTree {
        let sentence: Arc<str> = Arc::from("a + b");
        let space = Arc::new(SharedPackedParseTree::new(sentence.clone(), vec![leaf("WS", 1, 2, 2)], SpptNodeId(0), None));
        let space2 = Arc::new(SharedPackedParseTree::new(sentence.clone(), vec![leaf("WS", 3, 4, 4)], SpptNodeId(0), None));
        let mut a = leaf("NAME", 0, 1, 2);
        a.skip_after = Some(space);
        let mut plus = leaf("'+'", 2, 3, 4);
        plus.skip_after = Some(space2);
        let b = leaf("NAME", 4, 5, 5);
        let nodes = vec![a, plus, b, branch("add", 0, 5, vec![alt(&[0, 1, 2])])];
        SharedPackedParseTree::new(sentence, nodes, SpptNodeId(3), None)
    }

    #[test]
    fn tree_string_leaves_out_skip() {
        assert_eq!(sample().to_tree_string(), "add { 'a' '+' 'b' }");
    }

    #[test]
    fn matched_text_restores_sentence() {
        let tree = sample();
        assert_eq!(tree.matched_text(), "a + b");
        assert_eq!(tree.non_skip_text(tree.root()), "a+b");
    }

    #[test]
    fn packed_alternatives_make_tree_ambiguous() {
        let tree = sample();
        assert!(!tree.is_ambiguous());
        assert_eq!(tree.find_all("NAME").len(), 2);

        let sentence: Arc<str> = Arc::from("x");
        let nodes =
            vec![leaf("X", 0, 1, 1), branch("A", 0, 1, vec![alt(&[0])]), branch("S", 0, 1, vec![alt(&[0]), alt(&[1])])];
        let ambiguous = SharedPackedParseTree::new(sentence, nodes, SpptNodeId(2), None);
        assert!(ambiguous.is_ambiguous());
        assert_eq!(ambiguous.alternatives(ambiguous.root()).len(), 2);
    }
}
