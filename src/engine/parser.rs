//! Growth engine.
//!
//! This module is the operational core: one `Engine` grows one GSS for one
//! goal rule over one sentence. The driver (`driver.rs`) owns the top-level
//! engine; skip and embedded parsing construct nested engines of their own.
//!
//! ## Rounds
//!
//! A round pops every head at the lowest frontier position and grows it:
//!
//! ```text
//! grow()
//!   clear failures below the round position
//!   while a head sits at the round position:
//!     incomplete head ──▶ WIDTH / EMBED
//!     complete head   ──▶ HEIGHT / GRAFT / GOAL  (over every previous node)
//! ```
//!
//! Nodes created at the same position (zero-width leaves, reductions of a
//! head) are grown in the same round; everything else waits for a later round.
//!
//! ## Lookahead
//!
//! Transition lookahead sets are resolved against the lookahead of the node
//! they sit on. Whether a set matches at a position is asked of the scanner;
//! "end of text" depends on the `EndOfText` of the engine:
//!
//! - top-level parse: the end of the sentence;
//! - skip parse: anywhere (skip may stop at any position);
//! - embedded parse: wherever the host could continue.
//!
//! ## Failures
//!
//! Every transition that is tried and rejected leaves a `FailedParseReason`
//! at the position where it gave up. A head without successful transitions is
//! simply not grown further.
//!
//! ## Invariants
//!
//! - Nodes only enter the graph through `Gss::upsert`.
//! - Heads are grown in ascending position order; nothing created by a head
//!   sits before it.

use super::automaton::{Action, ActionSet, Automaton, RulePosition, Transition};
use super::dedup::NodeKey;
use super::driver::InterruptHandle;
use super::failure::{FailedParseReason, FailureKind, FailureTracker, END_OF_TEXT_TAG};
use super::gss::{Gss, NodeId};
use super::lookahead::LookaheadSet;
use super::resolve::{Candidate, competing, resolve};
use super::tree_data::{Derivation, TreeData};
use crate::grammar::Terminal;
use crate::scanner::Scanner;
use crate::sppt::SharedPackedParseTree;
use crate::{ParseError, RuleId};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{trace, warn};

/// What "end of text" means for an engine.
#[derive(Debug, Clone)]
pub(crate) enum EndOfText {
    Sentence,
    Anywhere,
    /// Any of `terminals` is next, or (with `sentence`) the sentence ends.
    Terminals { terminals: Vec<Terminal>, sentence: bool },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineOptions {
    pub(crate) report_ambiguities: bool,
    pub(crate) cache_skip: bool,
    pub(crate) progress_budget: u32,
    pub(crate) skip_enabled: bool,
}

/// Outcome of one `grow` call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowthRound {
    pub(crate) position: usize,
    pub(crate) steps: usize,
    pub(crate) actions: ActionSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AmbiguityReport {
    pub(crate) position: usize,
    pub(crate) rules: Vec<String>,
    pub(crate) lookahead: Vec<String>,
}

#[derive(Debug, Default)]
struct SkipOutcome {
    end: usize,
    tree: Option<Arc<SharedPackedParseTree>>,
    failures: Vec<FailedParseReason>,
    furthest_failure: Option<usize>,
}

/// Head classification; decides which actions are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadKind {
    Goal,
    Incomplete,
    Complete,
}

impl HeadKind {
    fn of(key: &NodeKey) -> Self {
        if key.is_complete() {
            HeadKind::Complete
        } else if key.state.is_goal() {
            HeadKind::Goal
        } else {
            HeadKind::Incomplete
        }
    }

    fn actions(self) -> ActionSet {
        match self {
            HeadKind::Goal | HeadKind::Incomplete => ActionSet::EXPAND,
            HeadKind::Complete => ActionSet::REDUCE,
        }
    }
}

pub(crate) struct Engine<'a> {
    automaton: &'a Automaton,
    goal: RuleId,
    sentence: Arc<str>,
    scanner: &'a dyn Scanner,
    interrupt: &'a InterruptHandle,
    options: EngineOptions,
    end_of_text: EndOfText,
    gss: Gss,
    tree: TreeData,
    failures: FailureTracker,
    skip_memo: HashMap<(usize, LookaheadSet), Rc<SkipOutcome>>,
    ambiguities: Vec<AmbiguityReport>,
    actions: ActionSet,
}

impl<'a> Engine<'a> {
    pub(crate) fn new(
        automaton: &'a Automaton,
        goal: RuleId,
        sentence: Arc<str>,
        scanner: &'a dyn Scanner,
        interrupt: &'a InterruptHandle,
        options: EngineOptions,
        end_of_text: EndOfText,
    ) -> Self {
        Engine {
            automaton,
            goal,
            sentence,
            scanner,
            interrupt,
            options,
            end_of_text,
            gss: Gss::new(),
            tree: TreeData::default(),
            failures: FailureTracker::default(),
            skip_memo: HashMap::new(),
            ambiguities: Vec::new(),
            actions: ActionSet::empty(),
        }
    }

    pub(crate) fn automaton(&self) -> &'a Automaton {
        self.automaton
    }

    pub(crate) fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub(crate) fn ambiguities(&self) -> &[AmbiguityReport] {
        &self.ambiguities
    }

    pub(crate) fn node_count(&self) -> usize {
        self.gss.len()
    }

    pub(crate) fn head_count(&self) -> usize {
        self.gss.frontier_len()
    }

    pub(crate) fn can_grow(&self) -> bool {
        self.gss.can_grow()
    }

    /// Seed the goal node at `position`, after any leading skip.
    pub(crate) fn start(&mut self, position: usize) -> Result<(), ParseError> {
        let automaton = self.automaton;
        let mut next = position;
        if self.options.skip_enabled {
            let first = automaton.first_of_rest(RulePosition::goal(), self.goal).resolve(&LookaheadSet::end_of_text());
            let skip = self.parse_skip(position, &first)?;
            next = skip.end;
            self.tree.set_leading_skip(skip.tree.clone());
        }
        let key = NodeKey::new(RulePosition::goal(), position, next, LookaheadSet::end_of_text(), 0);
        self.gss.upsert(key, &[]);
        Ok(())
    }

    /// Grow every head at the lowest frontier position.
    pub(crate) fn grow(&mut self) -> Result<GrowthRound, ParseError> {
        self.actions = ActionSet::empty();
        let Some(position) = self.gss.next_position() else {
            return Ok(GrowthRound { position: 0, steps: 0, actions: self.actions });
        };
        self.failures.clear_below(position);

        let mut steps = 0;
        while let Some(head) = self.gss.pop_at_most(position) {
            self.grow_head(head)?;
            steps += 1;
        }
        Ok(GrowthRound { position, steps, actions: self.actions })
    }

    /// Grow until no head is left.
    pub(crate) fn run_to_end(&mut self) -> Result<(), ParseError> {
        while self.gss.can_grow() {
            self.grow()?;
        }
        Ok(())
    }

    /// A goal that consumed the whole sentence.
    pub(crate) fn full_match(&self) -> Option<NodeId> {
        let len = self.sentence.len();
        self.gss.goals().iter().copied().find(|g| self.gss.key(*g).next == len)
    }

    /// The completed goal reaching furthest, first found on ties.
    pub(crate) fn longest_goal(&self) -> Option<NodeId> {
        self.gss.goals().iter().copied().fold(None, |best: Option<NodeId>, g| match best {
            Some(b) if self.gss.key(b).next >= self.gss.key(g).next => Some(b),
            _ => Some(g),
        })
    }

    pub(crate) fn goal_end(&self, goal: NodeId) -> usize {
        self.gss.key(goal).next
    }

    pub(crate) fn materialize(&self, goal: NodeId) -> SharedPackedParseTree {
        self.tree.materialize(&self.gss, self.automaton, self.sentence.clone(), goal)
    }

    // --- Heads ------------------------------------------------------------------

    fn grow_head(&mut self, head: NodeId) -> Result<(), ParseError> {
        if self.interrupt.is_interrupted() {
            return Err(ParseError::Terminated(self.interrupt.message()));
        }
        let node = self.gss.node(head);
        if node.grown > self.options.progress_budget {
            warn!(
                rule = self.automaton.rule_name(node.key.state.rule),
                position = node.key.next,
                budget = self.options.progress_budget,
                "node regrown past progress budget"
            );
            return Err(ParseError::WontStop { position: node.key.next, budget: self.options.progress_budget });
        }

        let key = node.key.clone();
        let kind = HeadKind::of(&key);
        trace!(
            rule = self.automaton.rule_name(key.state.rule),
            position = key.state.position,
            start = key.start,
            next = key.next,
            ?kind,
            "grow head"
        );

        match kind {
            HeadKind::Goal | HeadKind::Incomplete => self.grow_expand(head, &key, kind.actions()),
            HeadKind::Complete => self.grow_complete(head, &key, kind.actions()),
        }
    }

    fn grow_expand(&mut self, head: NodeId, key: &NodeKey, allowed: ActionSet) -> Result<(), ParseError> {
        let transitions = self.automaton.width_transitions(key.state, self.goal);
        for transition in transitions.iter().filter(|t| allowed.contains(t.action.flag())) {
            let lookahead = transition.lookahead.resolve(&key.lookahead);
            if transition.action == Action::Embed {
                self.do_embed(head, key, transition, lookahead)?;
            } else {
                self.do_width(head, key, transition, lookahead)?;
            }
        }
        Ok(())
    }

    fn grow_complete(&mut self, head: NodeId, key: &NodeKey, allowed: ActionSet) -> Result<(), ParseError> {
        let automaton = self.automaton;
        let head_rule = key.state.rule;
        let previous = self.gss.node(head).previous.clone();

        let mut candidates = Vec::new();
        for prev in previous {
            let prev_key = self.gss.key(prev).clone();
            for transition in automaton.complete_transitions(prev_key.state, head_rule, self.goal) {
                if !allowed.contains(transition.action.flag()) {
                    continue;
                }
                let lookahead = transition.lookahead.resolve(&prev_key.lookahead);
                let guard = transition.guard.resolve(&prev_key.lookahead);
                let count = match transition.action {
                    Action::Height => {
                        usize::from(automaton.counts_item(RulePosition::start(transition.to.rule, transition.to.option)))
                    }
                    Action::Graft => prev_key.count + usize::from(automaton.counts_item(prev_key.state)),
                    _ => 0,
                }
                .min(automaton.count_cap(transition.to.rule));

                if !transition.runtime_guard.allows(count) {
                    let from = match transition.action {
                        Action::Height => RulePosition::start(transition.to.rule, transition.to.option),
                        _ => prev_key.state,
                    };
                    let context = if transition.action == Action::Height { &lookahead } else { &prev_key.lookahead };
                    let expected = self.continuation(from, context);
                    self.fail(key, &transition, key.next, FailureKind::GraftGuard { expected });
                    continue;
                }
                if !self.lookahead_matches(key.next, &guard) {
                    self.fail(key, &transition, key.next, FailureKind::Lookahead { expected: guard });
                    continue;
                }
                candidates.push(Candidate {
                    previous: prev,
                    previous_start: prev_key.start,
                    transition,
                    lookahead,
                    guard,
                    count,
                });
            }
        }

        if candidates.is_empty() {
            trace!(rule = automaton.rule_name(head_rule), next = key.next, "no transitions taken");
            return Ok(());
        }

        let precedence = automaton.grammar().precedence_for(head_rule);
        let chosen = resolve(precedence, |t| self.is_looking_at(key.next, t), candidates);
        if self.options.report_ambiguities {
            self.report_ambiguity(key, &chosen);
        }

        for candidate in chosen {
            if candidate.transition.action == Action::Height {
                self.do_height(head, key, candidate);
            } else {
                self.do_graft(head, key, candidate);
            }
        }
        Ok(())
    }

    // --- Actions ----------------------------------------------------------------

    fn do_width(
        &mut self,
        head: NodeId,
        key: &NodeKey,
        transition: &Transition,
        lookahead: LookaheadSet,
    ) -> Result<(), ParseError> {
        let automaton = self.automaton;
        let Some(terminal) = automaton.rule_terminal(transition.to.rule) else { return Ok(()) };
        let Some(leaf) = self.scanner.find_or_try_create_leaf(&self.sentence, key.next, terminal) else {
            self.fail(key, transition, key.next, FailureKind::WidthTargetNotFound { terminal: terminal.id() });
            return Ok(());
        };

        let mut next = leaf.range.end;
        let mut skip_tree = None;
        if !terminal.is_empty() {
            let skip = self.parse_skip(next, &lookahead)?;
            next = skip.end;
            skip_tree = skip.tree.clone();
            if !self.lookahead_matches(next, &lookahead) {
                self.fail_after_skip(key, transition, next, &skip, lookahead);
                return Ok(());
            }
        } else if !self.lookahead_matches(next, &lookahead) {
            self.fail(key, transition, next, FailureKind::Lookahead { expected: lookahead });
            return Ok(());
        }

        let (id, _) = self.gss.upsert(NodeKey::new(transition.to, key.next, next, lookahead, 0), &[head]);
        if self.tree.add_derivation(id, Derivation::Leaf) {
            self.tree.set_leaf(id, leaf);
            if let Some(skip) = skip_tree {
                self.tree.set_skip_after(id, skip);
            }
        }
        self.actions |= ActionSet::WIDTH;
        trace!(terminal = terminal.tag(), start = key.next, next, "width");
        Ok(())
    }

    fn do_embed(
        &mut self,
        head: NodeId,
        key: &NodeKey,
        transition: &Transition,
        lookahead: LookaheadSet,
    ) -> Result<(), ParseError> {
        let automaton = self.automaton;
        let Some((inner, inner_goal)) = automaton.embedded(transition.to.rule) else { return Ok(()) };

        let mut nested = Engine::new(
            inner,
            inner_goal,
            self.sentence.clone(),
            self.scanner,
            self.interrupt,
            EngineOptions { report_ambiguities: false, ..self.options },
            self.embedded_end_of_text(&lookahead),
        );
        nested.start(key.next)?;
        nested.run_to_end()?;

        let Some(goal) = nested.longest_goal() else {
            let (position, reasons) = match nested.failures.furthest() {
                Some((position, reasons)) => (position, reasons.to_vec()),
                None => (key.next, Vec::new()),
            };
            let grammar = Arc::from(inner.grammar().name());
            self.fail(key, transition, position, FailureKind::Embedded { grammar, nested: reasons });
            return Ok(());
        };

        let embedded = Arc::new(nested.materialize(goal));
        let skip = self.parse_skip(nested.goal_end(goal), &lookahead)?;
        let next = skip.end;
        if !self.lookahead_matches(next, &lookahead) {
            self.fail_after_skip(key, transition, next, &skip, lookahead);
            return Ok(());
        }

        let (id, _) = self.gss.upsert(NodeKey::new(transition.to, key.next, next, lookahead, 0), &[head]);
        if self.tree.add_derivation(id, Derivation::Embedded) {
            self.tree.set_embedded(id, embedded);
            if let Some(skip) = skip.tree.clone() {
                self.tree.set_skip_after(id, skip);
            }
        }
        self.actions |= ActionSet::EMBED;
        trace!(grammar = inner.grammar().name(), start = key.next, next, "embed");
        Ok(())
    }

    fn do_height(&mut self, head: NodeId, key: &NodeKey, candidate: Candidate) {
        let to = candidate.transition.to;
        let new_key = NodeKey::new(to, key.start, key.next, candidate.lookahead, candidate.count);
        let (id, _) = self.gss.upsert(new_key, &[candidate.previous]);
        self.tree.add_derivation(id, Derivation::Height { first: head });
        self.actions |= ActionSet::HEIGHT;
        trace!(rule = self.automaton.rule_name(to.rule), start = key.start, next = key.next, "height");
    }

    /// GRAFT, and GOAL as the graft onto the goal node. A completed goal is
    /// never grown again, so only grafts are linked for edge propagation.
    fn do_graft(&mut self, head: NodeId, key: &NodeKey, candidate: Candidate) {
        let prefix = self.gss.node(candidate.previous);
        let previous = prefix.previous.clone();
        let start = prefix.key.start;
        let action = candidate.transition.action;
        let to = candidate.transition.to;
        let new_key = NodeKey::new(to, start, key.next, candidate.lookahead, candidate.count);
        let (id, _) = self.gss.upsert(new_key, &previous);
        if action == Action::Graft {
            self.gss.link_graft(candidate.previous, id);
        }
        self.tree.add_derivation(id, Derivation::Graft { prefix: candidate.previous, child: head });
        self.actions |= action.flag();
        trace!(rule = self.automaton.rule_name(to.rule), start, next = key.next, action = action.name(), "graft");
    }

    // --- Skip -------------------------------------------------------------------

    fn parse_skip(&mut self, position: usize, lookahead: &LookaheadSet) -> Result<Rc<SkipOutcome>, ParseError> {
        let automaton = self.automaton;
        let Some(skip_goal) = automaton.skip_goal().filter(|_| self.options.skip_enabled) else {
            return Ok(Rc::new(SkipOutcome { end: position, ..SkipOutcome::default() }));
        };

        let memo_key = (position, lookahead.clone());
        if self.options.cache_skip {
            if let Some(hit) = self.skip_memo.get(&memo_key) {
                return Ok(hit.clone());
            }
        }

        let mut nested = Engine::new(
            automaton,
            skip_goal,
            self.sentence.clone(),
            self.scanner,
            self.interrupt,
            EngineOptions { skip_enabled: false, report_ambiguities: false, ..self.options },
            EndOfText::Anywhere,
        );
        nested.start(position)?;
        nested.run_to_end()?;

        let mut goals: Vec<(usize, NodeId)> = nested
            .gss
            .goals()
            .iter()
            .map(|g| (nested.gss.key(*g).next, *g))
            .filter(|(end, _)| *end > position)
            .collect();
        goals.sort_by(|a, b| b.0.cmp(&a.0));
        let chosen = goals.iter().find(|(end, _)| self.lookahead_matches(*end, lookahead)).or(goals.first()).copied();

        let (furthest_failure, failures) = match nested.failures.furthest() {
            Some((p, reasons)) => (Some(p), reasons.to_vec()),
            None => (None, Vec::new()),
        };
        let outcome = Rc::new(match chosen {
            Some((end, goal)) => {
                SkipOutcome { end, tree: Some(Arc::new(nested.materialize(goal))), failures, furthest_failure }
            }
            None => SkipOutcome { end: position, tree: None, failures, furthest_failure },
        });

        if self.options.cache_skip {
            self.skip_memo.insert(memo_key, outcome.clone());
        }
        Ok(outcome)
    }

    // --- Lookahead --------------------------------------------------------------

    fn is_looking_at(&self, position: usize, terminal: crate::TerminalId) -> bool {
        self.automaton.terminal(terminal).is_some_and(|t| self.scanner.is_looking_at(&self.sentence, position, t))
    }

    fn at_end_of_text(&self, position: usize) -> bool {
        match &self.end_of_text {
            EndOfText::Sentence => position == self.sentence.len(),
            EndOfText::Anywhere => true,
            EndOfText::Terminals { terminals, sentence } => {
                (*sentence && position == self.sentence.len())
                    || terminals.iter().any(|t| self.scanner.is_looking_at(&self.sentence, position, t))
            }
        }
    }

    fn lookahead_matches(&self, position: usize, lookahead: &LookaheadSet) -> bool {
        (lookahead.includes_end_of_text() && self.at_end_of_text(position))
            || lookahead.terminals().any(|t| self.is_looking_at(position, t))
    }

    /// End of text for a grammar embedded under `lookahead`: the host's
    /// lookahead terminals and skip terminals, plus the host's own end of text
    /// when the host may end there.
    fn embedded_end_of_text(&self, lookahead: &LookaheadSet) -> EndOfText {
        let automaton = self.automaton;
        let mut terminals: Vec<Terminal> =
            lookahead.terminals().filter_map(|id| automaton.terminal(id).cloned()).collect();
        terminals.extend(automaton.skip_terminals());
        if !lookahead.includes_end_of_text() {
            return EndOfText::Terminals { terminals, sentence: false };
        }
        match &self.end_of_text {
            EndOfText::Sentence => EndOfText::Terminals { terminals, sentence: true },
            EndOfText::Anywhere => EndOfText::Anywhere,
            EndOfText::Terminals { terminals: outer, sentence } => {
                terminals.extend(outer.iter().cloned());
                EndOfText::Terminals { terminals, sentence: *sentence }
            }
        }
    }

    /// What may continue a list in state `from` rather than end it.
    fn continuation(&self, from: RulePosition, context: &LookaheadSet) -> LookaheadSet {
        self.automaton
            .next_positions(from)
            .into_iter()
            .filter(|(p, _)| !p.is_complete())
            .fold(LookaheadSet::empty(), |acc, (p, _)| {
                acc.union(&self.automaton.first_of_rest(p, self.goal).resolve(context))
            })
    }

    // --- Diagnostics ------------------------------------------------------------

    fn fail(&mut self, key: &NodeKey, transition: &Transition, position: usize, kind: FailureKind) {
        let automaton = self.automaton;
        trace!(
            rule = automaton.rule_name(key.state.rule),
            action = transition.action.name(),
            target = automaton.rule_name(transition.to.rule),
            position,
            "transition failed"
        );
        self.failures.record(FailedParseReason::new(
            position,
            Arc::from(automaton.rule_name(key.state.rule)),
            Arc::from(automaton.rule_name(transition.to.rule)),
            kind,
        ));
    }

    /// Lookahead did not match after a token and its trailing skip. If the
    /// skip parse got further than the skip it produced, the skip content was
    /// needed and broken.
    fn fail_after_skip(
        &mut self,
        key: &NodeKey,
        transition: &Transition,
        after: usize,
        skip: &SkipOutcome,
        expected: LookaheadSet,
    ) {
        match skip.furthest_failure {
            Some(furthest) if furthest > after => {
                let kind = FailureKind::RequiredSkipMissing { skip: skip.failures.clone() };
                self.fail(key, transition, furthest, kind);
            }
            _ => self.fail(key, transition, after, FailureKind::Lookahead { expected }),
        }
    }

    fn report_ambiguity(&mut self, key: &NodeKey, chosen: &[Candidate]) {
        let Some(pairs) = competing(chosen) else { return };
        let automaton = self.automaton;
        let rules: Vec<String> = pairs
            .iter()
            .map(|(action, rule)| format!("{}:{}", action.name(), automaton.rule_name(*rule)))
            .collect();

        let guards = chosen.iter().fold(LookaheadSet::empty(), |acc, c| acc.union(&c.guard));
        let mut lookahead: Vec<String> = guards
            .terminals()
            .filter(|t| self.is_looking_at(key.next, *t))
            .map(|t| automaton.terminal_tag(t).to_string())
            .collect();
        if guards.includes_end_of_text() && self.at_end_of_text(key.next) {
            lookahead.push(END_OF_TEXT_TAG.to_string());
        }

        let report = AmbiguityReport { position: key.next, rules, lookahead };
        if !self.ambiguities.contains(&report) {
            trace!(position = report.position, rules = ?report.rules, "ambiguity");
            self.ambiguities.push(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrammarBuilder;
    use crate::scanner::RegexScanner;

    const OPTIONS: EngineOptions =
        EngineOptions { report_ambiguities: true, cache_skip: true, progress_budget: 10_000, skip_enabled: true };

    fn automaton() -> Automaton {
        let grammar = GrammarBuilder::new("Sum")
            .concatenation("S", [nt!("expr")])
            .choice("expr", [vec![nt!("NAME")], vec![nt!("add")]])
            .concatenation("add", [nt!("expr"), lit!("+"), nt!("expr")])
            .pattern("NAME", "[a-z]+")
            .pattern("WS", r"\s+")
            .skip("WS")
            .build()
            .unwrap();
        Automaton::new(Arc::new(grammar))
    }

    fn run(automaton: &Automaton, sentence: &str) -> (bool, usize, Vec<GrowthRound>) {
        let scanner = RegexScanner::new();
        let interrupt = InterruptHandle::default();
        let goal = automaton.start_state_for("S").unwrap();
        let mut engine =
            Engine::new(automaton, goal, Arc::from(sentence), &scanner, &interrupt, OPTIONS, EndOfText::Sentence);
        engine.start(0).unwrap();
        let mut rounds = Vec::new();
        while engine.can_grow() && engine.full_match().is_none() {
            rounds.push(engine.grow().unwrap());
        }
        let furthest = engine.failures().furthest().map_or(0, |(p, _)| p);
        (engine.full_match().is_some(), furthest, rounds)
    }

    #[test]
    fn rounds_advance_with_input() {
        let a = automaton();
        let (matched, _, rounds) = run(&a, "a + b");
        assert!(matched);
        assert!(rounds.windows(2).all(|w| w[0].position < w[1].position));
        assert!(rounds.iter().any(|r| r.actions.contains(ActionSet::GRAFT)));
        assert!(rounds[0].actions.contains(ActionSet::WIDTH));
    }

    #[test]
    fn failure_is_recorded_at_furthest_position() {
        let a = automaton();
        let (matched, furthest, _) = run(&a, "a + ");
        assert!(!matched);
        assert_eq!(furthest, 4);
    }

    #[test]
    fn left_recursion_packs_equal_keys() {
        let a = automaton();
        let scanner = RegexScanner::new();
        let interrupt = InterruptHandle::default();
        let goal = a.start_state_for("S").unwrap();
        let mut engine = Engine::new(&a, goal, Arc::from("a+b+c"), &scanner, &interrupt, OPTIONS, EndOfText::Sentence);
        engine.start(0).unwrap();
        engine.run_to_end().unwrap();

        let mut keys = std::collections::HashSet::new();
        for i in 0..engine.node_count() {
            assert!(keys.insert(engine.gss.key(NodeId(i)).clone()), "duplicate node key");
        }
        assert!(engine.full_match().is_some());
    }

    #[test]
    fn interrupt_stops_growth() {
        let a = automaton();
        let scanner = RegexScanner::new();
        let interrupt = InterruptHandle::default();
        let goal = a.start_state_for("S").unwrap();
        let mut engine = Engine::new(&a, goal, Arc::from("a+b"), &scanner, &interrupt, OPTIONS, EndOfText::Sentence);
        engine.start(0).unwrap();
        interrupt.interrupt("stop");
        assert!(matches!(engine.grow(), Err(ParseError::Terminated(message)) if message == "stop"));
    }

    #[test]
    fn skip_is_memoized_per_position_and_lookahead() {
        let a = automaton();
        let scanner = RegexScanner::new();
        let interrupt = InterruptHandle::default();
        let goal = a.start_state_for("S").unwrap();
        let mut engine =
            Engine::new(&a, goal, Arc::from("a   + b"), &scanner, &interrupt, OPTIONS, EndOfText::Sentence);
        let first = engine.parse_skip(1, &LookaheadSet::end_of_text()).unwrap();
        let second = engine.parse_skip(1, &LookaheadSet::end_of_text()).unwrap();
        assert_eq!(first.end, 4);
        assert!(Rc::ptr_eq(&first, &second));
    }
}
