//! Runtime automaton.
//!
//! This module holds the *static* side of the engine: everything derived from
//! a [`Grammar`] once, then shared read-only by every parse (and every nested
//! skip/embedded engine) for that grammar.
//!
//! Parsing is split into two phases:
//!
//! 1. **Build** (this module): compute nullability, first sets and, for every
//!    non-terminal, its left-corner closure with parameterized follow sets.
//! 2. **Run** (see `parser.rs`): grow a GSS by asking this module which
//!    transitions leave a given state.
//!
//! ## States
//!
//! A state is a `RulePosition` `(rule, option, position)`; `position` is the
//! index of the next item or `END`. Lists use position `0` for the first item
//! and `1` for every further item (or separator); separated lists use `2` for
//! the item that follows a separator. The goal of a parse is the pseudo rule
//! `RuleId::GOAL` whose single item is the goal rule.
//!
//! ## Transitions
//!
//! ```text
//! incomplete state, expects X  ──WIDTH──▶ terminal T   (T in closure(X))
//!                              ──EMBED──▶ embedded E   (E in closure(X))
//! complete R, previous P (expects X)
//!                              ──GRAFT──▶ P advanced    (X == R)
//!                              ──HEIGHT─▶ (Q, o, 1)     (Q in closure(X), Q's option o starts with R)
//!                              ──GOAL───▶ goal complete (P is the goal state, X == R)
//! ```
//!
//! Lookahead sets on transitions are parameterized by the `runtime`
//! placeholder; the engine resolves them against the lookahead of the node
//! the new node sits on (the head for WIDTH/EMBED, the head's previous node
//! for HEIGHT/GRAFT/GOAL).
//!
//! ## Invariants
//!
//! - The automaton never changes after `Automaton::new`.
//! - Every terminal reachable from the grammar, including the terminals of
//!   embedded grammars, is registered in `terminals`.

use super::lookahead::LookaheadSet;
use crate::grammar::{Grammar, RuleRhs, Terminal};
use crate::{ParseError, RuleId, TerminalId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub(crate) const END: u32 = u32::MAX;

const EMPTY: RuleId = RuleId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RulePosition {
    pub(crate) rule: RuleId,
    pub(crate) option: u32,
    pub(crate) position: u32,
}

impl RulePosition {
    pub(crate) fn start(rule: RuleId, option: u32) -> Self {
        RulePosition { rule, option, position: 0 }
    }

    pub(crate) fn end(rule: RuleId, option: u32) -> Self {
        RulePosition { rule, option, position: END }
    }

    pub(crate) fn goal() -> Self {
        Self::start(RuleId::GOAL, 0)
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.position == END
    }

    pub(crate) fn is_goal(&self) -> bool {
        self.rule == RuleId::GOAL
    }

    fn at(self, position: u32) -> Self {
        RulePosition { position, ..self }
    }
}

bitflags::bitflags! {
    /// Set of transition kinds.
    ///
    /// Used to restrict what a head may try (see `HeadKind` in `parser.rs`)
    /// and to report which actions fired during a round.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActionSet: u8 {
        const WIDTH  = 1 << 0;
        const HEIGHT = 1 << 1;
        const GRAFT  = 1 << 2;
        const GOAL   = 1 << 3;
        const EMBED  = 1 << 4;
    }
}

impl ActionSet {
    pub(crate) const EXPAND: ActionSet = ActionSet::WIDTH.union(ActionSet::EMBED);
    pub(crate) const REDUCE: ActionSet = ActionSet::HEIGHT.union(ActionSet::GRAFT).union(ActionSet::GOAL);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Action {
    Width,
    Height,
    Graft,
    Goal,
    Embed,
}

impl Action {
    pub(crate) fn flag(self) -> ActionSet {
        match self {
            Action::Width => ActionSet::WIDTH,
            Action::Height => ActionSet::HEIGHT,
            Action::Graft => ActionSet::GRAFT,
            Action::Goal => ActionSet::GOAL,
            Action::Embed => ActionSet::EMBED,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Action::Width => "WIDTH",
            Action::Height => "HEIGHT",
            Action::Graft => "GRAFT",
            Action::Goal => "GOAL",
            Action::Embed => "EMBED",
        }
    }
}

/// Guard over the item count of a list node, checked after the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RuntimeGuard {
    None,
    /// Another item may follow.
    Continue { max: Option<usize> },
    /// The list may end here.
    Complete { min: usize, max: Option<usize> },
}

impl RuntimeGuard {
    pub(crate) fn allows(&self, items: usize) -> bool {
        match *self {
            RuntimeGuard::None => true,
            RuntimeGuard::Continue { max } => max.is_none_or(|m| items < m),
            RuntimeGuard::Complete { min, max } => items >= min && max.is_none_or(|m| items <= m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) action: Action,
    pub(crate) to: RulePosition,
    /// Lookahead of the node created by this transition.
    pub(crate) lookahead: LookaheadSet,
    /// What must be seen next for the transition to apply.
    pub(crate) guard: LookaheadSet,
    pub(crate) runtime_guard: RuntimeGuard,
}

/// Left-corner closure of one non-terminal.
///
/// `follow[r]` is what may follow `r` inside the closure, with `runtime`
/// standing for what follows the closure's root in the caller's context.
#[derive(Debug, Clone, Default)]
struct Closure {
    order: Vec<RuleId>,
    follow: HashMap<RuleId, LookaheadSet>,
}

#[derive(Debug)]
pub struct Automaton {
    grammar: Arc<Grammar>,
    nullable: Vec<bool>,
    first: Vec<BTreeSet<TerminalId>>,
    closures: HashMap<RuleId, Closure>,
    terminals: HashMap<TerminalId, Terminal>,
    embedded: HashMap<RuleId, Arc<Automaton>>,
}

impl Automaton {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        let mut embedded = HashMap::new();
        let mut terminals = HashMap::new();
        for (idx, rule) in grammar.rules().iter().enumerate() {
            match &rule.rhs {
                RuleRhs::Terminal(t) => {
                    terminals.insert(t.id(), t.clone());
                }
                RuleRhs::Embedded { grammar: inner, .. } => {
                    let automaton = Automaton::new(inner.clone());
                    terminals.extend(automaton.terminals.iter().map(|(id, t)| (*id, t.clone())));
                    embedded.insert(RuleId(idx as u32), Arc::new(automaton));
                }
                _ => {}
            }
        }

        let (nullable, first) = compute_first_sets(&grammar, &embedded);
        let mut automaton =
            Automaton { grammar, nullable, first, closures: HashMap::new(), terminals, embedded };

        let non_terminals: Vec<RuleId> =
            (0..automaton.grammar.rules().len() as u32).map(RuleId).filter(|r| automaton.is_non_terminal(*r)).collect();
        for rule in non_terminals {
            let closure = automaton.compute_closure(rule);
            automaton.closures.insert(rule, closure);
        }

        automaton
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Goal rule for `goal`, the start of every parse for that goal.
    pub fn start_state_for(&self, goal: &str) -> Result<RuleId, ParseError> {
        self.grammar.find_rule(goal).ok_or_else(|| ParseError::UnknownGoal(goal.to_string()))
    }

    /// Check that `goal` can be parsed without parsing anything.
    pub fn build_for(&self, goal: &str) -> Result<(), ParseError> {
        let id = self.start_state_for(goal)?;
        if self.is_non_terminal(id) && !self.closures.contains_key(&id) {
            return Err(ParseError::UnknownGoal(goal.to_string()));
        }
        Ok(())
    }

    /// Goal of the skip automaton, if the grammar has skip rules.
    pub(crate) fn skip_goal(&self) -> Option<RuleId> {
        self.grammar.skip_goal()
    }

    /// Terminals that can start skip content.
    pub(crate) fn skip_terminals(&self) -> Vec<Terminal> {
        match self.skip_goal() {
            Some(goal) => self.first[goal.index()].iter().filter_map(|id| self.terminals.get(id).cloned()).collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn terminal(&self, id: TerminalId) -> Option<&Terminal> {
        self.terminals.get(&id)
    }

    pub(crate) fn terminal_tag(&self, id: TerminalId) -> &str {
        self.terminals.get(&id).map(Terminal::tag).unwrap_or("<unknown>")
    }

    pub(crate) fn rule_terminal(&self, rule: RuleId) -> Option<&Terminal> {
        if rule == RuleId::GOAL {
            return None;
        }
        self.grammar.rule(rule).terminal()
    }

    pub(crate) fn embedded(&self, rule: RuleId) -> Option<(&Automaton, RuleId)> {
        let automaton = self.embedded.get(&rule)?;
        match &self.grammar.rule(rule).rhs {
            RuleRhs::Embedded { goal, .. } => Some((automaton.as_ref(), *goal)),
            _ => None,
        }
    }

    pub(crate) fn rule_name(&self, rule: RuleId) -> &str {
        self.grammar.rule_name(rule)
    }

    fn is_non_terminal(&self, rule: RuleId) -> bool {
        rule != RuleId::GOAL
            && matches!(
                self.grammar.rule(rule).rhs,
                RuleRhs::Choice(_) | RuleRhs::List { .. } | RuleRhs::SeparatedList { .. }
            )
    }

    fn options(&self, rule: RuleId) -> u32 {
        match &self.grammar.rule(rule).rhs {
            RuleRhs::Choice(alternatives) => alternatives.len() as u32,
            RuleRhs::List { min, .. } | RuleRhs::SeparatedList { min, .. } => {
                if *min == 0 {
                    2
                } else {
                    1
                }
            }
            _ => 0,
        }
    }

    /// The item `state` waits for, `None` once complete.
    pub(crate) fn expected_item(&self, state: RulePosition, goal: RuleId) -> Option<RuleId> {
        if state.is_complete() {
            return None;
        }
        if state.is_goal() {
            return (state.position == 0).then_some(goal);
        }
        match &self.grammar.rule(state.rule).rhs {
            RuleRhs::Choice(alternatives) => alternatives.get(state.option as usize)?.get(state.position as usize).copied(),
            RuleRhs::List { item, .. } => Some(if state.option == 0 { *item } else { EMPTY }),
            RuleRhs::SeparatedList { item, separator, .. } => {
                if state.option == 1 {
                    Some(EMPTY)
                } else if state.position == 1 {
                    Some(*separator)
                } else {
                    Some(*item)
                }
            }
            _ => None,
        }
    }

    /// States reachable from `state` once its expected item has matched.
    pub(crate) fn next_positions(&self, state: RulePosition) -> Vec<(RulePosition, RuntimeGuard)> {
        if state.is_goal() {
            return vec![(RulePosition::end(RuleId::GOAL, 0), RuntimeGuard::None)];
        }
        let end = RulePosition::end(state.rule, state.option);
        match &self.grammar.rule(state.rule).rhs {
            RuleRhs::Choice(alternatives) => {
                let len = alternatives.get(state.option as usize).map_or(0, Vec::len) as u32;
                let next = state.position + 1;
                if next < len { vec![(state.at(next), RuntimeGuard::None)] } else { vec![(end, RuntimeGuard::None)] }
            }
            RuleRhs::List { min, max, .. } => {
                if state.option == 1 {
                    return vec![(end, RuntimeGuard::None)];
                }
                list_next(state, end, *min, *max)
            }
            RuleRhs::SeparatedList { min, max, .. } => {
                if state.option == 1 {
                    vec![(end, RuntimeGuard::None)]
                } else if state.position == 1 {
                    vec![(state.at(2), RuntimeGuard::None)]
                } else {
                    list_next(state, end, *min, *max)
                }
            }
            _ => Vec::new(),
        }
    }

    /// Whether matching the item expected at `state` increments the list count.
    pub(crate) fn counts_item(&self, state: RulePosition) -> bool {
        if state.is_goal() || state.option != 0 {
            return false;
        }
        match &self.grammar.rule(state.rule).rhs {
            RuleRhs::List { .. } => true,
            RuleRhs::SeparatedList { .. } => state.position != 1,
            _ => false,
        }
    }

    /// Item counts at or above the cap are indistinguishable for the runtime
    /// guards, so counts saturate there and node keys stay finite.
    pub(crate) fn count_cap(&self, rule: RuleId) -> usize {
        if rule == RuleId::GOAL {
            return 0;
        }
        match &self.grammar.rule(rule).rhs {
            RuleRhs::List { min, max, .. } | RuleRhs::SeparatedList { min, max, .. } => {
                (*min).max(max.unwrap_or(*min)) + 1
            }
            _ => 0,
        }
    }

    /// Lookahead of everything after the current position of `state`;
    /// `runtime` if the rest may be empty.
    pub(crate) fn first_of_rest(&self, state: RulePosition, goal: RuleId) -> LookaheadSet {
        if state.is_complete() {
            return LookaheadSet::runtime();
        }
        if state.is_goal() {
            return self.sequence_lookahead(&[goal]);
        }
        match &self.grammar.rule(state.rule).rhs {
            RuleRhs::Choice(alternatives) => match alternatives.get(state.option as usize) {
                Some(items) => self.sequence_lookahead(items.get(state.position as usize..).unwrap_or(&[])),
                None => LookaheadSet::runtime(),
            },
            RuleRhs::SeparatedList { item, separator, .. } if state.option == 0 && state.position == 1 => {
                self.sequence_lookahead(&[*separator, *item])
            }
            _ => match self.expected_item(state, goal) {
                Some(item) => self.sequence_lookahead(&[item]),
                None => LookaheadSet::runtime(),
            },
        }
    }

    /// What may follow the item expected at `state`, parameterized on the
    /// lookahead of the node in that state.
    pub(crate) fn follow_of_expected(&self, state: RulePosition, goal: RuleId) -> LookaheadSet {
        self.next_positions(state)
            .into_iter()
            .fold(LookaheadSet::empty(), |acc, (next, _)| acc.union(&self.first_of_rest(next, goal)))
    }

    fn sequence_lookahead(&self, items: &[RuleId]) -> LookaheadSet {
        let mut terminals = BTreeSet::new();
        for item in items {
            if *item == RuleId::GOAL {
                break;
            }
            terminals.extend(self.first[item.index()].iter().copied());
            if !self.nullable[item.index()] {
                return LookaheadSet::of(terminals);
            }
        }
        LookaheadSet::of(terminals).union(&LookaheadSet::runtime())
    }

    fn compute_closure(&self, root: RuleId) -> Closure {
        let mut closure = Closure::default();
        closure.order.push(root);
        closure.follow.insert(root, LookaheadSet::runtime());

        let mut work = vec![root];
        while let Some(rule) = work.pop() {
            let follow_rule = closure.follow[&rule].clone();
            for option in 0..self.options(rule) {
                let start = RulePosition::start(rule, option);
                let Some(item) = self.expected_item(start, RuleId::GOAL) else { continue };
                let follow = self.follow_of_expected(start, RuleId::GOAL).resolve(&follow_rule);
                let grew = match closure.follow.get_mut(&item) {
                    Some(existing) => {
                        let merged = existing.union(&follow);
                        let grew = merged != *existing;
                        *existing = merged;
                        grew
                    }
                    None => {
                        closure.order.push(item);
                        closure.follow.insert(item, follow);
                        true
                    }
                };
                if grew && self.is_non_terminal(item) {
                    work.push(item);
                }
            }
        }
        closure
    }

    /// WIDTH and EMBED transitions out of an incomplete `state`.
    pub(crate) fn width_transitions(&self, state: RulePosition, goal: RuleId) -> Vec<Transition> {
        let Some(expected) = self.expected_item(state, goal) else { return Vec::new() };
        let context = self.follow_of_expected(state, goal);

        let leaves: Vec<(RuleId, LookaheadSet)> = match self.closures.get(&expected) {
            Some(closure) => closure.order.iter().map(|r| (*r, closure.follow[r].clone())).collect(),
            None => vec![(expected, LookaheadSet::runtime())],
        };

        let mut transitions = Vec::new();
        for (rule, follow) in leaves {
            let action = match &self.grammar.rule(rule).rhs {
                RuleRhs::Terminal(_) => Action::Width,
                RuleRhs::Embedded { .. } => Action::Embed,
                _ => continue,
            };
            let lookahead = follow.resolve(&context);
            transitions.push(Transition {
                action,
                to: RulePosition::end(rule, 0),
                guard: lookahead.clone(),
                lookahead,
                runtime_guard: RuntimeGuard::None,
            });
        }
        transitions
    }

    /// HEIGHT, GRAFT and GOAL transitions for a completed `head_rule` whose
    /// previous node is in state `previous`.
    pub(crate) fn complete_transitions(&self, previous: RulePosition, head_rule: RuleId, goal: RuleId) -> Vec<Transition> {
        let Some(expected) = self.expected_item(previous, goal) else { return Vec::new() };
        let mut transitions = Vec::new();

        if expected == head_rule {
            if previous.is_goal() {
                transitions.push(Transition {
                    action: Action::Goal,
                    to: RulePosition::end(RuleId::GOAL, 0),
                    lookahead: LookaheadSet::runtime(),
                    guard: LookaheadSet::runtime(),
                    runtime_guard: RuntimeGuard::None,
                });
            } else {
                for (to, runtime_guard) in self.next_positions(previous) {
                    transitions.push(Transition {
                        action: Action::Graft,
                        to,
                        lookahead: LookaheadSet::runtime(),
                        guard: self.first_of_rest(to, goal),
                        runtime_guard,
                    });
                }
            }
        }

        if let Some(closure) = self.closures.get(&expected) {
            let context = self.follow_of_expected(previous, goal);
            for parent in &closure.order {
                if !self.is_non_terminal(*parent) {
                    continue;
                }
                for option in 0..self.options(*parent) {
                    let start = RulePosition::start(*parent, option);
                    if self.expected_item(start, goal) != Some(head_rule) {
                        continue;
                    }
                    let lookahead = closure.follow[parent].resolve(&context);
                    for (to, runtime_guard) in self.next_positions(start) {
                        let guard = self.first_of_rest(to, goal).resolve(&lookahead);
                        transitions.push(Transition {
                            action: Action::Height,
                            to,
                            lookahead: lookahead.clone(),
                            guard,
                            runtime_guard,
                        });
                    }
                }
            }
        }

        transitions
    }
}

fn list_next(
    state: RulePosition,
    end: RulePosition,
    min: usize,
    max: Option<usize>,
) -> Vec<(RulePosition, RuntimeGuard)> {
    let mut next = Vec::with_capacity(2);
    if max != Some(1) {
        next.push((state.at(1), RuntimeGuard::Continue { max }));
    }
    next.push((end, RuntimeGuard::Complete { min, max }));
    next
}

fn compute_first_sets(
    grammar: &Grammar,
    embedded: &HashMap<RuleId, Arc<Automaton>>,
) -> (Vec<bool>, Vec<BTreeSet<TerminalId>>) {
    let count = grammar.rules().len();
    let mut nullable = vec![false; count];
    let mut first: Vec<BTreeSet<TerminalId>> = vec![BTreeSet::new(); count];

    loop {
        let mut changed = false;
        for (idx, rule) in grammar.rules().iter().enumerate() {
            let (now_nullable, now_first) = match &rule.rhs {
                RuleRhs::Terminal(t) if t.is_empty() => (true, BTreeSet::new()),
                RuleRhs::Terminal(t) => (false, BTreeSet::from([t.id()])),
                RuleRhs::Choice(alternatives) => {
                    let mut terminals = BTreeSet::new();
                    let mut any_nullable = false;
                    for alternative in alternatives {
                        let mut all_nullable = true;
                        for item in alternative {
                            terminals.extend(first[item.index()].iter().copied());
                            if !nullable[item.index()] {
                                all_nullable = false;
                                break;
                            }
                        }
                        any_nullable |= all_nullable;
                    }
                    (any_nullable, terminals)
                }
                RuleRhs::List { item, min, .. } => (*min == 0 || nullable[item.index()], first[item.index()].clone()),
                RuleRhs::SeparatedList { item, separator, min, .. } => {
                    let mut terminals = first[item.index()].clone();
                    if nullable[item.index()] {
                        terminals.extend(first[separator.index()].iter().copied());
                    }
                    (*min == 0 || nullable[item.index()], terminals)
                }
                RuleRhs::Embedded { goal, .. } => match embedded.get(&RuleId(idx as u32)) {
                    Some(inner) => (inner.nullable[goal.index()], inner.first[goal.index()].clone()),
                    None => (false, BTreeSet::new()),
                },
            };
            if now_nullable != nullable[idx] || now_first.len() != first[idx].len() {
                nullable[idx] = now_nullable;
                first[idx] = now_first;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    (nullable, first)
}
