//! Ambiguity and precedence resolution.
//!
//! A complete head may be reducible in several ways at once: grafted onto the
//! rule that was waiting for it, or used to start (HEIGHT) a new parent. After
//! the engine has dropped every candidate whose guards fail, this module picks
//! the subset that is actually applied.
//!
//! ```text
//! candidates ──▶ precedence declared for head rule? ──yes──▶ by_precedence
//!                                                  └─no───▶ by_default
//! ```
//!
//! ## Default
//!
//! Candidates are grouped by target rule. When a group has a GRAFT, its
//! HEIGHTs are dropped (continue the left operand rather than opening a new
//! level), and only the GRAFTs onto the left-most previous node are kept.
//!
//! ## Declared precedence
//!
//! A candidate *participates* in a precedence option when it leads into the
//! option's target rule and:
//!
//! - HEIGHT: the scanner sees one of the option's operators right after the
//!   head (or the option lists no operators);
//! - GRAFT: it completes the target rule.
//!
//! Only participants of the highest precedence survive; candidates that
//! participate in nothing are kept. A tie between GRAFT and HEIGHT is settled by
//! associativity: LEFT keeps the GRAFT, RIGHT the HEIGHT, NONE keeps both.
//!
//! Whatever survives is applied. If more than one target remains, the result
//! is reported as ambiguous by the caller.

use super::automaton::{Action, Transition};
use super::gss::NodeId;
use super::lookahead::LookaheadSet;
use crate::grammar::{Associativity, PrecedenceOption, PrecedenceRules};
use crate::{RuleId, TerminalId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) previous: NodeId,
    pub(crate) previous_start: usize,
    pub(crate) transition: Transition,
    /// Lookahead of the node to create, resolved.
    pub(crate) lookahead: LookaheadSet,
    /// Guard, resolved.
    pub(crate) guard: LookaheadSet,
    /// List item count of the node to create.
    pub(crate) count: usize,
}

impl Candidate {
    fn action(&self) -> Action {
        self.transition.action
    }

    fn target(&self) -> RuleId {
        self.transition.to.rule
    }
}

pub(crate) fn resolve(
    precedence: Option<&PrecedenceRules>,
    looking_at: impl Fn(TerminalId) -> bool,
    candidates: Vec<Candidate>,
) -> Vec<Candidate> {
    if candidates.len() < 2 {
        return candidates;
    }
    match precedence {
        Some(rules) if !rules.options.is_empty() => by_precedence(rules, looking_at, candidates),
        _ => by_default(candidates),
    }
}

/// Distinct `(action, target rule)` pairs among the chosen candidates, if
/// there is more than one.
pub(crate) fn competing(chosen: &[Candidate]) -> Option<Vec<(Action, RuleId)>> {
    let mut seen = HashSet::new();
    let distinct: Vec<(Action, RuleId)> =
        chosen.iter().map(|c| (c.action(), c.target())).filter(|pair| seen.insert(*pair)).collect();
    (distinct.len() > 1).then_some(distinct)
}

fn by_default(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut leftmost_graft: HashMap<RuleId, usize> = HashMap::new();
    for candidate in candidates.iter().filter(|c| c.action() == Action::Graft) {
        leftmost_graft
            .entry(candidate.target())
            .and_modify(|start| *start = (*start).min(candidate.previous_start))
            .or_insert(candidate.previous_start);
    }

    candidates
        .into_iter()
        .filter(|c| match (c.action(), leftmost_graft.get(&c.target())) {
            (Action::Height, Some(_)) => false,
            (Action::Graft, Some(start)) => c.previous_start == *start,
            _ => true,
        })
        .collect()
}

fn participates(option: &PrecedenceOption, candidate: &Candidate, looking_at: &impl Fn(TerminalId) -> bool) -> bool {
    if option.target != candidate.target() {
        return false;
    }
    match candidate.action() {
        Action::Height => option.operators.is_empty() || option.operators.iter().any(|t| looking_at(*t)),
        Action::Graft => candidate.transition.to.is_complete(),
        _ => false,
    }
}

fn by_precedence(
    rules: &PrecedenceRules,
    looking_at: impl Fn(TerminalId) -> bool,
    candidates: Vec<Candidate>,
) -> Vec<Candidate> {
    let ranked: Vec<(Candidate, Option<&PrecedenceOption>)> = candidates
        .into_iter()
        .map(|c| {
            let option =
                rules.options.iter().filter(|o| participates(o, &c, &looking_at)).max_by_key(|o| o.precedence);
            (c, option)
        })
        .collect();

    let Some(top) = ranked.iter().filter_map(|(_, o)| *o).max_by_key(|o| o.precedence) else {
        return ranked.into_iter().map(|(c, _)| c).collect();
    };

    let at_top = |o: &Option<&PrecedenceOption>| o.is_some_and(|o| o.precedence == top.precedence);
    let has_graft = ranked.iter().any(|(c, o)| at_top(o) && c.action() == Action::Graft);
    let has_height = ranked.iter().any(|(c, o)| at_top(o) && c.action() == Action::Height);
    let tie = has_graft && has_height;

    ranked
        .into_iter()
        .filter(|(c, o)| match o {
            None => true,
            Some(o) if o.precedence < top.precedence => false,
            Some(_) if !tie => true,
            Some(_) => match top.associativity {
                Associativity::Left => c.action() == Action::Graft,
                Associativity::Right => c.action() == Action::Height,
                Associativity::None => true,
            },
        })
        .map(|(c, _)| c)
        .collect()
}
