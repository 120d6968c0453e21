//! In-memory grammar model.
//!
//! A [`Grammar`] is the read-only input of the runtime automaton. It is
//! assembled with a [`GrammarBuilder`]:
//!
//! ```text
//! GrammarBuilder::new("Expr")
//!     .concatenation("S", [nt!("expr")])
//!     .choice("expr", [vec![nt!("var")], vec![nt!("add")]])
//!     .concatenation("add", [nt!("expr"), lit!("+"), nt!("expr")])
//!     .concatenation("var", [nt!("NAME")])
//!     .pattern("NAME", "[a-z]+")
//!     .pattern("WS", r"\s+")
//!     .skip("WS")
//!     .build()?
//! ```
//!
//! ## Rule shapes
//!
//! - **Terminal**: a named literal or pattern, or an anonymous one interned
//!   from a `lit!`/`pat!` item. Anonymous terminals are tagged `'text'` and
//!   `"pattern"` in diagnostics.
//! - **Choice**: ordered alternatives; a concatenation is a choice with one
//!   alternative. An empty alternative matches the built-in `<EMPTY>` terminal.
//! - **List** / **SeparatedList**: repetition with a minimum and an optional
//!   maximum item count. The counts are enforced at parse time by runtime
//!   guards rather than by unrolling states.
//! - **Embedded**: the rule is matched by parsing another grammar from one of
//!   its rules.
//!
//! Skip rules (whitespace, comments) are collected into the generated `<SKIP>`
//! list rule, which is the goal of the skip automaton.
//!
//! ## Invariants
//!
//! - Rule `0` is always `<EMPTY>`.
//! - `RuleId` indexes `Grammar::rules`; generated rules come after declared
//!   rules and interned terminals.

use crate::{RuleId, TerminalId};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

static NEXT_TERMINAL_ID: AtomicU32 = AtomicU32::new(0);

pub(crate) const EMPTY_TAG: &str = "<EMPTY>";
pub(crate) const GOAL_NAME: &str = "<GOAL>";
const SKIP_GOAL_NAME: &str = "<SKIP>";
const SKIP_CHOICE_NAME: &str = "<SKIP_CHOICE>";

/// Errors raised while assembling a grammar.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("Duplicate rule '{0}'")]
    DuplicateRule(String),

    #[error("Unknown rule '{name}' referenced from '{from}'")]
    UnknownRule { name: String, from: String },

    #[error("Invalid pattern for '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid repetition range for '{rule}': min {min}, max {max}")]
    InvalidRange { rule: String, min: usize, max: usize },

    #[error("Precedence operator '{operator}' of '{rule}' is not a terminal")]
    NotATerminal { rule: String, operator: String },
}

// --- Terminals ---------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) enum TerminalKind {
    Empty,
    Literal(String),
    /// Anchored at the start of the haystack (`^(?:...)`).
    Pattern(Regex),
}

/// A terminal descriptor: what the scanner is asked to match.
#[derive(Debug, Clone)]
pub struct Terminal {
    id: TerminalId,
    tag: Arc<str>,
    kind: TerminalKind,
}

impl Terminal {
    fn new(tag: &str, kind: TerminalKind) -> Self {
        Terminal { id: TerminalId(NEXT_TERMINAL_ID.fetch_add(1, Ordering::Relaxed)), tag: Arc::from(tag), kind }
    }

    fn literal(tag: &str, text: &str) -> Self {
        Self::new(tag, TerminalKind::Literal(text.to_string()))
    }

    fn pattern(rule: &str, tag: &str, pattern: &str) -> Result<Self, GrammarError> {
        let regex = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|source| GrammarError::InvalidPattern { rule: rule.to_string(), source })?;
        Ok(Self::new(tag, TerminalKind::Pattern(regex)))
    }

    pub fn id(&self) -> TerminalId {
        self.id
    }

    /// Name used in diagnostics: the rule name for named terminals, `'text'`
    /// or `"pattern"` for anonymous ones.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, TerminalKind::Empty)
    }

    pub(crate) fn kind(&self) -> &TerminalKind {
        &self.kind
    }
}

// --- Rules -------------------------------------------------------------------

/// An item on the right-hand side of a rule, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Rule(String),
    Literal(String),
    Pattern(String),
}

#[derive(Debug, Clone)]
pub(crate) enum RuleRhs {
    Terminal(Terminal),
    Choice(Vec<Vec<RuleId>>),
    List { item: RuleId, min: usize, max: Option<usize> },
    SeparatedList { item: RuleId, separator: RuleId, min: usize, max: Option<usize> },
    Embedded { grammar: Arc<Grammar>, goal: RuleId },
}

#[derive(Debug, Clone)]
pub(crate) struct Rule {
    pub(crate) name: Arc<str>,
    pub(crate) rhs: RuleRhs,
    pub(crate) skip: bool,
}

impl Rule {
    pub(crate) fn terminal(&self) -> Option<&Terminal> {
        match &self.rhs {
            RuleRhs::Terminal(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Associativity {
    Left,
    Right,
    None,
}

#[derive(Debug, Clone)]
pub(crate) struct PrecedenceOption {
    /// Higher binds tighter.
    pub(crate) precedence: u32,
    pub(crate) target: RuleId,
    /// Terminals that trigger this option when seen as lookahead. Empty means
    /// the option applies regardless of lookahead.
    pub(crate) operators: Vec<TerminalId>,
    pub(crate) associativity: Associativity,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PrecedenceRules {
    pub(crate) options: Vec<PrecedenceOption>,
}

/// Declares precedence options for one governing rule.
///
/// Options declared first bind tightest.
#[derive(Debug, Default)]
pub struct PrecedenceBuilder {
    options: Vec<(String, Vec<Item>, Associativity)>,
}

impl PrecedenceBuilder {
    pub fn option(
        mut self,
        target: &str,
        operators: impl IntoIterator<Item = Item>,
        associativity: Associativity,
    ) -> Self {
        self.options.push((target.to_string(), operators.into_iter().collect(), associativity));
        self
    }

    pub fn left(self, target: &str, operators: impl IntoIterator<Item = Item>) -> Self {
        self.option(target, operators, Associativity::Left)
    }

    pub fn right(self, target: &str, operators: impl IntoIterator<Item = Item>) -> Self {
        self.option(target, operators, Associativity::Right)
    }

    pub fn none(self, target: &str, operators: impl IntoIterator<Item = Item>) -> Self {
        self.option(target, operators, Associativity::None)
    }
}

// --- Grammar -----------------------------------------------------------------

#[derive(Debug)]
pub struct Grammar {
    name: Arc<str>,
    rules: Vec<Rule>,
    by_name: HashMap<Arc<str>, RuleId>,
    skip_goal: Option<RuleId>,
    precedence: HashMap<RuleId, PrecedenceRules>,
}

impl Grammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find_rule(&self, name: &str) -> Option<RuleId> {
        self.by_name.get(name).copied()
    }

    pub fn rule_name(&self, id: RuleId) -> &str {
        if id == RuleId::GOAL {
            return GOAL_NAME;
        }
        self.rules.get(id.index()).map(|r| &*r.name).unwrap_or("<unknown>")
    }

    /// Names of the rules declared through the builder (generated rules excluded).
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|n| &**n).filter(|n| *n != EMPTY_TAG).collect();
        names.sort_unstable();
        names
    }

    pub fn has_skip(&self) -> bool {
        self.skip_goal.is_some()
    }

    /// Names of the rules marked as skip content, in declaration order.
    pub fn skip_rules(&self) -> Vec<&str> {
        self.rules.iter().filter(|r| r.skip).map(|r| &*r.name).collect()
    }

    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub(crate) fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub(crate) fn skip_goal(&self) -> Option<RuleId> {
        self.skip_goal
    }

    pub(crate) fn precedence_for(&self, rule: RuleId) -> Option<&PrecedenceRules> {
        self.precedence.get(&rule)
    }
}

// --- Builder -----------------------------------------------------------------

#[derive(Debug)]
enum Body {
    Choice(Vec<Vec<Item>>),
    List { item: Item, min: usize, max: Option<usize> },
    SeparatedList { item: Item, separator: Item, min: usize, max: Option<usize> },
    Literal(String),
    Pattern(String),
    Embedded { grammar: Arc<Grammar>, goal: String },
}

#[derive(Debug)]
pub struct GrammarBuilder {
    name: String,
    rules: Vec<(String, Body)>,
    skip: Vec<String>,
    precedence: Vec<(String, PrecedenceBuilder)>,
}

impl GrammarBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        GrammarBuilder { name: name.into(), rules: Vec::new(), skip: Vec::new(), precedence: Vec::new() }
    }

    pub fn concatenation(mut self, name: &str, items: impl IntoIterator<Item = Item>) -> Self {
        self.rules.push((name.to_string(), Body::Choice(vec![items.into_iter().collect()])));
        self
    }

    pub fn choice<I, A>(mut self, name: &str, alternatives: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: IntoIterator<Item = Item>,
    {
        let alternatives = alternatives.into_iter().map(|a| a.into_iter().collect()).collect();
        self.rules.push((name.to_string(), Body::Choice(alternatives)));
        self
    }

    pub fn list(mut self, name: &str, item: Item, min: usize, max: Option<usize>) -> Self {
        self.rules.push((name.to_string(), Body::List { item, min, max }));
        self
    }

    pub fn separated_list(mut self, name: &str, item: Item, separator: Item, min: usize, max: Option<usize>) -> Self {
        self.rules.push((name.to_string(), Body::SeparatedList { item, separator, min, max }));
        self
    }

    pub fn literal(mut self, name: &str, text: &str) -> Self {
        self.rules.push((name.to_string(), Body::Literal(text.to_string())));
        self
    }

    pub fn pattern(mut self, name: &str, pattern: &str) -> Self {
        self.rules.push((name.to_string(), Body::Pattern(pattern.to_string())));
        self
    }

    /// A rule matched by parsing `grammar` from its rule `goal`.
    pub fn embedded(mut self, name: &str, grammar: Arc<Grammar>, goal: &str) -> Self {
        self.rules.push((name.to_string(), Body::Embedded { grammar, goal: goal.to_string() }));
        self
    }

    /// Mark an already declared rule as skip content.
    pub fn skip(mut self, name: &str) -> Self {
        self.skip.push(name.to_string());
        self
    }

    pub fn precedence(mut self, rule: &str, declare: impl FnOnce(PrecedenceBuilder) -> PrecedenceBuilder) -> Self {
        self.precedence.push((rule.to_string(), declare(PrecedenceBuilder::default())));
        self
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        let GrammarBuilder { name, rules: declared, skip, precedence } = self;

        let mut by_name: HashMap<Arc<str>, RuleId> = HashMap::new();
        by_name.insert(Arc::from(EMPTY_TAG), RuleId(0));
        for (idx, (rule_name, _)) in declared.iter().enumerate() {
            if by_name.insert(Arc::from(rule_name.as_str()), RuleId(idx as u32 + 1)).is_some() {
                return Err(GrammarError::DuplicateRule(rule_name.clone()));
            }
        }

        let empty = Terminal::new(EMPTY_TAG, TerminalKind::Empty);
        let mut interner = Interner { by_name: &by_name, next: declared.len() as u32 + 1, by_tag: HashMap::new(), rules: Vec::new() };
        let mut rules = vec![Rule { name: Arc::from(EMPTY_TAG), rhs: RuleRhs::Terminal(empty), skip: false }];

        for (rule_name, body) in declared {
            let rhs = match body {
                Body::Choice(alternatives) => {
                    let mut resolved = Vec::with_capacity(alternatives.len());
                    for alternative in alternatives {
                        if alternative.is_empty() {
                            resolved.push(vec![RuleId(0)]);
                            continue;
                        }
                        let items =
                            alternative.iter().map(|i| interner.resolve(i, &rule_name)).collect::<Result<Vec<_>, _>>()?;
                        resolved.push(items);
                    }
                    RuleRhs::Choice(resolved)
                }
                Body::List { item, min, max } => {
                    check_range(&rule_name, min, max)?;
                    RuleRhs::List { item: interner.resolve(&item, &rule_name)?, min, max }
                }
                Body::SeparatedList { item, separator, min, max } => {
                    check_range(&rule_name, min, max)?;
                    RuleRhs::SeparatedList {
                        item: interner.resolve(&item, &rule_name)?,
                        separator: interner.resolve(&separator, &rule_name)?,
                        min,
                        max,
                    }
                }
                Body::Literal(text) => RuleRhs::Terminal(Terminal::literal(&rule_name, &text)),
                Body::Pattern(pattern) => RuleRhs::Terminal(Terminal::pattern(&rule_name, &rule_name, &pattern)?),
                Body::Embedded { grammar, goal } => {
                    let goal_id = grammar
                        .find_rule(&goal)
                        .ok_or_else(|| GrammarError::UnknownRule { name: goal.clone(), from: rule_name.clone() })?;
                    RuleRhs::Embedded { grammar, goal: goal_id }
                }
            };
            rules.push(Rule { name: Arc::from(rule_name.as_str()), rhs, skip: false });
        }

        let mut precedence_rules: HashMap<RuleId, PrecedenceRules> = HashMap::new();
        for (context, declared_options) in precedence {
            let context_id = by_name
                .get(context.as_str())
                .copied()
                .ok_or_else(|| GrammarError::UnknownRule { name: context.clone(), from: "<precedence>".to_string() })?;
            let count = declared_options.options.len() as u32;
            let mut options = Vec::with_capacity(declared_options.options.len());
            for (idx, (target, operators, associativity)) in declared_options.options.into_iter().enumerate() {
                let target_id = by_name
                    .get(target.as_str())
                    .copied()
                    .ok_or_else(|| GrammarError::UnknownRule { name: target.clone(), from: context.clone() })?;
                let mut operator_ids = Vec::with_capacity(operators.len());
                for operator in &operators {
                    let id = interner.resolve(operator, &context)?;
                    let terminal = interner.terminal(&rules, id).ok_or_else(|| GrammarError::NotATerminal {
                        rule: context.clone(),
                        operator: format!("{:?}", operator),
                    })?;
                    operator_ids.push(terminal);
                }
                options.push(PrecedenceOption {
                    precedence: count - idx as u32,
                    target: target_id,
                    operators: operator_ids,
                    associativity,
                });
            }
            precedence_rules.entry(context_id).or_default().options.extend(options);
        }

        rules.extend(interner.rules);

        let mut skip_ids = Vec::with_capacity(skip.len());
        for skip_name in &skip {
            let id = by_name
                .get(skip_name.as_str())
                .copied()
                .ok_or_else(|| GrammarError::UnknownRule { name: skip_name.clone(), from: "<skip>".to_string() })?;
            rules[id.index()].skip = true;
            skip_ids.push(id);
        }

        let skip_goal = if skip_ids.is_empty() {
            None
        } else {
            let choice = RuleId(rules.len() as u32);
            rules.push(Rule {
                name: Arc::from(SKIP_CHOICE_NAME),
                rhs: RuleRhs::Choice(skip_ids.iter().map(|id| vec![*id]).collect()),
                skip: true,
            });
            let goal = RuleId(rules.len() as u32);
            rules.push(Rule {
                name: Arc::from(SKIP_GOAL_NAME),
                rhs: RuleRhs::List { item: choice, min: 1, max: None },
                skip: true,
            });
            Some(goal)
        };

        Ok(Grammar { name: Arc::from(name.as_str()), rules, by_name, skip_goal, precedence: precedence_rules })
    }
}

fn check_range(rule: &str, min: usize, max: Option<usize>) -> Result<(), GrammarError> {
    match max {
        Some(max) if max == 0 || min > max => Err(GrammarError::InvalidRange { rule: rule.to_string(), min, max }),
        _ => Ok(()),
    }
}

/// Resolves items to rule ids, interning anonymous terminals as new rules.
struct Interner<'a> {
    by_name: &'a HashMap<Arc<str>, RuleId>,
    next: u32,
    by_tag: HashMap<String, RuleId>,
    rules: Vec<Rule>,
}

impl Interner<'_> {
    fn resolve(&mut self, item: &Item, from: &str) -> Result<RuleId, GrammarError> {
        match item {
            Item::Rule(name) => self
                .by_name
                .get(name.as_str())
                .copied()
                .ok_or_else(|| GrammarError::UnknownRule { name: name.clone(), from: from.to_string() }),
            Item::Literal(text) => {
                let tag = format!("'{}'", text);
                if let Some(id) = self.by_tag.get(&tag) {
                    return Ok(*id);
                }
                Ok(self.intern(tag.clone(), Terminal::literal(&tag, text)))
            }
            Item::Pattern(pattern) => {
                let tag = format!("\"{}\"", pattern);
                if let Some(id) = self.by_tag.get(&tag) {
                    return Ok(*id);
                }
                let terminal = Terminal::pattern(from, &tag, pattern)?;
                Ok(self.intern(tag, terminal))
            }
        }
    }

    fn intern(&mut self, tag: String, terminal: Terminal) -> RuleId {
        let id = RuleId(self.next);
        self.next += 1;
        self.rules.push(Rule { name: Arc::from(tag.as_str()), rhs: RuleRhs::Terminal(terminal), skip: false });
        self.by_tag.insert(tag, id);
        id
    }

    /// Terminal id of `id`, looking at both declared and interned rules.
    fn terminal(&self, declared: &[Rule], id: RuleId) -> Option<TerminalId> {
        let rule = declared.get(id.index()).or_else(|| self.rules.get(id.index() - declared.len()))?;
        rule.terminal().map(Terminal::id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arithmetic() -> GrammarBuilder {
        GrammarBuilder::new("Arithmetic")
            .concatenation("S", [nt!("expr")])
            .choice("expr", [vec![nt!("var")], vec![nt!("add")]])
            .concatenation("add", [nt!("expr"), lit!("+"), nt!("expr")])
            .concatenation("var", [nt!("NAME")])
            .pattern("NAME", "[a-z]+")
            .pattern("WS", r"\s+")
            .skip("WS")
    }

    #[test]
    fn build_resolves_names_and_interns_literals() {
        let grammar = arithmetic().build().unwrap();

        let add = grammar.find_rule("add").unwrap();
        let RuleRhs::Choice(alternatives) = &grammar.rule(add).rhs else { panic!("add should be a choice") };
        assert_eq!(alternatives.len(), 1);
        assert_eq!(grammar.rule_name(alternatives[0][0]), "expr");
        assert_eq!(grammar.rule_name(alternatives[0][1]), "'+'");
        assert!(grammar.rule(alternatives[0][1]).terminal().is_some());
    }

    #[test]
    fn skip_rules_generate_skip_goal() {
        let grammar = arithmetic().build().unwrap();
        let goal = grammar.skip_goal().unwrap();
        assert!(matches!(grammar.rule(goal).rhs, RuleRhs::List { min: 1, max: None, .. }));
        assert!(grammar.rule(grammar.find_rule("WS").unwrap()).skip);
        assert!(!grammar.rule(grammar.find_rule("NAME").unwrap()).skip);
        assert_eq!(grammar.skip_rules(), vec!["WS"]);
    }

    #[test]
    fn empty_alternative_uses_empty_terminal() {
        let grammar = GrammarBuilder::new("Opt")
            .choice("opt", [vec![lit!("x")], vec![]])
            .build()
            .unwrap();
        let RuleRhs::Choice(alternatives) = &grammar.rule(grammar.find_rule("opt").unwrap()).rhs else {
            panic!("opt should be a choice")
        };
        assert_eq!(alternatives[1], vec![RuleId(0)]);
        assert!(grammar.rule(RuleId(0)).terminal().unwrap().is_empty());
    }

    #[test]
    fn unknown_rule_is_reported_with_referencing_rule() {
        let err = GrammarBuilder::new("Bad").concatenation("S", [nt!("missing")]).build().unwrap_err();
        match err {
            GrammarError::UnknownRule { name, from } => {
                assert_eq!(name, "missing");
                assert_eq!(from, "S");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn duplicate_rules_are_rejected() {
        let err = GrammarBuilder::new("Dup").literal("A", "a").literal("A", "b").build().unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule(name) if name == "A"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = GrammarBuilder::new("Bad").pattern("P", "(").build().unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { ref rule, .. } if rule == "P"));
    }

    #[test]
    fn invalid_list_range_is_rejected() {
        let err = GrammarBuilder::new("Bad").list("L", lit!("a"), 3, Some(2)).build().unwrap_err();
        assert!(matches!(err, GrammarError::InvalidRange { min: 3, max: 2, .. }));
    }

    #[test]
    fn precedence_first_declared_binds_tightest() {
        let grammar = arithmetic()
            .concatenation("mul", [nt!("expr"), lit!("*"), nt!("expr")])
            .precedence("expr", |p| p.left("mul", [lit!("*")]).left("add", [lit!("+")]))
            .build()
            .unwrap();
        let rules = grammar.precedence_for(grammar.find_rule("expr").unwrap()).unwrap();
        assert_eq!(rules.options.len(), 2);
        assert!(rules.options[0].precedence > rules.options[1].precedence);
        assert_eq!(rules.options[0].operators.len(), 1);
    }
}
