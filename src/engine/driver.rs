//! Outer parse loop.
//!
//! `LeftCornerParser` owns what outlives a single parse (the automaton, the
//! scanner and the interrupt flag) and builds a fresh [`Engine`] per call:
//!
//! ```text
//! parse(sentence)
//!   seed goal at 0
//!   while heads remain and no goal covers the sentence:
//!     grow one round                  (metrics per round)
//!   goal found  ──▶ materialize tree  (+ ambiguity warnings)
//!   otherwise   ──▶ one error at the furthest failure position
//! ```
//!
//! `expected_at` runs the same loop over a truncated sentence and reads the
//! failures left at the cut instead of building a tree.

use super::automaton::Automaton;
use super::failure::{Embedding, FlatFailure, Spine};
use super::metrics::{ParseMetrics, RoundMetrics};
use super::parser::{Engine, EngineOptions, EndOfText};
use crate::grammar::Grammar;
use crate::issues::{Issue, IssueCollection, SentenceLocation, context_at};
use crate::scanner::{RegexScanner, Scanner};
use crate::{ExpectedAt, ParseError, ParseOptions, ParseResult, RuleId};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Sticky cancellation flag shared between a parser and whoever wants to
/// stop it. Once set, every growth step fails with
/// [`ParseError::Terminated`] until the parser is reset.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    inner: Arc<InterruptState>,
}

#[derive(Debug, Default)]
struct InterruptState {
    flag: AtomicBool,
    message: Mutex<Option<String>>,
}

impl InterruptHandle {
    pub fn interrupt(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.inner.message.lock() {
            *slot = Some(message.into());
        }
        self.inner.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub fn message(&self) -> String {
        self.inner
            .message
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "parser terminated".to_string())
    }

    pub(crate) fn clear(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.inner.message.lock() {
            *slot = None;
        }
    }
}

impl From<&ParseOptions> for EngineOptions {
    fn from(options: &ParseOptions) -> Self {
        EngineOptions {
            report_ambiguities: options.report_grammar_ambiguities,
            cache_skip: options.cache_skip,
            progress_budget: options.progress_budget,
            skip_enabled: true,
        }
    }
}

/// Scannerless left-corner parser for one grammar.
///
/// # Example
/// ```
/// use leftcorner::{LeftCornerParser, grammars};
///
/// let parser = LeftCornerParser::new(grammars::expression());
/// let result = parser.parse_for_goal("S", "a + b * c").unwrap();
/// assert!(result.tree.is_some());
/// ```
pub struct LeftCornerParser {
    automaton: Arc<Automaton>,
    scanner: Box<dyn Scanner>,
    interrupt: InterruptHandle,
}

impl LeftCornerParser {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        Self::from_automaton(Arc::new(Automaton::new(grammar)))
    }

    pub fn from_automaton(automaton: Arc<Automaton>) -> Self {
        LeftCornerParser { automaton, scanner: Box::new(RegexScanner::new()), interrupt: InterruptHandle::default() }
    }

    pub fn with_scanner(mut self, scanner: Box<dyn Scanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn automaton(&self) -> &Arc<Automaton> {
        &self.automaton
    }

    /// Validate `goal` ahead of the first parse.
    pub fn build_for(&self, goal: &str) -> Result<(), ParseError> {
        self.automaton.build_for(goal)
    }

    pub fn interrupt(&self, message: impl Into<String>) {
        self.interrupt.interrupt(message);
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Clear the interrupt flag and the scanner cache.
    pub fn reset(&self) {
        self.interrupt.clear();
        self.scanner.reset();
    }

    pub fn parse_for_goal(&self, goal: &str, sentence: &str) -> Result<ParseResult, ParseError> {
        self.parse(sentence, &ParseOptions::for_goal(goal))
    }

    pub fn parse(&self, sentence: &str, options: &ParseOptions) -> Result<ParseResult, ParseError> {
        let started = Instant::now();
        let goal = self.goal_for(options)?;
        self.scanner.reset();

        let sentence: Arc<str> = Arc::from(sentence);
        let identity = options.sentence_identity.map(|identify| identify(&*sentence));
        let mut engine = self.engine(goal, sentence.clone(), options);
        engine.start(0)?;

        let mut metrics = ParseMetrics::default();
        let growth_started = Instant::now();
        while engine.can_grow() && engine.full_match().is_none() {
            let heads = engine.head_count();
            let round_started = Instant::now();
            let round = engine.grow()?;
            let duration = round_started.elapsed();
            debug!(position = round.position, heads, steps = round.steps, actions = ?round.actions, "round");
            metrics.max_heads = metrics.max_heads.max(heads);
            metrics.rounds.push(RoundMetrics {
                position: round.position,
                heads,
                steps: round.steps,
                actions: round.actions,
                duration,
            });
        }
        metrics.growth = growth_started.elapsed();
        metrics.nodes = engine.node_count();

        let mut issues = IssueCollection::default();
        if options.report_grammar_ambiguities {
            for report in engine.ambiguities() {
                let location = SentenceLocation::in_sentence(&sentence, report.position, 0, identity.clone());
                let message = format!(
                    "Ambiguity on [{}] at position {} with lookahead {{{}}}",
                    report.rules.join(", "),
                    report.position,
                    report.lookahead.join(", ")
                );
                issues.push(Issue::warning(location, message));
            }
        }

        let tree = match engine.full_match() {
            Some(goal) => {
                let tree_started = Instant::now();
                let tree = engine.materialize(goal);
                metrics.tree = tree_started.elapsed();
                Some(tree)
            }
            None => {
                if options.report_errors {
                    issues.push(failure_issue(&engine, &sentence, identity));
                }
                None
            }
        };
        metrics.total = started.elapsed();
        debug!(
            matched = tree.is_some(),
            rounds = metrics.rounds.len(),
            nodes = metrics.nodes,
            max_heads = metrics.max_heads,
            "parse finished"
        );

        Ok(ParseResult { tree, issues, metrics })
    }

    /// Continuations that were live at `position`.
    ///
    /// A cursor inside a word is moved back to the start of the word, so the
    /// word itself is among the expected terminals.
    pub fn expected_at(&self, sentence: &str, position: usize, options: &ParseOptions) -> Result<ExpectedAt, ParseError> {
        let goal = self.goal_for(options)?;
        self.scanner.reset();

        let mut cut = position.min(sentence.len());
        while !sentence.is_char_boundary(cut) {
            cut -= 1;
        }
        let used_position = regex!(r"\w+$").find(&sentence[..cut]).map_or(cut, |m| m.start());

        let mut engine = self.engine(goal, Arc::from(&sentence[..used_position]), options);
        engine.start(0)?;
        engine.run_to_end()?;

        let automaton = engine.automaton();
        let mut flat = Vec::new();
        for reason in engine.failures().at(used_position) {
            reason.flatten(&mut Vec::new(), &mut flat);
        }
        let spines = flat.iter().map(|f| f.reason.spine(automaton).clone()).collect();
        debug!(position, used_position, "expected at");

        Ok(ExpectedAt { used_position, spines })
    }

    /// Terminal tags that may appear at `position`.
    pub fn expected_terminals_at(
        &self,
        sentence: &str,
        position: usize,
        options: &ParseOptions,
    ) -> Result<BTreeSet<String>, ParseError> {
        let expected = self.expected_at(sentence, position, options)?;
        Ok(expected.spines.iter().flat_map(Spine::expected_terminals).map(str::to_string).collect())
    }

    fn goal_for(&self, options: &ParseOptions) -> Result<RuleId, ParseError> {
        if !options.enabled {
            return Err(ParseError::Disabled);
        }
        let goal = options.goal_rule.as_deref().ok_or(ParseError::GoalRequired)?;
        self.automaton.start_state_for(goal)
    }

    fn engine(&self, goal: RuleId, sentence: Arc<str>, options: &ParseOptions) -> Engine<'_> {
        Engine::new(
            &self.automaton,
            goal,
            sentence,
            self.scanner.as_ref(),
            &self.interrupt,
            EngineOptions::from(options),
            EndOfText::Sentence,
        )
    }
}

/// The single error issue of a failed parse, built from the failures at the
/// furthest position reached.
fn failure_issue(engine: &Engine<'_>, sentence: &str, identity: Option<String>) -> Issue {
    let automaton = engine.automaton();
    let (position, reasons) = match engine.failures().furthest() {
        Some((position, reasons)) => (position, reasons),
        None => (0, &[][..]),
    };

    let mut flat: Vec<FlatFailure<'_>> = Vec::new();
    for reason in reasons {
        reason.flatten(&mut Vec::new(), &mut flat);
    }

    let mut expected = BTreeSet::new();
    for failure in &flat {
        expected.extend(failure.reason.spine(automaton).expected.iter().cloned());
    }

    let mut message = format!(
        "Failed to match {{{}}} at: {}",
        expected.iter().map(String::as_str).collect::<Vec<_>>().join(" | "),
        context_at(sentence, position)
    );
    let embeddings: BTreeSet<&[Embedding<'_>]> =
        flat.iter().map(|f| f.embedding.as_slice()).filter(|e| !e.is_empty()).collect();
    for embedding in embeddings {
        let chain: Vec<String> = embedding
            .iter()
            .map(|e| format!("rule '{}' of '{}' parsed with grammar '{}'", e.rule, e.host, e.grammar))
            .collect();
        let _ = write!(message, " (in {})", chain.join(", in "));
    }

    let length = sentence.len().saturating_sub(position).min(1);
    Issue::error(SentenceLocation::in_sentence(sentence, position, length, identity), message, expected)
}
