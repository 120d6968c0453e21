//! Scanner collaborator.
//!
//! The engine never decides what a terminal matches; it asks a [`Scanner`]
//! whether a terminal is present at a position and, for WIDTH actions, for
//! the leaf itself. Nested skip and embedded engines share the scanner of the
//! outermost parse, so implementations must tolerate sequential reuse from
//! nested calls (the default one caches behind a `RefCell`).

use crate::grammar::{Terminal, TerminalKind};
use crate::{Leaf, Range, TerminalId};
use std::cell::RefCell;
use std::collections::HashMap;

pub trait Scanner {
    /// Drop cached matches (called before every new sentence).
    fn reset(&self);

    /// Length of the match of `terminal` starting exactly at `position`.
    fn matched_length(&self, sentence: &str, position: usize, terminal: &Terminal) -> Option<usize>;

    fn is_looking_at(&self, sentence: &str, position: usize, terminal: &Terminal) -> bool {
        self.matched_length(sentence, position, terminal).is_some()
    }

    fn find_or_try_create_leaf(&self, sentence: &str, position: usize, terminal: &Terminal) -> Option<Leaf> {
        self.matched_length(sentence, position, terminal)
            .map(|len| Leaf { terminal: terminal.id(), range: Range { start: position, end: position + len } })
    }
}

/// Default scanner: literal prefix comparison and anchored regex matching,
/// memoized per `(position, terminal)`.
#[derive(Debug, Default)]
pub struct RegexScanner {
    cache: RefCell<HashMap<(usize, TerminalId), Option<usize>>>,
}

impl RegexScanner {
    pub fn new() -> Self {
        Self::default()
    }

    fn scan(sentence: &str, position: usize, terminal: &Terminal) -> Option<usize> {
        let rest = sentence.get(position..)?;
        match terminal.kind() {
            TerminalKind::Empty => Some(0),
            TerminalKind::Literal(text) => rest.starts_with(text.as_str()).then_some(text.len()),
            TerminalKind::Pattern(regex) => regex.find(rest).map(|m| m.end()),
        }
    }
}

impl Scanner for RegexScanner {
    fn reset(&self) {
        self.cache.borrow_mut().clear();
    }

    fn matched_length(&self, sentence: &str, position: usize, terminal: &Terminal) -> Option<usize> {
        let key = (position, terminal.id());
        if let Some(cached) = self.cache.borrow().get(&key) {
            return *cached;
        }
        let found = Self::scan(sentence, position, terminal);
        self.cache.borrow_mut().insert(key, found);
        found
    }
}
