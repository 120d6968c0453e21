//! Built-in grammars.
//!
//! Each grammar is built once on first use and shared afterwards. They serve
//! as ready-made inputs for the command line binary and as the fixtures of the
//! scenario tests in `grammars/tests.rs`.

use crate::grammar::Grammar;
use std::sync::Arc;

#[path = "grammars/expression.rs"]
mod expression;
#[path = "grammars/json.rs"]
mod json;
#[cfg(test)]
#[path = "grammars/tests.rs"]
mod tests;

/// Arithmetic and boolean expressions; goal `S`.
pub fn expression() -> Arc<Grammar> {
    expression::GRAMMAR.clone()
}

/// JSON values; goal `value`.
pub fn json() -> Arc<Grammar> {
    json::GRAMMAR.clone()
}

/// Built-in grammar by name, together with its goal rule.
pub fn by_name(name: &str) -> Option<(Arc<Grammar>, &'static str)> {
    match name {
        "expression" => Some((expression(), expression::GOAL)),
        "json" => Some((json(), json::GOAL)),
        _ => None,
    }
}
