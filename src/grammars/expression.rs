use crate::grammar::{Grammar, GrammarBuilder};
use once_cell::sync::Lazy;
use std::sync::Arc;

pub(super) const GOAL: &str = "S";

// Declared literally below, so building cannot fail.
pub(super) static GRAMMAR: Lazy<Arc<Grammar>> = Lazy::new(|| Arc::new(build().expect("expression grammar is valid")));

fn build() -> Result<Grammar, crate::GrammarError> {
    GrammarBuilder::new("Expression")
        .concatenation("S", [nt!("expr")])
        .choice(
            "expr",
            [
                vec![nt!("var")],
                vec![nt!("bool")],
                vec![nt!("group")],
                vec![nt!("div")],
                vec![nt!("mul")],
                vec![nt!("add")],
                vec![nt!("sub")],
            ],
        )
        .concatenation("var", [nt!("NAME")])
        .choice("bool", [vec![lit!("true")], vec![lit!("false")]])
        .concatenation("group", [lit!("("), nt!("expr"), lit!(")")])
        .concatenation("div", [nt!("expr"), lit!("/"), nt!("expr")])
        .concatenation("mul", [nt!("expr"), lit!("*"), nt!("expr")])
        .concatenation("add", [nt!("expr"), lit!("+"), nt!("expr")])
        .concatenation("sub", [nt!("expr"), lit!("-"), nt!("expr")])
        .pattern("NAME", "[a-zA-Z_][a-zA-Z0-9_]*")
        .pattern("WS", r"\s+")
        .pattern("COMMENT", r"//[^\n]*")
        .skip("WS")
        .skip("COMMENT")
        .precedence("expr", |p| {
            p.left("var", [])
                .left("bool", [])
                .left("group", [])
                .left("div", [lit!("/")])
                .left("mul", [lit!("*")])
                .left("add", [lit!("+")])
                .left("sub", [lit!("-")])
        })
        .build()
}
