use crate::grammar::{Grammar, GrammarBuilder};
use once_cell::sync::Lazy;
use std::sync::Arc;

pub(super) const GOAL: &str = "value";

pub(super) static GRAMMAR: Lazy<Arc<Grammar>> = Lazy::new(|| Arc::new(build().expect("json grammar is valid")));

fn build() -> Result<Grammar, crate::GrammarError> {
    GrammarBuilder::new("Json")
        .choice(
            "value",
            [
                vec![nt!("object")],
                vec![nt!("array")],
                vec![nt!("string")],
                vec![nt!("number")],
                vec![nt!("literal")],
            ],
        )
        .concatenation("object", [lit!("{"), nt!("members"), lit!("}")])
        .separated_list("members", nt!("member"), lit!(","), 0, None)
        .concatenation("member", [nt!("string"), lit!(":"), nt!("value")])
        .concatenation("array", [lit!("["), nt!("elements"), lit!("]")])
        .separated_list("elements", nt!("value"), lit!(","), 0, None)
        .choice("literal", [vec![lit!("true")], vec![lit!("false")], vec![lit!("null")]])
        .pattern("string", r#""(?:[^"\\]|\\.)*""#)
        .pattern("number", r"-?(?:0|[1-9][0-9]*)(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?")
        .pattern("WS", r"[ \t\r\n]+")
        .skip("WS")
        .build()
}
