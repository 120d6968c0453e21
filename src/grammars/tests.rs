#![allow(clippy::unwrap_used)]

use super::{expression, json};
use crate::sppt::{SharedPackedParseTree, SpptNodeId, SpptNodeKind};
use crate::{Grammar, GrammarBuilder, LeftCornerParser, ParseError, ParseOptions, ParseResult};
use rstest::rstest;
use std::collections::BTreeSet;
use std::sync::Arc;

const OPERATORS: [&str; 6] = ["'+'", "'-'", "'*'", "'/'", "'('", "')'"];

fn parse(grammar: Arc<Grammar>, goal: &str, sentence: &str) -> ParseResult {
    LeftCornerParser::new(grammar).parse_for_goal(goal, sentence).unwrap()
}

/// `rule(child, ..)` with pass-through rules collapsed and operator leaves
/// left out; leaves render as their text.
fn shape(tree: &SharedPackedParseTree, id: SpptNodeId) -> String {
    let node = tree.node(id);
    match &node.kind {
        SpptNodeKind::Leaf => tree.text(id).to_string(),
        SpptNodeKind::Embedded(inner) => format!("{}[{}]", node.name, shape(inner, inner.root())),
        SpptNodeKind::Branch => {
            let children: Vec<SpptNodeId> =
                tree.children(id).iter().copied().filter(|c| !OPERATORS.contains(&&*tree.node(*c).name)).collect();
            if matches!(&*node.name, "S" | "expr" | "value") && children.len() == 1 {
                return shape(tree, children[0]);
            }
            let inner: Vec<String> = children.iter().map(|c| shape(tree, *c)).collect();
            format!("{}({})", node.name, inner.join(", "))
        }
    }
}

fn tree_shape(result: &ParseResult) -> String {
    let tree = result.tree.as_ref().unwrap();
    shape(tree, tree.root())
}

fn sum_grammar(declare: impl FnOnce(crate::PrecedenceBuilder) -> crate::PrecedenceBuilder) -> Arc<Grammar> {
    let grammar = GrammarBuilder::new("Sum")
        .concatenation("S", [nt!("expr")])
        .choice("expr", [vec![nt!("var")], vec![nt!("add")]])
        .concatenation("add", [nt!("expr"), lit!("+"), nt!("expr")])
        .concatenation("var", [nt!("NAME")])
        .pattern("NAME", "[a-z]+")
        .pattern("WS", r"\s+")
        .skip("WS")
        .precedence("expr", declare)
        .build()
        .unwrap();
    Arc::new(grammar)
}

// --- Expression scenario ------------------------------------------------------

#[rstest]
#[case("a+b*c", "add(var(a), mul(var(b), var(c)))")]
#[case("a*b+c", "add(mul(var(a), var(b)), var(c))")]
#[case("a-b-c", "sub(sub(var(a), var(b)), var(c))")]
#[case("a/b*c", "mul(div(var(a), var(b)), var(c))")]
#[case("(a+b)*c", "mul(group(add(var(a), var(b))), var(c))")]
#[case("a * (b - c) / d", "mul(var(a), div(group(sub(var(b), var(c))), var(d)))")]
fn expression_precedence(#[case] sentence: &str, #[case] expected: &str) {
    let result = parse(expression(), "S", sentence);
    assert!(result.issues.is_empty(), "{:?}", result.issues);
    assert_eq!(tree_shape(&result), expected);
}

#[test]
fn left_and_right_associativity() {
    let left = parse(sum_grammar(|p| p.left("add", [lit!("+")])), "S", "a+b+c");
    assert_eq!(tree_shape(&left), "add(add(var(a), var(b)), var(c))");

    let right = parse(sum_grammar(|p| p.right("add", [lit!("+")])), "S", "a+b+c");
    assert_eq!(tree_shape(&right), "add(var(a), add(var(b), var(c)))");
}

#[test]
fn default_resolution_continues_left_operand() {
    let grammar = GrammarBuilder::new("Sum")
        .concatenation("S", [nt!("expr")])
        .choice("expr", [vec![nt!("var")], vec![nt!("add")]])
        .concatenation("add", [nt!("expr"), lit!("+"), nt!("expr")])
        .concatenation("var", [nt!("NAME")])
        .pattern("NAME", "[a-z]+")
        .build()
        .unwrap();
    let parser = LeftCornerParser::new(Arc::new(grammar));
    let result = parser.parse("a+b+c", &ParseOptions::for_goal("S").report_grammar_ambiguities(true)).unwrap();

    assert_eq!(tree_shape(&result), "add(add(var(a), var(b)), var(c))");
    assert!(!result.tree.unwrap().is_ambiguous());
    assert_eq!(result.issues.warnings().count(), 0);
}

#[test]
fn non_associative_operator_packs_both_nestings() {
    let parser = LeftCornerParser::new(sum_grammar(|p| p.none("add", [lit!("+")])));
    let result = parser.parse("a+b+c", &ParseOptions::for_goal("S").report_grammar_ambiguities(true)).unwrap();

    let tree = result.tree.as_ref().unwrap();
    assert!(tree.is_ambiguous());
    let root_add = tree.find_all("add").into_iter().find(|id| (tree.node(*id).start, tree.node(*id).end) == (0, 5)).unwrap();
    assert_eq!(tree.alternatives(root_add).len(), 2);

    let warning = result.issues.warnings().next().unwrap();
    assert!(warning.message.starts_with("Ambiguity on ["));
    assert!(warning.message.contains("GRAFT:add"));
    assert!(warning.message.contains("HEIGHT:add"));
    assert!(warning.message.contains("at position 3"));
}

#[test]
fn competing_heights_are_reported_and_packed() {
    let grammar = GrammarBuilder::new("Twins")
        .choice("S", [vec![nt!("A")], vec![nt!("B")]])
        .concatenation("A", [nt!("X")])
        .concatenation("B", [nt!("X")])
        .literal("X", "x")
        .build()
        .unwrap();
    let parser = LeftCornerParser::new(Arc::new(grammar));
    let result = parser.parse("x", &ParseOptions::for_goal("S").report_grammar_ambiguities(true)).unwrap();

    let tree = result.tree.as_ref().unwrap();
    assert_eq!(tree.alternatives(tree.root()).len(), 2);
    let warning = result.issues.warnings().next().unwrap();
    assert_eq!(warning.message, "Ambiguity on [HEIGHT:A, HEIGHT:B] at position 1 with lookahead {<EOT>}");
}

#[test]
fn keyword_and_name_share_one_packed_node() {
    let result = parse(expression(), "S", "true");
    let tree = result.tree.as_ref().unwrap();
    assert!(tree.is_ambiguous());
    let expr = tree.find_all("expr");
    assert_eq!(expr.len(), 1);
    let options: BTreeSet<u32> = tree.alternatives(expr[0]).iter().map(|a| a.option).collect();
    assert_eq!(options, BTreeSet::from([0, 1]));
}

// --- Skip --------------------------------------------------------------------

#[rstest]
#[case("a+b*c")]
#[case("  a +\n b  *  c ")]
#[case("a // first\n + b*c // last")]
fn skip_is_transparent(#[case] sentence: &str) {
    let result = parse(expression(), "S", sentence);
    assert_eq!(tree_shape(&result), "add(var(a), mul(var(b), var(c)))");

    let tree = result.tree.unwrap();
    assert_eq!(tree.matched_text(), sentence);
    assert_eq!(tree.non_skip_text(tree.root()), "a+b*c");
}

#[test]
fn canonical_text_round_trips() {
    let first = parse(expression(), "S", " (a + b) / c ");
    let tree = first.tree.unwrap();
    let second = parse(expression(), "S", &tree.matched_text());
    assert_eq!(second.tree.unwrap().to_tree_string(), tree.to_tree_string());
}

#[test]
fn leading_skip_hangs_off_the_tree() {
    let result = parse(expression(), "S", "   a");
    let tree = result.tree.unwrap();
    assert_eq!(tree.leading_skip().unwrap().matched_text(), "   ");
    assert_eq!(tree.node(tree.root()).start, 3);
}

fn block_comment_grammar() -> Arc<Grammar> {
    let grammar = GrammarBuilder::new("Words")
        .list("S", nt!("NAME"), 1, None)
        .pattern("NAME", "[a-z]+")
        .concatenation("COMMENT", [lit!("/*"), nt!("TEXT"), lit!("*/")])
        .pattern("TEXT", r"[^*]+")
        .pattern("WS", r"\s+")
        .skip("WS")
        .skip("COMMENT")
        .build()
        .unwrap();
    Arc::new(grammar)
}

#[test]
fn structured_skip_is_transparent() {
    let sentence = "a /* x */ b";
    let result = parse(block_comment_grammar(), "S", sentence);
    let tree = result.tree.unwrap();
    assert_eq!(tree.children(tree.root()).len(), 2);
    assert_eq!(tree.matched_text(), sentence);
    assert_eq!(tree.non_skip_text(tree.root()), "ab");
}

#[test]
fn unterminated_skip_fails_where_the_skip_gave_up() {
    let result = parse(block_comment_grammar(), "S", "a /* x b");
    assert!(result.tree.is_none());

    let error = result.issues.errors().next().unwrap();
    assert_eq!(error.location.position, 8);
    assert_eq!(error.expected, BTreeSet::from(["'*/'".to_string()]));
    assert_eq!(error.message, "Failed to match {'*/'} at: a /* x b^");
}

#[rstest]
#[case("a // first\n + b*c // last")]
#[case("  (a +\n b) * c ")]
fn uncached_skip_builds_the_same_tree(#[case] sentence: &str) {
    let parser = LeftCornerParser::new(expression());
    let cached = parser.parse(sentence, &ParseOptions::for_goal("S")).unwrap().tree.unwrap();
    let uncached = parser.parse(sentence, &ParseOptions::for_goal("S").cache_skip(false)).unwrap().tree.unwrap();

    assert_eq!(uncached.to_tree_string(), cached.to_tree_string());
    assert_eq!(uncached.matched_text(), sentence);
}

// --- Failures ----------------------------------------------------------------

#[test]
fn empty_sentence_fails_at_zero_with_first_terminals() {
    let result = parse(expression(), "S", "");
    assert!(result.tree.is_none());

    let errors: Vec<_> = result.issues.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].location.position, 0);
    let expected: BTreeSet<String> = ["'('", "'false'", "'true'", "NAME"].into_iter().map(String::from).collect();
    assert_eq!(errors[0].expected, expected);
    assert_eq!(errors[0].message, "Failed to match {'(' | 'false' | 'true' | NAME} at: ^");
}

#[rstest]
#[case("a +", 3)]
#[case("a + * b", 4)]
#[case("(a", 2)]
#[case("a b", 2)]
fn furthest_failure_position(#[case] sentence: &str, #[case] position: usize) {
    let result = parse(expression(), "S", sentence);
    assert!(result.tree.is_none());
    assert_eq!(result.issues.errors().next().unwrap().location.position, position);
}

#[test]
fn runaway_growth_is_fatal() {
    let parser = LeftCornerParser::new(expression());
    let err = parser.parse("a+b", &ParseOptions::for_goal("S").progress_budget(0)).unwrap_err();
    assert_eq!(err, ParseError::WontStop { position: 0, budget: 0 });
}

#[test]
fn interrupt_from_a_cloned_handle() {
    let parser = LeftCornerParser::new(expression());
    let handle = parser.interrupt_handle();
    std::thread::spawn(move || handle.interrupt("closing")).join().unwrap();

    assert_eq!(parser.parse_for_goal("S", "a").unwrap_err(), ParseError::Terminated("closing".into()));
    parser.reset();
    assert!(parser.parse_for_goal("S", "a").unwrap().is_success());
}

// --- Completion --------------------------------------------------------------

#[rstest]
#[case("a + ", 4, 4)]
#[case("a + bc", 6, 4)]
#[case("a + bc", 5, 4)]
#[case("a", 1, 0)]
fn expected_at_operand(#[case] sentence: &str, #[case] position: usize, #[case] used: usize) {
    let parser = LeftCornerParser::new(expression());
    let options = ParseOptions::for_goal("S");

    let expected = parser.expected_at(sentence, position, &options).unwrap();
    assert_eq!(expected.used_position, used);

    let terminals = parser.expected_terminals_at(sentence, position, &options).unwrap();
    let operand: BTreeSet<String> = ["'('", "'false'", "'true'", "NAME"].into_iter().map(String::from).collect();
    assert_eq!(terminals, operand);
}

#[test]
fn expected_after_operand_lists_operators() {
    let parser = LeftCornerParser::new(expression());
    let terminals = parser.expected_terminals_at("a ", 2, &ParseOptions::for_goal("S")).unwrap();
    for operator in ["'+'", "'-'", "'*'", "'/'"] {
        assert!(terminals.contains(operator), "missing {operator} in {terminals:?}");
    }
}

// --- Lists -------------------------------------------------------------------

#[rstest]
#[case("aa", true)]
#[case("aaa", true)]
#[case("a", false)]
#[case("aaaa", false)]
#[case("", false)]
fn list_bounds(#[case] sentence: &str, #[case] matches: bool) {
    let grammar = GrammarBuilder::new("Lists").list("L", lit!("a"), 2, Some(3)).build().unwrap();
    let result = parse(Arc::new(grammar), "L", sentence);
    assert_eq!(result.is_success(), matches);
    if matches {
        let tree = result.tree.unwrap();
        assert_eq!(tree.children(tree.root()).len(), sentence.len());
    }
}

#[test]
fn list_over_maximum_fails_where_the_extra_item_starts() {
    let grammar = GrammarBuilder::new("Lists").list("L", lit!("a"), 2, Some(3)).build().unwrap();
    let result = parse(Arc::new(grammar), "L", "aaaa");
    assert_eq!(result.issues.errors().next().unwrap().location.position, 3);
}

#[rstest]
#[case("1", true)]
#[case("1, 2 ,3", true)]
#[case("1,,2", false)]
#[case("1,", false)]
fn separated_list(#[case] sentence: &str, #[case] matches: bool) {
    let grammar = GrammarBuilder::new("Numbers")
        .separated_list("L", nt!("NUM"), lit!(","), 1, None)
        .pattern("NUM", "[0-9]+")
        .pattern("WS", " +")
        .skip("WS")
        .build()
        .unwrap();
    let result = parse(Arc::new(grammar), "L", sentence);
    assert_eq!(result.is_success(), matches);
    if !matches {
        assert!(result.issues.errors().next().unwrap().expected.contains("NUM"));
    }
}

// --- Json --------------------------------------------------------------------

#[rstest]
#[case("{}")]
#[case("[ ]")]
#[case("\"text\"")]
#[case("-0.5e10")]
#[case(r#"{"a": [1, 2.5, true, null], "b": {"c": "x\"y"}}"#)]
#[case("[[1], [2, [3]], []]")]
fn json_accepts(#[case] sentence: &str) {
    let result = parse(json(), "value", sentence);
    assert!(result.is_success(), "{:?}", result.issues);
    assert_eq!(result.tree.unwrap().matched_text(), sentence);
}

#[rstest]
#[case("[1,]", 3)]
#[case(r#"{"a" 1}"#, 5)]
#[case("[1 2]", 3)]
#[case("{", 1)]
fn json_rejects(#[case] sentence: &str, #[case] position: usize) {
    let result = parse(json(), "value", sentence);
    assert!(!result.is_success());
    assert_eq!(result.issues.errors().next().unwrap().location.position, position);
}

#[test]
fn json_members_are_children_of_the_list() {
    let result = parse(json(), "value", r#"{"a": 1, "b": 2}"#);
    let tree = result.tree.unwrap();
    assert_eq!(tree.find_all("member").len(), 2);
    assert_eq!(tree.find_all("members").len(), 1);
}

// --- Large inputs ------------------------------------------------------------

#[test]
fn long_flat_array_builds_one_list_node() {
    let count = 50_000;
    let items: Vec<String> = (0..count).map(|i| i.to_string()).collect();
    let sentence = format!("[{}]", items.join(","));

    let result = parse(json(), "value", &sentence);
    let tree = result.tree.unwrap();
    let elements = tree.find_all("elements");
    assert_eq!(elements.len(), 1);
    // Items and the separators between them.
    assert_eq!(tree.children(elements[0]).len(), 2 * count - 1);
    assert_eq!(tree.matched_text(), sentence);
}

#[test]
fn deeply_nested_arrays_build_without_recursion() {
    let depth = 5_000;
    let sentence = format!("{}{}", "[".repeat(depth), "]".repeat(depth));

    let result = parse(json(), "value", &sentence);
    let tree = result.tree.unwrap();
    assert_eq!(tree.find_all("array").len(), depth);
    assert_eq!(tree.matched_text(), sentence);
    assert_eq!(tree.non_skip_text(tree.root()), sentence);
    assert!(tree.to_tree_string().starts_with("value { array { '[' elements { value { array {"));
}

// --- Embedding ---------------------------------------------------------------

fn host_grammar() -> Arc<Grammar> {
    let guest = GrammarBuilder::new("Guest")
        .choice("expr", [vec![nt!("NUM")], vec![nt!("sum")]])
        .concatenation("sum", [nt!("expr"), lit!("+"), nt!("NUM")])
        .pattern("NUM", "[0-9]+")
        .pattern("WS", r"\s+")
        .skip("WS")
        .build()
        .unwrap();
    let host = GrammarBuilder::new("Host")
        .concatenation("S", [lit!("begin"), nt!("inner"), lit!("end")])
        .embedded("inner", Arc::new(guest), "expr")
        .pattern("WS", r"\s+")
        .skip("WS")
        .build()
        .unwrap();
    Arc::new(host)
}

#[test]
fn embedded_grammar_contributes_a_nested_tree() {
    let sentence = "begin 1 + 2 end";
    let result = parse(host_grammar(), "S", sentence);
    let tree = result.tree.unwrap();

    assert_eq!(tree.to_tree_string(), "S { 'begin' inner { expr { sum { expr { '1' } '+' '2' } } } 'end' }");
    let inner = tree.find_all("inner")[0];
    assert!(matches!(tree.node(inner).kind, SpptNodeKind::Embedded(_)));
    assert_eq!((tree.node(inner).start, tree.node(inner).end), (6, 11));
    assert_eq!(tree.matched_text(), sentence);
}

#[test]
fn embedded_failure_names_host_rule_and_guest_expectation() {
    let result = parse(host_grammar(), "S", "begin 1 + end");
    assert!(result.tree.is_none());

    let error = result.issues.errors().next().unwrap();
    assert_eq!(error.location.position, 10);
    assert!(error.expected.contains("NUM"));
    assert_eq!(
        error.message,
        "Failed to match {NUM} at: begin 1 + ^end (in rule 'inner' of 'S' parsed with grammar 'Guest')"
    );
}
