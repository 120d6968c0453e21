use leftcorner::{ExpectedAt, IssueKind, ParseResult, SharedPackedParseTree, SpptNodeId, SpptNodeKind};
use std::time::Duration;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

const MAX_ROUNDS: usize = 12;

pub fn print_run(input: &str, result: &ParseResult, build: Duration, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Parsing: {:?}", input), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Rounds ━━━", ansi::GRAY));
    print_rounds(result, &palette);

    println!("\n{}", palette.paint("━━━ Result ━━━", ansi::GRAY));
    match &result.tree {
        Some(tree) => {
            let marker = if tree.is_ambiguous() { palette.paint("✓ matched (ambiguous)", ansi::YELLOW) } else { palette.paint("✓ matched", ansi::GREEN) };
            println!("  {}", marker);
            print_tree(tree, tree.root(), 1, &palette);
        }
        None => println!("  {}", palette.paint("✗ no match", ansi::RED)),
    }

    if !result.issues.is_empty() {
        println!("\n{}", palette.paint("━━━ Issues ━━━", ansi::GRAY));
        for issue in &result.issues {
            let color = match issue.kind {
                IssueKind::Error => ansi::RED,
                IssueKind::Warning => ansi::YELLOW,
                IssueKind::Information => ansi::BLUE,
            };
            println!("  {}", palette.paint(issue.to_string(), color));
        }
    }

    let metrics = &result.metrics;
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Automaton: {}  │  Growth: {}  │  Tree: {}",
        palette.paint(format!("{:?}", metrics.total), ansi::GREEN),
        palette.dim(format!("{:?}", build)),
        palette.paint(format!("{:?}", metrics.growth), ansi::CYAN),
        palette.dim(format!("{:?}", metrics.tree)),
    );
    println!();
}

pub fn print_expected(input: &str, expected: &ExpectedAt, color: bool) {
    let palette = ansi::Palette::new(color);
    let (before, after) = input.split_at(expected.used_position.min(input.len()));
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Expected at: {:?}^{:?}", before, after), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Continuations ━━━", ansi::GRAY));
    if expected.spines.is_empty() {
        println!("  {}", palette.dim("nothing can follow here"));
    }
    for spine in &expected.spines {
        let terminals: Vec<&str> = spine.expected_terminals().collect();
        println!(
            "  {} {} {}",
            palette.paint(&spine.rule, ansi::BLUE),
            palette.dim("│"),
            palette.paint(terminals.join(" | "), ansi::GREEN),
        );
    }
    println!();
}

fn print_rounds(result: &ParseResult, palette: &ansi::Palette) {
    let metrics = &result.metrics;
    println!(
        "  {} rounds  │  {} steps  │  {} nodes  │  max heads {}",
        palette.paint(metrics.rounds.len().to_string(), ansi::BLUE),
        palette.paint(metrics.steps().to_string(), ansi::BLUE),
        palette.paint(metrics.nodes.to_string(), ansi::BLUE),
        palette.paint(metrics.max_heads.to_string(), ansi::BLUE),
    );

    for round in metrics.rounds.iter().take(MAX_ROUNDS) {
        let actions: Vec<&str> = round.actions.iter_names().map(|(name, _)| name).collect();
        println!(
            "    {} {} {} {}",
            palette.paint(format!("@{}", round.position), ansi::YELLOW),
            palette.dim(format!("heads {} steps {}", round.heads, round.steps)),
            palette.paint(actions.join(" "), ansi::CYAN),
            palette.dim(format!("{:?}", round.duration)),
        );
    }
    if metrics.rounds.len() > MAX_ROUNDS {
        println!("    {}", palette.dim(format!("... +{} more", metrics.rounds.len() - MAX_ROUNDS)));
    }
}

fn print_tree(tree: &SharedPackedParseTree, root: SpptNodeId, depth: usize, palette: &ansi::Palette) {
    let mut stack = vec![(tree, root, depth)];
    while let Some((tree, id, depth)) = stack.pop() {
        let node = tree.node(id);
        let indent = "  ".repeat(depth);
        let span = palette.paint(format!("{}..{}", node.start, node.end), ansi::YELLOW);
        match &node.kind {
            SpptNodeKind::Leaf => {
                println!("{}{} {} {}", indent, palette.paint(&node.name, ansi::GREEN), span, palette.dim(format!("{:?}", tree.text(id))));
            }
            SpptNodeKind::Embedded(inner) => {
                println!("{}{} {} {}", indent, palette.bold(palette.paint(&node.name, ansi::BLUE)), span, palette.dim("(embedded)"));
                stack.push((&**inner, inner.root(), depth + 1));
            }
            SpptNodeKind::Branch => {
                let alternatives = tree.alternatives(id);
                let packed =
                    if alternatives.len() > 1 { palette.paint(format!("×{}", alternatives.len()), ansi::YELLOW) } else { String::new() };
                println!("{}{} {} {}", indent, palette.bold(palette.paint(&node.name, ansi::BLUE)), span, packed);
                stack.extend(tree.children(id).iter().rev().map(|child| (tree, *child, depth + 1)));
            }
        }
    }
}
