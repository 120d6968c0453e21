mod debug_report;

use leftcorner::{LeftCornerParser, ParseOptions, grammars};
use std::io::{self, IsTerminal, Read};
use std::time::Instant;

const DEFAULT_GRAMMAR: &str = "expression";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let Some((grammar, default_goal)) = grammars::by_name(&config.grammar) else {
        eprintln!("error: unknown grammar '{}' (expected expression or json)", config.grammar);
        std::process::exit(2);
    };
    let goal = config.goal.clone().unwrap_or_else(|| default_goal.to_string());
    let options = ParseOptions::for_goal(goal).report_grammar_ambiguities(config.ambiguities);

    let started = Instant::now();
    let parser = LeftCornerParser::new(grammar);
    let build = started.elapsed();

    if let Some(position) = config.expected_at {
        match parser.expected_at(&config.input, position, &options) {
            Ok(expected) => debug_report::print_expected(&config.input, &expected, config.color),
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    match parser.parse(&config.input, &options) {
        Ok(result) => {
            debug_report::print_run(&config.input, &result, build, config.color);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

struct CliConfig {
    input: String,
    grammar: String,
    goal: Option<String>,
    expected_at: Option<usize>,
    ambiguities: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut grammar = DEFAULT_GRAMMAR.to_string();
    let mut goal = None;
    let mut expected_at = None;
    let mut ambiguities = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("leftcorner {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--ambiguities" => ambiguities = true,
            "--grammar" | "-g" => {
                grammar = args.next().ok_or_else(|| "error: --grammar expects a value".to_string())?;
            }
            "--goal" => {
                goal = Some(args.next().ok_or_else(|| "error: --goal expects a value".to_string())?);
            }
            "--expected-at" => {
                let value = args.next().ok_or_else(|| "error: --expected-at expects a value".to_string())?;
                expected_at = Some(parse_position(&value)?);
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.is_empty() {
                    if input.is_some() {
                        return Err("error: input provided multiple times".to_string());
                    }
                    input = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--grammar=") => {
                grammar = arg.trim_start_matches("--grammar=").to_string();
            }
            _ if arg.starts_with("--goal=") => {
                goal = Some(arg.trim_start_matches("--goal=").to_string());
            }
            _ if arg.starts_with("--expected-at=") => {
                expected_at = Some(parse_position(arg.trim_start_matches("--expected-at="))?);
            }
            _ if arg.starts_with("--input=") => {
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(arg.trim_start_matches("--input=").to_string());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(rest);
                break;
            }
        }
    }

    // An empty sentence is a legitimate input; only a missing one is an error.
    let input = match input {
        Some(value) => value,
        None if io::stdin().is_terminal() => return Err(format!("error: no input provided\n\n{}", help_text())),
        None => read_stdin_input()?,
    };

    Ok(CliConfig { input, grammar, goal, expected_at, ambiguities, color })
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn parse_position(value: &str) -> Result<usize, String> {
    value.parse().map_err(|_| format!("error: invalid --expected-at '{value}' (expected a byte offset)"))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "leftcorner {version}

Scannerless left-corner parser CLI.

Usage:
  leftcorner [OPTIONS] [--] <input...>
  leftcorner [OPTIONS] --input <text>

Options:
  -i, --input <text>         Sentence to parse. If omitted, reads remaining args
                             or stdin when no args are provided.
  -g, --grammar <name>       Built-in grammar: expression or json.
                             Default: {default_grammar}
  --goal <rule>              Goal rule. Default: the grammar's own goal.
  --expected-at <offset>     Print what may follow at a byte offset instead of
                             parsing the whole sentence.
  --ambiguities              Report competing derivations as warnings.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Exit codes:
  0  Sentence matched.
  1  Sentence did not match, or the parse was aborted.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        default_grammar = DEFAULT_GRAMMAR
    )
}
