//! Left-corner parsing engine.
//!
//! This module is the entry point for the growth machinery. The engine is
//! split into focused submodules under `src/engine/`; only the driver surface
//! and a few descriptive types are public.
//!
//! ## How the parts work together
//!
//! ```text
//! Grammar ──▶ Automaton::new                      (automaton.rs)
//!               - nullable / first sets
//!               - left-corner closure per rule
//!               - parameterized lookahead          (lookahead.rs)
//!                        │
//! sentence ──▶ LeftCornerParser::parse            (driver.rs)
//!                        │
//!                        v
//!              Engine::grow, one round per position  (parser.rs)
//!                - heads popped from the GSS frontier (gss.rs)
//!                - nodes merged on NodeKey            (dedup.rs)
//!                - competing reductions resolved      (resolve.rs)
//!                - rejected transitions recorded      (failure.rs)
//!                - derivations kept for the tree      (tree_data.rs)
//!                        │
//!                        v
//!              SharedPackedParseTree  or  furthest-failure issue
//! ```
//!
//! Skip content and embedded grammars are parsed by nested engines that share
//! the automaton (or the embedded grammar's automaton), the scanner and the
//! interrupt flag of the outer parse.
//!
//! ## Responsibilities by module
//!
//! - `automaton.rs`: rule positions, transitions and lookahead per state.
//! - `lookahead.rs`: immutable terminal sets with end-of-text and runtime
//!   placeholders.
//! - `gss.rs`: node arena, back edges and the position-ordered frontier.
//! - `dedup.rs`: the identity of a node; equal keys are one node.
//! - `parser.rs`: the five actions, skip and embedded sub-parses.
//! - `resolve.rs`: default GRAFT-over-HEIGHT choice and declared precedence.
//! - `failure.rs`: failure reasons, spines and the rolling tracker.
//! - `tree_data.rs`: derivations and materialization of the packed tree.
//! - `driver.rs`: the outer loop, diagnostics, `expected_at`, interrupts.
//! - `metrics.rs`: per-round timing and growth data.
//!
//! ## Debugging
//!
//! Every head and transition is traced with `tracing` at `trace` level, every
//! round at `debug` level. Install any subscriber to see them.

#[path = "engine/automaton.rs"]
mod automaton;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/driver.rs"]
mod driver;
#[path = "engine/failure.rs"]
mod failure;
#[path = "engine/gss.rs"]
mod gss;
#[path = "engine/lookahead.rs"]
mod lookahead;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/parser.rs"]
mod parser;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/tree_data.rs"]
mod tree_data;

pub use automaton::{ActionSet, Automaton};
pub use driver::{InterruptHandle, LeftCornerParser};
pub use failure::Spine;
pub use metrics::{ParseMetrics, RoundMetrics};
