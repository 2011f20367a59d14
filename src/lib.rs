//! Multi-line parse-and-run support for an embedded Ruby-subset REPL.
//!
//! The core is [`multiline::is_incomplete`], which decides from a parser's
//! end state whether input is still open, and [`cycle::run_cycle`], which
//! parses, classifies, runs and reports one chunk of source. [`session`]
//! wraps both behind an init/finalize lifecycle. The tokenizer, parser and
//! interpreter are a small reference front end and engine.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod cycle;
pub mod eval;
pub mod multiline;
pub mod parser;
pub mod session;
pub mod tokenizer;
pub mod types;
pub mod validate;
pub mod value;

pub use context::ParserContext;
pub use cycle::{run_cycle, Engine, Parser};
pub use eval::Interpreter;
pub use multiline::is_incomplete;
pub use parser::MiniParser;
pub use session::{multiline_parse_run_source, Session, SessionError};
pub use types::{Outcome, ParseEndState, PrintLevel};
