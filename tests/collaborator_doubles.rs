use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;

use mlparse::context::ParserContext;
use mlparse::cycle::{run_cycle, Engine, Parser};
use mlparse::types::{
    Exception, ExceptionKind, LexState, Outcome, ParseAttempt, ParseEndState, PrintLevel,
    SyntaxDiagnostic,
};

/// A parse tree that counts how often it is released.
struct CountedTree {
    drops: Rc<Cell<usize>>,
}

impl Drop for CountedTree {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Hands out a fixed end state with a fresh counted tree on every call.
struct ScriptedParser {
    state: ParseEndState,
    drops: Rc<Cell<usize>>,
    calls: usize,
}

impl ScriptedParser {
    fn new(state: ParseEndState) -> Self {
        ScriptedParser {
            state,
            drops: Rc::new(Cell::new(0)),
            calls: 0,
        }
    }
}

impl Parser for ScriptedParser {
    type Tree = CountedTree;

    fn parse(&mut self, _source: &str, _ctx: &ParserContext) -> ParseAttempt<CountedTree> {
        self.calls += 1;
        ParseAttempt {
            state: self.state.clone(),
            tree: CountedTree {
                drops: Rc::clone(&self.drops),
            },
        }
    }
}

/// Records what the cycle asked of it.
struct FakeEngine {
    executed: usize,
    /// Exception raised by the next `execute`.
    raise_on_execute: Option<Exception>,
    exception: Option<Exception>,
    out: Vec<u8>,
    drops: Rc<Cell<usize>>,
    /// Tree drop count observed when a result was inspected.
    drops_at_print: Option<usize>,
}

impl FakeEngine {
    fn new(drops: Rc<Cell<usize>>) -> Self {
        FakeEngine {
            executed: 0,
            raise_on_execute: None,
            exception: None,
            out: Vec::new(),
            drops,
            drops_at_print: None,
        }
    }

    fn output(&self) -> String {
        String::from_utf8(self.out.clone()).unwrap()
    }
}

impl Engine for FakeEngine {
    type Tree = CountedTree;
    type Value = i64;

    fn execute(&mut self, _tree: &CountedTree) -> i64 {
        self.executed += 1;
        self.exception = self.raise_on_execute.take();
        42
    }

    fn raise(&mut self, exception: Exception) {
        self.exception = Some(exception);
    }

    fn pending_exception(&self) -> Option<&Exception> {
        self.exception.as_ref()
    }

    fn clear_exception(&mut self) -> Option<Exception> {
        self.exception.take()
    }

    fn inspect(&self, value: &i64) -> String {
        value.to_string()
    }

    fn stdout(&mut self) -> &mut dyn Write {
        self.drops_at_print = Some(self.drops.get());
        &mut self.out
    }
}

fn closed() -> ParseEndState {
    ParseEndState {
        lex_state: LexState::End,
        ..ParseEndState::default()
    }
}

fn with_error(message: &str) -> ParseEndState {
    let mut state = closed();
    state.error_count = 1;
    state.errors.push(SyntaxDiagnostic::new(2, message));
    state
}

/// Run one cycle against the doubles.
fn cycle(state: ParseEndState, level: PrintLevel) -> (Outcome, ScriptedParser, FakeEngine) {
    let mut parser = ScriptedParser::new(state);
    let mut engine = FakeEngine::new(Rc::clone(&parser.drops));
    let outcome = run_cycle(&ParserContext::new(), &mut parser, &mut engine, "src", level).unwrap();
    (outcome, parser, engine)
}

// ========== Tree release ==========

#[test]
fn tree_released_once_on_success() {
    let (outcome, parser, engine) = cycle(closed(), PrintLevel::Results);
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(parser.drops.get(), 1);
    assert_eq!(engine.executed, 1);
    assert_eq!(engine.output(), "42\n");
}

#[test]
fn tree_released_before_printing() {
    let (_, _, engine) = cycle(closed(), PrintLevel::Results);
    assert_eq!(engine.drops_at_print, Some(1));
}

#[test]
fn tree_released_once_when_incomplete() {
    let state = ParseEndState {
        lex_state: LexState::Beg,
        ..ParseEndState::default()
    };
    let (outcome, parser, engine) = cycle(state, PrintLevel::Results);
    assert_eq!(outcome, Outcome::Incomplete);
    assert_eq!(parser.drops.get(), 1);
    assert_eq!(engine.executed, 0);
    assert_eq!(engine.output(), "");
}

#[test]
fn tree_released_once_on_syntax_error() {
    let (outcome, parser, engine) = cycle(
        with_error("syntax error, unexpected keyword_end"),
        PrintLevel::Exceptions,
    );
    assert_eq!(outcome, Outcome::ErrorClosed);
    assert_eq!(parser.drops.get(), 1);
    assert_eq!(engine.executed, 0);
    assert_eq!(
        engine.output(),
        "line 2: syntax error, unexpected keyword_end (SyntaxError)\n"
    );
}

#[test]
fn repeated_cycles_release_every_tree() {
    let mut parser = ScriptedParser::new(closed());
    let mut engine = FakeEngine::new(Rc::clone(&parser.drops));
    let ctx = ParserContext::new();
    for _ in 0..5 {
        run_cycle(&ctx, &mut parser, &mut engine, "x", PrintLevel::Silent).unwrap();
    }
    assert_eq!(parser.calls, 5);
    assert_eq!(parser.drops.get(), 5);
}

// ========== Exceptions ==========

#[test]
fn runtime_exception_printed_and_cleared() {
    let mut parser = ScriptedParser::new(closed());
    let mut engine = FakeEngine::new(Rc::clone(&parser.drops));
    engine.raise_on_execute = Some(Exception::new(ExceptionKind::RuntimeError, "boom"));
    let outcome = run_cycle(
        &ParserContext::new(),
        &mut parser,
        &mut engine,
        "x",
        PrintLevel::Exceptions,
    )
    .unwrap();
    assert_eq!(outcome, Outcome::ErrorClosed);
    assert_eq!(engine.output(), "boom (RuntimeError)\n");
    assert!(engine.pending_exception().is_none());
}

#[test]
fn silent_level_leaves_exception_pending() {
    let (outcome, _, engine) = cycle(
        with_error("syntax error, unexpected keyword_end"),
        PrintLevel::Silent,
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(engine.output(), "");
    let pending = engine.pending_exception().unwrap();
    assert_eq!(pending.kind, ExceptionKind::SyntaxError);
    assert_eq!(pending.message, "line 2: syntax error, unexpected keyword_end\n");
}

#[test]
fn uncaptured_error_uses_line_zero() {
    let mut state = closed();
    state.error_count = 3;
    let (_, _, engine) = cycle(state, PrintLevel::Silent);
    assert_eq!(
        engine.pending_exception().unwrap().message,
        "line 0: syntax error\n"
    );
}

#[test]
fn unexpected_end_error_keeps_input_open() {
    let (outcome, _, engine) = cycle(
        with_error("syntax error, unexpected $end, expecting keyword_end"),
        PrintLevel::Results,
    );
    assert_eq!(outcome, Outcome::Incomplete);
    assert!(engine.pending_exception().is_none());
}
