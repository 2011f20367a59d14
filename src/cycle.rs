use std::io::{self, Write};

use tracing::debug;

use crate::context::ParserContext;
use crate::multiline;
use crate::types::{
    Exception, ExceptionKind, Outcome, ParseAttempt, PrintLevel, SyntaxDiagnostic,
};

/// Longest synthesized syntax error message, in bytes.
pub const MAX_SYNTAX_MESSAGE: usize = 255;

// ========== Collaborators ==========

/// Turns source text into a parse attempt.
///
/// Every call starts from a fresh attempt with the line counter at 1.
pub trait Parser {
    type Tree;

    fn parse(&mut self, source: &str, ctx: &ParserContext) -> ParseAttempt<Self::Tree>;
}

/// Runs parse trees against a persistent top-level scope.
pub trait Engine {
    type Tree;
    type Value;

    /// Compile and run `tree` at top level. Failures land in the pending exception slot.
    fn execute(&mut self, tree: &Self::Tree) -> Self::Value;

    /// Install `exception` as the pending exception.
    fn raise(&mut self, exception: Exception);

    fn pending_exception(&self) -> Option<&Exception>;

    /// Remove and return the pending exception.
    fn clear_exception(&mut self) -> Option<Exception>;

    /// The `inspect` representation of a value.
    fn inspect(&self, value: &Self::Value) -> String;

    /// Where printed representations go.
    fn stdout(&mut self) -> &mut dyn Write;
}

// ========== Cycle ==========

/// Parse `source`, run it if it is closed, and report how it went.
///
/// Syntax errors never surface as `Err`: open input becomes
/// [`Outcome::Incomplete`] and closed input with errors becomes a pending
/// `SyntaxError`. The only `Err` is a failed write of diagnostic output.
pub fn run_cycle<P, E>(
    ctx: &ParserContext,
    parser: &mut P,
    engine: &mut E,
    source: &str,
    level: PrintLevel,
) -> io::Result<Outcome>
where
    P: Parser,
    E: Engine<Tree = P::Tree>,
{
    let attempt = parser.parse(source, ctx);
    let open = multiline::is_incomplete(&attempt.state);
    debug!(
        open,
        errors = attempt.state.error_count,
        lex_state = ?attempt.state.lex_state,
        "parsed"
    );

    let mut result = None;
    if !open {
        if attempt.state.has_errors() {
            let message = syntax_error_message(attempt.state.first_error());
            engine.raise(Exception::new(ExceptionKind::SyntaxError, message));
        } else {
            result = Some(engine.execute(&attempt.tree));
        }
    }
    drop(attempt);

    let outcome = check_and_print_result(engine, result.as_ref(), open, level)?;
    debug!(code = outcome.code(), "cycle finished");
    Ok(outcome)
}

/// Map a finished cycle to its outcome, printing what `level` asks for.
fn check_and_print_result<E: Engine>(
    engine: &mut E,
    result: Option<&E::Value>,
    open: bool,
    level: PrintLevel,
) -> io::Result<Outcome> {
    if open {
        return Ok(Outcome::Incomplete);
    }
    if level.shows_exceptions() {
        if let Some(exception) = engine.clear_exception() {
            writeln!(engine.stdout(), "{}", exception.inspect())?;
            return Ok(Outcome::ErrorClosed);
        }
    }
    if level.shows_results() {
        if let Some(value) = result {
            let shown = engine.inspect(value);
            writeln!(engine.stdout(), "{}", shown)?;
        }
    }
    Ok(Outcome::Success)
}

/// `line N: message\n` for the first error, cut to [`MAX_SYNTAX_MESSAGE`] bytes.
fn syntax_error_message(first: Option<&SyntaxDiagnostic>) -> String {
    let mut message = match first {
        Some(diagnostic) => format!("{}\n", diagnostic),
        // errors were counted but not captured
        None => "line 0: syntax error\n".to_string(),
    };
    if message.len() > MAX_SYNTAX_MESSAGE {
        let mut cut = MAX_SYNTAX_MESSAGE;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}
