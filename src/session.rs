use std::io;

use thiserror::Error;
use tracing::{debug, info};

use crate::context::ParserContext;
use crate::cycle::{self, Engine, Parser};
use crate::types::{Outcome, PrintLevel};

/// Misuse of the embedding lifecycle, or a failed diagnostic write.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session has not been initialized")]
    NotInitialized,

    #[error("session is already initialized")]
    AlreadyInitialized,

    #[error("session has been finalized")]
    Finalized,

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Finished,
}

/// One embedding of the interpreter: parser, engine and parser configuration.
///
/// The engine's top-level scope persists across every cycle run through the
/// session. A session is not shareable across threads without an outside lock.
pub struct Session<P, E> {
    parser: P,
    engine: E,
    context: Option<ParserContext>,
    lifecycle: Lifecycle,
    print_level: PrintLevel,
}

impl<P, E> Session<P, E>
where
    P: Parser,
    E: Engine<Tree = P::Tree>,
{
    /// A session that still needs [`Session::init`].
    pub fn new(parser: P, engine: E) -> Self {
        Session {
            parser,
            engine,
            context: None,
            lifecycle: Lifecycle::Created,
            print_level: PrintLevel::Results,
        }
    }

    /// Allocate the parser configuration, with error capture on.
    pub fn init(&mut self) -> Result<(), SessionError> {
        self.init_with(ParserContext::new())
    }

    /// Like [`Session::init`] with a caller-built configuration.
    pub fn init_with(&mut self, context: ParserContext) -> Result<(), SessionError> {
        match self.lifecycle {
            Lifecycle::Created => {
                self.context = Some(context);
                self.lifecycle = Lifecycle::Running;
                info!("session initialized");
                Ok(())
            }
            Lifecycle::Running => Err(SessionError::AlreadyInitialized),
            Lifecycle::Finished => Err(SessionError::Finalized),
        }
    }

    /// Release the parser configuration. No cycles can run afterwards.
    pub fn finalize(&mut self) -> Result<(), SessionError> {
        match self.lifecycle {
            Lifecycle::Running => {
                self.context = None;
                self.lifecycle = Lifecycle::Finished;
                info!("session finalized");
                Ok(())
            }
            Lifecycle::Created => Err(SessionError::NotInitialized),
            Lifecycle::Finished => Err(SessionError::Finalized),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn print_level(&self) -> PrintLevel {
        self.print_level
    }

    pub fn set_print_level(&mut self, level: PrintLevel) {
        self.print_level = level;
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Run one cycle at the session's print level.
    pub fn run_source(&mut self, source: &str) -> Result<Outcome, SessionError> {
        let level = self.print_level;
        self.run_source_with(source, level)
    }

    /// Run one cycle at an explicit print level.
    pub fn run_source_with(
        &mut self,
        source: &str,
        level: PrintLevel,
    ) -> Result<Outcome, SessionError> {
        let context = match (self.lifecycle, self.context.as_ref()) {
            (Lifecycle::Running, Some(context)) => context,
            (Lifecycle::Finished, _) => return Err(SessionError::Finalized),
            _ => return Err(SessionError::NotInitialized),
        };
        debug!(bytes = source.len(), ?level, "running source");
        let outcome = cycle::run_cycle(context, &mut self.parser, &mut self.engine, source, level)?;
        Ok(outcome)
    }
}

/// Parse and, if the input is closed, run `source`.
///
/// Returns `0` on success, `1` when an exception was raised (or a syntax
/// error was installed as one) and `2` when more input is needed.
/// `print_level`: `0` silent, `1` print exceptions, `2` and up also print results.
pub fn multiline_parse_run_source<P, E>(
    session: &mut Session<P, E>,
    source: &str,
    print_level: i32,
) -> Result<i32, SessionError>
where
    P: Parser,
    E: Engine<Tree = P::Tree>,
{
    let outcome = session.run_source_with(source, PrintLevel::from(print_level))?;
    Ok(outcome.code())
}
