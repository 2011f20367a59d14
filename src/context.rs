use tracing::warn;

use crate::types::{ParseEndState, SyntaxDiagnostic};

/// Maximum number of diagnostics kept per parse attempt.
pub const ERROR_BUFFER_SIZE: usize = 10;

/// Parser configuration shared by every parse attempt of a session.
///
/// Created once when the embedding starts and dropped when it shuts down.
#[derive(Clone, Debug)]
pub struct ParserContext {
    capture_errors: bool,
    filename: Option<String>,
}

impl Default for ParserContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserContext {
    /// A context with error capture enabled.
    pub fn new() -> Self {
        ParserContext {
            capture_errors: true,
            filename: None,
        }
    }

    pub fn with_capture_errors(mut self, capture: bool) -> Self {
        self.capture_errors = capture;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn capture_errors(&self) -> bool {
        self.capture_errors
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Count a syntax error against `state`, keeping its text when capture is on.
    ///
    /// Uncaptured errors still bump `error_count` but leave `errors` untouched.
    pub fn report(&self, state: &mut ParseEndState, line: usize, message: impl Into<String>) {
        let message = message.into();
        state.error_count += 1;
        if !self.capture_errors {
            warn!(
                file = self.filename().unwrap_or("-"),
                line,
                "{}",
                message
            );
            return;
        }
        if state.errors.len() < ERROR_BUFFER_SIZE {
            state.errors.push(SyntaxDiagnostic::new(line, message));
        } else {
            warn!(line, "error buffer full, dropping: {}", message);
        }
    }
}
