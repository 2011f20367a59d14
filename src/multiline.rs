use tracing::trace;

use crate::types::{LexState, ParseEndState};

/// Diagnostic the grammar emits when input stops in the middle of a construct.
/// Matched as a prefix; the grammar may append what it was expecting.
pub const UNEXPECTED_END: &str = "syntax error, unexpected $end";

/// A stray `end` keyword.
pub const UNEXPECTED_KEYWORD_END: &str = "syntax error, unexpected keyword_end";

/// A regex literal where the grammar could not take one.
pub const UNEXPECTED_REGEXP_BEG: &str = "syntax error, unexpected tREGEXP_BEG";

/// Check whether a finished parse attempt needs more input before it can run.
///
/// Rules, first match wins:
/// - an unterminated heredoc body is open
/// - a heredoc that closed on this very attempt is closed
/// - with syntax errors, only a premature end of input counts as open
/// - an unterminated string or regex literal is open
/// - otherwise the lexer mode decides
pub fn is_incomplete(state: &ParseEndState) -> bool {
    if state.heredoc_active {
        trace!("open: heredoc body");
        return true;
    }
    if state.heredoc_just_closed {
        trace!("closed: heredoc terminator");
        return false;
    }

    if state.has_errors() {
        let open = match state.first_error().map(|e| e.message.as_str()) {
            Some(message) if message.starts_with(UNEXPECTED_END) => true,
            Some(UNEXPECTED_KEYWORD_END) => false,
            Some(UNEXPECTED_REGEXP_BEG) => false,
            _ => false,
        };
        trace!(open, errors = state.error_count, "decided by first error");
        return open;
    }

    if state.open_string {
        trace!("open: string literal");
        return true;
    }

    let open = lex_state_awaits_more(state.lex_state);
    trace!(open, lex_state = ?state.lex_state, "decided by lexer mode");
    open
}

/// Whether the lexer mode means an expression has started but has no value yet.
fn lex_state_awaits_more(lex_state: LexState) -> bool {
    match lex_state {
        // after an operator, `.`, `class`, `def` or a conditional keyword
        LexState::Beg
        | LexState::Dot
        | LexState::Class
        | LexState::Fname
        | LexState::Value => true,
        LexState::Arg => false,
        // CmdArg, End, EndArg, EndFn, Mid and the sentinel are treated as
        // closed only because nothing says otherwise.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyntaxDiagnostic;

    fn with_mode(lex_state: LexState) -> ParseEndState {
        ParseEndState {
            lex_state,
            ..ParseEndState::default()
        }
    }

    fn with_error(message: &str) -> ParseEndState {
        ParseEndState {
            error_count: 1,
            errors: vec![SyntaxDiagnostic::new(1, message)],
            lex_state: LexState::End,
            ..ParseEndState::default()
        }
    }

    #[test]
    fn test_heredoc_active_is_open() {
        let state = ParseEndState {
            heredoc_active: true,
            lex_state: LexState::End,
            ..ParseEndState::default()
        };
        assert!(is_incomplete(&state));
    }

    #[test]
    fn test_heredoc_active_beats_errors() {
        let mut state = with_error("syntax error, unexpected keyword_end");
        state.heredoc_active = true;
        assert!(is_incomplete(&state));
    }

    #[test]
    fn test_heredoc_just_closed_is_closed() {
        let state = ParseEndState {
            heredoc_just_closed: true,
            open_string: true,
            lex_state: LexState::Beg,
            ..ParseEndState::default()
        };
        assert!(!is_incomplete(&state));
    }

    #[test]
    fn test_heredoc_just_closed_beats_unexpected_end() {
        let mut state = with_error(UNEXPECTED_END);
        state.heredoc_just_closed = true;
        assert!(!is_incomplete(&state));
    }

    #[test]
    fn test_unexpected_end_is_open() {
        assert!(is_incomplete(&with_error(UNEXPECTED_END)));
    }

    #[test]
    fn test_unexpected_end_with_suffix_is_open() {
        assert!(is_incomplete(&with_error(
            "syntax error, unexpected $end, expecting keyword_end"
        )));
    }

    #[test]
    fn test_stray_end_is_closed() {
        assert!(!is_incomplete(&with_error(UNEXPECTED_KEYWORD_END)));
    }

    #[test]
    fn test_regexp_beg_is_closed() {
        assert!(!is_incomplete(&with_error(UNEXPECTED_REGEXP_BEG)));
    }

    #[test]
    fn test_keyword_end_with_suffix_is_closed() {
        // exact match only, and the default is closed anyway
        assert!(!is_incomplete(&with_error(
            "syntax error, unexpected keyword_end, expecting $end"
        )));
    }

    #[test]
    fn test_other_error_is_closed() {
        assert!(!is_incomplete(&with_error("syntax error, unexpected tINTEGER")));
    }

    #[test]
    fn test_errors_short_circuit_open_string_and_mode() {
        let mut state = with_error("syntax error, unexpected ')'");
        state.open_string = true;
        state.lex_state = LexState::Beg;
        assert!(!is_incomplete(&state));
    }

    #[test]
    fn test_only_first_error_counts() {
        let state = ParseEndState {
            error_count: 2,
            errors: vec![
                SyntaxDiagnostic::new(1, "syntax error, unexpected tINTEGER"),
                SyntaxDiagnostic::new(2, UNEXPECTED_END),
            ],
            ..ParseEndState::default()
        };
        assert!(!is_incomplete(&state));
    }

    #[test]
    fn test_uncaptured_error_is_closed() {
        let state = ParseEndState {
            error_count: 1,
            lex_state: LexState::Beg,
            ..ParseEndState::default()
        };
        assert!(!is_incomplete(&state));
    }

    #[test]
    fn test_open_string_is_open() {
        let state = ParseEndState {
            open_string: true,
            lex_state: LexState::End,
            ..ParseEndState::default()
        };
        assert!(is_incomplete(&state));
    }

    #[test]
    fn test_awaiting_modes_are_open() {
        for mode in [
            LexState::Beg,
            LexState::Dot,
            LexState::Class,
            LexState::Fname,
            LexState::Value,
        ] {
            assert!(is_incomplete(&with_mode(mode)), "{:?}", mode);
        }
    }

    #[test]
    fn test_value_modes_are_closed() {
        for mode in [
            LexState::Arg,
            LexState::CmdArg,
            LexState::End,
            LexState::EndArg,
            LexState::EndFn,
            LexState::Mid,
            LexState::MaxState,
        ] {
            assert!(!is_incomplete(&with_mode(mode)), "{:?}", mode);
        }
    }
}
