use mlparse::cycle::Engine;
use mlparse::eval::Interpreter;
use mlparse::parser::MiniParser;
use mlparse::session::{multiline_parse_run_source, Session, SessionError};
use mlparse::types::{ExceptionKind, Outcome, PrintLevel};
use mlparse::value::Value;

type TestSession = Session<MiniParser, Interpreter<Vec<u8>>>;

/// Create an initialized session writing into a buffer.
fn new_session() -> TestSession {
    let mut s = Session::new(MiniParser, Interpreter::new(Vec::new()));
    s.init().unwrap();
    s
}

/// Drain everything the session printed so far.
fn take_output(s: &mut TestSession) -> String {
    let bytes = std::mem::take(s.engine_mut().output_mut());
    String::from_utf8(bytes).unwrap()
}

/// Helper: run one chunk at `level`, returning the code and printed text.
fn run(s: &mut TestSession, source: &str, level: i32) -> (i32, String) {
    let code = multiline_parse_run_source(s, source, level).unwrap();
    (code, take_output(s))
}

// ========== Closed input ==========

#[test]
fn closed_expression_succeeds_at_every_level() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "1 + 1", 0), (0, String::new()));
    assert_eq!(run(&mut s, "1 + 1", 1), (0, String::new()));
    assert_eq!(run(&mut s, "1 + 1", 2), (0, "2\n".to_string()));
}

#[test]
fn results_print_in_inspect_form() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "\"a\" + \"b\"", 2).1, "\"ab\"\n");
    assert_eq!(run(&mut s, "nil", 2).1, "nil\n");
    assert_eq!(run(&mut s, "puts \"hi\"", 2).1, "hi\nnil\n");
}

#[test]
fn program_output_is_kept_at_silent_level() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "puts 42", 0), (0, "42\n".to_string()));
}

// ========== Open input ==========

#[test]
fn trailing_operator_is_incomplete() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "puts 1 +", 2), (2, String::new()));
    assert_eq!(run(&mut s, "puts 1 +\n2", 2), (0, "3\nnil\n".to_string()));
}

#[test]
fn open_def_accumulates_until_end() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "def foo", 2).0, 2);
    assert_eq!(run(&mut s, "def foo\n  1", 2).0, 2);
    assert_eq!(run(&mut s, "def foo\n  1\nend", 2), (0, ":foo\n".to_string()));
    assert_eq!(run(&mut s, "foo", 2), (0, "1\n".to_string()));
}

#[test]
fn open_lexer_modes_are_incomplete() {
    let mut s = new_session();
    for source in ["x =", "\"abc\".", "class", "if", "\"abc", "/ab"] {
        assert_eq!(run(&mut s, source, 2).0, 2, "{:?}", source);
    }
}

#[test]
fn heredoc_stays_open_until_terminator() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "<<~HEREDOC", 2).0, 2);
    assert_eq!(run(&mut s, "<<~HEREDOC\nhello", 2).0, 2);
    assert_eq!(
        run(&mut s, "<<~HEREDOC\n  hello\nHEREDOC", 2),
        (0, "\"hello\\n\"\n".to_string())
    );
}

#[test]
fn statement_after_heredoc_follows_its_own_mode() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "x = <<~A\nfoo\nA\nif true", 2).0, 2);
    assert_eq!(run(&mut s, "x = <<~A\nfoo\nA\nif true\n", 2).0, 2);
    assert_eq!(
        run(&mut s, "x = <<~A\nfoo\nA\nif true\n  x\nend", 2),
        (0, "\"foo\\n\"\n".to_string())
    );
}

#[test]
fn incomplete_result_is_repeatable() {
    let mut s = new_session();
    for _ in 0..3 {
        assert_eq!(run(&mut s, "while true do", 2), (2, String::new()));
    }
    assert!(s.engine().pending_exception().is_none());
}

// ========== Syntax errors ==========

#[test]
fn stray_end_is_a_closed_syntax_error() {
    let mut s = new_session();
    assert_eq!(
        run(&mut s, "end", 1),
        (1, "line 1: syntax error, unexpected keyword_end (SyntaxError)\n".to_string())
    );
    assert!(s.engine().pending_exception().is_none());
}

#[test]
fn syntax_error_stays_pending_at_silent_level() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "end", 0), (0, String::new()));
    let pending = s.engine().pending_exception().unwrap();
    assert_eq!(pending.kind, ExceptionKind::SyntaxError);
    assert_eq!(pending.message, "line 1: syntax error, unexpected keyword_end\n");
}

#[test]
fn regex_argument_without_parens_is_closed() {
    let mut s = new_session();
    let (code, output) = run(&mut s, "\"a,b\".split /,/", 1);
    assert_eq!(code, 1);
    assert!(output.contains("unexpected tREGEXP_BEG"), "{}", output);
}

#[test]
fn syntax_error_reports_its_line() {
    let mut s = new_session();
    let (code, output) = run(&mut s, "x = 1\ny = 2\nend", 1);
    assert_eq!(code, 1);
    assert!(output.starts_with("line 3: "), "{}", output);
}

#[test]
fn invalid_character_is_closed() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "1 $ 2", 1).0, 1);
}

#[test]
fn deep_nesting_is_a_closed_syntax_error() {
    let mut s = new_session();
    let parens = format!("{}1{}", "(".repeat(500), ")".repeat(500));
    assert_eq!(
        run(&mut s, &parens, 1),
        (1, "line 1: memory exhausted (SyntaxError)\n".to_string())
    );
    let minus = format!("{}1", "-".repeat(500));
    assert_eq!(run(&mut s, &minus, 1).0, 1);
    assert_eq!(run(&mut s, "1", 2), (0, "1\n".to_string()));
}

// ========== Runtime errors ==========

#[test]
fn runtime_error_prints_and_clears() {
    let mut s = new_session();
    assert_eq!(
        run(&mut s, "1 / 0", 1),
        (1, "divided by 0 (ZeroDivisionError)\n".to_string())
    );
    assert!(s.engine().pending_exception().is_none());
    assert_eq!(run(&mut s, "2", 2), (0, "2\n".to_string()));
}

#[test]
fn raise_message_is_printed() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "raise \"boom\"", 2), (1, "boom (RuntimeError)\n".to_string()));
}

#[test]
fn output_before_error_is_kept() {
    let mut s = new_session();
    let (code, output) = run(&mut s, "puts 1\nundefined_thing", 1);
    assert_eq!(code, 1);
    assert_eq!(
        output,
        "1\nundefined local variable or method 'undefined_thing' for main (NameError)\n"
    );
}

#[test]
fn oversized_string_repeat_is_an_argument_error() {
    let mut s = new_session();
    assert_eq!(
        run(&mut s, "\"ab\" * 9223372036854775807", 1),
        (1, "argument too big (ArgumentError)\n".to_string())
    );
    assert_eq!(
        run(&mut s, "\"ab\" * -1", 1),
        (1, "negative argument (ArgumentError)\n".to_string())
    );
    assert_eq!(run(&mut s, "\"ab\" * 3", 2), (0, "\"ababab\"\n".to_string()));
}

// ========== Persistent state ==========

#[test]
fn locals_persist_between_cycles() {
    let mut s = new_session();
    run(&mut s, "x = 5", 2);
    assert_eq!(run(&mut s, "x * 2", 2), (0, "10\n".to_string()));
    assert_eq!(s.engine().local("x"), Some(&Value::Int(5)));
}

#[test]
fn classes_persist_between_cycles() {
    let mut s = new_session();
    run(&mut s, "class Counter\n  def start\n    10\n  end\nend", 0);
    assert_eq!(run(&mut s, "Counter.new.start.succ", 2), (0, "11\n".to_string()));
}

// ========== Session lifecycle ==========

#[test]
fn run_before_init_fails() {
    let mut s = Session::new(MiniParser, Interpreter::new(Vec::new()));
    assert!(matches!(
        s.run_source("1"),
        Err(SessionError::NotInitialized)
    ));
    assert!(matches!(s.finalize(), Err(SessionError::NotInitialized)));
}

#[test]
fn double_init_fails() {
    let mut s = new_session();
    assert!(matches!(s.init(), Err(SessionError::AlreadyInitialized)));
    assert!(s.is_running());
}

#[test]
fn run_after_finalize_fails() {
    let mut s = new_session();
    s.finalize().unwrap();
    assert!(!s.is_running());
    assert!(matches!(s.run_source("1"), Err(SessionError::Finalized)));
    assert!(matches!(s.init(), Err(SessionError::Finalized)));
}

#[test]
fn session_print_level_is_used_by_run_source() {
    let mut s = new_session();
    assert_eq!(s.print_level(), PrintLevel::Results);
    s.set_print_level(PrintLevel::Silent);
    assert_eq!(s.run_source("1 + 1").unwrap(), Outcome::Success);
    assert_eq!(take_output(&mut s), "");
}

#[test]
fn out_of_range_print_levels_clamp() {
    let mut s = new_session();
    assert_eq!(run(&mut s, "3", -5), (0, String::new()));
    assert_eq!(run(&mut s, "3", 9), (0, "3\n".to_string()));
}
