use std::fmt;

/// Lexer mode at the point where a parse attempt ran out of input.
///
/// The tags follow the classic Ruby lexer states: each one describes what kind
/// of token could legally come next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LexState {
    /// Start of an expression: after an operator, `(`, `,` or a statement separator.
    #[default]
    Beg,
    /// A complete value was just read.
    End,
    /// A closing parenthesis of an argument list.
    EndArg,
    /// The name of a method definition.
    EndFn,
    /// A method name after `.`; an argument may follow.
    Arg,
    /// A command name in statement position (`puts`, `p`, ...).
    CmdArg,
    /// A jump keyword (`return`, `break`, `next`).
    Mid,
    /// After `def`, awaiting a method name.
    Fname,
    /// After `.`, awaiting a message name.
    Dot,
    /// After `class`, awaiting a class name.
    Class,
    /// After a conditional keyword, awaiting a condition.
    Value,
    /// Sentinel past the last real state.
    MaxState,
}

/// One captured syntax error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxDiagnostic {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

impl SyntaxDiagnostic {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        SyntaxDiagnostic {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// What the parser knew when it reached the end of the input.
///
/// Lives for exactly one parse attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseEndState {
    /// A heredoc body is still being accumulated.
    pub heredoc_active: bool,
    /// A heredoc terminator was matched and no newline was lexed after it.
    pub heredoc_just_closed: bool,
    /// Number of syntax errors seen, including ones that were not captured.
    pub error_count: usize,
    /// Captured errors in the order they were reported.
    pub errors: Vec<SyntaxDiagnostic>,
    /// Input ended inside a quoted or regex literal.
    pub open_string: bool,
    pub lex_state: LexState,
}

impl ParseEndState {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn first_error(&self) -> Option<&SyntaxDiagnostic> {
        self.errors.first()
    }
}

/// A finished parse attempt: its end state plus whatever tree the parser built.
#[derive(Debug)]
pub struct ParseAttempt<T> {
    pub state: ParseEndState,
    pub tree: T,
}

/// Result code of one parse/run cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Parsed and executed with no pending exception.
    Success,
    /// Input was closed but execution raised, or a syntax error was installed.
    ErrorClosed,
    /// Input is syntactically open; append another line and retry.
    Incomplete,
}

impl Outcome {
    pub fn code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::ErrorClosed => 1,
            Outcome::Incomplete => 2,
        }
    }
}

impl From<Outcome> for i32 {
    fn from(outcome: Outcome) -> i32 {
        outcome.code()
    }
}

/// How much the cycle driver prints after a closed cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrintLevel {
    Silent,
    /// Print uncaught exceptions.
    Exceptions,
    /// Print uncaught exceptions and the value of every successful evaluation.
    Results,
}

impl PrintLevel {
    pub fn shows_exceptions(self) -> bool {
        self >= PrintLevel::Exceptions
    }

    pub fn shows_results(self) -> bool {
        self >= PrintLevel::Results
    }
}

impl From<i32> for PrintLevel {
    fn from(level: i32) -> Self {
        match level {
            i32::MIN..=0 => PrintLevel::Silent,
            1 => PrintLevel::Exceptions,
            _ => PrintLevel::Results,
        }
    }
}

/// Built-in exception classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    SyntaxError,
    RuntimeError,
    NameError,
    NoMethodError,
    ArgumentError,
    TypeError,
    ZeroDivisionError,
    LocalJumpError,
    IOError,
    SystemStackError,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionKind::SyntaxError => "SyntaxError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::NoMethodError => "NoMethodError",
            ExceptionKind::ArgumentError => "ArgumentError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::LocalJumpError => "LocalJumpError",
            ExceptionKind::IOError => "IOError",
            ExceptionKind::SystemStackError => "SystemStackError",
        };
        f.write_str(name)
    }
}

/// A language-level exception sitting in (or headed for) the engine's pending slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Exception {
            kind,
            message: message.into(),
        }
    }

    /// `message (Class)`, or just the class name when there is no message.
    pub fn inspect(&self) -> String {
        let message = self.message.trim_end_matches('\n');
        if message.is_empty() {
            self.kind.to_string()
        } else {
            format!("{} ({})", message, self.kind)
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
