use std::collections::HashSet;

use crate::types::LexState;

/// Reserved words of the language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    If,
    Unless,
    Elsif,
    Else,
    Then,
    While,
    Until,
    Do,
    End,
    Def,
    Class,
    Return,
    Break,
    Next,
    And,
    Or,
    Not,
    Nil,
    True,
    False,
    SelfKw,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Keyword> {
        let kw = match word {
            "if" => Keyword::If,
            "unless" => Keyword::Unless,
            "elsif" => Keyword::Elsif,
            "else" => Keyword::Else,
            "then" => Keyword::Then,
            "while" => Keyword::While,
            "until" => Keyword::Until,
            "do" => Keyword::Do,
            "end" => Keyword::End,
            "def" => Keyword::Def,
            "class" => Keyword::Class,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "next" => Keyword::Next,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "nil" => Keyword::Nil,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "self" => Keyword::SelfKw,
            _ => return None,
        };
        Some(kw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Unless => "unless",
            Keyword::Elsif => "elsif",
            Keyword::Else => "else",
            Keyword::Then => "then",
            Keyword::While => "while",
            Keyword::Until => "until",
            Keyword::Do => "do",
            Keyword::End => "end",
            Keyword::Def => "def",
            Keyword::Class => "class",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Next => "next",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::Nil => "nil",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::SelfKw => "self",
        }
    }

    /// Lexer mode after this keyword.
    fn next_state(self) -> LexState {
        match self {
            Keyword::If | Keyword::Unless | Keyword::Elsif | Keyword::While | Keyword::Until => {
                LexState::Value
            }
            Keyword::Def => LexState::Fname,
            Keyword::Class => LexState::Class,
            Keyword::Return | Keyword::Break | Keyword::Next => LexState::Mid,
            Keyword::End | Keyword::Nil | Keyword::True | Keyword::False | Keyword::SelfKw => {
                LexState::End
            }
            Keyword::Else | Keyword::Then | Keyword::Do | Keyword::And | Keyword::Or | Keyword::Not => {
                LexState::Beg
            }
        }
    }
}

/// Operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Assign,
    AndAnd,
    OrOr,
    Bang,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Star => "*",
            Op::Slash => "/",
            Op::Percent => "%",
            Op::Shl => "<<",
            Op::EqEq => "==",
            Op::NotEq => "!=",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::LtEq => "<=",
            Op::GtEq => ">=",
            Op::Assign => "=",
            Op::AndAnd => "&&",
            Op::OrOr => "||",
            Op::Bang => "!",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Str(String),
    Regex(String),
    /// Index into [`Lexed::heredocs`].
    Heredoc(usize),
    Ident(String),
    Const(String),
    Keyword(Keyword),
    Op(Op),
    Dot,
    Comma,
    LParen,
    RParen,
    /// A significant newline or `;`.
    Newline,
    /// Something the lexer could not read; carries the full diagnostic.
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    /// Whitespace separated this token from the previous one.
    pub space_before: bool,
}

/// Everything the tokenizer learned about one source text.
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub heredocs: Vec<String>,
    pub lex_state: LexState,
    pub open_string: bool,
    pub heredoc_active: bool,
    pub heredoc_just_closed: bool,
    /// Line the input ended on.
    pub last_line: usize,
}

struct PendingHeredoc {
    index: usize,
    terminator: String,
    /// `<<-` or `<<~`: the terminator may be indented.
    indented_end: bool,
    /// `<<~`: strip the common indentation of the body.
    squiggly: bool,
}

/// Tokenize `source`, tracking the lexer mode after every token.
pub fn tokenize(source: &str) -> Lexed {
    let mut lexer = Lexer::new(source);
    lexer.run();
    lexer.finish()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    state: LexState,
    /// Next identifier sits in command position.
    cmd_start: bool,
    space_before: bool,
    locals: HashSet<String>,
    pending: Vec<PendingHeredoc>,
    out: Lexed,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            state: LexState::Beg,
            cmd_start: true,
            space_before: false,
            locals: HashSet::new(),
            pending: Vec::new(),
            out: Lexed::default(),
        }
    }

    fn finish(mut self) -> Lexed {
        if !self.pending.is_empty() {
            // a heredoc was opened but its body never started
            self.out.heredoc_active = true;
        }
        self.out.lex_state = self.state;
        self.out.last_line = self.line;
        self.out
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, next: LexState) {
        // anything lexed after a terminator means the heredoc closed earlier
        self.out.heredoc_just_closed = false;
        self.out.tokens.push(Token {
            kind,
            line: self.line,
            space_before: self.space_before,
        });
        self.state = next;
        self.cmd_start = false;
    }

    /// Whether a `/` or `<<` here starts a literal rather than an operator.
    fn literal_allowed(&self) -> bool {
        match self.state {
            LexState::Beg | LexState::Mid | LexState::Value | LexState::Class => true,
            LexState::Arg | LexState::CmdArg => {
                self.space_before && !matches!(self.peek_at(1), Some(' ' | '\t' | '\n') | None)
            }
            _ => false,
        }
    }

    fn run(&mut self) {
        loop {
            self.space_before = false;
            while let Some(' ' | '\t' | '\r') = self.peek() {
                self.bump();
                self.space_before = true;
            }
            let Some(c) = self.peek() else { break };
            match c {
                '#' => self.skip_comment(),
                '\n' => self.newline(),
                ';' => {
                    self.bump();
                    self.push(TokenKind::Newline, LexState::Beg);
                    self.cmd_start = true;
                }
                '0'..='9' => self.number(),
                '"' | '\'' => {
                    if !self.string(c) {
                        return;
                    }
                }
                '/' if self.literal_allowed() => {
                    if !self.regex() {
                        return;
                    }
                }
                '<' if self.peek_at(1) == Some('<') && self.literal_allowed() && self.heredoc_start() => {}
                'a'..='z' | 'A'..='Z' | '_' => self.word(),
                '.' => {
                    self.bump();
                    self.push(TokenKind::Dot, LexState::Dot);
                }
                ',' => {
                    self.bump();
                    self.push(TokenKind::Comma, LexState::Beg);
                }
                '(' => {
                    self.bump();
                    self.push(TokenKind::LParen, LexState::Beg);
                    self.cmd_start = true;
                }
                ')' => {
                    self.bump();
                    self.push(TokenKind::RParen, LexState::EndArg);
                }
                _ => self.operator(c),
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Only blanks and comments left before the end of input.
    fn only_trivia_remains(&self) -> bool {
        let mut in_comment = false;
        for &c in &self.chars[self.pos..] {
            match c {
                '\n' => in_comment = false,
                _ if in_comment => {}
                '#' => in_comment = true,
                c if c.is_whitespace() => {}
                _ => return false,
            }
        }
        true
    }

    fn newline(&mut self) {
        let line = self.line;
        self.bump();
        self.out.heredoc_just_closed = false;
        if !self.pending.is_empty() && !self.heredoc_bodies() {
            return;
        }
        match self.state {
            // the expression is not finished, the newline is just whitespace
            LexState::Beg | LexState::Dot | LexState::Class | LexState::Fname | LexState::Value => {}
            _ if self.only_trivia_remains() => {}
            _ => {
                self.out.tokens.push(Token {
                    kind: TokenKind::Newline,
                    line,
                    space_before: self.space_before,
                });
                self.state = LexState::Beg;
                self.cmd_start = true;
            }
        }
    }

    fn number(&mut self) {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c != '_' {
                break;
            }
            self.bump();
        }
        match digits.parse::<i64>() {
            Ok(n) => self.push(TokenKind::Int(n), LexState::End),
            Err(_) => self.push(
                TokenKind::Error(format!("integer too big: {}", digits)),
                LexState::End,
            ),
        }
    }

    /// Read a quoted string. Returns false when the input ended inside it.
    fn string(&mut self, quote: char) -> bool {
        let line = self.line;
        self.bump();
        let mut text = String::new();
        loop {
            let Some(c) = self.bump() else {
                self.out.open_string = true;
                return false;
            };
            if c == quote {
                break;
            }
            if c != '\\' {
                text.push(c);
                continue;
            }
            let Some(escaped) = self.bump() else {
                self.out.open_string = true;
                return false;
            };
            if quote == '\'' {
                if escaped != '\'' && escaped != '\\' {
                    text.push('\\');
                }
                text.push(escaped);
            } else {
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    'e' => '\x1b',
                    '0' => '\0',
                    other => other,
                });
            }
        }
        self.out.tokens.push(Token {
            kind: TokenKind::Str(text),
            line,
            space_before: self.space_before,
        });
        self.state = LexState::End;
        self.cmd_start = false;
        true
    }

    /// Read a `/.../` literal. Returns false when the input ended inside it.
    fn regex(&mut self) -> bool {
        let line = self.line;
        self.bump();
        let mut source = String::new();
        loop {
            let Some(c) = self.bump() else {
                self.out.open_string = true;
                return false;
            };
            match c {
                '/' => break,
                '\\' => {
                    source.push('\\');
                    match self.bump() {
                        Some(escaped) => source.push(escaped),
                        None => {
                            self.out.open_string = true;
                            return false;
                        }
                    }
                }
                other => source.push(other),
            }
        }
        while let Some('i' | 'm' | 'x') = self.peek() {
            self.bump();
        }
        self.out.tokens.push(Token {
            kind: TokenKind::Regex(source),
            line,
            space_before: self.space_before,
        });
        self.state = LexState::End;
        self.cmd_start = false;
        true
    }

    /// Try to read `<<ID`, `<<-ID` or `<<~ID`. Leaves the input alone on failure.
    fn heredoc_start(&mut self) -> bool {
        let mut offset = 2;
        let (indented_end, squiggly) = match self.peek_at(offset) {
            Some('-') => (true, false),
            Some('~') => (true, true),
            _ => (false, false),
        };
        if indented_end {
            offset += 1;
        }
        let quote = match self.peek_at(offset) {
            Some(q @ ('\'' | '"')) => {
                offset += 1;
                Some(q)
            }
            _ => None,
        };
        let mut terminator = String::new();
        while let Some(c) = self.peek_at(offset) {
            let starts = terminator.is_empty();
            if c == '_' || c.is_ascii_alphabetic() || (!starts && c.is_ascii_digit()) {
                terminator.push(c);
                offset += 1;
            } else {
                break;
            }
        }
        if terminator.is_empty() {
            return false;
        }
        if let Some(q) = quote {
            if self.peek_at(offset) != Some(q) {
                return false;
            }
            offset += 1;
        }
        for _ in 0..offset {
            self.bump();
        }
        let index = self.out.heredocs.len();
        self.out.heredocs.push(String::new());
        self.pending.push(PendingHeredoc {
            index,
            terminator,
            indented_end,
            squiggly,
        });
        self.push(TokenKind::Heredoc(index), LexState::End);
        true
    }

    /// Read the bodies of every heredoc opened on the line just ended.
    /// Returns false when the input ran out before a terminator.
    fn heredoc_bodies(&mut self) -> bool {
        let pending = std::mem::take(&mut self.pending);
        for heredoc in pending {
            let mut lines = Vec::new();
            loop {
                if self.peek().is_none() {
                    self.out.heredoc_active = true;
                    self.out.heredocs[heredoc.index] = join_body(&lines, heredoc.squiggly);
                    return false;
                }
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                let had_newline = self.bump().is_some();
                let candidate = if heredoc.indented_end {
                    text.trim_start()
                } else {
                    text.as_str()
                };
                if candidate.trim_end_matches('\r') == heredoc.terminator {
                    self.out.heredoc_just_closed = true;
                    break;
                }
                lines.push(text);
                if !had_newline {
                    self.out.heredoc_active = true;
                    self.out.heredocs[heredoc.index] = join_body(&lines, heredoc.squiggly);
                    return false;
                }
            }
            self.out.heredocs[heredoc.index] = join_body(&lines, heredoc.squiggly);
        }
        true
    }

    fn word(&mut self) {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        if let Some('?' | '!') = self.peek() {
            if self.peek_at(1) != Some('=') {
                self.pos += 1;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if self.state == LexState::Dot {
            self.push(TokenKind::Ident(word), LexState::Arg);
            return;
        }
        if self.state == LexState::Fname {
            self.push(TokenKind::Ident(word), LexState::EndFn);
            return;
        }
        if let Some(kw) = Keyword::lookup(&word) {
            let cmd_start = matches!(kw, Keyword::Then | Keyword::Do | Keyword::Else);
            self.push(TokenKind::Keyword(kw), kw.next_state());
            self.cmd_start = cmd_start;
            return;
        }
        if word.starts_with(|c: char| c.is_ascii_uppercase()) {
            let next = if self.state == LexState::Class {
                LexState::End
            } else if self.cmd_start {
                LexState::CmdArg
            } else {
                LexState::Arg
            };
            self.push(TokenKind::Const(word), next);
            return;
        }

        if self.assignment_follows() {
            self.locals.insert(word.clone());
        }
        let next = if self.locals.contains(&word) {
            LexState::End
        } else if self.cmd_start {
            LexState::CmdArg
        } else {
            LexState::Arg
        };
        self.push(TokenKind::Ident(word), next);
    }

    /// `=` (and not `==`) follows on the same line.
    fn assignment_follows(&self) -> bool {
        let mut i = self.pos;
        while let Some(' ' | '\t') = self.chars.get(i) {
            i += 1;
        }
        self.chars.get(i) == Some(&'=') && self.chars.get(i + 1) != Some(&'=')
    }

    fn operator(&mut self, c: char) {
        let next = self.peek_at(1);
        let (op, len) = match (c, next) {
            ('=', Some('=')) => (Op::EqEq, 2),
            ('=', _) => (Op::Assign, 1),
            ('!', Some('=')) => (Op::NotEq, 2),
            ('!', _) => (Op::Bang, 1),
            ('<', Some('=')) => (Op::LtEq, 2),
            ('<', Some('<')) => (Op::Shl, 2),
            ('<', _) => (Op::Lt, 1),
            ('>', Some('=')) => (Op::GtEq, 2),
            ('>', _) => (Op::Gt, 1),
            ('&', Some('&')) => (Op::AndAnd, 2),
            ('|', Some('|')) => (Op::OrOr, 2),
            ('+', _) => (Op::Plus, 1),
            ('-', _) => (Op::Minus, 1),
            ('*', _) => (Op::Star, 1),
            ('/', _) => (Op::Slash, 1),
            ('%', _) => (Op::Percent, 1),
            _ => {
                self.bump();
                let state = self.state;
                self.push(
                    TokenKind::Error(format!("Invalid char '{}' in expression", c.escape_default())),
                    state,
                );
                return;
            }
        };
        for _ in 0..len {
            self.bump();
        }
        self.push(TokenKind::Op(op), LexState::Beg);
    }
}

/// Join heredoc body lines, dedenting them for `<<~`.
fn join_body(lines: &[String], squiggly: bool) -> String {
    let indent = if squiggly {
        lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.chars().take_while(|c| *c == ' ' || *c == '\t').count())
            .min()
            .unwrap_or(0)
    } else {
        0
    };
    let mut body = String::new();
    for line in lines {
        let skip = line
            .char_indices()
            .take(indent)
            .take_while(|(_, c)| *c == ' ' || *c == '\t')
            .count();
        let rest: String = line.chars().skip(skip).collect();
        body.push_str(&rest);
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).tokens.into_iter().map(|t| t.kind).collect()
    }

    fn end_state(source: &str) -> LexState {
        tokenize(source).lex_state
    }

    #[test]
    fn test_simple_expression() {
        assert_eq!(
            kinds("1 + 22"),
            vec![TokenKind::Int(1), TokenKind::Op(Op::Plus), TokenKind::Int(22)]
        );
        assert_eq!(end_state("1 + 22"), LexState::End);
    }

    #[test]
    fn test_trailing_operator_is_beg() {
        assert_eq!(end_state("puts 1 +"), LexState::Beg);
    }

    #[test]
    fn test_trailing_dot() {
        assert_eq!(end_state("\"abc\"."), LexState::Dot);
    }

    #[test]
    fn test_method_name_after_dot_is_arg() {
        assert_eq!(end_state("\"abc\".upcase"), LexState::Arg);
    }

    #[test]
    fn test_class_and_def_keywords() {
        assert_eq!(end_state("class"), LexState::Class);
        assert_eq!(end_state("class Foo"), LexState::End);
        assert_eq!(end_state("def"), LexState::Fname);
        assert_eq!(end_state("def foo"), LexState::EndFn);
    }

    #[test]
    fn test_conditional_keyword_is_value() {
        assert_eq!(end_state("if"), LexState::Value);
        assert_eq!(end_state("x = 1 while"), LexState::Value);
    }

    #[test]
    fn test_jump_keyword_is_mid() {
        assert_eq!(end_state("return"), LexState::Mid);
    }

    #[test]
    fn test_command_position() {
        assert_eq!(end_state("puts"), LexState::CmdArg);
        assert_eq!(end_state("x = 1; x"), LexState::End);
    }

    #[test]
    fn test_newline_after_operator_continues() {
        assert_eq!(
            kinds("1 +\n2"),
            vec![TokenKind::Int(1), TokenKind::Op(Op::Plus), TokenKind::Int(2)]
        );
    }

    #[test]
    fn test_newline_separates_statements() {
        assert_eq!(
            kinds("1\n2"),
            vec![TokenKind::Int(1), TokenKind::Newline, TokenKind::Int(2)]
        );
    }

    #[test]
    fn test_trailing_newline_keeps_state() {
        assert_eq!(kinds("1\n\n"), vec![TokenKind::Int(1)]);
        assert_eq!(end_state("1\n  # done\n"), LexState::End);
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#""a\nb" 'c\d'"#),
            vec![TokenKind::Str("a\nb".into()), TokenKind::Str("c\\d".into())]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let lexed = tokenize("puts \"hello");
        assert!(lexed.open_string);
        assert_eq!(lexed.tokens.len(), 1);
    }

    #[test]
    fn test_multiline_string_counts_lines() {
        let lexed = tokenize("\"a\nb\"\nx");
        assert!(!lexed.open_string);
        assert_eq!(lexed.tokens[2].line, 3);
    }

    #[test]
    fn test_regex_in_argument_position() {
        assert_eq!(
            kinds("p /ab/"),
            vec![TokenKind::Ident("p".into()), TokenKind::Regex("ab".into())]
        );
    }

    #[test]
    fn test_slash_after_value_is_division() {
        assert_eq!(
            kinds("6 / 2"),
            vec![TokenKind::Int(6), TokenKind::Op(Op::Slash), TokenKind::Int(2)]
        );
    }

    #[test]
    fn test_unterminated_regex() {
        assert!(tokenize("x = /ab").open_string);
    }

    #[test]
    fn test_heredoc_open() {
        let lexed = tokenize("<<~HEREDOC\nhello");
        assert!(lexed.heredoc_active);
        assert!(!lexed.heredoc_just_closed);
    }

    #[test]
    fn test_heredoc_not_started() {
        assert!(tokenize("x = <<EOS").heredoc_active);
    }

    #[test]
    fn test_heredoc_closed() {
        let lexed = tokenize("<<~HEREDOC\n  hello\n    world\n  HEREDOC");
        assert!(!lexed.heredoc_active);
        assert!(lexed.heredoc_just_closed);
        assert_eq!(lexed.heredocs, vec!["hello\n  world\n".to_string()]);
    }

    #[test]
    fn test_heredoc_flag_cleared_by_later_newline() {
        let lexed = tokenize("x = <<EOS\nhi\nEOS\nputs x\n1");
        assert!(!lexed.heredoc_just_closed);
        assert_eq!(lexed.heredocs, vec!["hi\n".to_string()]);
    }

    #[test]
    fn test_heredoc_flag_cleared_by_following_statement() {
        let lexed = tokenize("x = <<~A\nfoo\nA\nif true");
        assert!(!lexed.heredoc_just_closed);
        assert_eq!(lexed.lex_state, LexState::End);
        assert!(!tokenize("x = <<~A\nfoo\nA\nif true\n").heredoc_just_closed);
    }

    #[test]
    fn test_plain_heredoc_needs_column_zero() {
        assert!(tokenize("<<EOS\nhi\n  EOS").heredoc_active);
        assert!(!tokenize("<<-EOS\nhi\n  EOS").heredoc_active);
    }

    #[test]
    fn test_shift_operator() {
        assert_eq!(
            kinds("x = 1; x << 2"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Op(Op::Assign),
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Ident("x".into()),
                TokenKind::Op(Op::Shl),
                TokenKind::Int(2),
            ]
        );
    }

    #[test]
    fn test_invalid_char() {
        assert_eq!(
            kinds("1 $"),
            vec![
                TokenKind::Int(1),
                TokenKind::Error("Invalid char '$' in expression".into())
            ]
        );
    }

    #[test]
    fn test_predicate_method_name() {
        assert_eq!(
            kinds("x.nil?"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Dot,
                TokenKind::Ident("nil?".into())
            ]
        );
    }
}
