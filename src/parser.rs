use std::collections::HashSet;

use crate::ast::{BinOp, Node, Program};
use crate::context::ParserContext;
use crate::cycle::Parser;
use crate::multiline::UNEXPECTED_END;
use crate::tokenizer::{self, Keyword, Op, Token, TokenKind};
use crate::types::{ParseAttempt, ParseEndState};

/// Deepest expression nesting the grammar descends into.
pub const MAX_NESTING: usize = 64;

/// Reported when [`MAX_NESTING`] is exceeded.
pub const NESTING_TOO_DEEP: &str = "memory exhausted";

/// Recursive-descent parser for the Ruby subset.
///
/// Stops at the first syntax error, the way a yacc grammar without error
/// productions does.
#[derive(Clone, Copy, Debug, Default)]
pub struct MiniParser;

impl Parser for MiniParser {
    type Tree = Program;

    fn parse(&mut self, source: &str, ctx: &ParserContext) -> ParseAttempt<Program> {
        parse_source(source, ctx)
    }
}

/// Parse `source` into a fresh attempt.
pub fn parse_source(source: &str, ctx: &ParserContext) -> ParseAttempt<Program> {
    let lexed = tokenizer::tokenize(source);
    let mut state = ParseEndState {
        heredoc_active: lexed.heredoc_active,
        heredoc_just_closed: lexed.heredoc_just_closed,
        open_string: lexed.open_string,
        lex_state: lexed.lex_state,
        ..ParseEndState::default()
    };

    let mut grammar = Grammar {
        tokens: &lexed.tokens,
        heredocs: &lexed.heredocs,
        pos: 0,
        depth: 0,
        eof_line: lexed.last_line,
        locals: vec![HashSet::new()],
    };
    let tree = match grammar.program() {
        Ok(program) => program,
        Err(failure) => {
            ctx.report(&mut state, failure.line, failure.message);
            Vec::new()
        }
    };
    ParseAttempt { state, tree }
}

struct Failure {
    line: usize,
    message: String,
}

type PResult<T> = Result<T, Failure>;

/// Grammar-style name of a token for diagnostics.
fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Int(_) => "tINTEGER".to_string(),
        TokenKind::Str(_) | TokenKind::Heredoc(_) => "tSTRING".to_string(),
        TokenKind::Regex(_) => "tREGEXP_BEG".to_string(),
        TokenKind::Ident(_) => "tIDENTIFIER".to_string(),
        TokenKind::Const(_) => "tCONSTANT".to_string(),
        TokenKind::Keyword(kw) => format!("keyword_{}", kw.as_str()),
        TokenKind::Op(op) => match op {
            Op::EqEq => "tEQ".to_string(),
            Op::NotEq => "tNEQ".to_string(),
            Op::LtEq => "tLEQ".to_string(),
            Op::GtEq => "tGEQ".to_string(),
            Op::AndAnd => "tANDOP".to_string(),
            Op::OrOr => "tOROP".to_string(),
            Op::Shl => "tLSHFT".to_string(),
            other => format!("'{}'", other.as_str()),
        },
        TokenKind::Dot => "'.'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Newline => "'\\n'".to_string(),
        TokenKind::Error(message) => message.clone(),
    }
}

struct Grammar<'a> {
    tokens: &'a [Token],
    heredocs: &'a [String],
    pos: usize,
    /// Current expression nesting, bounded by [`MAX_NESTING`].
    depth: usize,
    eof_line: usize,
    /// Local variable names, one set per `def`/`class` scope.
    locals: Vec<HashSet<String>>,
}

impl<'a> Grammar<'a> {
    // ========== Token access ==========

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn kind_at(&self, offset: usize) -> Option<&'a TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.kind_at(0)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn unexpected(&self, tok: Option<&Token>) -> Failure {
        match tok {
            None => Failure {
                line: self.eof_line,
                message: UNEXPECTED_END.to_string(),
            },
            Some(Token {
                kind: TokenKind::Error(message),
                line,
                ..
            }) => Failure {
                line: *line,
                message: message.clone(),
            },
            Some(tok) => Failure {
                line: tok.line,
                message: format!("syntax error, unexpected {}", describe(&tok.kind)),
            },
        }
    }

    fn expect_end(&mut self) -> PResult<()> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Keyword(Keyword::End),
                ..
            }) => {
                self.pos += 1;
                Ok(())
            }
            None => Err(Failure {
                line: self.eof_line,
                message: format!("{}, expecting keyword_end", UNEXPECTED_END),
            }),
            tok => Err(self.unexpected(tok)),
        }
    }

    /// `then`/`do` or a newline after a condition.
    fn expect_clause(&mut self, word: Keyword) -> PResult<()> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(kw)) if *kw == word => {
                self.pos += 1;
                Ok(())
            }
            Some(TokenKind::Newline) => Ok(()),
            _ => Err(self.unexpected(self.peek())),
        }
    }

    // ========== Scopes ==========

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.last().is_some_and(|scope| scope.contains(name))
    }

    fn scoped<T>(
        &mut self,
        names: HashSet<String>,
        f: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<T> {
        self.locals.push(names);
        let result = f(self);
        self.locals.pop();
        result
    }

    // ========== Statements ==========

    fn program(&mut self) -> PResult<Program> {
        let body = self.statements(&[])?;
        match self.peek() {
            None => Ok(body),
            tok => Err(self.unexpected(tok)),
        }
    }

    /// Statements up to the end of input or one of `stops`, which is left unconsumed.
    fn statements(&mut self, stops: &[Keyword]) -> PResult<Vec<Node>> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                None => return Ok(body),
                Some(TokenKind::Keyword(kw)) if stops.contains(kw) => return Ok(body),
                _ => {}
            }
            body.push(self.statement()?);
            match self.peek_kind() {
                None | Some(TokenKind::Newline) => {}
                Some(TokenKind::Keyword(kw)) if stops.contains(kw) => return Ok(body),
                _ => return Err(self.unexpected(self.peek())),
            }
        }
    }

    /// An expression with optional trailing `if`/`unless`/`while`/`until` modifiers.
    fn statement(&mut self) -> PResult<Node> {
        let mut node = self.expr_stmt()?;
        loop {
            let kw = match self.peek_kind() {
                Some(TokenKind::Keyword(
                    kw @ (Keyword::If | Keyword::Unless | Keyword::While | Keyword::Until),
                )) => *kw,
                _ => break,
            };
            self.pos += 1;
            let cond = Box::new(self.expr_stmt()?);
            node = match kw {
                Keyword::If => Node::If {
                    cond,
                    then_body: vec![node],
                    else_body: Vec::new(),
                },
                Keyword::Unless => Node::If {
                    cond: Box::new(Node::Not(cond)),
                    then_body: vec![node],
                    else_body: Vec::new(),
                },
                Keyword::While => Node::While {
                    cond,
                    body: vec![node],
                    negate: false,
                },
                _ => Node::While {
                    cond,
                    body: vec![node],
                    negate: true,
                },
            };
        }
        Ok(node)
    }

    /// `and` / `or` chains.
    fn expr_stmt(&mut self) -> PResult<Node> {
        let mut left = self.not_operand()?;
        loop {
            if self.eat(&TokenKind::Keyword(Keyword::And)) {
                let right = self.not_operand()?;
                left = Node::And(Box::new(left), Box::new(right));
            } else if self.eat(&TokenKind::Keyword(Keyword::Or)) {
                let right = self.not_operand()?;
                left = Node::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn not_operand(&mut self) -> PResult<Node> {
        if self.eat(&TokenKind::Keyword(Keyword::Not)) {
            let inner = self.nested(Self::not_operand)?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.expr()
    }

    // ========== Expressions ==========

    fn expr(&mut self) -> PResult<Node> {
        if let (Some(TokenKind::Ident(name)), Some(TokenKind::Op(Op::Assign))) =
            (self.kind_at(0), self.kind_at(1))
        {
            self.pos += 2;
            self.declare(name);
            let value = self.nested(Self::expr)?;
            return Ok(Node::Assign(name.clone(), Box::new(value)));
        }
        self.oror()
    }

    fn oror(&mut self) -> PResult<Node> {
        let mut left = self.andand()?;
        while self.eat(&TokenKind::Op(Op::OrOr)) {
            let right = self.andand()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn andand(&mut self) -> PResult<Node> {
        let mut left = self.equality()?;
        while self.eat(&TokenKind::Op(Op::AndAnd)) {
            let right = self.equality()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// Left-associative binary level over `ops`, with `operand` one level tighter.
    fn binary(
        &mut self,
        ops: &[(Op, BinOp)],
        operand: fn(&mut Self) -> PResult<Node>,
    ) -> PResult<Node> {
        let mut left = operand(self)?;
        'outer: loop {
            for (op, bin) in ops {
                if self.eat(&TokenKind::Op(*op)) {
                    let right = operand(self)?;
                    left = Node::Binary(*bin, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> PResult<Node> {
        self.binary(
            &[(Op::EqEq, BinOp::Eq), (Op::NotEq, BinOp::NotEq)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> PResult<Node> {
        self.binary(
            &[
                (Op::Lt, BinOp::Lt),
                (Op::Gt, BinOp::Gt),
                (Op::LtEq, BinOp::LtEq),
                (Op::GtEq, BinOp::GtEq),
            ],
            Self::shift,
        )
    }

    fn shift(&mut self) -> PResult<Node> {
        self.binary(&[(Op::Shl, BinOp::Shl)], Self::additive)
    }

    fn additive(&mut self) -> PResult<Node> {
        self.binary(
            &[(Op::Plus, BinOp::Add), (Op::Minus, BinOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> PResult<Node> {
        self.binary(
            &[
                (Op::Star, BinOp::Mul),
                (Op::Slash, BinOp::Div),
                (Op::Percent, BinOp::Mod),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> PResult<Node> {
        self.nested(Self::prefixed)
    }

    /// Run `rule` one nesting level deeper, failing once [`MAX_NESTING`] is reached.
    fn nested(&mut self, rule: fn(&mut Self) -> PResult<Node>) -> PResult<Node> {
        if self.depth >= MAX_NESTING {
            return Err(Failure {
                line: self.peek().map_or(self.eof_line, |tok| tok.line),
                message: NESTING_TOO_DEEP.to_string(),
            });
        }
        self.depth += 1;
        let node = rule(self);
        self.depth -= 1;
        node
    }

    fn prefixed(&mut self) -> PResult<Node> {
        if self.eat(&TokenKind::Op(Op::Minus)) {
            let inner = self.unary()?;
            return Ok(match inner {
                Node::Int(n) => Node::Int(n.wrapping_neg()),
                other => Node::Neg(Box::new(other)),
            });
        }
        if self.eat(&TokenKind::Op(Op::Bang)) {
            let inner = self.unary()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Node> {
        let mut node = self.primary()?;
        while self.eat(&TokenKind::Dot) {
            let name = match self.next() {
                Some(Token {
                    kind: TokenKind::Ident(name),
                    ..
                }) => name.clone(),
                tok => return Err(self.unexpected(tok)),
            };
            let args = if self.at_paren_args() {
                self.paren_args()?
            } else {
                Vec::new()
            };
            node = Node::Call {
                recv: Some(Box::new(node)),
                name,
                args,
            };
        }
        Ok(node)
    }

    fn primary(&mut self) -> PResult<Node> {
        let Some(tok) = self.next() else {
            return Err(self.unexpected(None));
        };
        match &tok.kind {
            TokenKind::Int(n) => Ok(Node::Int(*n)),
            TokenKind::Str(s) => Ok(Node::Str(s.clone())),
            TokenKind::Heredoc(index) => Ok(Node::Str(
                self.heredocs.get(*index).cloned().unwrap_or_default(),
            )),
            TokenKind::Regex(source) => Ok(Node::Regex(source.clone())),
            TokenKind::Const(name) => Ok(Node::Const(name.clone())),
            TokenKind::Ident(name) => self.identifier(name),
            TokenKind::LParen => {
                self.skip_newlines();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Node::Nil);
                }
                let inner = self.statement()?;
                self.skip_newlines();
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    tok => Err(self.unexpected(tok)),
                }
            }
            TokenKind::Keyword(kw) => match kw {
                Keyword::Nil => Ok(Node::Nil),
                Keyword::True => Ok(Node::True),
                Keyword::False => Ok(Node::False),
                Keyword::SelfKw => Ok(Node::SelfRef),
                Keyword::If => self.if_rest(false),
                Keyword::Unless => self.if_rest(true),
                Keyword::While => self.while_rest(false),
                Keyword::Until => self.while_rest(true),
                Keyword::Def => self.def_rest(),
                Keyword::Class => self.class_rest(),
                Keyword::Return | Keyword::Break | Keyword::Next => {
                    let value = if self.starts_value() {
                        Some(Box::new(self.expr()?))
                    } else {
                        None
                    };
                    Ok(match kw {
                        Keyword::Return => Node::Return(value),
                        Keyword::Break => Node::Break(value),
                        _ => Node::Next(value),
                    })
                }
                _ => Err(self.unexpected(Some(tok))),
            },
            _ => Err(self.unexpected(Some(tok))),
        }
    }

    // ========== Calls ==========

    fn at_paren_args(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token {
                kind: TokenKind::LParen,
                space_before: false,
                ..
            })
        )
    }

    fn paren_args(&mut self) -> PResult<Vec<Node>> {
        self.pos += 1;
        let mut args = Vec::new();
        self.skip_newlines();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            self.skip_newlines();
            match self.next() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => self.skip_newlines(),
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => return Ok(args),
                tok => return Err(self.unexpected(tok)),
            }
        }
    }

    /// Whether the next token can begin an expression.
    fn starts_value(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::Int(_)
                    | TokenKind::Str(_)
                    | TokenKind::Heredoc(_)
                    | TokenKind::Regex(_)
                    | TokenKind::Ident(_)
                    | TokenKind::Const(_)
                    | TokenKind::LParen
                    | TokenKind::Op(Op::Minus | Op::Bang)
                    | TokenKind::Keyword(
                        Keyword::Nil | Keyword::True | Keyword::False | Keyword::SelfKw
                    )
            )
        )
    }

    /// Whether the next token is the first argument of a parenthesis-free call.
    fn starts_command_arg(&self) -> bool {
        let Some(tok) = self.peek() else {
            return false;
        };
        if !tok.space_before {
            return false;
        }
        match &tok.kind {
            // `foo -1` passes -1, `foo - 1` subtracts
            TokenKind::Op(Op::Minus) => self
                .tokens
                .get(self.pos + 1)
                .is_some_and(|next| !next.space_before),
            _ => self.starts_value(),
        }
    }

    fn identifier(&mut self, name: &str) -> PResult<Node> {
        if self.at_paren_args() {
            let args = self.paren_args()?;
            return Ok(Node::Call {
                recv: None,
                name: name.to_string(),
                args,
            });
        }
        if !self.is_local(name) && self.starts_command_arg() {
            let mut args = vec![self.expr()?];
            while self.eat(&TokenKind::Comma) {
                args.push(self.expr()?);
            }
            return Ok(Node::Call {
                recv: None,
                name: name.to_string(),
                args,
            });
        }
        Ok(Node::Ident(name.to_string()))
    }

    // ========== Compound forms ==========

    fn if_rest(&mut self, negate: bool) -> PResult<Node> {
        let cond = self.expr_stmt()?;
        self.expect_clause(Keyword::Then)?;
        let then_body = self.statements(&[Keyword::Elsif, Keyword::Else, Keyword::End])?;
        let else_body = match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::Elsif)) if !negate => {
                self.pos += 1;
                vec![self.nested(|g| g.if_rest(false))?]
            }
            Some(TokenKind::Keyword(Keyword::Else)) => {
                self.pos += 1;
                let body = self.statements(&[Keyword::End])?;
                self.expect_end()?;
                body
            }
            _ => {
                self.expect_end()?;
                Vec::new()
            }
        };
        let cond = if negate {
            Node::Not(Box::new(cond))
        } else {
            cond
        };
        Ok(Node::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    fn while_rest(&mut self, negate: bool) -> PResult<Node> {
        let cond = self.expr_stmt()?;
        self.expect_clause(Keyword::Do)?;
        let body = self.statements(&[Keyword::End])?;
        self.expect_end()?;
        Ok(Node::While {
            cond: Box::new(cond),
            body,
            negate,
        })
    }

    fn def_rest(&mut self) -> PResult<Node> {
        let name = match self.next() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => name.clone(),
            tok => return Err(self.unexpected(tok)),
        };

        let mut params = Vec::new();
        if self.eat(&TokenKind::LParen) && !self.eat(&TokenKind::RParen) {
            loop {
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Ident(param),
                        ..
                    }) => params.push(param.clone()),
                    tok => return Err(self.unexpected(tok)),
                }
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Comma,
                        ..
                    }) => {}
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => break,
                    tok => return Err(self.unexpected(tok)),
                }
            }
        } else {
            while let Some(TokenKind::Ident(param)) = self.peek_kind() {
                params.push(param.clone());
                self.pos += 1;
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let scope = params.iter().cloned().collect();
        let body = self.scoped(scope, |g| g.statements(&[Keyword::End]))?;
        self.expect_end()?;
        Ok(Node::Def { name, params, body })
    }

    fn class_rest(&mut self) -> PResult<Node> {
        let name = match self.next() {
            Some(Token {
                kind: TokenKind::Const(name),
                ..
            }) => name.clone(),
            tok => return Err(self.unexpected(tok)),
        };
        let body = self.scoped(HashSet::new(), |g| g.statements(&[Keyword::End]))?;
        self.expect_end()?;
        Ok(Node::Class { name, body })
    }
}
