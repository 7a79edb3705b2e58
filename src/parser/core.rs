//! Core parser struct and helper methods.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParseError>;

/// The parser for SwiftScript.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse a complete program, stopping at the first error.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        Ok(Program::new(statements))
    }

    /// Diagnostics mode: collect every parse error, synchronizing at
    /// statement boundaries so later errors are still reported.
    pub fn parse_all(&mut self) -> (Program, Vec<ParseError>) {
        let mut statements = Vec::new();
        let mut errors = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }
        (Program::new(statements), errors)
    }

    /// Skip tokens until a plausible statement boundary.
    pub(crate) fn synchronize(&mut self) {
        while !self.is_at_end() {
            match self.peek().kind {
                TokenKind::Var
                | TokenKind::Let
                | TokenKind::Func
                | TokenKind::Class
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Protocol
                | TokenKind::Extension
                | TokenKind::Import
                | TokenKind::If
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Switch
                | TokenKind::Return => return,
                TokenKind::Semicolon | TokenKind::RightBrace => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let index = if self.current + n < self.tokens.len() {
            self.current + n
        } else {
            self.tokens.len() - 1
        };
        &self.tokens[index]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(format!("{}", kind)))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Expect `>`, splitting a `>>` token in place for nested generics.
    pub(crate) fn expect_closing_angle(&mut self) -> ParseResult<()> {
        match self.peek().kind {
            TokenKind::Greater => {
                self.advance();
                Ok(())
            }
            TokenKind::Shr => {
                // Consume one `>` of the pair; the other stays current.
                self.tokens[self.current].kind = TokenKind::Greater;
                Ok(())
            }
            _ => Err(self.unexpected(">")),
        }
    }

    /// Build an `UnexpectedToken` error, surfacing lexer error tokens.
    pub(crate) fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        match &self.peek().kind {
            TokenKind::Error(message) => ParseError::general(message.clone(), self.current_span()),
            found => ParseError::unexpected_token(
                expected,
                format!("{}", found),
                self.current_span(),
            ),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn previous_span(&self) -> Span {
        self.previous().span
    }
}
