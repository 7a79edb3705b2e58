//! Statement parsing: control flow, loops, switch.

use crate::ast::*;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        match &self.peek().kind {
            TokenKind::If => {
                self.advance();
                self.if_statement(span)
            }
            TokenKind::Guard => {
                self.advance();
                self.guard_statement(span)
            }
            TokenKind::While => {
                self.advance();
                let condition = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::new(StmtKind::While { condition, body }, span))
            }
            TokenKind::Repeat => {
                self.advance();
                let body = self.block()?;
                self.expect(&TokenKind::While)?;
                let condition = self.expression()?;
                Ok(Stmt::new(StmtKind::RepeatWhile { body, condition }, span))
            }
            TokenKind::For => {
                self.advance();
                self.for_statement(span)
            }
            TokenKind::Switch => {
                self.advance();
                self.switch_statement(span)
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expression() {
                    Some(self.expression()?)
                } else {
                    None
                };
                Ok(Stmt::new(StmtKind::Return(value), span))
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.expression()?;
                Ok(Stmt::new(StmtKind::Throw(value), span))
            }
            TokenKind::Print => {
                self.advance();
                self.expect(&TokenKind::LeftParen)?;
                let mut values = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        values.push(self.expression()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightParen)?;
                Ok(Stmt::new(StmtKind::Print(values), span))
            }
            TokenKind::LeftBrace => {
                let body = self.block()?;
                Ok(Stmt::new(StmtKind::Block(body), span))
            }
            _ => {
                let expr = self.expression()?;
                Ok(Stmt::new(StmtKind::Expression(expr), span))
            }
        }
    }

    /// A `{ ... }` block of declarations.
    pub(crate) fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }

    fn if_statement(&mut self, span: crate::span::Span) -> ParseResult<Stmt> {
        // `if let x = expr { … }`
        if self.check(&TokenKind::Let) && matches!(self.peek_nth(1).kind, TokenKind::Identifier(_))
        {
            self.advance();
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::Equal)?;
            let value = self.expression()?;
            let then_branch = self.block()?;
            let else_branch = self.else_branch()?;
            return Ok(Stmt::new(
                StmtKind::IfLet {
                    name,
                    value,
                    then_branch,
                    else_branch,
                },
                span,
            ));
        }

        let condition = self.expression()?;
        let then_branch = self.block()?;
        let else_branch = self.else_branch()?;
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn else_branch(&mut self) -> ParseResult<Option<Vec<Stmt>>> {
        if !self.match_token(&TokenKind::Else) {
            return Ok(None);
        }
        if self.check(&TokenKind::If) {
            let span = self.current_span();
            self.advance();
            let nested = self.if_statement(span)?;
            Ok(Some(vec![nested]))
        } else {
            Ok(Some(self.block()?))
        }
    }

    fn guard_statement(&mut self, span: crate::span::Span) -> ParseResult<Stmt> {
        if self.check(&TokenKind::Let) && matches!(self.peek_nth(1).kind, TokenKind::Identifier(_))
        {
            self.advance();
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::Equal)?;
            let value = self.expression()?;
            self.expect(&TokenKind::Else)?;
            let body = self.block()?;
            return Ok(Stmt::new(StmtKind::GuardLet { name, value, body }, span));
        }

        let condition = self.expression()?;
        self.expect(&TokenKind::Else)?;
        let body = self.block()?;
        Ok(Stmt::new(StmtKind::Guard { condition, body }, span))
    }

    fn for_statement(&mut self, span: crate::span::Span) -> ParseResult<Stmt> {
        let variable = if self.match_token(&TokenKind::Underscore) {
            "_".to_string()
        } else {
            self.expect_identifier()?
        };
        self.expect(&TokenKind::In)?;
        let iterable = self.expression()?;
        let where_clause = if self.match_token(&TokenKind::Where) {
            Some(self.expression()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(Stmt::new(
            StmtKind::For {
                variable,
                iterable,
                where_clause,
                body,
            },
            span,
        ))
    }

    fn switch_statement(&mut self, span: crate::span::Span) -> ParseResult<Stmt> {
        let subject = self.expression()?;
        self.expect(&TokenKind::LeftBrace)?;

        let mut cases = Vec::new();
        let mut default = None;

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            if self.match_token(&TokenKind::Default) {
                self.expect(&TokenKind::Colon)?;
                default = Some(self.case_body()?);
            } else {
                let case_span = self.current_span();
                self.expect(&TokenKind::Case)?;
                let mut patterns = vec![self.pattern()?];
                while self.match_token(&TokenKind::Comma) {
                    patterns.push(self.pattern()?);
                }
                let guard = if self.match_token(&TokenKind::Where) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.expect(&TokenKind::Colon)?;
                let body = self.case_body()?;
                cases.push(SwitchCase {
                    patterns,
                    guard,
                    body,
                    span: case_span,
                });
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Stmt::new(
            StmtKind::Switch {
                subject,
                cases,
                default,
            },
            span,
        ))
    }

    /// Statements of one case arm, ending at the next `case`, `default`,
    /// or the closing brace.
    fn case_body(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Case)
            && !self.check(&TokenKind::Default)
            && !self.check(&TokenKind::RightBrace)
            && !self.is_at_end()
        {
            body.push(self.declaration()?);
        }
        Ok(body)
    }

    /// A switch case pattern: enum case (with optional bindings), range, or
    /// literal expression compared by equality.
    fn pattern(&mut self) -> ParseResult<Pattern> {
        // Leading-dot shorthand: `.ok(let n)`
        if self.match_token(&TokenKind::Dot) {
            let case_name = self.expect_identifier()?;
            let bindings = self.case_bindings()?;
            return Ok(Pattern::EnumCase {
                enum_name: None,
                case_name,
                bindings,
            });
        }

        // Qualified enum pattern with bindings: `Response.success(let msg)`
        if matches!(self.peek().kind, TokenKind::Identifier(_))
            && self.peek_nth(1).kind == TokenKind::Dot
            && matches!(self.peek_nth(2).kind, TokenKind::Identifier(_))
            && self.peek_nth(3).kind == TokenKind::LeftParen
            && self.peek_nth(4).kind == TokenKind::Let
        {
            let enum_name = self.expect_identifier()?;
            self.advance();
            let case_name = self.expect_identifier()?;
            let bindings = self.case_bindings()?;
            return Ok(Pattern::EnumCase {
                enum_name: Some(enum_name),
                case_name,
                bindings,
            });
        }

        let expr = self.expression()?;
        if let ExprKind::Range {
            start,
            end,
            inclusive,
        } = expr.kind
        {
            Ok(Pattern::Range {
                start: *start,
                end: *end,
                inclusive,
            })
        } else {
            Ok(Pattern::Literal(expr))
        }
    }

    /// `(let a, let b)` bindings after an enum case pattern.
    fn case_bindings(&mut self) -> ParseResult<Vec<String>> {
        let mut bindings = Vec::new();
        if self.match_token(&TokenKind::LeftParen) {
            loop {
                self.expect(&TokenKind::Let)?;
                bindings.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RightParen)?;
        }
        Ok(bindings)
    }

    /// Whether the current token can begin an expression (used by `return`).
    fn starts_expression(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::IntLiteral(_)
                | TokenKind::FloatLiteral(_)
                | TokenKind::StringLiteral(_)
                | TokenKind::BoolLiteral(_)
                | TokenKind::InterpolationStart(_)
                | TokenKind::Identifier(_)
                | TokenKind::Nil
                | TokenKind::SelfKw
                | TokenKind::Super
                | TokenKind::Minus
                | TokenKind::Bang
                | TokenKind::Tilde
                | TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::LeftBrace
        )
    }
}
