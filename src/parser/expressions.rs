//! Expression parsing with precedence climbing.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::{get_precedence, Precedence};
use crate::span::Span;

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Assignment)
    }

    pub(crate) fn parse_precedence(&mut self, min: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        loop {
            let prec = get_precedence(&self.peek().kind);
            if prec < min {
                break;
            }
            left = self.parse_infix(left, prec)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let token = self.advance();

        match token.kind {
            TokenKind::IntLiteral(n) => Ok(Expr::new(ExprKind::IntLiteral(n), span)),
            TokenKind::FloatLiteral(n) => Ok(Expr::new(ExprKind::FloatLiteral(n), span)),
            TokenKind::StringLiteral(s) => Ok(Expr::new(ExprKind::StringLiteral(s), span)),
            TokenKind::BoolLiteral(b) => Ok(Expr::new(ExprKind::BoolLiteral(b), span)),
            TokenKind::Nil => Ok(Expr::new(ExprKind::Nil, span)),
            TokenKind::InterpolationStart(prefix) => self.interpolated_string(prefix, span),
            TokenKind::Identifier(name) => self.identifier_expr(name, span),
            TokenKind::SelfKw => Ok(Expr::new(ExprKind::SelfExpr, span)),
            TokenKind::Super => {
                self.expect(&TokenKind::Dot)?;
                let name = self.member_name()?;
                Ok(Expr::new(ExprKind::SuperMethod(name), span))
            }
            TokenKind::Minus => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        operator: UnaryOp::Negate,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Bang => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        operator: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Tilde => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        operator: UnaryOp::BitNot,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::LeftParen => self.paren_expr(span),
            TokenKind::LeftBracket => self.bracket_literal(span),
            TokenKind::LeftBrace => self.closure_literal(span),
            TokenKind::Error(message) => Err(ParseError::general(message, span)),
            other => Err(ParseError::unexpected_token(
                "expression",
                format!("{}", other),
                span,
            )),
        }
    }

    fn parse_infix(&mut self, left: Expr, prec: Precedence) -> ParseResult<Expr> {
        let span = self.current_span();
        let token = self.advance();

        match token.kind {
            // Assignment (right-associative)
            TokenKind::Equal => self.finish_assignment(left, None, span),
            TokenKind::PlusEqual => self.finish_assignment(left, Some(BinaryOp::Add), span),
            TokenKind::MinusEqual => self.finish_assignment(left, Some(BinaryOp::Subtract), span),
            TokenKind::StarEqual => self.finish_assignment(left, Some(BinaryOp::Multiply), span),
            TokenKind::SlashEqual => self.finish_assignment(left, Some(BinaryOp::Divide), span),
            TokenKind::PercentEqual => self.finish_assignment(left, Some(BinaryOp::Modulo), span),
            TokenKind::AmpEqual => self.finish_assignment(left, Some(BinaryOp::BitAnd), span),
            TokenKind::PipeEqual => self.finish_assignment(left, Some(BinaryOp::BitOr), span),
            TokenKind::CaretEqual => self.finish_assignment(left, Some(BinaryOp::BitXor), span),
            TokenKind::ShlEqual => self.finish_assignment(left, Some(BinaryOp::Shl), span),
            TokenKind::ShrEqual => self.finish_assignment(left, Some(BinaryOp::Shr), span),

            TokenKind::Question => {
                let then_expr = self.expression()?;
                self.expect(&TokenKind::Colon)?;
                let else_expr = self.parse_precedence(Precedence::Ternary)?;
                Ok(Expr::new(
                    ExprKind::Ternary {
                        condition: Box::new(left),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    },
                    span,
                ))
            }

            TokenKind::QuestionQuestion => {
                let right = self.parse_precedence(Precedence::NilCoalescing.next())?;
                Ok(Expr::new(
                    ExprKind::NilCoalesce {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                ))
            }

            TokenKind::PipePipe => self.logical(left, LogicalOp::Or, Precedence::Or, span),
            TokenKind::AmpAmp => self.logical(left, LogicalOp::And, Precedence::And, span),

            TokenKind::Pipe => self.binary(left, BinaryOp::BitOr, Precedence::BitOr, span),
            TokenKind::Caret => self.binary(left, BinaryOp::BitXor, Precedence::BitXor, span),
            TokenKind::Amp => self.binary(left, BinaryOp::BitAnd, Precedence::BitAnd, span),
            TokenKind::EqualEqual => self.binary(left, BinaryOp::Equal, Precedence::Equality, span),
            TokenKind::BangEqual => {
                self.binary(left, BinaryOp::NotEqual, Precedence::Equality, span)
            }
            TokenKind::Less => self.binary(left, BinaryOp::Less, Precedence::Comparison, span),
            TokenKind::LessEqual => {
                self.binary(left, BinaryOp::LessEqual, Precedence::Comparison, span)
            }
            TokenKind::Greater => {
                self.binary(left, BinaryOp::Greater, Precedence::Comparison, span)
            }
            TokenKind::GreaterEqual => {
                self.binary(left, BinaryOp::GreaterEqual, Precedence::Comparison, span)
            }
            TokenKind::Is => {
                let type_name = self.type_name_for_cast()?;
                Ok(Expr::new(
                    ExprKind::TypeCheck {
                        value: Box::new(left),
                        type_name,
                    },
                    span,
                ))
            }
            TokenKind::As => {
                let kind = if self.match_token(&TokenKind::Question) {
                    CastKind::Optional
                } else if self.match_token(&TokenKind::Bang) {
                    CastKind::Forced
                } else {
                    CastKind::Checked
                };
                let type_name = self.type_name_for_cast()?;
                Ok(Expr::new(
                    ExprKind::Cast {
                        value: Box::new(left),
                        type_name,
                        kind,
                    },
                    span,
                ))
            }

            TokenKind::ClosedRange => self.range(left, true, span),
            TokenKind::HalfOpenRange => self.range(left, false, span),

            TokenKind::Shl => self.binary(left, BinaryOp::Shl, Precedence::Shift, span),
            TokenKind::Shr => self.binary(left, BinaryOp::Shr, Precedence::Shift, span),
            TokenKind::Plus => self.binary(left, BinaryOp::Add, Precedence::Term, span),
            TokenKind::Minus => self.binary(left, BinaryOp::Subtract, Precedence::Term, span),
            TokenKind::Star => self.binary(left, BinaryOp::Multiply, Precedence::Factor, span),
            TokenKind::Slash => self.binary(left, BinaryOp::Divide, Precedence::Factor, span),
            TokenKind::Percent => self.binary(left, BinaryOp::Modulo, Precedence::Factor, span),

            // Postfix
            TokenKind::LeftParen => {
                let arguments = self.argument_list()?;
                Ok(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(left),
                        arguments,
                    },
                    span,
                ))
            }
            TokenKind::Dot => {
                if let TokenKind::IntLiteral(n) = self.peek().kind {
                    self.advance();
                    Ok(Expr::new(
                        ExprKind::TupleIndex {
                            object: Box::new(left),
                            index: n as u16,
                        },
                        span,
                    ))
                } else {
                    let name = self.member_name()?;
                    Ok(Expr::new(
                        ExprKind::Member {
                            object: Box::new(left),
                            name,
                        },
                        span,
                    ))
                }
            }
            TokenKind::QuestionDot => {
                let name = self.member_name()?;
                Ok(Expr::new(
                    ExprKind::OptionalMember {
                        object: Box::new(left),
                        name,
                    },
                    span,
                ))
            }
            TokenKind::LeftBracket => {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                Ok(Expr::new(
                    ExprKind::Subscript {
                        object: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ))
            }
            TokenKind::Bang => Ok(Expr::new(ExprKind::ForceUnwrap(Box::new(left)), span)),

            other => {
                let _ = prec;
                Err(ParseError::unexpected_token(
                    "operator",
                    format!("{}", other),
                    span,
                ))
            }
        }
    }

    fn binary(
        &mut self,
        left: Expr,
        operator: BinaryOp,
        prec: Precedence,
        span: Span,
    ) -> ParseResult<Expr> {
        let right = self.parse_precedence(prec.next())?;
        Ok(Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn logical(
        &mut self,
        left: Expr,
        operator: LogicalOp,
        prec: Precedence,
        span: Span,
    ) -> ParseResult<Expr> {
        let right = self.parse_precedence(prec.next())?;
        Ok(Expr::new(
            ExprKind::Logical {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn range(&mut self, left: Expr, inclusive: bool, span: Span) -> ParseResult<Expr> {
        let right = self.parse_precedence(Precedence::Range.next())?;
        Ok(Expr::new(
            ExprKind::Range {
                start: Box::new(left),
                end: Box::new(right),
                inclusive,
            },
            span,
        ))
    }

    fn finish_assignment(
        &mut self,
        target: Expr,
        operator: Option<BinaryOp>,
        span: Span,
    ) -> ParseResult<Expr> {
        match target.kind {
            ExprKind::Variable(_)
            | ExprKind::Member { .. }
            | ExprKind::OptionalMember { .. }
            | ExprKind::Subscript { .. }
            | ExprKind::TupleIndex { .. }
            | ExprKind::SelfExpr => {}
            _ => return Err(ParseError::InvalidAssignmentTarget(target.span)),
        }
        let value = self.parse_precedence(Precedence::Assignment)?;
        Ok(Expr::new(
            ExprKind::Assign {
                target: Box::new(target),
                operator,
                value: Box::new(value),
            },
            span,
        ))
    }

    /// Lower an interpolated string to a left-folded `+` concatenation so
    /// that `"a\(e)b"` becomes `"a" + e + "b"`.
    fn interpolated_string(&mut self, prefix: String, span: Span) -> ParseResult<Expr> {
        let mut result = Expr::new(ExprKind::StringLiteral(prefix), span);
        loop {
            let inner = self.expression()?;
            result = Expr::new(
                ExprKind::Binary {
                    left: Box::new(result),
                    operator: BinaryOp::Add,
                    right: Box::new(inner),
                },
                span,
            );
            let marker = self.advance();
            match marker.kind {
                TokenKind::InterpolationMid(segment) => {
                    if !segment.is_empty() {
                        result = Expr::new(
                            ExprKind::Binary {
                                left: Box::new(result),
                                operator: BinaryOp::Add,
                                right: Box::new(Expr::new(
                                    ExprKind::StringLiteral(segment),
                                    marker.span,
                                )),
                            },
                            span,
                        );
                    }
                }
                TokenKind::InterpolationEnd(suffix) => {
                    if !suffix.is_empty() {
                        result = Expr::new(
                            ExprKind::Binary {
                                left: Box::new(result),
                                operator: BinaryOp::Add,
                                right: Box::new(Expr::new(
                                    ExprKind::StringLiteral(suffix),
                                    marker.span,
                                )),
                            },
                            span,
                        );
                    }
                    break;
                }
                other => {
                    return Err(ParseError::unexpected_token(
                        "interpolation segment",
                        format!("{}", other),
                        marker.span,
                    ))
                }
            }
        }
        Ok(result)
    }

    /// An identifier in expression position: a variable reference, a
    /// `readLine()` builtin, or a generic instantiation `Pair<Int, String>`.
    fn identifier_expr(&mut self, name: String, span: Span) -> ParseResult<Expr> {
        if name == "readLine" && self.check(&TokenKind::LeftParen) {
            self.advance();
            self.expect(&TokenKind::RightParen)?;
            return Ok(Expr::new(ExprKind::ReadLine, span));
        }

        if self.check(&TokenKind::Less) && self.generic_args_follow() {
            self.advance();
            let type_args = self.parse_type_argument_list()?;
            return Ok(Expr::new(
                ExprKind::GenericInstantiation {
                    base: name,
                    type_args,
                },
                span,
            ));
        }

        Ok(Expr::new(ExprKind::Variable(name), span))
    }

    /// Lookahead: does a `<` start a balanced type-argument list followed by
    /// `(`? Distinguishes `Pair<Int, String>(…)` from `a < b`.
    fn generic_args_follow(&self) -> bool {
        let mut depth = 0usize;
        let mut n = 0usize;
        loop {
            let kind = &self.peek_nth(n).kind;
            match kind {
                TokenKind::Less => depth += 1,
                TokenKind::Greater => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_nth(n + 1).kind == TokenKind::LeftParen;
                    }
                }
                TokenKind::Shr => {
                    if depth < 2 {
                        return false;
                    }
                    depth -= 2;
                    if depth == 0 {
                        return self.peek_nth(n + 1).kind == TokenKind::LeftParen;
                    }
                }
                TokenKind::Identifier(_)
                | TokenKind::Comma
                | TokenKind::LeftBracket
                | TokenKind::RightBracket
                | TokenKind::Colon
                | TokenKind::Question => {}
                _ => return false,
            }
            n += 1;
            if n > 64 {
                return false;
            }
        }
    }

    /// `(` in expression position: grouping or a tuple literal.
    fn paren_expr(&mut self, span: Span) -> ParseResult<Expr> {
        if self.match_token(&TokenKind::RightParen) {
            return Ok(Expr::new(ExprKind::TupleLiteral(Vec::new()), span));
        }

        // A label makes this unambiguously a tuple.
        let first_label = self.tuple_label();
        let first = self.expression()?;

        if first_label.is_none() && !self.check(&TokenKind::Comma) {
            self.expect(&TokenKind::RightParen)?;
            return Ok(Expr::new(ExprKind::Grouping(Box::new(first)), span));
        }

        let mut elements = vec![(first_label, first)];
        while self.match_token(&TokenKind::Comma) {
            let label = self.tuple_label();
            let value = self.expression()?;
            elements.push((label, value));
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(Expr::new(ExprKind::TupleLiteral(elements), span))
    }

    fn tuple_label(&mut self) -> Option<String> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            if self.peek_nth(1).kind == TokenKind::Colon {
                let name = name.clone();
                self.advance();
                self.advance();
                return Some(name);
            }
        }
        None
    }

    /// `[` in expression position: array literal, dictionary literal, or
    /// the empty dictionary `[:]`.
    fn bracket_literal(&mut self, span: Span) -> ParseResult<Expr> {
        if self.match_token(&TokenKind::Colon) {
            self.expect(&TokenKind::RightBracket)?;
            return Ok(Expr::new(ExprKind::DictLiteral(Vec::new()), span));
        }
        if self.match_token(&TokenKind::RightBracket) {
            return Ok(Expr::new(ExprKind::ArrayLiteral(Vec::new()), span));
        }

        let first = self.expression()?;
        if self.match_token(&TokenKind::Colon) {
            let value = self.expression()?;
            let mut pairs = vec![(first, value)];
            while self.match_token(&TokenKind::Comma) {
                let key = self.expression()?;
                self.expect(&TokenKind::Colon)?;
                let value = self.expression()?;
                pairs.push((key, value));
            }
            self.expect(&TokenKind::RightBracket)?;
            Ok(Expr::new(ExprKind::DictLiteral(pairs), span))
        } else {
            let mut elements = vec![first];
            while self.match_token(&TokenKind::Comma) {
                elements.push(self.expression()?);
            }
            self.expect(&TokenKind::RightBracket)?;
            Ok(Expr::new(ExprKind::ArrayLiteral(elements), span))
        }
    }

    /// `{` in expression position: a closure literal, `{ a, b in … }` or
    /// `{ … }`.
    fn closure_literal(&mut self, span: Span) -> ParseResult<Expr> {
        let params = if self.closure_params_follow() {
            let mut params = Vec::new();
            let parenthesized = self.match_token(&TokenKind::LeftParen);
            loop {
                let p_span = self.current_span();
                let name = self.expect_identifier()?;
                let type_annotation = if self.match_token(&TokenKind::Colon) {
                    Some(self.parse_type_annotation()?)
                } else {
                    None
                };
                params.push(Parameter {
                    external_label: None,
                    name,
                    type_annotation,
                    default_value: None,
                    span: p_span,
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            if parenthesized {
                self.expect(&TokenKind::RightParen)?;
            }
            self.expect(&TokenKind::In)?;
            params
        } else {
            Vec::new()
        };

        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            body.push(self.declaration()?);
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Expr::new(
            ExprKind::Closure {
                params,
                return_type: None,
                body,
            },
            span,
        ))
    }

    /// Lookahead for a closure parameter list: `a, b in` or `(a, b) in`.
    fn closure_params_follow(&self) -> bool {
        let mut n = 0usize;
        let parenthesized = self.peek_nth(n).kind == TokenKind::LeftParen;
        if parenthesized {
            n += 1;
        }
        loop {
            if !matches!(self.peek_nth(n).kind, TokenKind::Identifier(_)) {
                return false;
            }
            n += 1;
            // Skip an optional type annotation (single name only).
            if self.peek_nth(n).kind == TokenKind::Colon {
                if !matches!(self.peek_nth(n + 1).kind, TokenKind::Identifier(_)) {
                    return false;
                }
                n += 2;
            }
            if self.peek_nth(n).kind == TokenKind::Comma {
                n += 1;
                continue;
            }
            break;
        }
        if parenthesized {
            if self.peek_nth(n).kind != TokenKind::RightParen {
                return false;
            }
            n += 1;
        }
        self.peek_nth(n).kind == TokenKind::In
    }

    /// Parse a call argument list after `(`.
    pub(crate) fn argument_list(&mut self) -> ParseResult<Vec<Argument>> {
        let mut arguments = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let label = self.tuple_label();
                let value = self.expression()?;
                arguments.push(Argument { label, value });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(arguments)
    }

    /// A member name after `.`: an identifier or `init`.
    pub(crate) fn member_name(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::Init => {
                self.advance();
                Ok("init".to_string())
            }
            _ => Err(self.unexpected("member name")),
        }
    }

    /// A type name after `is`/`as`: a plain or generic name rendered to its
    /// canonical form.
    fn type_name_for_cast(&mut self) -> ParseResult<String> {
        let ty = self.parse_type_annotation()?;
        Ok(ty.canonical_name())
    }
}
