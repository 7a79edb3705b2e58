//! Type annotation parsing.

use crate::ast::{TypeAnnotation, TypeKind};
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};

impl Parser {
    /// Parse a type annotation: named, generic, optional, array,
    /// dictionary, function, or tuple types.
    pub(crate) fn parse_type_annotation(&mut self) -> ParseResult<TypeAnnotation> {
        let span = self.current_span();
        let mut ty = match &self.peek().kind {
            TokenKind::Identifier(_) => {
                let name = self.expect_identifier()?;
                if self.check(&TokenKind::Less) {
                    self.advance();
                    let args = self.parse_type_argument_list()?;
                    TypeAnnotation::new(TypeKind::Generic { base: name, args }, span)
                } else {
                    TypeAnnotation::named(name, span)
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let first = self.parse_type_annotation()?;
                if self.match_token(&TokenKind::Colon) {
                    let value = self.parse_type_annotation()?;
                    self.expect(&TokenKind::RightBracket)?;
                    TypeAnnotation::new(
                        TypeKind::Dictionary {
                            key: Box::new(first),
                            value: Box::new(value),
                        },
                        span,
                    )
                } else {
                    self.expect(&TokenKind::RightBracket)?;
                    TypeAnnotation::new(TypeKind::Array(Box::new(first)), span)
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        // A label is an identifier followed by `:` that is
                        // not itself the start of a dictionary type.
                        let label = if let TokenKind::Identifier(name) = &self.peek().kind {
                            if self.peek_nth(1).kind == TokenKind::Colon {
                                let name = name.clone();
                                self.advance();
                                self.advance();
                                Some(name)
                            } else {
                                None
                            }
                        } else {
                            None
                        };
                        let ty = self.parse_type_annotation()?;
                        elements.push((label, ty));
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightParen)?;

                if self.match_token(&TokenKind::Arrow) {
                    let return_type = self.parse_type_annotation()?;
                    TypeAnnotation::new(
                        TypeKind::Function {
                            params: elements.into_iter().map(|(_, t)| t).collect(),
                            return_type: Box::new(return_type),
                        },
                        span,
                    )
                } else {
                    TypeAnnotation::new(TypeKind::Tuple(elements), span)
                }
            }
            _ => return Err(self.unexpected("type")),
        };

        while self.match_token(&TokenKind::Question) {
            let span = ty.span;
            ty = TypeAnnotation::new(TypeKind::Optional(Box::new(ty)), span);
        }
        Ok(ty)
    }

    /// Parse `T, U, ...>`: the `<` has already been consumed. Handles the
    /// `>>` split for nested generics like `Pair<Box<Int>>`.
    pub(crate) fn parse_type_argument_list(&mut self) -> ParseResult<Vec<TypeAnnotation>> {
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type_annotation()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_closing_angle()?;
        Ok(args)
    }
}
