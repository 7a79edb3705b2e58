//! Scanner for SwiftScript source code.
//!
//! The scanner never fails: malformed input produces `Error` tokens with the
//! message embedded in the token, and the parser decides whether to surface
//! or recover past them.

use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The lexer transforms source code into a stream of tokens.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: u32,
    column: u32,
    start_pos: usize,
    start_line: u32,
    start_column: u32,
    /// Paren depth of each open string interpolation, innermost last.
    interpolations: Vec<u32>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
            interpolations: Vec::new(),
        }
    }

    /// Scan all tokens from the source, ending with Eof.
    pub fn scan_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Token::eof(self.current_pos, self.line, self.column);
        };

        match c {
            '(' => {
                if let Some(depth) = self.interpolations.last_mut() {
                    *depth += 1;
                }
                self.make_token(TokenKind::LeftParen)
            }
            ')' => {
                match self.interpolations.last_mut() {
                    Some(0) => {
                        // Closing an interpolation segment: resume the string.
                        self.interpolations.pop();
                        self.scan_string_tail()
                    }
                    Some(depth) => {
                        *depth -= 1;
                        self.make_token(TokenKind::RightParen)
                    }
                    None => self.make_token(TokenKind::RightParen),
                }
            }
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            ';' => self.make_token(TokenKind::Semicolon),
            '~' => self.make_token(TokenKind::Tilde),
            '.' => {
                if self.match_char('.') {
                    if self.match_char('.') {
                        self.make_token(TokenKind::ClosedRange)
                    } else if self.match_char('<') {
                        self.make_token(TokenKind::HalfOpenRange)
                    } else {
                        self.error_token("Unexpected '..'")
                    }
                } else {
                    self.make_token(TokenKind::Dot)
                }
            }
            ':' => self.make_token(TokenKind::Colon),
            '?' => {
                if self.match_char('?') {
                    self.make_token(TokenKind::QuestionQuestion)
                } else if self.match_char('.') {
                    self.make_token(TokenKind::QuestionDot)
                } else {
                    self.make_token(TokenKind::Question)
                }
            }
            '+' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::PlusEqual)
                } else {
                    self.make_token(TokenKind::Plus)
                }
            }
            '-' => {
                if self.match_char('>') {
                    self.make_token(TokenKind::Arrow)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::MinusEqual)
                } else {
                    self.make_token(TokenKind::Minus)
                }
            }
            '*' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::StarEqual)
                } else {
                    self.make_token(TokenKind::Star)
                }
            }
            '/' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::SlashEqual)
                } else {
                    self.make_token(TokenKind::Slash)
                }
            }
            '%' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::PercentEqual)
                } else {
                    self.make_token(TokenKind::Percent)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual)
                } else if self.match_char('<') {
                    if self.match_char('=') {
                        self.make_token(TokenKind::ShlEqual)
                    } else {
                        self.make_token(TokenKind::Shl)
                    }
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else if self.match_char('>') {
                    if self.match_char('=') {
                        self.make_token(TokenKind::ShrEqual)
                    } else {
                        self.make_token(TokenKind::Shr)
                    }
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.make_token(TokenKind::AmpAmp)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::AmpEqual)
                } else {
                    self.make_token(TokenKind::Amp)
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.make_token(TokenKind::PipePipe)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::PipeEqual)
                } else {
                    self.make_token(TokenKind::Pipe)
                }
            }
            '^' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::CaretEqual)
                } else {
                    self.make_token(TokenKind::Caret)
                }
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(c),
            c if c.is_alphabetic() || c == '_' => self.scan_identifier(c),
            _ => self.error_token(format!("Unexpected character '{}'", c)),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('/') => {
                    if self.peek_next() == Some('/') {
                        while self.peek().is_some() && self.peek() != Some('\n') {
                            self.advance();
                        }
                    } else if self.peek_next() == Some('*') {
                        self.advance();
                        self.advance();
                        let mut depth = 1;
                        while depth > 0 {
                            match self.peek() {
                                None => break,
                                Some('*') if self.peek_next() == Some('/') => {
                                    self.advance();
                                    self.advance();
                                    depth -= 1;
                                }
                                Some('/') if self.peek_next() == Some('*') => {
                                    self.advance();
                                    self.advance();
                                    depth += 1;
                                }
                                Some('\n') => {
                                    self.advance();
                                    self.line += 1;
                                    self.column = 1;
                                }
                                _ => {
                                    self.advance();
                                }
                            }
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    /// Scan a string literal starting after the opening quote.
    ///
    /// Returns `StringLiteral` for a plain string, or `InterpolationStart`
    /// with the literal prefix when a `\(` is found; the interpolation
    /// expression is then lexed as ordinary tokens.
    fn scan_string(&mut self) -> Token {
        match self.scan_string_segment() {
            StringSegment::Plain(s) => self.make_token(TokenKind::StringLiteral(s)),
            StringSegment::Interpolated(s) => {
                self.interpolations.push(0);
                self.make_token(TokenKind::InterpolationStart(s))
            }
            StringSegment::Unterminated => self.error_token("Unterminated string"),
            StringSegment::BadEscape(c) => {
                self.error_token(format!("Invalid escape sequence '\\{}'", c))
            }
        }
    }

    /// Resume a string after an interpolation `)`.
    fn scan_string_tail(&mut self) -> Token {
        match self.scan_string_segment() {
            StringSegment::Plain(s) => self.make_token(TokenKind::InterpolationEnd(s)),
            StringSegment::Interpolated(s) => {
                self.interpolations.push(0);
                self.make_token(TokenKind::InterpolationMid(s))
            }
            StringSegment::Unterminated => self.error_token("Unterminated string"),
            StringSegment::BadEscape(c) => {
                self.error_token(format!("Invalid escape sequence '\\{}'", c))
            }
        }
    }

    fn scan_string_segment(&mut self) -> StringSegment {
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => return StringSegment::Unterminated,
                Some('"') => {
                    self.advance();
                    return StringSegment::Plain(value);
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('(') => {
                            self.advance();
                            return StringSegment::Interpolated(value);
                        }
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('r') => {
                            self.advance();
                            value.push('\r');
                        }
                        Some('0') => {
                            self.advance();
                            value.push('\0');
                        }
                        Some('\\') => {
                            self.advance();
                            value.push('\\');
                        }
                        Some('"') => {
                            self.advance();
                            value.push('"');
                        }
                        Some(c) => return StringSegment::BadEscape(c),
                        None => return StringSegment::Unterminated,
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }
    }

    fn scan_number(&mut self, first: char) -> Token {
        let mut value = String::from(first);
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                value.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                // A digit must follow, otherwise this is `1...3` or `x.y`.
                if let Some(next) = self.peek_next() {
                    if next.is_ascii_digit() {
                        is_float = true;
                        value.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            } else if c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            match value.parse::<f64>() {
                Ok(n) => self.make_token(TokenKind::FloatLiteral(n)),
                Err(_) => self.error_token(format!("Invalid number '{}'", value)),
            }
        } else {
            match value.parse::<i64>() {
                Ok(n) => self.make_token(TokenKind::IntLiteral(n)),
                Err(_) => self.error_token(format!("Invalid number '{}'", value)),
            }
        }
    }

    fn scan_identifier(&mut self, first: char) -> Token {
        let mut value = String::from(first);

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Identifier(value));
        self.make_token(kind)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        self.source[self.current_pos..].chars().nth(1)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }

    fn error_token(&self, message: impl Into<String>) -> Token {
        Token::new(TokenKind::Error(message.into()), self.current_span())
    }
}

enum StringSegment {
    Plain(String),
    Interpolated(String),
    Unterminated,
    BadEscape(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            scan("(){}"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            scan("42 3.14 1_000"),
            vec![
                TokenKind::IntLiteral(42),
                TokenKind::FloatLiteral(3.14),
                TokenKind::IntLiteral(1000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            scan("var let func class struct enum"),
            vec![
                TokenKind::Var,
                TokenKind::Let,
                TokenKind::Func,
                TokenKind::Class,
                TokenKind::Struct,
                TokenKind::Enum,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_range_operators() {
        assert_eq!(
            scan("1...3 1..<3"),
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::ClosedRange,
                TokenKind::IntLiteral(3),
                TokenKind::IntLiteral(1),
                TokenKind::HalfOpenRange,
                TokenKind::IntLiteral(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_multi_char_operators() {
        assert_eq!(
            scan("-> ?? ?. << >> <<= &="),
            vec![
                TokenKind::Arrow,
                TokenKind::QuestionQuestion,
                TokenKind::QuestionDot,
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::ShlEqual,
                TokenKind::AmpEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string() {
        assert_eq!(
            scan(r#""hello""#),
            vec![
                TokenKind::StringLiteral("hello".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            scan(r#""a\nb\t\"c\"""#),
            vec![
                TokenKind::StringLiteral("a\nb\t\"c\"".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_interpolated_string() {
        assert_eq!(
            scan(r#""Hello \(name)!""#),
            vec![
                TokenKind::InterpolationStart("Hello ".to_string()),
                TokenKind::Identifier("name".to_string()),
                TokenKind::InterpolationEnd("!".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_multi_segment_interpolation() {
        assert_eq!(
            scan(r#""a\(x)b\(y)c""#),
            vec![
                TokenKind::InterpolationStart("a".to_string()),
                TokenKind::Identifier("x".to_string()),
                TokenKind::InterpolationMid("b".to_string()),
                TokenKind::Identifier("y".to_string()),
                TokenKind::InterpolationEnd("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_interpolation_with_nested_parens() {
        assert_eq!(
            scan(r#""v=\(f(x))""#),
            vec![
                TokenKind::InterpolationStart("v=".to_string()),
                TokenKind::Identifier("f".to_string()),
                TokenKind::LeftParen,
                TokenKind::Identifier("x".to_string()),
                TokenKind::RightParen,
                TokenKind::InterpolationEnd("".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_error_token_for_unterminated_string() {
        let tokens = scan("\"abc");
        assert!(matches!(tokens[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            scan("1 // comment\n/* block /* nested */ */ 2"),
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::IntLiteral(2),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Scanner::new("1\n2\n3").scan_tokens();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[2].span.line, 3);
    }
}
