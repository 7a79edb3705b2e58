//! Error types for all phases of the pipeline.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors. The scanner itself never fails; it embeds these messages
/// in `Error` tokens, and callers that refuse error tokens surface them
/// through this type.
#[derive(Debug, Error)]
pub enum LexError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of file at {0}")]
    UnexpectedEof(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParseError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Severity of a type-checker diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single type-checker diagnostic. The checker aggregates these instead of
/// stopping at the first failure.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}: {} at line {}, column {}",
            kind, self.message, self.line, self.column
        )
    }
}

/// Type-checking failure: the aggregated diagnostic list.
#[derive(Debug, Error)]
#[error("{}", .diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n"))]
pub struct TypeError {
    pub diagnostics: Vec<Diagnostic>,
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{message} at line {line}")]
    General { message: String, line: u32 },
}

impl CompileError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self::General {
            message: message.into(),
            line,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            Self::General { line, .. } => *line,
        }
    }
}

/// Runtime errors raised by the VM.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Division by zero at line {0}")]
    DivisionByZero(u32),

    #[error("Undefined variable '{0}' at line {1}")]
    UndefinedVariable(String, u32),

    #[error("Cannot call non-function value at line {0}")]
    NotCallable(u32),

    #[error("Wrong number of arguments: expected {expected}, got {got} at line {line}")]
    WrongArity {
        expected: usize,
        got: usize,
        line: u32,
    },

    #[error("Type error: {message} at line {line}")]
    TypeError { message: String, line: u32 },

    #[error("Cannot access property '{property}' on {value_type} at line {line}")]
    NoSuchProperty {
        value_type: String,
        property: String,
        line: u32,
    },

    #[error("Unhandled error thrown: {value} at line {line}")]
    ScriptThrow { value: String, line: u32 },

    #[error("Unimplemented opcode {opcode:#04x} at line {line}")]
    UnimplementedOpcode { opcode: u8, line: u32 },

    #[error("{message} at line {line}")]
    General { message: String, line: u32 },
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self::General {
            message: message.into(),
            line,
        }
    }

    pub fn type_error(message: impl Into<String>, line: u32) -> Self {
        Self::TypeError {
            message: message.into(),
            line,
        }
    }

    pub fn wrong_arity(expected: usize, got: usize, line: u32) -> Self {
        Self::WrongArity {
            expected,
            got,
            line,
        }
    }

    pub fn no_such_property(
        value_type: impl Into<String>,
        property: impl Into<String>,
        line: u32,
    ) -> Self {
        Self::NoSuchProperty {
            value_type: value_type.into(),
            property: property.into(),
            line,
        }
    }
}

/// Errors from reading a bytecode file.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Bad magic number: not a SwiftScript bytecode file")]
    BadMagic,

    #[error("Unsupported bytecode version {0}")]
    UnsupportedVersion(u16),

    #[error("Truncated bytecode file while reading {0}")]
    Truncated(&'static str),

    #[error("Index out of range in {table}: {index} (size {size})")]
    IndexOutOfRange {
        table: &'static str,
        index: usize,
        size: usize,
    },

    #[error("Invalid {0} in bytecode file")]
    Invalid(&'static str),
}

/// A unified error type for the whole pipeline.
#[derive(Debug, Error)]
pub enum SwiftScriptError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Type error: {0}")]
    Type(#[from] TypeError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
