//! Statement AST nodes.

use crate::ast::decl::{
    ClassDecl, EnumDecl, ExtensionDecl, FuncDecl, ProtocolDecl, StructDecl, VarDecl,
};
use crate::ast::expr::Expr;
use crate::span::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement
    Expression(Expr),

    /// var/let declaration
    Var(VarDecl),

    /// Tuple destructuring: let (a, b) = expr
    TupleDestructure {
        names: Vec<String>,
        is_let: bool,
        value: Expr,
    },

    /// Block: { statements }
    Block(Vec<Stmt>),

    /// if cond { } else { }
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },

    /// if let x = expr { } else { }
    IfLet {
        name: String,
        value: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },

    /// guard cond else { }: the body must exit
    Guard { condition: Expr, body: Vec<Stmt> },

    /// guard let x = expr else { }: binds x in the enclosing scope
    GuardLet {
        name: String,
        value: Expr,
        body: Vec<Stmt>,
    },

    /// while cond { }
    While { condition: Expr, body: Vec<Stmt> },

    /// repeat { } while cond
    RepeatWhile { body: Vec<Stmt>, condition: Expr },

    /// for x in iterable where cond { }
    For {
        variable: String,
        iterable: Expr,
        where_clause: Option<Expr>,
        body: Vec<Stmt>,
    },

    /// switch subject { case ...: default: }
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },

    Return(Option<Expr>),
    Break,
    Continue,

    /// throw expr
    Throw(Expr),

    /// print(exprs)
    Print(Vec<Expr>),

    Function(FuncDecl),
    Class(ClassDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Protocol(ProtocolDecl),
    Extension(ExtensionDecl),

    /// import Name
    Import(String),
}

/// One `case` arm in a switch statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// Multi-pattern arms: `case 1, 2, 3:` matches if any pattern matches.
    pub patterns: Vec<Pattern>,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Patterns usable in switch cases.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// A literal or other expression compared by equality.
    Literal(Expr),
    /// Range pattern: a...b or a..<b
    Range {
        start: Expr,
        end: Expr,
        inclusive: bool,
    },
    /// Enum case pattern: `.ok(let n)` or `Status.active`.
    EnumCase {
        enum_name: Option<String>,
        case_name: String,
        bindings: Vec<String>,
    },
}

/// A complete program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}
