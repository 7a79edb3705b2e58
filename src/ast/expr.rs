//! Expression AST nodes.

use crate::ast::decl::Parameter;
use crate::ast::stmt::Stmt;
use crate::ast::types::TypeAnnotation;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// An argument in a function call, optionally labeled.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub label: Option<String>,
    pub value: Expr,
}

/// How an `as` cast fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// `as`: runtime error on failure
    Checked,
    /// `as?`: nil on failure
    Optional,
    /// `as!`: runtime error on failure, forced
    Forced,
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: 42
    IntLiteral(i64),
    /// Float literal: 3.14
    FloatLiteral(f64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Boolean literal: true, false
    BoolLiteral(bool),
    /// nil literal
    Nil,

    /// Variable reference: foo
    Variable(String),

    /// self reference
    SelfExpr,

    /// super method reference: super.speak
    SuperMethod(String),

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    /// Short-circuit logical operation: a && b, a || b
    Logical {
        left: Box<Expr>,
        operator: LogicalOp,
        right: Box<Expr>,
    },

    /// Unary operation: -x, !x, ~x
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    /// Ternary conditional: cond ? a : b
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Range expression: a...b or a..<b
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },

    /// Grouping: (expr)
    Grouping(Box<Expr>),

    /// Assignment: x = v, x.y = v, x[i] = v.
    /// Compound assignment operators carry the desugared binary operator.
    Assign {
        target: Box<Expr>,
        operator: Option<BinaryOp>,
        value: Box<Expr>,
    },

    /// Function call: foo(a, label: b)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Argument>,
    },

    /// Generic instantiation: Pair<Int, String>
    GenericInstantiation {
        base: String,
        type_args: Vec<TypeAnnotation>,
    },

    /// Member access: obj.name (also Enum.case and Type.static)
    Member { object: Box<Expr>, name: String },

    /// Optional chaining: obj?.name
    OptionalMember { object: Box<Expr>, name: String },

    /// Tuple element by position: t.0
    TupleIndex { object: Box<Expr>, index: u16 },

    /// Subscript: obj[index]
    Subscript { object: Box<Expr>, index: Box<Expr> },

    /// Forced unwrap: x!
    ForceUnwrap(Box<Expr>),

    /// Nil coalescing: a ?? b (short-circuit)
    NilCoalesce { left: Box<Expr>, right: Box<Expr> },

    /// Type check: x is T
    TypeCheck { value: Box<Expr>, type_name: String },

    /// Type cast: x as T, x as? T, x as! T
    Cast {
        value: Box<Expr>,
        type_name: String,
        kind: CastKind,
    },

    /// Array literal: [1, 2, 3]
    ArrayLiteral(Vec<Expr>),

    /// Dictionary literal: ["a": 1] or [:]
    DictLiteral(Vec<(Expr, Expr)>),

    /// Tuple literal: (1, 2) or (x: 1, y: 2)
    TupleLiteral(Vec<(Option<String>, Expr)>),

    /// Closure literal: { x in ... } or { ... }
    Closure {
        params: Vec<Parameter>,
        return_type: Option<TypeAnnotation>,
        body: Vec<Stmt>,
    },

    /// readLine()
    ReadLine,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        };
        write!(f, "{}", s)
    }
}

/// Short-circuit logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
}
