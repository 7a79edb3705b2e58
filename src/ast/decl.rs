//! Declaration AST nodes: functions, types, properties.

use crate::ast::expr::Expr;
use crate::ast::stmt::Stmt;
use crate::ast::types::TypeAnnotation;
use crate::span::Span;

/// Access level on a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    Private,
    /// `fileprivate`: the single-module model treats this as internal.
    Fileprivate,
    #[default]
    Internal,
    Public,
}

/// Reference ownership of a stored property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    #[default]
    Strong,
    Weak,
    Unowned,
}

/// A function parameter: `label name: Type = default`.
///
/// `external_label` is what call sites write; `None` means the parameter was
/// declared with `_` and takes no label. A parameter declared with a bare
/// name uses that name as its label.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub external_label: Option<String>,
    pub name: String,
    pub type_annotation: Option<TypeAnnotation>,
    pub default_value: Option<Expr>,
    pub span: Span,
}

/// A generic type parameter, optionally constrained: `<T: Printable>`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: String,
    pub constraint: Option<String>,
}

/// Function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub generic_params: Vec<GenericParam>,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    /// `expected <ErrorType>` clause, recorded in the prototype.
    pub expected_error: Option<String>,
    pub body: Vec<Stmt>,
    pub access: Access,
    pub is_static: bool,
    pub is_mutating: bool,
    pub is_override: bool,
    pub span: Span,
}

/// Computed property accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessors {
    pub getter: Vec<Stmt>,
    /// Setter body with its value parameter name (`newValue` by default).
    pub setter: Option<(String, Vec<Stmt>)>,
}

/// willSet/didSet observers on a stored property.
#[derive(Debug, Clone, PartialEq)]
pub struct Observers {
    /// willSet body with its parameter name (`newValue` by default).
    pub will_set: Option<(String, Vec<Stmt>)>,
    /// didSet body with its parameter name (`oldValue` by default).
    pub did_set: Option<(String, Vec<Stmt>)>,
}

/// A `var`/`let` declaration, at top level, in a block, or as a member.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub is_let: bool,
    pub type_annotation: Option<TypeAnnotation>,
    pub initializer: Option<Expr>,
    pub accessors: Option<Accessors>,
    pub observers: Option<Observers>,
    pub access: Access,
    pub is_static: bool,
    pub is_lazy: bool,
    pub ownership: Ownership,
    pub span: Span,
}

/// Class declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub generic_params: Vec<GenericParam>,
    pub superclass: Option<String>,
    pub conformances: Vec<String>,
    pub properties: Vec<VarDecl>,
    pub methods: Vec<FuncDecl>,
    pub initializers: Vec<FuncDecl>,
    pub deinit_body: Option<Vec<Stmt>>,
    pub access: Access,
    pub span: Span,
}

/// Struct declaration. As a class minus inheritance and deinit; methods may
/// be `mutating`.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub generic_params: Vec<GenericParam>,
    pub conformances: Vec<String>,
    pub properties: Vec<VarDecl>,
    pub methods: Vec<FuncDecl>,
    pub initializers: Vec<FuncDecl>,
    pub access: Access,
    pub span: Span,
}

/// A single enum case declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumCaseDecl {
    pub name: String,
    pub raw_value: Option<Expr>,
    /// Associated-value parameters with labels: `case ok(value: Int)`.
    pub associated: Vec<Parameter>,
    pub span: Span,
}

/// Enum declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub raw_type: Option<String>,
    pub cases: Vec<EnumCaseDecl>,
    pub methods: Vec<FuncDecl>,
    pub computed_properties: Vec<VarDecl>,
    pub access: Access,
    pub span: Span,
}

/// A method requirement in a protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMethodReq {
    pub name: String,
    pub param_names: Vec<String>,
    pub is_mutating: bool,
    pub span: Span,
}

/// A property requirement in a protocol: `var name: T { get set }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolPropertyReq {
    pub name: String,
    pub has_getter: bool,
    pub has_setter: bool,
    pub span: Span,
}

/// Protocol declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDecl {
    pub name: String,
    pub inherited: Vec<String>,
    pub methods: Vec<ProtocolMethodReq>,
    pub properties: Vec<ProtocolPropertyReq>,
    pub span: Span,
}

/// Extension declaration: adds members to a named type, possibly with new
/// protocol conformances.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDecl {
    pub type_name: String,
    pub conformances: Vec<String>,
    pub methods: Vec<FuncDecl>,
    pub computed_properties: Vec<VarDecl>,
    pub span: Span,
}
