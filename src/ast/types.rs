//! Type annotation AST nodes.

use crate::span::Span;

/// A source-level type annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub kind: TypeKind,
    pub span: Span,
}

impl TypeAnnotation {
    pub fn new(kind: TypeKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn named(name: impl Into<String>, span: Span) -> Self {
        Self {
            kind: TypeKind::Named(name.into()),
            span,
        }
    }

    /// Render the annotation back to canonical source form.
    /// Generic references render as `Name<Arg,...>`, which is also the
    /// specialization key used by the compiler.
    pub fn canonical_name(&self) -> String {
        match &self.kind {
            TypeKind::Named(name) => name.clone(),
            TypeKind::Generic { base, args } => {
                let args: Vec<String> = args.iter().map(|a| a.canonical_name()).collect();
                format!("{}<{}>", base, args.join(","))
            }
            TypeKind::Optional(inner) => format!("{}?", inner.canonical_name()),
            TypeKind::Array(inner) => format!("[{}]", inner.canonical_name()),
            TypeKind::Dictionary { key, value } => {
                format!("[{}:{}]", key.canonical_name(), value.canonical_name())
            }
            TypeKind::Function { params, return_type } => {
                let params: Vec<String> = params.iter().map(|p| p.canonical_name()).collect();
                format!("({}) -> {}", params.join(","), return_type.canonical_name())
            }
            TypeKind::Tuple(elements) => {
                let parts: Vec<String> = elements
                    .iter()
                    .map(|(label, ty)| match label {
                        Some(l) => format!("{}: {}", l, ty.canonical_name()),
                        None => ty.canonical_name(),
                    })
                    .collect();
                format!("({})", parts.join(","))
            }
        }
    }
}

/// Type annotation variants.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// A plain type name: `Int`, `Point`
    Named(String),
    /// A generic reference: `Pair<Int, String>`
    Generic {
        base: String,
        args: Vec<TypeAnnotation>,
    },
    /// An optional: `Int?`
    Optional(Box<TypeAnnotation>),
    /// An array: `[Int]`
    Array(Box<TypeAnnotation>),
    /// A dictionary: `[String: Int]`
    Dictionary {
        key: Box<TypeAnnotation>,
        value: Box<TypeAnnotation>,
    },
    /// A function type: `(Int, Int) -> Int`
    Function {
        params: Vec<TypeAnnotation>,
        return_type: Box<TypeAnnotation>,
    },
    /// A tuple type: `(x: Int, y: Int)` or `(Int, String)`
    Tuple(Vec<(Option<String>, TypeAnnotation)>),
}
