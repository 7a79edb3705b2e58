//! The checker's type representation.

use crate::ast::{TypeAnnotation, TypeKind};

/// A static type as the checker sees it. `Unknown` propagates silently so
/// partially-typed programs still check what they can.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Nil,
    Void,
    Unknown,
    Array(Box<Type>),
    Dictionary(Box<Type>, Box<Type>),
    Optional(Box<Type>),
    Tuple(Vec<(Option<String>, Type)>),
    Function {
        params: Vec<Type>,
        return_type: Box<Type>,
    },
    /// A class, struct, enum, or protocol by name.
    Named(String),
}

impl Type {
    /// Resolve a source annotation. Generic references collapse to their
    /// canonical name (the checker treats specializations nominally).
    pub fn from_annotation(annotation: &TypeAnnotation) -> Type {
        match &annotation.kind {
            TypeKind::Named(name) => Self::from_name(name),
            TypeKind::Generic { .. } => Type::Named(annotation.canonical_name()),
            TypeKind::Optional(inner) => {
                Type::Optional(Box::new(Self::from_annotation(inner)))
            }
            TypeKind::Array(inner) => Type::Array(Box::new(Self::from_annotation(inner))),
            TypeKind::Dictionary { key, value } => Type::Dictionary(
                Box::new(Self::from_annotation(key)),
                Box::new(Self::from_annotation(value)),
            ),
            TypeKind::Function {
                params,
                return_type,
            } => Type::Function {
                params: params.iter().map(Self::from_annotation).collect(),
                return_type: Box::new(Self::from_annotation(return_type)),
            },
            TypeKind::Tuple(elements) => Type::Tuple(
                elements
                    .iter()
                    .map(|(label, ty)| (label.clone(), Self::from_annotation(ty)))
                    .collect(),
            ),
        }
    }

    pub fn from_name(name: &str) -> Type {
        match name {
            "Int" => Type::Int,
            "Float" => Type::Float,
            "Bool" => Type::Bool,
            "String" => Type::String,
            "Void" => Type::Void,
            _ => Type::Named(name.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::Nil => write!(f, "Nil"),
            Type::Void => write!(f, "Void"),
            Type::Unknown => write!(f, "_"),
            Type::Array(inner) => write!(f, "[{}]", inner),
            Type::Dictionary(key, value) => write!(f, "[{}: {}]", key, value),
            Type::Optional(inner) => write!(f, "{}?", inner),
            Type::Tuple(elements) => {
                let parts: Vec<String> = elements
                    .iter()
                    .map(|(label, ty)| match label {
                        Some(label) => format!("{}: {}", label, ty),
                        None => ty.to_string(),
                    })
                    .collect();
                write!(f, "({})", parts.join(", "))
            }
            Type::Function {
                params,
                return_type,
            } => {
                let parts: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "({}) -> {}", parts.join(", "), return_type)
            }
            Type::Named(name) => write!(f, "{}", name),
        }
    }
}
