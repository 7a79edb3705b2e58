//! Symbol tables and type registries for the checker.

use std::collections::HashMap;

use crate::ast::Access;
use crate::types::type_repr::Type;

/// One variable binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: Type,
    pub is_let: bool,
}

/// A declared function or method signature.
#[derive(Debug, Clone)]
pub struct FuncSig {
    pub params: Vec<ParamSig>,
    pub return_type: Type,
    pub is_mutating: bool,
    pub is_static: bool,
    pub is_override: bool,
    pub access: Access,
}

#[derive(Debug, Clone)]
pub struct ParamSig {
    /// External label; `None` means declared with `_`.
    pub label: Option<String>,
    pub ty: Type,
    pub has_default: bool,
}

/// A declared property.
#[derive(Debug, Clone)]
pub struct PropertySig {
    pub ty: Type,
    pub is_let: bool,
    pub is_static: bool,
    pub access: Access,
}

/// A declared class, struct, or enum.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    pub is_struct: bool,
    pub is_enum: bool,
    pub superclass: Option<String>,
    pub conformances: Vec<String>,
    pub properties: HashMap<String, PropertySig>,
    pub methods: HashMap<String, FuncSig>,
    pub initializers: Vec<FuncSig>,
    /// Enum cases and their associated-value arity.
    pub cases: HashMap<String, usize>,
}

/// A declared protocol.
#[derive(Debug, Clone, Default)]
pub struct ProtocolInfo {
    pub inherited: Vec<String>,
}

/// Per-scope symbol tables plus the global type registries.
#[derive(Default)]
pub struct TypeEnvironment {
    scopes: Vec<HashMap<String, Binding>>,
    pub functions: HashMap<String, FuncSig>,
    pub types: HashMap<String, TypeInfo>,
    pub protocols: HashMap<String, ProtocolInfo>,
}

impl TypeEnvironment {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            functions: HashMap::new(),
            types: HashMap::new(),
            protocols: HashMap::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn declare(&mut self, name: &str, ty: Type, is_let: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding { ty, is_let });
        }
    }

    /// Look a name up through the scope chain.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// A member lookup walking the class chain; returns the declaring type
    /// name too, for access control.
    pub fn find_property(&self, type_name: &str, member: &str) -> Option<(String, &PropertySig)> {
        let mut current = Some(type_name.to_string());
        while let Some(name) = current {
            let info = self.types.get(&name)?;
            if let Some(sig) = info.properties.get(member) {
                return Some((name, sig));
            }
            current = info.superclass.clone();
        }
        None
    }

    pub fn find_method(&self, type_name: &str, member: &str) -> Option<(String, &FuncSig)> {
        let mut current = Some(type_name.to_string());
        while let Some(name) = current {
            let info = self.types.get(&name)?;
            if let Some(sig) = info.methods.get(member) {
                return Some((name, sig));
            }
            current = info.superclass.clone();
        }
        None
    }

    /// Whether an ancestor (strictly above `type_name`) declares a method.
    pub fn ancestor_has_method(&self, type_name: &str, member: &str) -> bool {
        let parent = self
            .types
            .get(type_name)
            .and_then(|info| info.superclass.clone());
        match parent {
            Some(parent) => self.find_method(&parent, member).is_some(),
            None => false,
        }
    }

    /// Subtype test: exact match, Int→Float widening, class chain walk,
    /// and declared protocol conformance.
    pub fn accepts(&self, expected: &Type, actual: &Type) -> bool {
        if expected.is_unknown() || actual.is_unknown() {
            return true;
        }
        if expected == actual {
            return true;
        }
        match (expected, actual) {
            (Type::Float, Type::Int) => true,
            (Type::Optional(inner), Type::Nil) => {
                let _ = inner;
                true
            }
            (Type::Optional(inner), other) => self.accepts(inner, other),
            (Type::Named(expected_name), Type::Named(actual_name)) => {
                self.is_subtype_name(actual_name, expected_name)
            }
            _ => false,
        }
    }

    fn is_subtype_name(&self, actual: &str, expected: &str) -> bool {
        if actual == expected {
            return true;
        }
        let mut current = Some(actual.to_string());
        while let Some(name) = current {
            let Some(info) = self.types.get(&name) else {
                return false;
            };
            if info.conformances.iter().any(|c| {
                c == expected || self.protocol_inherits(c, expected)
            }) {
                return true;
            }
            match &info.superclass {
                Some(parent) if parent == expected => return true,
                Some(parent) => current = Some(parent.clone()),
                None => return false,
            }
        }
        false
    }

    fn protocol_inherits(&self, protocol: &str, wanted: &str) -> bool {
        let Some(info) = self.protocols.get(protocol) else {
            return false;
        };
        info.inherited
            .iter()
            .any(|p| p == wanted || self.protocol_inherits(p, wanted))
    }
}
