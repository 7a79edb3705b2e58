//! Declaration collection and validation.

use crate::ast::*;
use crate::types::checker::{TypeChecker, TypeScope};
use crate::types::environment::{FuncSig, ParamSig, PropertySig, ProtocolInfo, TypeInfo};
use crate::types::type_repr::Type;

impl TypeChecker {
    /// First pass: record the signatures of declared types, protocols, and
    /// functions.
    pub(crate) fn declare_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Function(decl) => {
                let sig = self.func_signature(decl);
                self.env.functions.insert(decl.name.clone(), sig);
            }
            StmtKind::Class(decl) => self.declare_class(decl),
            StmtKind::Struct(decl) => self.declare_struct(decl),
            StmtKind::Enum(decl) => self.declare_enum(decl),
            StmtKind::Protocol(decl) => {
                self.env.protocols.insert(
                    decl.name.clone(),
                    ProtocolInfo {
                        inherited: decl.inherited.clone(),
                    },
                );
            }
            StmtKind::Extension(decl) => self.declare_extension(decl),
            _ => {}
        }
    }

    pub(crate) fn func_signature(&self, decl: &FuncDecl) -> FuncSig {
        FuncSig {
            params: decl
                .params
                .iter()
                .map(|p| ParamSig {
                    label: p.external_label.clone(),
                    ty: p
                        .type_annotation
                        .as_ref()
                        .map(Type::from_annotation)
                        .unwrap_or(Type::Unknown),
                    has_default: p.default_value.is_some(),
                })
                .collect(),
            return_type: decl
                .return_type
                .as_ref()
                .map(Type::from_annotation)
                .unwrap_or(Type::Void),
            is_mutating: decl.is_mutating,
            is_static: decl.is_static,
            is_override: decl.is_override,
            access: decl.access,
        }
    }

    fn property_signature(&self, decl: &VarDecl) -> PropertySig {
        PropertySig {
            ty: decl
                .type_annotation
                .as_ref()
                .map(Type::from_annotation)
                .unwrap_or(Type::Unknown),
            is_let: decl.is_let,
            is_static: decl.is_static,
            access: decl.access,
        }
    }

    fn declare_class(&mut self, decl: &ClassDecl) {
        let mut info = TypeInfo {
            is_struct: false,
            ..Default::default()
        };

        // The parser puts the first heritage name in `superclass`; a
        // protocol there is really a conformance.
        let mut superclass = decl.superclass.clone();
        let mut conformances = decl.conformances.clone();
        if let Some(first) = &superclass {
            if self.env.protocols.contains_key(first) {
                conformances.insert(0, first.clone());
                superclass = None;
            }
        }
        info.superclass = superclass;
        info.conformances = conformances;

        for property in &decl.properties {
            info.properties
                .insert(property.name.clone(), self.property_signature(property));
        }
        for method in &decl.methods {
            info.methods
                .insert(method.name.clone(), self.func_signature(method));
        }
        for initializer in &decl.initializers {
            info.initializers.push(self.func_signature(initializer));
        }
        self.env.types.insert(decl.name.clone(), info);
    }

    fn declare_struct(&mut self, decl: &StructDecl) {
        let mut info = TypeInfo {
            is_struct: true,
            conformances: decl.conformances.clone(),
            ..Default::default()
        };
        for property in &decl.properties {
            info.properties
                .insert(property.name.clone(), self.property_signature(property));
        }
        for method in &decl.methods {
            info.methods
                .insert(method.name.clone(), self.func_signature(method));
        }
        for initializer in &decl.initializers {
            info.initializers.push(self.func_signature(initializer));
        }
        self.env.types.insert(decl.name.clone(), info);
    }

    fn declare_enum(&mut self, decl: &EnumDecl) {
        let mut info = TypeInfo {
            is_enum: true,
            ..Default::default()
        };
        for case in &decl.cases {
            info.cases.insert(case.name.clone(), case.associated.len());
        }
        for method in &decl.methods {
            info.methods
                .insert(method.name.clone(), self.func_signature(method));
        }
        for property in &decl.computed_properties {
            info.properties
                .insert(property.name.clone(), self.property_signature(property));
        }
        self.env.types.insert(decl.name.clone(), info);
    }

    fn declare_extension(&mut self, decl: &ExtensionDecl) {
        let methods: Vec<(String, FuncSig)> = decl
            .methods
            .iter()
            .map(|m| (m.name.clone(), self.func_signature(m)))
            .collect();
        let properties: Vec<(String, PropertySig)> = decl
            .computed_properties
            .iter()
            .map(|p| (p.name.clone(), self.property_signature(p)))
            .collect();
        if let Some(info) = self.env.types.get_mut(&decl.type_name) {
            for conformance in &decl.conformances {
                if !info.conformances.contains(conformance) {
                    info.conformances.push(conformance.clone());
                }
            }
            info.methods.extend(methods);
            info.properties.extend(properties);
        }
    }

    // --- Second-pass declaration checks ---

    pub(crate) fn check_class(&mut self, decl: &ClassDecl) {
        self.check_override_discipline(decl);

        let previous = self.current_type.replace(TypeScope {
            name: decl.name.clone(),
            is_struct: false,
        });
        for property in &decl.properties {
            self.check_member_property(&decl.name, property);
        }
        for method in &decl.methods {
            self.check_method_body(&decl.name, method, false);
        }
        for initializer in &decl.initializers {
            self.check_method_body(&decl.name, initializer, false);
        }
        if let Some(body) = &decl.deinit_body {
            self.env.push_scope();
            self.env
                .declare("self", Type::Named(decl.name.clone()), true);
            for stmt in body {
                self.check_stmt(stmt);
            }
            self.env.pop_scope();
        }
        self.current_type = previous;
    }

    pub(crate) fn check_struct(&mut self, decl: &StructDecl) {
        let previous = self.current_type.replace(TypeScope {
            name: decl.name.clone(),
            is_struct: true,
        });
        for property in &decl.properties {
            self.check_member_property(&decl.name, property);
        }
        for method in &decl.methods {
            self.check_method_body(&decl.name, method, method.is_mutating);
        }
        for initializer in &decl.initializers {
            self.check_method_body(&decl.name, initializer, true);
        }
        self.current_type = previous;
    }

    pub(crate) fn check_enum(&mut self, decl: &EnumDecl) {
        let previous = self.current_type.replace(TypeScope {
            name: decl.name.clone(),
            is_struct: false,
        });
        for method in &decl.methods {
            self.check_method_body(&decl.name, method, false);
        }
        for property in &decl.computed_properties {
            self.check_member_property(&decl.name, property);
        }
        self.current_type = previous;
    }

    pub(crate) fn check_extension(&mut self, decl: &ExtensionDecl) {
        if !self.env.types.contains_key(&decl.type_name) {
            self.error(
                format!("Cannot extend unknown type '{}'", decl.type_name),
                decl.span,
            );
            return;
        }
        let is_struct = self
            .env
            .types
            .get(&decl.type_name)
            .map(|i| i.is_struct)
            .unwrap_or(false);
        let previous = self.current_type.replace(TypeScope {
            name: decl.type_name.clone(),
            is_struct,
        });
        for method in &decl.methods {
            self.check_method_body(&decl.type_name, method, method.is_mutating);
        }
        for property in &decl.computed_properties {
            self.check_member_property(&decl.type_name, property);
        }
        self.current_type = previous;
    }

    /// Override discipline: shadowing a non-initializer ancestor method
    /// requires `override`; `override` requires a matching ancestor.
    fn check_override_discipline(&mut self, decl: &ClassDecl) {
        for method in &decl.methods {
            let shadows = self.env.ancestor_has_method(&decl.name, &method.name);
            if shadows && !method.is_override {
                self.error(
                    format!(
                        "Method '{}' overrides a superclass method and must be marked 'override'",
                        method.name
                    ),
                    method.span,
                );
            }
            if method.is_override && !shadows {
                self.error(
                    format!(
                        "Method '{}' is marked 'override' but no superclass method matches",
                        method.name
                    ),
                    method.span,
                );
            }
        }
    }

    fn check_member_property(&mut self, type_name: &str, decl: &VarDecl) {
        if let (Some(annotation), Some(initializer)) = (&decl.type_annotation, &decl.initializer)
        {
            let declared = Type::from_annotation(annotation);
            let actual = self.infer_expr(initializer);
            if !self.env.accepts(&declared, &actual) {
                self.error(
                    format!(
                        "Cannot initialize '{}' of type {} with a value of type {}",
                        decl.name, declared, actual
                    ),
                    decl.span,
                );
            }
        }
        if let Some(accessors) = &decl.accessors {
            self.env.push_scope();
            self.env
                .declare("self", Type::Named(type_name.to_string()), true);
            for stmt in &accessors.getter {
                self.check_stmt(stmt);
            }
            if let Some((param, body)) = &accessors.setter {
                self.env.push_scope();
                let value_type = decl
                    .type_annotation
                    .as_ref()
                    .map(Type::from_annotation)
                    .unwrap_or(Type::Unknown);
                self.env.declare(param, value_type, true);
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.env.pop_scope();
            }
            self.env.pop_scope();
        }
        if let Some(observers) = &decl.observers {
            let value_type = decl
                .type_annotation
                .as_ref()
                .map(Type::from_annotation)
                .unwrap_or(Type::Unknown);
            for (param, body) in observers
                .will_set
                .iter()
                .chain(observers.did_set.iter())
            {
                self.env.push_scope();
                self.env
                    .declare("self", Type::Named(type_name.to_string()), true);
                self.env.declare(param, value_type.clone(), true);
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.env.pop_scope();
            }
        }
    }

    pub(crate) fn check_method_body(
        &mut self,
        type_name: &str,
        decl: &FuncDecl,
        allow_self_mutation: bool,
    ) {
        let previous_mutating = self.in_mutating_method;
        self.in_mutating_method = allow_self_mutation;
        self.env.push_scope();
        self.env
            .declare("self", Type::Named(type_name.to_string()), !allow_self_mutation);
        self.declare_params(&decl.params);
        for stmt in &decl.body {
            self.check_stmt(stmt);
        }
        self.env.pop_scope();
        self.in_mutating_method = previous_mutating;
    }

    pub(crate) fn declare_params(&mut self, params: &[Parameter]) {
        for param in params {
            let ty = param
                .type_annotation
                .as_ref()
                .map(Type::from_annotation)
                .unwrap_or(Type::Unknown);
            self.env.declare(&param.name, ty, false);
        }
    }
}
