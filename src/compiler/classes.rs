//! Compilation of type declarations: classes, structs, enums, protocols,
//! and extensions.

use std::collections::HashSet;

use crate::ast::*;
use crate::bytecode::assembly::{
    ComputedPropertyDef, EnumCaseDef, MethodDef, ObservedPropertyDef, ProtocolDef,
    ProtocolMethodDef, ProtocolPropertyDef, StoredPropertyDef, TypeDef, TypeDefKind,
};
use crate::bytecode::opcode::{enum_case_flags, method_flags, property_flags, OpCode, NO_LABEL};
use crate::compiler::{ClassMeta, CompileResult, Compiler, FunctionType, TypeContext};
use crate::error::CompileError;

impl Compiler {
    pub(crate) fn compile_class_decl(&mut self, decl: &ClassDecl) -> CompileResult<()> {
        if !decl.generic_params.is_empty() {
            self.register_generic_class(decl);
            return Ok(());
        }
        let line = decl.span.line;

        // The parser stores the first heritage entry as a superclass;
        // reclassify it when it names a protocol.
        let mut superclass = decl.superclass.clone();
        let mut conformances = decl.conformances.clone();
        if let Some(first) = &superclass {
            if self.protocol_names.contains(first) {
                conformances.insert(0, first.clone());
                superclass = None;
            }
        }

        if let Some(parent) = &superclass {
            if !self.class_meta.contains_key(parent) {
                return Err(CompileError::new(
                    format!("Unknown superclass '{}'", parent),
                    line,
                ));
            }
        }

        self.register_class_meta(decl, superclass.clone(), &conformances);
        self.check_override_rules(decl, superclass.as_deref())?;

        // Assemble the type definition record.
        let name_idx = self.assembly.add_string(&decl.name);
        let mut def = TypeDef::new(TypeDefKind::Class, name_idx);
        def.superclass = superclass
            .as_ref()
            .map(|s| self.assembly.add_string(s));
        def.conformances = conformances
            .iter()
            .map(|c| self.assembly.add_string(c))
            .collect();

        // Bare member references also reach inherited members.
        let mut members = Self::collect_member_names(&decl.properties, &decl.methods);
        let mut ancestor = superclass.clone();
        while let Some(parent) = ancestor {
            match self.class_meta.get(&parent) {
                Some(meta) => {
                    members.extend(meta.members.iter().cloned());
                    ancestor = meta.superclass.clone();
                }
                None => break,
            }
        }
        let type_context = TypeContext {
            name: decl.name.clone(),
            is_struct: false,
            has_superclass: superclass.is_some(),
            members,
        };
        let previous_context = self.type_context.replace(type_context);

        self.emit_op(OpCode::Class, line);
        let type_slot = self.current_offset();
        self.emit_u16(0, line);

        if let Some(parent) = &superclass {
            self.emit_string_op(OpCode::GetGlobal, parent, line);
            self.emit_op(OpCode::Inherit, line);
        }

        self.compile_type_members(
            &decl.name,
            &decl.properties,
            &decl.methods,
            &decl.initializers,
            decl.deinit_body.as_deref(),
            false,
            &mut def,
            line,
        )?;

        let type_idx = self.assembly.add_type(def);
        self.func.body.code[type_slot] = (type_idx & 0xff) as u8;
        self.func.body.code[type_slot + 1] = (type_idx >> 8) as u8;

        self.type_context = previous_context;
        self.emit_string_op(OpCode::DefineGlobal, &decl.name, line);
        Ok(())
    }

    pub(crate) fn compile_struct_decl(&mut self, decl: &StructDecl) -> CompileResult<()> {
        if !decl.generic_params.is_empty() {
            self.register_generic_struct(decl);
            return Ok(());
        }
        let line = decl.span.line;

        self.struct_meta.insert(
            decl.name.clone(),
            ClassMeta {
                superclass: None,
                methods: decl.methods.iter().map(|m| m.name.clone()).collect(),
                members: Self::collect_member_names(&decl.properties, &decl.methods),
                conformances: decl.conformances.iter().cloned().collect(),
            },
        );

        let name_idx = self.assembly.add_string(&decl.name);
        let mut def = TypeDef::new(TypeDefKind::Struct, name_idx);
        def.conformances = decl
            .conformances
            .iter()
            .map(|c| self.assembly.add_string(c))
            .collect();

        let type_context = TypeContext {
            name: decl.name.clone(),
            is_struct: true,
            has_superclass: false,
            members: Self::collect_member_names(&decl.properties, &decl.methods),
        };
        let previous_context = self.type_context.replace(type_context);

        self.emit_op(OpCode::Struct, line);
        let type_slot = self.current_offset();
        self.emit_u16(0, line);

        self.compile_type_members(
            &decl.name,
            &decl.properties,
            &decl.methods,
            &decl.initializers,
            None,
            true,
            &mut def,
            line,
        )?;

        let type_idx = self.assembly.add_type(def);
        self.func.body.code[type_slot] = (type_idx & 0xff) as u8;
        self.func.body.code[type_slot + 1] = (type_idx >> 8) as u8;

        self.type_context = previous_context;
        self.emit_string_op(OpCode::DefineGlobal, &decl.name, line);
        Ok(())
    }

    /// Shared member emission for classes and structs. The type object is
    /// on top of the stack throughout.
    #[allow(clippy::too_many_arguments)]
    fn compile_type_members(
        &mut self,
        type_name: &str,
        properties: &[VarDecl],
        methods: &[FuncDecl],
        initializers: &[FuncDecl],
        deinit_body: Option<&[Stmt]>,
        is_struct: bool,
        def: &mut TypeDef,
        line: u32,
    ) -> CompileResult<()> {
        for property in properties {
            self.compile_property_member(type_name, property, def)?;
        }

        let method_op = if is_struct {
            OpCode::StructMethod
        } else {
            OpCode::Method
        };

        for method in methods {
            let proto_idx = self.compile_method(type_name, method, FunctionType::Method)?;
            let name_idx = self.assembly.add_string(&method.name);
            let mut flags = 0u8;
            if method.is_static {
                flags |= method_flags::STATIC;
            }
            if method.is_mutating {
                flags |= method_flags::MUTATING;
            }
            self.emit_closure(proto_idx, method.span.line);
            self.emit_op_u16(method_op, name_idx, method.span.line);
            self.emit_byte(flags, method.span.line);
            def.methods.push(MethodDef {
                name: name_idx,
                proto: proto_idx,
                flags,
            });
        }

        for initializer in initializers {
            let proto_idx =
                self.compile_method(type_name, initializer, FunctionType::Initializer)?;
            let name_idx = self.assembly.add_string("init");
            let flags = method_flags::INITIALIZER;
            self.emit_closure(proto_idx, initializer.span.line);
            self.emit_op_u16(method_op, name_idx, initializer.span.line);
            self.emit_byte(flags, initializer.span.line);
            def.methods.push(MethodDef {
                name: name_idx,
                proto: proto_idx,
                flags,
            });
        }

        if let Some(body) = deinit_body {
            let proto_idx = self.compile_accessor_body(type_name, "deinit", &[], body, line)?;
            let name_idx = self.assembly.add_string("deinit");
            self.emit_closure(proto_idx, line);
            self.emit_op_u16(OpCode::Method, name_idx, line);
            self.emit_byte(0, line);
            def.methods.push(MethodDef {
                name: name_idx,
                proto: proto_idx,
                flags: 0,
            });
        }

        Ok(())
    }

    /// One property member: stored (with optional default thunk), computed,
    /// or observed.
    fn compile_property_member(
        &mut self,
        type_name: &str,
        property: &VarDecl,
        def: &mut TypeDef,
    ) -> CompileResult<()> {
        let line = property.span.line;
        let name_idx = self.assembly.add_string(&property.name);

        if let Some(accessors) = &property.accessors {
            let getter_proto = self.compile_accessor_body(
                type_name,
                &format!("get {}", property.name),
                &[],
                &accessors.getter,
                line,
            )?;
            self.emit_closure(getter_proto, line);

            let setter_proto = match &accessors.setter {
                Some((param, body)) => {
                    let proto = self.compile_accessor_body(
                        type_name,
                        &format!("set {}", property.name),
                        std::slice::from_ref(param),
                        body,
                        line,
                    )?;
                    self.emit_closure(proto, line);
                    Some(proto)
                }
                None => None,
            };

            self.emit_op_u16(OpCode::DefineComputedProperty, name_idx, line);
            self.emit_byte(setter_proto.is_some() as u8, line);
            def.computed.push(ComputedPropertyDef {
                name: name_idx,
                getter_proto,
                setter_proto,
            });
            return Ok(());
        }

        if let Some(observers) = &property.observers {
            let mut flags = 0u8;
            let default_proto = match &property.initializer {
                Some(init) => {
                    flags |= property_flags::HAS_DEFAULT;
                    let proto = self.compile_default_thunk(type_name, &property.name, init)?;
                    self.emit_closure(proto, line);
                    Some(proto)
                }
                None => None,
            };
            let will_set = match &observers.will_set {
                Some((param, body)) => {
                    flags |= property_flags::HAS_WILLSET;
                    let proto = self.compile_accessor_body(
                        type_name,
                        &format!("willSet {}", property.name),
                        std::slice::from_ref(param),
                        body,
                        line,
                    )?;
                    self.emit_closure(proto, line);
                    Some(proto)
                }
                None => None,
            };
            let did_set = match &observers.did_set {
                Some((param, body)) => {
                    flags |= property_flags::HAS_DIDSET;
                    let proto = self.compile_accessor_body(
                        type_name,
                        &format!("didSet {}", property.name),
                        std::slice::from_ref(param),
                        body,
                        line,
                    )?;
                    self.emit_closure(proto, line);
                    Some(proto)
                }
                None => None,
            };

            self.emit_op_u16(OpCode::DefinePropertyWithObservers, name_idx, line);
            self.emit_byte(flags, line);
            def.observed.push(ObservedPropertyDef {
                name: name_idx,
                will_set_proto: will_set,
                did_set_proto: did_set,
            });
            def.stored.push(StoredPropertyDef {
                name: name_idx,
                flags,
                default_proto,
            });
            return Ok(());
        }

        // Plain stored property.
        let mut flags = 0u8;
        if property.is_static {
            flags |= property_flags::STATIC;
        }
        if property.is_let {
            flags |= property_flags::LET;
        }
        if property.ownership == Ownership::Weak {
            flags |= property_flags::WEAK;
        }
        if property.is_lazy {
            flags |= property_flags::LAZY;
        }
        let default_proto = match &property.initializer {
            Some(init) => {
                flags |= property_flags::HAS_DEFAULT;
                let proto = self.compile_default_thunk(type_name, &property.name, init)?;
                self.emit_closure(proto, line);
                Some(proto)
            }
            None => None,
        };
        self.emit_op_u16(OpCode::DefineProperty, name_idx, line);
        self.emit_byte(flags, line);
        def.stored.push(StoredPropertyDef {
            name: name_idx,
            flags,
            default_proto,
        });
        Ok(())
    }

    /// A method or initializer body.
    fn compile_method(
        &mut self,
        type_name: &str,
        decl: &FuncDecl,
        function_type: FunctionType,
    ) -> CompileResult<u16> {
        if !decl.generic_params.is_empty() {
            return Err(CompileError::new(
                "Generic methods are not supported; make the type generic instead",
                decl.span.line,
            ));
        }
        let proto_idx = self.compile_function_parts(
            decl.name.clone(),
            &decl.params,
            &decl.body,
            function_type,
            decl.span.line,
        )?;
        let proto = &mut self.assembly.protos[proto_idx as usize];
        proto.owner = Some(type_name.to_string());
        proto.is_initializer = function_type == FunctionType::Initializer;
        proto.is_override = decl.is_override;
        proto.is_mutating = decl.is_mutating;
        Ok(proto_idx)
    }

    /// A getter/setter/observer body: a nullary-or-unary method whose
    /// parameters have no labels or defaults.
    fn compile_accessor_body(
        &mut self,
        type_name: &str,
        name: &str,
        params: &[String],
        body: &[Stmt],
        line: u32,
    ) -> CompileResult<u16> {
        let params: Vec<Parameter> = params
            .iter()
            .map(|p| Parameter {
                external_label: None,
                name: p.clone(),
                type_annotation: None,
                default_value: None,
                span: Default::default(),
            })
            .collect();
        let proto_idx = self.compile_function_parts(
            name.to_string(),
            &params,
            body,
            FunctionType::Accessor,
            line,
        )?;
        self.assembly.protos[proto_idx as usize].owner = Some(type_name.to_string());
        Ok(proto_idx)
    }

    /// A stored-property default value, wrapped in a thunk so it is
    /// evaluated per instance (and on first read for `lazy`).
    fn compile_default_thunk(
        &mut self,
        type_name: &str,
        property_name: &str,
        init: &Expr,
    ) -> CompileResult<u16> {
        let line = init.span.line;
        self.begin_function(
            FunctionType::Accessor,
            format!("default {}", property_name),
        );
        self.compile_expr(init)?;
        self.emit_op(OpCode::Return, line);
        let proto_idx = self.end_function(line)?;
        self.assembly.protos[proto_idx as usize].owner = Some(type_name.to_string());
        Ok(proto_idx)
    }

    fn collect_member_names(
        properties: &[VarDecl],
        methods: &[FuncDecl],
    ) -> HashSet<String> {
        properties
            .iter()
            .map(|p| p.name.clone())
            .chain(methods.iter().map(|m| m.name.clone()))
            .collect()
    }

    fn register_class_meta(
        &mut self,
        decl: &ClassDecl,
        superclass: Option<String>,
        conformances: &[String],
    ) {
        self.class_meta.insert(
            decl.name.clone(),
            ClassMeta {
                superclass,
                methods: decl.methods.iter().map(|m| m.name.clone()).collect(),
                members: Self::collect_member_names(&decl.properties, &decl.methods),
                conformances: conformances.iter().cloned().collect(),
            },
        );
    }

    /// Override discipline: a subclass method shadowing an ancestor method
    /// must carry `override`; `override` without an ancestor method is an
    /// error. Initializers are exempt both ways.
    fn check_override_rules(
        &self,
        decl: &ClassDecl,
        _superclass: Option<&str>,
    ) -> CompileResult<()> {
        for method in &decl.methods {
            let shadows = self.ancestor_has_method(&decl.name, &method.name);
            if shadows && !method.is_override {
                return Err(CompileError::new(
                    format!(
                        "Method '{}' overrides a superclass method and must be marked 'override'",
                        method.name
                    ),
                    method.span.line,
                ));
            }
            if method.is_override && !shadows {
                return Err(CompileError::new(
                    format!(
                        "Method '{}' is marked 'override' but no superclass method matches",
                        method.name
                    ),
                    method.span.line,
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn compile_enum_decl(&mut self, decl: &EnumDecl) -> CompileResult<()> {
        let line = decl.span.line;
        self.enum_names.insert(decl.name.clone());

        let name_idx = self.assembly.add_string(&decl.name);
        let mut def = TypeDef::new(TypeDefKind::Enum, name_idx);
        def.raw_type = decl
            .raw_type
            .as_ref()
            .map(|t| self.assembly.add_string(t));

        let type_context = TypeContext {
            name: decl.name.clone(),
            is_struct: false,
            has_superclass: false,
            members: decl
                .methods
                .iter()
                .map(|m| m.name.clone())
                .chain(decl.computed_properties.iter().map(|p| p.name.clone()))
                .collect(),
        };
        let previous_context = self.type_context.replace(type_context);

        self.emit_op(OpCode::Enum, line);
        let type_slot = self.current_offset();
        self.emit_u16(0, line);

        for case in &decl.cases {
            let case_line = case.span.line;
            let case_name_idx = self.assembly.add_string(&case.name);
            let mut flags = 0u8;
            let mut raw_const = None;

            if let Some(raw) = &case.raw_value {
                flags |= enum_case_flags::HAS_RAW;
                self.compile_expr(raw)?;
                raw_const = self.constant_index_of_literal(raw);
            }

            self.emit_op_u16(OpCode::EnumCase, case_name_idx, case_line);
            self.emit_byte(flags, case_line);
            self.emit_byte(case.associated.len() as u8, case_line);
            let mut labels = Vec::new();
            for param in &case.associated {
                let label_idx = match &param.external_label {
                    Some(label) => self.assembly.add_string(label),
                    None => NO_LABEL,
                };
                self.emit_u16(label_idx, case_line);
                if label_idx != NO_LABEL {
                    labels.push(label_idx);
                }
            }
            def.cases.push(EnumCaseDef {
                name: case_name_idx,
                raw: raw_const,
                labels,
            });
        }

        for method in &decl.methods {
            let proto_idx = self.compile_method(&decl.name, method, FunctionType::Method)?;
            let method_name_idx = self.assembly.add_string(&method.name);
            let mut flags = 0u8;
            if method.is_static {
                flags |= method_flags::STATIC;
            }
            self.emit_closure(proto_idx, method.span.line);
            self.emit_op_u16(OpCode::Method, method_name_idx, method.span.line);
            self.emit_byte(flags, method.span.line);
            def.methods.push(MethodDef {
                name: method_name_idx,
                proto: proto_idx,
                flags,
            });
        }

        // Computed properties register against the enum's type object the
        // same way they do for classes.
        for property in &decl.computed_properties {
            self.compile_property_member(&decl.name, property, &mut def)?;
        }

        let type_idx = self.assembly.add_type(def);
        self.func.body.code[type_slot] = (type_idx & 0xff) as u8;
        self.func.body.code[type_slot + 1] = (type_idx >> 8) as u8;

        self.type_context = previous_context;
        self.emit_string_op(OpCode::DefineGlobal, &decl.name, line);
        Ok(())
    }

    /// Constant-pool index of an already-compiled raw value, for the type
    /// table record.
    fn constant_index_of_literal(&mut self, expr: &Expr) -> Option<u16> {
        use crate::bytecode::assembly::Const;
        match &expr.kind {
            ExprKind::IntLiteral(n) => Some(self.assembly.add_constant(Const::Int(*n))),
            ExprKind::FloatLiteral(n) => Some(self.assembly.add_constant(Const::Float(*n))),
            ExprKind::BoolLiteral(b) => Some(self.assembly.add_constant(Const::Bool(*b))),
            ExprKind::StringLiteral(s) => {
                let idx = self.assembly.add_string(s);
                Some(self.assembly.add_constant(Const::Str(idx)))
            }
            _ => None,
        }
    }

    pub(crate) fn compile_protocol_decl(&mut self, decl: &ProtocolDecl) -> CompileResult<()> {
        let line = decl.span.line;
        self.protocol_names.insert(decl.name.clone());

        let name_idx = self.assembly.add_string(&decl.name);
        let inherited = decl
            .inherited
            .iter()
            .map(|p| self.assembly.add_string(p))
            .collect();
        let methods = decl
            .methods
            .iter()
            .map(|m| ProtocolMethodDef {
                name: self.assembly.add_string(&m.name),
                param_names: m
                    .param_names
                    .iter()
                    .map(|p| self.assembly.add_string(p))
                    .collect(),
                is_mutating: m.is_mutating,
            })
            .collect::<Vec<_>>();
        let properties = decl
            .properties
            .iter()
            .map(|p| ProtocolPropertyDef {
                name: self.assembly.add_string(&p.name),
                has_getter: p.has_getter,
                has_setter: p.has_setter,
            })
            .collect::<Vec<_>>();

        let protocol_idx = self.assembly.add_protocol(ProtocolDef {
            name: name_idx,
            inherited,
            methods,
            properties,
        });

        self.emit_op_u16(OpCode::Protocol, protocol_idx, line);
        self.emit_string_op(OpCode::DefineGlobal, &decl.name, line);
        Ok(())
    }

    pub(crate) fn compile_extension_decl(&mut self, decl: &ExtensionDecl) -> CompileResult<()> {
        let line = decl.span.line;
        let is_struct = self.is_struct_type(&decl.type_name);
        let is_known = is_struct
            || self.class_meta.contains_key(&decl.type_name)
            || self.enum_names.contains(&decl.type_name);
        if !is_known {
            return Err(CompileError::new(
                format!("Cannot extend unknown type '{}'", decl.type_name),
                line,
            ));
        }

        // New conformances land in the type's definition record and the
        // compile-time registry; the runtime object picks them up when the
        // type definition executes.
        if !decl.conformances.is_empty() {
            let extra: Vec<u16> = decl
                .conformances
                .iter()
                .map(|c| self.assembly.add_string(c))
                .collect();
            let name_idx = self.assembly.add_string(&decl.type_name);
            if let Some(def) = self
                .assembly
                .types
                .iter_mut()
                .find(|t| t.name == name_idx)
            {
                for idx in extra {
                    if !def.conformances.contains(&idx) {
                        def.conformances.push(idx);
                    }
                }
            }
            let registry = if is_struct {
                self.struct_meta.get_mut(&decl.type_name)
            } else {
                self.class_meta.get_mut(&decl.type_name)
            };
            if let Some(meta) = registry {
                for c in &decl.conformances {
                    meta.conformances.insert(c.clone());
                }
            }
        }

        // Bare member references inside extension bodies resolve against
        // the extended type's existing members plus the new ones.
        let mut members: HashSet<String> = decl
            .methods
            .iter()
            .map(|m| m.name.clone())
            .chain(decl.computed_properties.iter().map(|p| p.name.clone()))
            .collect();
        let existing = if is_struct {
            self.struct_meta.get(&decl.type_name)
        } else {
            self.class_meta.get(&decl.type_name)
        };
        if let Some(meta) = existing {
            members.extend(meta.members.iter().cloned());
        }
        let type_context = TypeContext {
            name: decl.type_name.clone(),
            is_struct,
            has_superclass: false,
            members,
        };
        let previous_context = self.type_context.replace(type_context);

        self.emit_string_op(OpCode::GetGlobal, &decl.type_name, line);

        let method_op = if is_struct {
            OpCode::StructMethod
        } else {
            OpCode::Method
        };
        for method in &decl.methods {
            let proto_idx = self.compile_method(&decl.type_name, method, FunctionType::Method)?;
            let name_idx = self.assembly.add_string(&method.name);
            let mut flags = 0u8;
            if method.is_static {
                flags |= method_flags::STATIC;
            }
            if method.is_mutating {
                flags |= method_flags::MUTATING;
            }
            self.emit_closure(proto_idx, method.span.line);
            self.emit_op_u16(method_op, name_idx, method.span.line);
            self.emit_byte(flags, method.span.line);

            if let Some(meta) = if is_struct {
                self.struct_meta.get_mut(&decl.type_name)
            } else {
                self.class_meta.get_mut(&decl.type_name)
            } {
                meta.methods.insert(method.name.clone());
                meta.members.insert(method.name.clone());
            }
        }

        for property in &decl.computed_properties {
            let name_idx = self.assembly.add_string(&property.name);
            let accessors = property.accessors.as_ref().expect("parser guarantees");
            let getter_proto = self.compile_accessor_body(
                &decl.type_name,
                &format!("get {}", property.name),
                &[],
                &accessors.getter,
                property.span.line,
            )?;
            self.emit_closure(getter_proto, property.span.line);
            let has_setter = if let Some((param, body)) = &accessors.setter {
                let proto = self.compile_accessor_body(
                    &decl.type_name,
                    &format!("set {}", property.name),
                    std::slice::from_ref(param),
                    body,
                    property.span.line,
                )?;
                self.emit_closure(proto, property.span.line);
                true
            } else {
                false
            };
            self.emit_op_u16(OpCode::DefineComputedProperty, name_idx, property.span.line);
            self.emit_byte(has_setter as u8, property.span.line);
        }

        self.emit_op(OpCode::Pop, line);
        self.type_context = previous_context;
        Ok(())
    }
}
