//! Expression compilation.

use crate::ast::*;
use crate::bytecode::assembly::{Const, ParamInfo};
use crate::bytecode::opcode::{OpCode, NO_LABEL};
use crate::compiler::{CompileResult, Compiler, FunctionType, VariableAccess};
use crate::error::CompileError;

impl Compiler {
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        let line = expr.span.line;
        match &expr.kind {
            ExprKind::IntLiteral(n) => self.emit_constant(Const::Int(*n), line),
            ExprKind::FloatLiteral(n) => self.emit_constant(Const::Float(*n), line),
            ExprKind::BoolLiteral(true) => self.emit_op(OpCode::True, line),
            ExprKind::BoolLiteral(false) => self.emit_op(OpCode::False, line),
            ExprKind::Nil => self.emit_op(OpCode::Nil, line),
            ExprKind::StringLiteral(s) => {
                let idx = self.assembly.add_string(s);
                self.emit_op_u16(OpCode::String, idx, line);
            }

            ExprKind::Variable(name) => self.compile_variable_get(name, line)?,

            ExprKind::SelfExpr => {
                if self.type_context.is_none() {
                    return Err(CompileError::new("Cannot use 'self' outside of a type", line));
                }
                self.emit_self_load(line);
            }

            ExprKind::SuperMethod(name) => {
                let in_class = self
                    .type_context
                    .as_ref()
                    .map(|ctx| ctx.has_superclass)
                    .unwrap_or(false);
                if !in_class {
                    return Err(CompileError::new(
                        "Cannot use 'super' outside of a subclass method",
                        line,
                    ));
                }
                self.emit_self_load(line);
                self.emit_string_op(OpCode::Super, name, line);
            }

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_binary_op(*operator, line);
            }

            ExprKind::Logical {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                match operator {
                    LogicalOp::And => {
                        let short = self.emit_jump(OpCode::JumpIfFalse, line);
                        self.emit_op(OpCode::Pop, line);
                        self.compile_expr(right)?;
                        self.patch_jump(short);
                    }
                    LogicalOp::Or => {
                        let else_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                        let end_jump = self.emit_jump(OpCode::Jump, line);
                        self.patch_jump(else_jump);
                        self.emit_op(OpCode::Pop, line);
                        self.compile_expr(right)?;
                        self.patch_jump(end_jump);
                    }
                }
            }

            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit_op(OpCode::Negate, line),
                    UnaryOp::Not => self.emit_op(OpCode::Not, line),
                    UnaryOp::BitNot => self.emit_op(OpCode::BitwiseNot, line),
                }
            }

            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                self.compile_expr(then_expr)?;
                let end_jump = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(else_jump);
                self.emit_op(OpCode::Pop, line);
                self.compile_expr(else_expr)?;
                self.patch_jump(end_jump);
            }

            ExprKind::Range {
                start,
                end,
                inclusive,
            } => {
                self.compile_expr(start)?;
                self.compile_expr(end)?;
                let op = if *inclusive {
                    OpCode::RangeInclusive
                } else {
                    OpCode::RangeExclusive
                };
                self.emit_op(op, line);
            }

            ExprKind::Grouping(inner) => self.compile_expr(inner)?,

            ExprKind::Assign {
                target,
                operator,
                value,
            } => self.compile_assignment(target, *operator, value, line)?,

            ExprKind::Call { callee, arguments } => {
                self.compile_call(callee, arguments, line)?
            }

            ExprKind::GenericInstantiation { base, type_args } => {
                let mangled = self.ensure_specialized(base, type_args, line)?;
                self.emit_string_op(OpCode::GetGlobal, &mangled, line);
            }

            ExprKind::Member { object, name } => {
                self.compile_expr(object)?;
                // A member read off a local with a declared tuple type is a
                // label access; everything else goes through the general
                // member dispatch.
                if self.object_has_tuple_type(object) {
                    self.emit_string_op(OpCode::GetTupleLabel, name, line);
                } else {
                    self.emit_string_op(OpCode::GetProperty, name, line);
                }
            }

            ExprKind::OptionalMember { object, name } => {
                self.compile_expr(object)?;
                let skip = self.emit_jump(OpCode::OptionalChain, line);
                self.emit_string_op(OpCode::GetProperty, name, line);
                self.patch_jump(skip);
            }

            ExprKind::TupleIndex { object, index } => {
                self.compile_expr(object)?;
                self.emit_op_u16(OpCode::GetTupleIndex, *index, line);
            }

            ExprKind::Subscript { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit_op(OpCode::GetSubscript, line);
            }

            ExprKind::ForceUnwrap(inner) => {
                self.compile_expr(inner)?;
                self.emit_op(OpCode::Unwrap, line);
            }

            ExprKind::NilCoalesce { left, right } => {
                self.compile_expr(left)?;
                let end_jump = self.emit_jump(OpCode::NilCoalesce, line);
                self.compile_expr(right)?;
                self.patch_jump(end_jump);
            }

            ExprKind::TypeCheck { value, type_name } => {
                self.compile_expr(value)?;
                self.emit_string_op(OpCode::TypeCheck, type_name, line);
            }

            ExprKind::Cast {
                value,
                type_name,
                kind,
            } => {
                self.compile_expr(value)?;
                let op = match kind {
                    CastKind::Checked => OpCode::TypeCast,
                    CastKind::Optional => OpCode::TypeCastOptional,
                    CastKind::Forced => OpCode::TypeCastForced,
                };
                self.emit_string_op(op, type_name, line);
            }

            ExprKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit_op_u16(OpCode::Array, elements.len() as u16, line);
            }

            ExprKind::DictLiteral(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit_op_u16(OpCode::Dict, pairs.len() as u16, line);
            }

            ExprKind::TupleLiteral(elements) => {
                for (_, value) in elements {
                    self.compile_expr(value)?;
                }
                self.emit_op(OpCode::Tuple, line);
                self.emit_byte(elements.len() as u8, line);
                for (label, _) in elements {
                    let idx = match label {
                        Some(l) => self.assembly.add_string(l),
                        None => NO_LABEL,
                    };
                    self.emit_u16(idx, line);
                }
            }

            ExprKind::Closure {
                params,
                return_type: _,
                body,
            } => {
                let proto_idx = self.compile_function_parts(
                    String::new(),
                    params,
                    body,
                    FunctionType::Lambda,
                    line,
                )?;
                self.emit_closure(proto_idx, line);
            }

            ExprKind::ReadLine => self.emit_op(OpCode::ReadLine, line),
        }
        Ok(())
    }

    pub(crate) fn emit_binary_op(&mut self, operator: BinaryOp, line: u32) {
        let op = match operator {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Subtract => OpCode::Subtract,
            BinaryOp::Multiply => OpCode::Multiply,
            BinaryOp::Divide => OpCode::Divide,
            BinaryOp::Modulo => OpCode::Modulo,
            BinaryOp::Equal => OpCode::Equal,
            BinaryOp::NotEqual => OpCode::NotEqual,
            BinaryOp::Less => OpCode::Less,
            BinaryOp::LessEqual => OpCode::LessEqual,
            BinaryOp::Greater => OpCode::Greater,
            BinaryOp::GreaterEqual => OpCode::GreaterEqual,
            BinaryOp::BitAnd => OpCode::BitwiseAnd,
            BinaryOp::BitOr => OpCode::BitwiseOr,
            BinaryOp::BitXor => OpCode::BitwiseXor,
            BinaryOp::Shl => OpCode::LeftShift,
            BinaryOp::Shr => OpCode::RightShift,
        };
        self.emit_op(op, line);
    }

    fn compile_variable_get(&mut self, name: &str, line: u32) -> CompileResult<()> {
        match self.resolve_variable(name) {
            VariableAccess::Local(slot) => self.emit_op_u16(OpCode::GetLocal, slot, line),
            VariableAccess::Upvalue(idx) => self.emit_op_u16(OpCode::GetUpvalue, idx, line),
            VariableAccess::ImplicitSelf(name) => {
                self.emit_self_load(line);
                self.emit_string_op(OpCode::GetProperty, &name, line);
            }
            VariableAccess::Global(name) => {
                self.emit_string_op(OpCode::GetGlobal, &name, line)
            }
        }
        Ok(())
    }

    /// Whether an expression reads a local whose declared type is a tuple.
    fn object_has_tuple_type(&self, object: &Expr) -> bool {
        let ExprKind::Variable(name) = &object.kind else {
            return false;
        };
        self.func
            .resolve_local(name)
            .and_then(|slot| self.func.locals[slot as usize].type_name.as_deref())
            .map(|ty| ty.starts_with('(') && !ty.contains("->"))
            .unwrap_or(false)
    }

    /// Load `self`: slot 0 in methods, a captured upvalue inside closures
    /// nested in methods.
    pub(crate) fn emit_self_load(&mut self, line: u32) {
        if let Some(slot) = self.func.resolve_local("self") {
            self.emit_op_u16(OpCode::GetLocal, slot, line);
        } else if let Some(idx) = self.func.resolve_upvalue("self") {
            self.emit_op_u16(OpCode::GetUpvalue, idx, line);
        } else {
            self.emit_op_u16(OpCode::GetLocal, 0, line);
        }
    }

    /// Whether binding this expression's value needs a struct deep copy -
    /// reads of existing storage do; freshly produced values don't.
    pub(crate) fn needs_value_copy(expr: &Expr) -> bool {
        matches!(
            expr.kind,
            ExprKind::Variable(_)
                | ExprKind::Member { .. }
                | ExprKind::OptionalMember { .. }
                | ExprKind::Subscript { .. }
                | ExprKind::TupleIndex { .. }
                | ExprKind::SelfExpr
                | ExprKind::ForceUnwrap(_)
        )
    }

    fn compile_assignment(
        &mut self,
        target: &Expr,
        operator: Option<BinaryOp>,
        value: &Expr,
        line: u32,
    ) -> CompileResult<()> {
        match &target.kind {
            ExprKind::Variable(name) => {
                let access = self.resolve_variable(name);
                match access {
                    VariableAccess::Local(slot) => {
                        if self.func.locals[slot as usize].is_let {
                            return Err(CompileError::new(
                                format!("Cannot assign to 'let' constant '{}'", name),
                                line,
                            ));
                        }
                        self.compile_assigned_value(operator, value, line, |c, l| {
                            c.emit_op_u16(OpCode::GetLocal, slot, l)
                        })?;
                        self.emit_op_u16(OpCode::SetLocal, slot, line);
                    }
                    VariableAccess::Upvalue(idx) => {
                        self.compile_assigned_value(operator, value, line, |c, l| {
                            c.emit_op_u16(OpCode::GetUpvalue, idx, l)
                        })?;
                        self.emit_op_u16(OpCode::SetUpvalue, idx, line);
                    }
                    VariableAccess::ImplicitSelf(name) => {
                        self.emit_self_load(line);
                        let name_for_get = name.clone();
                        self.compile_assigned_value(operator, value, line, move |c, l| {
                            c.emit_self_load(l);
                            c.emit_string_op(OpCode::GetProperty, &name_for_get, l);
                        })?;
                        self.emit_string_op(OpCode::SetProperty, &name, line);
                    }
                    VariableAccess::Global(name) => {
                        if self.global_lets.contains(&name) {
                            return Err(CompileError::new(
                                format!("Cannot assign to 'let' constant '{}'", name),
                                line,
                            ));
                        }
                        let name_for_get = name.clone();
                        self.compile_assigned_value(operator, value, line, move |c, l| {
                            c.emit_string_op(OpCode::GetGlobal, &name_for_get, l)
                        })?;
                        self.emit_string_op(OpCode::SetGlobal, &name, line);
                    }
                }
            }

            ExprKind::Member { object, name } => {
                self.compile_expr(object)?;
                if let Some(op) = operator {
                    self.emit_op(OpCode::Dup, line);
                    self.emit_string_op(OpCode::GetProperty, name, line);
                    self.compile_expr(value)?;
                    self.emit_binary_op(op, line);
                } else {
                    self.compile_expr(value)?;
                    if Self::needs_value_copy(value) {
                        self.emit_op(OpCode::CopyValue, line);
                    }
                }
                self.emit_string_op(OpCode::SetProperty, name, line);
            }

            ExprKind::OptionalMember { object, name } => {
                self.compile_expr(object)?;
                let skip = self.emit_jump(OpCode::OptionalChain, line);
                self.compile_expr(value)?;
                self.emit_string_op(OpCode::SetProperty, name, line);
                self.patch_jump(skip);
            }

            ExprKind::Subscript { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                if let Some(op) = operator {
                    // Re-evaluate the receiver pair for the read.
                    self.compile_expr(object)?;
                    self.compile_expr(index)?;
                    self.emit_op(OpCode::GetSubscript, line);
                    self.compile_expr(value)?;
                    self.emit_binary_op(op, line);
                } else {
                    self.compile_expr(value)?;
                    if Self::needs_value_copy(value) {
                        self.emit_op(OpCode::CopyValue, line);
                    }
                }
                self.emit_op(OpCode::SetSubscript, line);
            }

            _ => {
                return Err(CompileError::new("Invalid assignment target", line));
            }
        }
        Ok(())
    }

    /// Compile the right-hand side of an assignment; for compound operators
    /// `read_target` re-emits the current value first.
    fn compile_assigned_value(
        &mut self,
        operator: Option<BinaryOp>,
        value: &Expr,
        line: u32,
        read_target: impl FnOnce(&mut Compiler, u32),
    ) -> CompileResult<()> {
        match operator {
            Some(op) => {
                read_target(self, line);
                self.compile_expr(value)?;
                self.emit_binary_op(op, line);
            }
            None => {
                self.compile_expr(value)?;
                if Self::needs_value_copy(value) {
                    self.emit_op(OpCode::CopyValue, line);
                }
            }
        }
        Ok(())
    }

    fn compile_call(
        &mut self,
        callee: &Expr,
        arguments: &[Argument],
        line: u32,
    ) -> CompileResult<()> {
        self.compile_expr(callee)?;

        for argument in arguments {
            self.compile_expr(&argument.value)?;
        }

        let has_labels = arguments.iter().any(|a| a.label.is_some());
        if has_labels {
            self.emit_op(OpCode::CallNamed, line);
            self.emit_byte(arguments.len() as u8, line);
            for argument in arguments {
                let idx = match &argument.label {
                    Some(label) => self.assembly.add_string(label),
                    None => NO_LABEL,
                };
                self.emit_u16(idx, line);
            }
        } else {
            self.emit_op(OpCode::Call, line);
            self.emit_byte(arguments.len() as u8, line);
        }
        Ok(())
    }

    /// Emit `Closure` when the prototype captures variables, otherwise the
    /// cheaper `Function`.
    pub(crate) fn emit_closure(&mut self, proto_idx: u16, line: u32) {
        let op = if self.assembly.protos[proto_idx as usize].upvalues.is_empty() {
            OpCode::Function
        } else {
            OpCode::Closure
        };
        self.emit_op_u16(op, proto_idx, line);
    }

    /// Compile a function body into a prototype and return its index.
    pub(crate) fn compile_function_parts(
        &mut self,
        name: String,
        params: &[Parameter],
        body: &[crate::ast::Stmt],
        function_type: FunctionType,
        line: u32,
    ) -> CompileResult<u16> {
        self.begin_function(function_type, name);

        for param in params {
            let default = match &param.default_value {
                Some(expr) => Some(self.literal_constant(expr)?),
                None => None,
            };
            let type_name = param
                .type_annotation
                .as_ref()
                .map(|t| t.canonical_name());
            self.func.proto.params.push(ParamInfo {
                label: param.external_label.clone(),
                name: param.name.clone(),
                default,
                type_name: type_name.clone(),
            });
            self.add_typed_local(param.name.clone(), false, type_name);
        }

        self.begin_scope();
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.end_scope(line);

        self.end_function(line)
    }

    /// Fold a default-value expression to a constant-pool entry. Defaults
    /// are restricted to literals.
    fn literal_constant(&mut self, expr: &Expr) -> CompileResult<u16> {
        let constant = match &expr.kind {
            ExprKind::IntLiteral(n) => Const::Int(*n),
            ExprKind::FloatLiteral(n) => Const::Float(*n),
            ExprKind::BoolLiteral(b) => Const::Bool(*b),
            ExprKind::Nil => Const::Nil,
            ExprKind::StringLiteral(s) => {
                let idx = self.assembly.add_string(s);
                Const::Str(idx)
            }
            ExprKind::Unary {
                operator: UnaryOp::Negate,
                operand,
            } => match &operand.kind {
                ExprKind::IntLiteral(n) => Const::Int(-n),
                ExprKind::FloatLiteral(n) => Const::Float(-n),
                _ => {
                    return Err(CompileError::new(
                        "Default parameter values must be literal constants",
                        expr.span.line,
                    ))
                }
            },
            _ => {
                return Err(CompileError::new(
                    "Default parameter values must be literal constants",
                    expr.span.line,
                ))
            }
        };
        Ok(self.assembly.add_constant(constant))
    }
}
