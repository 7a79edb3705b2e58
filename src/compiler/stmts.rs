//! Statement compilation.

use std::path::PathBuf;

use crate::ast::*;
use crate::bytecode::assembly::Const;
use crate::bytecode::opcode::OpCode;
use crate::compiler::{CompileResult, Compiler, ContinueTarget, FunctionType};
use crate::error::CompileError;

impl Compiler {
    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        let line = stmt.span.line;
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit_op(OpCode::Pop, line);
            }

            StmtKind::Var(decl) => self.compile_var_stmt(decl, line)?,

            StmtKind::TupleDestructure {
                names,
                is_let,
                value,
            } => self.compile_tuple_destructure(names, *is_let, value, line)?,

            StmtKind::Block(stmts) => {
                self.begin_scope();
                for stmt in stmts {
                    self.compile_stmt(stmt)?;
                }
                self.end_scope(line);
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.compile_if(condition, then_branch, else_branch.as_deref(), line)?,

            StmtKind::IfLet {
                name,
                value,
                then_branch,
                else_branch,
            } => self.compile_if_let(name, value, then_branch, else_branch.as_deref(), line)?,

            StmtKind::Guard { condition, body } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                let continue_jump = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(else_jump);
                self.emit_op(OpCode::Pop, line);
                self.compile_scoped_block(body, line)?;
                self.patch_jump(continue_jump);
            }

            StmtKind::GuardLet { name, value, body } => {
                // The binding lives in the enclosing scope, past the guard.
                self.compile_expr(value)?;
                if Self::needs_value_copy(value) {
                    self.emit_op(OpCode::CopyValue, line);
                }
                let slot = self.bind_local(name, true, None, line)?;
                self.emit_op_u16(OpCode::GetLocal, slot, line);
                let else_jump = self.emit_jump(OpCode::JumpIfNil, line);
                self.emit_op(OpCode::Pop, line);
                let continue_jump = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(else_jump);
                self.emit_op(OpCode::Pop, line);
                self.compile_scoped_block(body, line)?;
                self.patch_jump(continue_jump);
            }

            StmtKind::While { condition, body } => {
                let loop_start = self.current_offset();
                self.begin_loop(loop_start, ContinueTarget::Backward(loop_start));
                self.compile_expr(condition)?;
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                self.compile_scoped_block(body, line)?;
                self.emit_loop(loop_start, line);
                self.patch_jump(exit_jump);
                self.emit_op(OpCode::Pop, line);
                self.end_loop();
            }

            StmtKind::RepeatWhile { body, condition } => {
                let body_start = self.current_offset();
                // `continue` re-tests the condition; its offset is not known
                // until the body is compiled, so collect forward jumps.
                self.begin_loop(body_start, ContinueTarget::Forward(Vec::new()));
                self.compile_scoped_block(body, line)?;
                self.patch_continue_jumps();
                self.compile_expr(condition)?;
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                self.emit_loop(body_start, line);
                self.patch_jump(exit_jump);
                self.emit_op(OpCode::Pop, line);
                self.end_loop();
            }

            StmtKind::For {
                variable,
                iterable,
                where_clause,
                body,
            } => self.compile_for(variable, iterable, where_clause.as_ref(), body, line)?,

            StmtKind::Switch {
                subject,
                cases,
                default,
            } => self.compile_switch(subject, cases, default.as_deref(), line)?,

            StmtKind::Return(value) => {
                if self.func.function_type == FunctionType::Script {
                    return Err(CompileError::new("Cannot return from top-level code", line));
                }
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit_op(OpCode::Nil, line),
                }
                self.emit_op(OpCode::Return, line);
            }

            StmtKind::Break => {
                if self.func.loop_context.is_none() {
                    return Err(CompileError::new("'break' outside of a loop", line));
                }
                self.emit_loop_unwind(line);
                let jump = self.emit_jump(OpCode::Jump, line);
                if let Some(ctx) = &mut self.func.loop_context {
                    ctx.break_patches.push(jump);
                }
            }

            StmtKind::Continue => {
                let Some(ctx) = &self.func.loop_context else {
                    return Err(CompileError::new("'continue' outside of a loop", line));
                };
                let target = ctx.continue_target.clone();
                self.emit_loop_unwind(line);
                match target {
                    ContinueTarget::Backward(start) => self.emit_loop(start, line),
                    ContinueTarget::Forward(_) => {
                        let jump = self.emit_jump(OpCode::Jump, line);
                        if let Some(ctx) = &mut self.func.loop_context {
                            if let ContinueTarget::Forward(patches) = &mut ctx.continue_target {
                                patches.push(jump);
                            }
                        }
                    }
                }
            }

            StmtKind::Throw(expr) => {
                self.compile_expr(expr)?;
                self.emit_op(OpCode::Throw, line);
            }

            StmtKind::Print(values) => {
                for value in values {
                    self.compile_expr(value)?;
                }
                self.emit_op(OpCode::Print, line);
                self.emit_byte(values.len() as u8, line);
            }

            StmtKind::Function(decl) => self.compile_function_stmt(decl, line)?,
            StmtKind::Class(decl) => self.compile_class_decl(decl)?,
            StmtKind::Struct(decl) => self.compile_struct_decl(decl)?,
            StmtKind::Enum(decl) => self.compile_enum_decl(decl)?,
            StmtKind::Protocol(decl) => self.compile_protocol_decl(decl)?,
            StmtKind::Extension(decl) => self.compile_extension_decl(decl)?,

            StmtKind::Import(name) => self.compile_import(name, line)?,
        }
        Ok(())
    }

    /// Compile statements in their own lexical scope.
    pub(crate) fn compile_scoped_block(
        &mut self,
        stmts: &[Stmt],
        line: u32,
    ) -> CompileResult<()> {
        self.begin_scope();
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        self.end_scope(line);
        Ok(())
    }

    fn compile_var_stmt(&mut self, decl: &VarDecl, line: u32) -> CompileResult<()> {
        if decl.accessors.is_some() || decl.observers.is_some() {
            return Err(CompileError::new(
                "Computed properties and observers are only allowed inside types",
                line,
            ));
        }

        match &decl.initializer {
            Some(expr) => {
                self.compile_expr(expr)?;
                if Self::needs_value_copy(expr) {
                    self.emit_op(OpCode::CopyValue, line);
                }
            }
            None => self.emit_op(OpCode::Nil, line),
        }

        let type_name = decl.type_annotation.as_ref().map(|t| t.canonical_name());
        if self.func.scope_depth > 0 {
            self.declare_variable(&decl.name, decl.is_let, type_name, line)?;
        } else {
            if decl.is_let {
                self.global_lets.insert(decl.name.clone());
            }
            self.emit_string_op(OpCode::DefineGlobal, &decl.name, line);
        }
        Ok(())
    }

    /// Bind a fresh local from the value on top of the stack, or define a
    /// global; returns the slot for locals.
    fn bind_local(
        &mut self,
        name: &str,
        is_let: bool,
        type_name: Option<String>,
        line: u32,
    ) -> CompileResult<u16> {
        if self.func.scope_depth > 0 {
            self.declare_variable(name, is_let, type_name, line)?;
            Ok((self.func.locals.len() - 1) as u16)
        } else {
            // Top-level guard-let: keep the value as a global.
            self.emit_op(OpCode::Dup, line);
            self.emit_string_op(OpCode::DefineGlobal, name, line);
            // The stack copy acts as the "local" tested below.
            self.add_local(name, is_let);
            Ok((self.func.locals.len() - 1) as u16)
        }
    }

    fn compile_tuple_destructure(
        &mut self,
        names: &[String],
        is_let: bool,
        value: &Expr,
        line: u32,
    ) -> CompileResult<()> {
        self.compile_expr(value)?;

        if self.func.scope_depth > 0 {
            // The tuple stays in a hidden slot below its element bindings.
            self.add_local("$tuple", false);
            let tuple_slot = (self.func.locals.len() - 1) as u16;
            for (i, name) in names.iter().enumerate() {
                if name == "_" {
                    continue;
                }
                self.emit_op_u16(OpCode::GetLocal, tuple_slot, line);
                self.emit_op_u16(OpCode::GetTupleIndex, i as u16, line);
                self.declare_variable(name, is_let, None, line)?;
            }
        } else {
            for (i, name) in names.iter().enumerate() {
                if name == "_" {
                    continue;
                }
                self.emit_op(OpCode::Dup, line);
                self.emit_op_u16(OpCode::GetTupleIndex, i as u16, line);
                if is_let {
                    self.global_lets.insert(name.clone());
                }
                self.emit_string_op(OpCode::DefineGlobal, name, line);
            }
            self.emit_op(OpCode::Pop, line);
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
        line: u32,
    ) -> CompileResult<()> {
        self.compile_expr(condition)?;
        let else_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit_op(OpCode::Pop, line);
        self.compile_scoped_block(then_branch, line)?;

        if let Some(else_branch) = else_branch {
            let end_jump = self.emit_jump(OpCode::Jump, line);
            self.patch_jump(else_jump);
            self.emit_op(OpCode::Pop, line);
            self.compile_scoped_block(else_branch, line)?;
            self.patch_jump(end_jump);
        } else {
            self.patch_jump(else_jump);
            self.emit_op(OpCode::Pop, line);
        }
        Ok(())
    }

    fn compile_if_let(
        &mut self,
        name: &str,
        value: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
        line: u32,
    ) -> CompileResult<()> {
        self.begin_scope();
        self.compile_expr(value)?;
        self.declare_variable(name, true, None, line)?;
        let slot = (self.func.locals.len() - 1) as u16;

        self.emit_op_u16(OpCode::GetLocal, slot, line);
        let else_jump = self.emit_jump(OpCode::JumpIfNil, line);
        self.emit_op(OpCode::Pop, line);
        self.compile_scoped_block(then_branch, line)?;
        let end_jump = self.emit_jump(OpCode::Jump, line);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop, line);
        if let Some(else_branch) = else_branch {
            self.compile_scoped_block(else_branch, line)?;
        }
        self.patch_jump(end_jump);
        self.end_scope(line);
        Ok(())
    }

    fn compile_for(
        &mut self,
        variable: &str,
        iterable: &Expr,
        where_clause: Option<&Expr>,
        body: &[Stmt],
        line: u32,
    ) -> CompileResult<()> {
        if let ExprKind::Range {
            start,
            end,
            inclusive,
        } = &iterable.kind
        {
            return self.compile_range_for(
                variable,
                start,
                end,
                *inclusive,
                where_clause,
                body,
                line,
            );
        }

        // General path: index over a materialized collection.
        self.begin_scope();
        self.compile_expr(iterable)?;
        self.add_local("$iter", false);
        self.emit_constant(Const::Int(0), line);
        self.add_local("$idx", false);
        self.emit_op(OpCode::Nil, line);
        self.add_local(variable, false);

        let iter_slot = self.func.resolve_local("$iter").unwrap();
        let idx_slot = self.func.resolve_local("$idx").unwrap();
        let var_slot = self.func.resolve_local(variable).unwrap();

        let loop_start = self.current_offset();
        self.begin_loop(loop_start, ContinueTarget::Forward(Vec::new()));

        self.emit_op_u16(OpCode::GetLocal, idx_slot, line);
        self.emit_op_u16(OpCode::GetLocal, iter_slot, line);
        self.emit_string_op(OpCode::GetProperty, "count", line);
        self.emit_op(OpCode::Less, line);
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit_op(OpCode::Pop, line);

        self.emit_op_u16(OpCode::GetLocal, iter_slot, line);
        self.emit_op_u16(OpCode::GetLocal, idx_slot, line);
        self.emit_op(OpCode::GetSubscript, line);
        self.emit_op_u16(OpCode::SetLocal, var_slot, line);
        self.emit_op(OpCode::Pop, line);

        self.compile_loop_body(where_clause, body, line)?;

        self.patch_continue_jumps();
        self.emit_op_u16(OpCode::GetLocal, idx_slot, line);
        self.emit_constant(Const::Int(1), line);
        self.emit_op(OpCode::Add, line);
        self.emit_op_u16(OpCode::SetLocal, idx_slot, line);
        self.emit_op(OpCode::Pop, line);
        self.emit_loop(loop_start, line);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop, line);
        self.end_loop();
        self.end_scope(line);
        Ok(())
    }

    /// `for x in a...b` without materializing a collection.
    #[allow(clippy::too_many_arguments)]
    fn compile_range_for(
        &mut self,
        variable: &str,
        start: &Expr,
        end: &Expr,
        inclusive: bool,
        where_clause: Option<&Expr>,
        body: &[Stmt],
        line: u32,
    ) -> CompileResult<()> {
        self.begin_scope();
        self.compile_expr(start)?;
        self.add_local(variable, false);
        self.compile_expr(end)?;
        self.add_local("$end", false);

        let var_slot = self.func.resolve_local(variable).unwrap();
        let end_slot = self.func.resolve_local("$end").unwrap();

        let loop_start = self.current_offset();
        self.begin_loop(loop_start, ContinueTarget::Forward(Vec::new()));

        self.emit_op_u16(OpCode::GetLocal, var_slot, line);
        self.emit_op_u16(OpCode::GetLocal, end_slot, line);
        self.emit_op(
            if inclusive {
                OpCode::LessEqual
            } else {
                OpCode::Less
            },
            line,
        );
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit_op(OpCode::Pop, line);

        self.compile_loop_body(where_clause, body, line)?;

        self.patch_continue_jumps();
        self.emit_op_u16(OpCode::GetLocal, var_slot, line);
        self.emit_constant(Const::Int(1), line);
        self.emit_op(OpCode::Add, line);
        self.emit_op_u16(OpCode::SetLocal, var_slot, line);
        self.emit_op(OpCode::Pop, line);
        self.emit_loop(loop_start, line);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop, line);
        self.end_loop();
        self.end_scope(line);
        Ok(())
    }

    /// Loop body with an optional `where` filter; a failing filter falls
    /// through to the increment.
    fn compile_loop_body(
        &mut self,
        where_clause: Option<&Expr>,
        body: &[Stmt],
        line: u32,
    ) -> CompileResult<()> {
        match where_clause {
            Some(filter) => {
                self.compile_expr(filter)?;
                let skip_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                self.compile_scoped_block(body, line)?;
                let over_pop = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(skip_jump);
                self.emit_op(OpCode::Pop, line);
                self.patch_jump(over_pop);
            }
            None => self.compile_scoped_block(body, line)?,
        }
        Ok(())
    }

    /// Patch forward `continue` jumps to land at the current offset (the
    /// loop's increment/condition step).
    pub(crate) fn patch_continue_jumps(&mut self) {
        if let Some(ctx) = &mut self.func.loop_context {
            if let ContinueTarget::Forward(patches) = &mut ctx.continue_target {
                let patches = std::mem::take(patches);
                for patch in patches {
                    self.func.body.patch_jump(patch);
                }
            }
        }
    }

    fn compile_function_stmt(&mut self, decl: &FuncDecl, line: u32) -> CompileResult<()> {
        if !decl.generic_params.is_empty() {
            self.register_generic_function(decl);
            return Ok(());
        }

        let proto_idx = self.compile_function_parts(
            decl.name.clone(),
            &decl.params,
            &decl.body,
            FunctionType::Function,
            line,
        )?;
        self.emit_closure(proto_idx, line);

        if self.func.scope_depth > 0 {
            self.declare_variable(&decl.name, false, None, line)?;
        } else {
            self.emit_string_op(OpCode::DefineGlobal, &decl.name, line);
        }
        Ok(())
    }

    /// Resolve and compile an imported module in place, deduplicating by
    /// resolved path and reporting import cycles.
    fn compile_import(&mut self, name: &str, line: u32) -> CompileResult<()> {
        let Some(resolver) = &self.resolver else {
            return Err(CompileError::new(
                format!("Cannot import '{}': no module resolver configured", name),
                line,
            ));
        };
        let path = resolver
            .resolve(name)
            .map_err(|e| CompileError::new(format!("Cannot import '{}': {}", name, e), line))?;
        let path: PathBuf = std::fs::canonicalize(&path).unwrap_or(path);

        if self.imports_done.contains(&path) {
            return Ok(());
        }
        if self.imports_in_progress.contains(&path) {
            return Err(CompileError::new(
                format!("Import cycle detected at '{}'", name),
                line,
            ));
        }

        let source = std::fs::read_to_string(&path).map_err(|e| {
            CompileError::new(format!("Cannot read module '{}': {}", path.display(), e), line)
        })?;
        let tokens = crate::lexer::Scanner::new(&source).scan_tokens();
        let program = crate::parser::Parser::new(tokens)
            .parse()
            .map_err(|e| CompileError::new(format!("In module '{}': {}", name, e), line))?;

        self.imports_in_progress.push(path.clone());
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        self.imports_in_progress.pop();
        self.imports_done.insert(path);
        Ok(())
    }
}
