//! Switch statement compilation.
//!
//! A switch lowers to a chain of typed tests in textual order; the first
//! arm whose pattern matches (and whose `where` guard passes) runs, then
//! control jumps past the whole statement.

use crate::ast::*;
use crate::bytecode::opcode::OpCode;
use crate::compiler::{CompileResult, Compiler};

impl Compiler {
    pub(crate) fn compile_switch(
        &mut self,
        subject: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
        line: u32,
    ) -> CompileResult<()> {
        self.begin_scope();
        self.compile_expr(subject)?;
        self.add_local("$subject", true);
        let subject_slot = (self.func.locals.len() - 1) as u16;

        let mut end_jumps = Vec::new();

        for case in cases {
            let case_line = case.span.line;

            // OR over the arm's patterns: any match proceeds to the body.
            let mut matched_jumps = Vec::new();
            for pattern in &case.patterns {
                self.compile_pattern_test(pattern, subject_slot, case_line)?;
                let fail = self.emit_jump(OpCode::JumpIfFalse, case_line);
                self.emit_op(OpCode::Pop, case_line);
                matched_jumps.push(self.emit_jump(OpCode::Jump, case_line));
                self.patch_jump(fail);
                self.emit_op(OpCode::Pop, case_line);
            }
            let next_case = self.emit_jump(OpCode::Jump, case_line);

            for jump in matched_jumps {
                self.patch_jump(jump);
            }

            // Bindings come from the first pattern; multi-pattern arms with
            // bindings are not meaningful and bind from the first.
            let bindings = match &case.patterns[0] {
                Pattern::EnumCase { bindings, .. } => bindings.clone(),
                _ => Vec::new(),
            };

            self.begin_scope();
            for (i, binding) in bindings.iter().enumerate() {
                self.emit_op_u16(OpCode::GetLocal, subject_slot, case_line);
                self.emit_op_u16(OpCode::GetAssociated, i as u16, case_line);
                self.declare_variable(binding, true, None, case_line)?;
            }

            let guard_fail = match &case.guard {
                Some(guard) => {
                    self.compile_expr(guard)?;
                    let fail = self.emit_jump(OpCode::JumpIfFalse, case_line);
                    self.emit_op(OpCode::Pop, case_line);
                    Some(fail)
                }
                None => None,
            };

            for stmt in &case.body {
                self.compile_stmt(stmt)?;
            }
            let binding_count = bindings.len();
            self.end_scope(case_line);
            end_jumps.push(self.emit_jump(OpCode::Jump, case_line));

            // A failed guard pops its bool and the bindings before trying
            // the next case.
            if let Some(fail) = guard_fail {
                self.patch_jump(fail);
                self.emit_op(OpCode::Pop, case_line);
                for _ in 0..binding_count {
                    self.emit_op(OpCode::Pop, case_line);
                }
            }
            self.patch_jump(next_case);
        }

        if let Some(default_body) = default {
            self.compile_scoped_block(default_body, line)?;
        }

        for jump in end_jumps {
            self.patch_jump(jump);
        }
        self.end_scope(line);
        Ok(())
    }

    /// Emit a test leaving a Bool on the stack.
    fn compile_pattern_test(
        &mut self,
        pattern: &Pattern,
        subject_slot: u16,
        line: u32,
    ) -> CompileResult<()> {
        match pattern {
            Pattern::Literal(expr) => {
                self.emit_op_u16(OpCode::GetLocal, subject_slot, line);
                self.compile_expr(expr)?;
                self.emit_op(OpCode::Equal, line);
            }
            Pattern::Range {
                start,
                end,
                inclusive,
            } => {
                // subject >= start && subject <= end (or < for half-open).
                self.emit_op_u16(OpCode::GetLocal, subject_slot, line);
                self.compile_expr(start)?;
                self.emit_op(OpCode::GreaterEqual, line);
                let short = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                self.emit_op_u16(OpCode::GetLocal, subject_slot, line);
                self.compile_expr(end)?;
                self.emit_op(
                    if *inclusive {
                        OpCode::LessEqual
                    } else {
                        OpCode::Less
                    },
                    line,
                );
                self.patch_jump(short);
            }
            Pattern::EnumCase {
                enum_name,
                case_name,
                ..
            } => {
                let qualified = match enum_name {
                    Some(enum_name) => format!("{}.{}", enum_name, case_name),
                    None => case_name.clone(),
                };
                self.emit_op_u16(OpCode::GetLocal, subject_slot, line);
                self.emit_string_op(OpCode::MatchEnumCase, &qualified, line);
            }
        }
        Ok(())
    }
}
