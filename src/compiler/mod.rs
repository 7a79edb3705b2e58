//! AST-to-bytecode compiler.
//!
//! Single-pass compilation: walks the AST once, emitting instructions into
//! method bodies inside an `Assembly`. Variable resolution happens at
//! compile time: locals become stack slot indices, captured variables
//! become upvalue descriptors.

pub mod classes;
pub mod exprs;
pub mod generics;
pub mod patterns;
pub mod stmts;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::ast::stmt::Program;
use crate::bytecode::assembly::{
    Assembly, Const, DebugInfo, FunctionProto, LocalDebug, MethodBody, UpvalueDesc,
};
use crate::bytecode::opcode::OpCode;
use crate::error::CompileError;
use crate::module::ModuleResolver;

use generics::GenericTemplate;

pub type CompileResult<T> = Result<T, CompileError>;

/// Compiler options.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Emit per-body debug info (source file, function name, local table).
    pub emit_debug: bool,
    /// Normalized path of the entry source, recorded in debug info.
    pub source_file: Option<PathBuf>,
}

/// A local variable tracked during compilation.
#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub depth: i32,
    pub is_captured: bool,
    pub is_let: bool,
    pub type_name: Option<String>,
}

/// What kind of function is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
    /// Property getter/setter, observer, or default-value thunk.
    Accessor,
    Lambda,
}

/// Where `continue` lands in the current loop.
#[derive(Debug, Clone)]
pub enum ContinueTarget {
    /// Loop back to a known offset (while / repeat-while).
    Backward(usize),
    /// Forward jumps patched at the increment step (for-in).
    Forward(Vec<usize>),
}

/// Loop bookkeeping for break/continue.
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub start: usize,
    pub break_patches: Vec<usize>,
    pub continue_target: ContinueTarget,
    /// Number of locals live when the loop body began; break/continue pop
    /// everything above this.
    pub local_floor: usize,
    pub enclosing: Option<Box<LoopContext>>,
}

/// Type body being compiled, for implicit-self resolution and `super`.
#[derive(Debug, Clone)]
pub struct TypeContext {
    pub name: String,
    pub is_struct: bool,
    pub has_superclass: bool,
    /// Member names resolvable without an explicit `self.`.
    pub members: HashSet<String>,
}

/// Per-function compilation state. Nested functions push a fresh context
/// and keep the outer one in `enclosing` for upvalue resolution.
pub struct FunctionContext {
    pub proto: FunctionProto,
    pub body: MethodBody,
    pub locals: Vec<Local>,
    pub scope_depth: i32,
    pub upvalues: Vec<UpvalueDesc>,
    pub function_type: FunctionType,
    pub loop_context: Option<LoopContext>,
    pub enclosing: Option<Box<FunctionContext>>,
    pub debug_locals: Vec<LocalDebug>,
}

impl FunctionContext {
    pub fn new(function_type: FunctionType, name: String) -> Self {
        let mut ctx = Self {
            proto: FunctionProto::new(name, 0),
            body: MethodBody::new(),
            locals: Vec::new(),
            scope_depth: 0,
            upvalues: Vec::new(),
            function_type,
            loop_context: None,
            enclosing: None,
            debug_locals: Vec::new(),
        };
        // Slot 0 holds the callee; in methods it is `self`.
        let slot_name = match function_type {
            FunctionType::Method | FunctionType::Initializer | FunctionType::Accessor => {
                "self".to_string()
            }
            _ => String::new(),
        };
        ctx.locals.push(Local {
            name: slot_name,
            depth: 0,
            is_captured: false,
            is_let: false,
            type_name: None,
        });
        ctx
    }

    pub fn resolve_local(&self, name: &str) -> Option<u16> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name && local.depth >= 0 {
                return Some(i as u16);
            }
        }
        None
    }

    /// Resolve a name captured from an enclosing function, recording the
    /// upvalue chain through every transiting function.
    pub fn resolve_upvalue(&mut self, name: &str) -> Option<u16> {
        let enclosing = self.enclosing.as_mut()?;
        if let Some(local_idx) = enclosing.resolve_local(name) {
            enclosing.locals[local_idx as usize].is_captured = true;
            return Some(self.add_upvalue(local_idx, true));
        }
        if let Some(upvalue_idx) = enclosing.resolve_upvalue(name) {
            return Some(self.add_upvalue(upvalue_idx, false));
        }
        None
    }

    fn add_upvalue(&mut self, index: u16, is_local: bool) -> u16 {
        for (i, upvalue) in self.upvalues.iter().enumerate() {
            if upvalue.index == index && upvalue.is_local == is_local {
                return i as u16;
            }
        }
        let idx = self.upvalues.len() as u16;
        self.upvalues.push(UpvalueDesc { index, is_local });
        idx
    }
}

/// How a variable is accessed at runtime.
#[derive(Debug, Clone)]
pub enum VariableAccess {
    Local(u16),
    Upvalue(u16),
    /// A bare member name inside a type body: `width = size` in an init.
    ImplicitSelf(String),
    Global(String),
}

/// Compile-time record of a class for override checks and member lookup.
#[derive(Debug, Clone, Default)]
pub struct ClassMeta {
    pub superclass: Option<String>,
    /// Method names, excluding initializers.
    pub methods: HashSet<String>,
    /// Every member name (methods and properties), for implicit-self
    /// resolution in extensions.
    pub members: HashSet<String>,
    pub conformances: HashSet<String>,
}

/// The compiler: transforms a program into an `Assembly`.
pub struct Compiler {
    pub assembly: Assembly,
    pub(crate) func: FunctionContext,
    pub(crate) type_context: Option<TypeContext>,
    pub(crate) options: CompilerOptions,

    // Global registries for name classification.
    pub(crate) class_meta: HashMap<String, ClassMeta>,
    pub(crate) struct_meta: HashMap<String, ClassMeta>,
    pub(crate) enum_names: HashSet<String>,
    pub(crate) protocol_names: HashSet<String>,
    pub(crate) global_lets: HashSet<String>,

    // Generic monomorphization state.
    pub(crate) generic_templates: HashMap<String, GenericTemplate>,
    pub(crate) specializations: HashSet<String>,

    // Module imports.
    pub(crate) resolver: Option<Box<dyn ModuleResolver>>,
    pub(crate) imports_done: HashSet<PathBuf>,
    pub(crate) imports_in_progress: Vec<PathBuf>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            assembly: Assembly::new(),
            func: FunctionContext::new(FunctionType::Script, String::new()),
            type_context: None,
            options,
            class_meta: HashMap::new(),
            struct_meta: HashMap::new(),
            enum_names: HashSet::new(),
            protocol_names: HashSet::new(),
            global_lets: HashSet::new(),
            generic_templates: HashMap::new(),
            specializations: HashSet::new(),
            resolver: None,
            imports_done: HashSet::new(),
            imports_in_progress: Vec::new(),
        }
    }

    /// Inject the module resolver consulted for `import` statements.
    pub fn set_resolver(&mut self, resolver: Box<dyn ModuleResolver>) {
        self.resolver = Some(resolver);
    }

    /// Compile a full program into an assembly.
    pub fn compile(mut self, program: &Program) -> CompileResult<Assembly> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        self.emit_op(OpCode::Nil, 0);
        self.emit_op(OpCode::Return, 0);

        let ctx = std::mem::replace(&mut self.func, FunctionContext::new(FunctionType::Script, String::new()));
        let main = self.finish_context(ctx, 0)?;
        self.assembly.main = main;
        Ok(self.assembly)
    }

    // --- Emission helpers ---

    pub(crate) fn emit_op(&mut self, op: OpCode, line: u32) {
        self.func.body.write_op(op, line);
    }

    pub(crate) fn emit_byte(&mut self, byte: u8, line: u32) {
        self.func.body.write_byte(byte, line);
    }

    pub(crate) fn emit_u16(&mut self, value: u16, line: u32) {
        self.func.body.write_u16(value, line);
    }

    pub(crate) fn emit_op_u16(&mut self, op: OpCode, operand: u16, line: u32) {
        self.emit_op(op, line);
        self.emit_u16(operand, line);
    }

    pub(crate) fn emit_constant(&mut self, constant: Const, line: u32) {
        let idx = self.assembly.add_constant(constant);
        self.emit_op_u16(OpCode::Constant, idx, line);
    }

    pub(crate) fn emit_string_op(&mut self, op: OpCode, s: &str, line: u32) {
        let idx = self.assembly.add_string(s);
        self.emit_op_u16(op, idx, line);
    }

    pub(crate) fn emit_jump(&mut self, op: OpCode, line: u32) -> usize {
        self.func.body.emit_jump(op, line)
    }

    pub(crate) fn patch_jump(&mut self, operand_offset: usize) {
        self.func.body.patch_jump(operand_offset);
    }

    pub(crate) fn current_offset(&self) -> usize {
        self.func.body.current_offset()
    }

    /// Emit a backward `Loop` to `loop_start`.
    pub(crate) fn emit_loop(&mut self, loop_start: usize, line: u32) {
        self.emit_op(OpCode::Loop, line);
        // Distance counts from just after the 2-byte operand.
        let distance = self.current_offset() + 2 - loop_start;
        debug_assert!(distance < u16::MAX as usize, "loop body too large");
        self.emit_u16(distance as u16, line);
    }

    // --- Scope management ---

    pub(crate) fn begin_scope(&mut self) {
        self.func.scope_depth += 1;
    }

    pub(crate) fn end_scope(&mut self, line: u32) {
        self.func.scope_depth -= 1;
        while let Some(local) = self.func.locals.last() {
            if local.depth <= self.func.scope_depth {
                break;
            }
            if local.is_captured {
                self.emit_op(OpCode::CloseUpvalue, line);
            } else {
                self.emit_op(OpCode::Pop, line);
            }
            self.remove_local();
        }
    }

    pub(crate) fn add_local(&mut self, name: impl Into<String>, is_let: bool) {
        self.add_typed_local(name, is_let, None);
    }

    pub(crate) fn add_typed_local(
        &mut self,
        name: impl Into<String>,
        is_let: bool,
        type_name: Option<String>,
    ) {
        let name = name.into();
        if self.options.emit_debug && !name.is_empty() && !name.starts_with('$') {
            self.func.debug_locals.push(LocalDebug {
                name: name.clone(),
                slot: self.func.locals.len() as u16,
                scope_start: self.func.body.current_offset() as u32,
                scope_end: u32::MAX,
                type_name: type_name.clone(),
            });
        }
        self.func.locals.push(Local {
            name,
            depth: self.func.scope_depth,
            is_captured: false,
            is_let,
            type_name,
        });
    }

    fn remove_local(&mut self) {
        if let Some(local) = self.func.locals.pop() {
            if self.options.emit_debug {
                let slot = self.func.locals.len() as u16;
                let end = self.func.body.current_offset() as u32;
                if let Some(entry) = self
                    .func
                    .debug_locals
                    .iter_mut()
                    .rev()
                    .find(|l| l.slot == slot && l.name == local.name && l.scope_end == u32::MAX)
                {
                    entry.scope_end = end;
                }
            }
        }
    }

    pub(crate) fn declare_variable(
        &mut self,
        name: &str,
        is_let: bool,
        type_name: Option<String>,
        line: u32,
    ) -> CompileResult<()> {
        debug_assert!(self.func.scope_depth > 0);
        for local in self.func.locals.iter().rev() {
            if local.depth >= 0 && local.depth < self.func.scope_depth {
                break;
            }
            if local.name == name {
                return Err(CompileError::new(
                    format!("Variable '{}' already declared in this scope", name),
                    line,
                ));
            }
        }
        self.add_typed_local(name, is_let, type_name);
        Ok(())
    }

    /// Resolve a name to local slot, upvalue, implicit self member, or
    /// global.
    pub(crate) fn resolve_variable(&mut self, name: &str) -> VariableAccess {
        if let Some(slot) = self.func.resolve_local(name) {
            return VariableAccess::Local(slot);
        }
        if let Some(idx) = self.func.resolve_upvalue(name) {
            return VariableAccess::Upvalue(idx);
        }
        if let Some(ctx) = &self.type_context {
            if self.in_method_context() && ctx.members.contains(name) {
                return VariableAccess::ImplicitSelf(name.to_string());
            }
        }
        VariableAccess::Global(name.to_string())
    }

    fn in_method_context(&self) -> bool {
        // Slot 0 of this function, or of an enclosing one, is `self`.
        let mut ctx = Some(&self.func);
        while let Some(c) = ctx {
            if matches!(
                c.function_type,
                FunctionType::Method | FunctionType::Initializer | FunctionType::Accessor
            ) {
                return true;
            }
            ctx = c.enclosing.as_deref();
        }
        false
    }

    // --- Function nesting ---

    /// Begin compiling a nested function; the current context becomes its
    /// parent until `end_function`.
    pub(crate) fn begin_function(&mut self, function_type: FunctionType, name: String) {
        let fresh = FunctionContext::new(function_type, name);
        let parent = std::mem::replace(&mut self.func, fresh);
        self.func.enclosing = Some(Box::new(parent));
    }

    /// Finish the nested function, returning its prototype index.
    pub(crate) fn end_function(&mut self, line: u32) -> CompileResult<u16> {
        self.emit_op(OpCode::Nil, line);
        self.emit_op(OpCode::Return, line);

        let parent = self
            .func
            .enclosing
            .take()
            .expect("end_function without begin_function");
        let finished = std::mem::replace(&mut self.func, *parent);
        self.finish_context(finished, line)
    }

    /// Install a finished function context into the assembly.
    fn finish_context(&mut self, mut ctx: FunctionContext, _line: u32) -> CompileResult<u16> {
        if self.options.emit_debug {
            let source_file = self
                .options
                .source_file
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            for local in &mut ctx.debug_locals {
                if local.scope_end == u32::MAX {
                    local.scope_end = ctx.body.current_offset() as u32;
                }
            }
            ctx.body.debug = Some(DebugInfo {
                source_file,
                function_name: if ctx.proto.name.is_empty() {
                    "<script>".to_string()
                } else {
                    ctx.proto.name.clone()
                },
                locals: ctx.debug_locals,
            });
        }

        let body_idx = self.assembly.add_body(ctx.body);
        let mut proto = ctx.proto;
        proto.body = body_idx;
        proto.upvalues = ctx.upvalues;
        Ok(self.assembly.add_proto(proto))
    }

    // --- Loop bookkeeping ---

    pub(crate) fn begin_loop(&mut self, start: usize, continue_target: ContinueTarget) {
        let enclosing = self.func.loop_context.take().map(Box::new);
        self.func.loop_context = Some(LoopContext {
            start,
            break_patches: Vec::new(),
            continue_target,
            local_floor: self.func.locals.len(),
            enclosing,
        });
    }

    /// Close the loop: patch break jumps and any forward continue jumps
    /// (already patched by the caller at the increment point).
    pub(crate) fn end_loop(&mut self) {
        if let Some(ctx) = self.func.loop_context.take() {
            for patch in &ctx.break_patches {
                self.func.body.patch_jump(*patch);
            }
            self.func.loop_context = ctx.enclosing.map(|b| *b);
        }
    }

    /// Pop the locals a break/continue would abandon, without touching the
    /// compile-time list.
    pub(crate) fn emit_loop_unwind(&mut self, line: u32) {
        if let Some(ctx) = &self.func.loop_context {
            let floor = ctx.local_floor;
            let count = self.func.locals.len().saturating_sub(floor);
            for _ in 0..count {
                self.emit_op(OpCode::Pop, line);
            }
        }
    }

    // --- Registry helpers ---

    pub(crate) fn is_struct_type(&self, name: &str) -> bool {
        self.struct_meta.contains_key(name)
    }

    /// Walk the compile-time class chain looking for a method.
    pub(crate) fn ancestor_has_method(&self, class: &str, method: &str) -> bool {
        let mut current = self
            .class_meta
            .get(class)
            .and_then(|meta| meta.superclass.clone());
        while let Some(name) = current {
            if let Some(meta) = self.class_meta.get(&name) {
                if meta.methods.contains(method) {
                    return true;
                }
                current = meta.superclass.clone();
            } else {
                break;
            }
        }
        false
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
