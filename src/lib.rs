//! SwiftScript: a Swift-inspired scripting language.
//!
//! The core pipeline is source → lexer → parser → (optional type checker)
//! → compiler → assembly → VM. Assemblies serialize to `.ssasm` files and
//! load back for execution; a debug controller can be attached to the VM
//! for breakpoints and stepping.

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod debug;
pub mod error;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod project;
pub mod span;
pub mod types;
pub mod vm;

use std::path::Path;

use error::{ParseError, SwiftScriptError};

/// Compilation options for the pipeline entry points.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Run the type checker before compiling.
    pub type_check: bool,
    /// Emit per-body debug info (Debug configuration).
    pub emit_debug: bool,
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, SwiftScriptError> {
    let tokens = lexer::Scanner::new(source).scan_tokens();
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Diagnostics mode: parse collecting every error instead of stopping at
/// the first.
pub fn parse_all(source: &str) -> (ast::Program, Vec<ParseError>) {
    let tokens = lexer::Scanner::new(source).scan_tokens();
    parser::Parser::new(tokens).parse_all()
}

/// Type check a program without executing.
pub fn type_check(source: &str) -> Result<(), SwiftScriptError> {
    let program = parse(source)?;
    let mut checker = types::TypeChecker::new();
    checker.check(&program)?;
    Ok(())
}

/// Compile source code to an assembly.
pub fn compile_source(
    source: &str,
    source_path: Option<&Path>,
    options: &BuildOptions,
) -> Result<bytecode::Assembly, SwiftScriptError> {
    let program = parse(source)?;

    if options.type_check {
        let mut checker = types::TypeChecker::new();
        checker.check(&program)?;
    }

    let compiler_options = compiler::CompilerOptions {
        emit_debug: options.emit_debug,
        source_file: source_path.map(|p| {
            std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
        }),
    };
    let mut compiler = compiler::Compiler::with_options(compiler_options);
    if let Some(dir) = source_path.and_then(|p| p.parent()) {
        compiler.set_resolver(Box::new(module::FileModuleResolver::for_directory(dir)));
    }
    let assembly = compiler.compile(&program)?;
    Ok(assembly)
}

/// Compile and run source code, returning the script's result value.
pub fn run_source(source: &str, options: &BuildOptions) -> Result<vm::Value, SwiftScriptError> {
    let assembly = compile_source(source, None, options)?;
    let mut vm = vm::Vm::new();
    Ok(vm.interpret(assembly)?)
}

/// Compile a project: resolve the descriptor, compile the entry source
/// with its import roots, and return the assembly.
pub fn build_project(
    project: &project::Project,
    options: &BuildOptions,
) -> Result<bytecode::Assembly, SwiftScriptError> {
    let source = std::fs::read_to_string(&project.entry_file)?;
    let program = parse(&source)?;

    if options.type_check {
        let mut checker = types::TypeChecker::new();
        checker.check(&program)?;
    }

    let compiler_options = compiler::CompilerOptions {
        emit_debug: options.emit_debug,
        source_file: Some(project.entry_file.clone()),
    };
    let mut compiler = compiler::Compiler::with_options(compiler_options);
    compiler.set_resolver(Box::new(module::FileModuleResolver::new(
        project.import_roots.clone(),
    )));
    Ok(compiler.compile(&program)?)
}

/// Execute a compiled assembly on a fresh VM.
pub fn run_assembly(assembly: bytecode::Assembly) -> Result<vm::Value, SwiftScriptError> {
    let mut vm = vm::Vm::new();
    Ok(vm.interpret(assembly)?)
}

/// Disassemble a compiled assembly to a string.
pub fn disassemble(assembly: &bytecode::Assembly) -> String {
    bytecode::disassemble(assembly)
}
