//! Generic monomorphization.
//!
//! Generic declarations are held as AST templates. A reference with
//! concrete type arguments specializes the template under a mangled name
//! (`Pair<Int, String>` becomes `Pair_Int_String`); each specialization is
//! compiled at most once per assembly. Constraints (`<T: Proto>`) are
//! checked against declared conformances at specialization time.

use std::collections::HashMap;

use crate::ast::*;
use crate::bytecode::opcode::OpCode;
use crate::compiler::{CompileResult, Compiler, FunctionType};
use crate::error::CompileError;

/// A generic declaration awaiting specialization.
#[derive(Debug, Clone)]
pub enum GenericTemplate {
    Class(ClassDecl),
    Struct(StructDecl),
    Func(FuncDecl),
}

/// Flatten a canonical type name (`Pair<Box<Int>,String>`) to a mangled
/// identifier (`Pair_Box_Int_String`).
pub fn mangle_type_name(canonical: &str) -> String {
    let mut out = String::with_capacity(canonical.len());
    let mut last_was_sep = false;
    for c in canonical.chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Split the top-level arguments of `Outer<A, B<C>, D>` into
/// `["A", "B<C>", "D"]` with a balanced-angle-bracket walk.
pub fn split_generic_args(canonical: &str) -> Option<(String, Vec<String>)> {
    let open = canonical.find('<')?;
    let base = canonical[..open].to_string();
    let inner = canonical[open + 1..].strip_suffix('>')?;

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '<' => {
                depth += 1;
                current.push(c);
            }
            '>' => {
                depth = depth.checked_sub(1)?;
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(current.trim().to_string());
    Some((base, args))
}

impl Compiler {
    pub(crate) fn register_generic_class(&mut self, decl: &ClassDecl) {
        self.generic_templates
            .insert(decl.name.clone(), GenericTemplate::Class(decl.clone()));
    }

    pub(crate) fn register_generic_struct(&mut self, decl: &StructDecl) {
        self.generic_templates
            .insert(decl.name.clone(), GenericTemplate::Struct(decl.clone()));
    }

    pub(crate) fn register_generic_function(&mut self, decl: &FuncDecl) {
        self.generic_templates
            .insert(decl.name.clone(), GenericTemplate::Func(decl.clone()));
    }

    /// Make sure `base<args>` has a compiled specialization; returns the
    /// mangled global name.
    pub(crate) fn ensure_specialized(
        &mut self,
        base: &str,
        type_args: &[TypeAnnotation],
        line: u32,
    ) -> CompileResult<String> {
        let arg_names: Vec<String> = type_args.iter().map(|t| t.canonical_name()).collect();
        let canonical = format!("{}<{}>", base, arg_names.join(","));
        let mangled = mangle_type_name(&canonical);

        if self.specializations.contains(&mangled) {
            return Ok(mangled);
        }

        let Some(template) = self.generic_templates.get(base).cloned() else {
            return Err(CompileError::new(
                format!("'{}' is not a generic type or function", base),
                line,
            ));
        };

        let generic_params = match &template {
            GenericTemplate::Class(decl) => &decl.generic_params,
            GenericTemplate::Struct(decl) => &decl.generic_params,
            GenericTemplate::Func(decl) => &decl.generic_params,
        };
        if generic_params.len() != arg_names.len() {
            return Err(CompileError::new(
                format!(
                    "'{}' expects {} type arguments, got {}",
                    base,
                    generic_params.len(),
                    arg_names.len()
                ),
                line,
            ));
        }

        // Constraint check: the concrete type must declare conformance.
        for (param, concrete) in generic_params.iter().zip(&arg_names) {
            if let Some(constraint) = &param.constraint {
                self.check_conformance(concrete, constraint, line)?;
            }
        }

        // Nested generic arguments specialize first, so the substituted
        // body can refer to them by mangled name.
        let mut substitution: HashMap<String, String> = HashMap::new();
        for (param, concrete) in generic_params.iter().zip(&arg_names) {
            let resolved = if let Some((nested_base, nested_args)) = split_generic_args(concrete)
            {
                let annotations: Vec<TypeAnnotation> = nested_args
                    .iter()
                    .map(|a| TypeAnnotation::named(a.clone(), Default::default()))
                    .collect();
                self.ensure_specialized(&nested_base, &annotations, line)?
            } else {
                concrete.clone()
            };
            substitution.insert(param.name.clone(), resolved);
        }

        self.specializations.insert(mangled.clone());

        match template {
            GenericTemplate::Class(mut decl) => {
                decl.name = mangled.clone();
                decl.generic_params.clear();
                substitute_class(&mut decl, &substitution);
                self.compile_class_decl(&decl)?;
            }
            GenericTemplate::Struct(mut decl) => {
                decl.name = mangled.clone();
                decl.generic_params.clear();
                substitute_struct(&mut decl, &substitution);
                self.compile_struct_decl(&decl)?;
            }
            GenericTemplate::Func(mut decl) => {
                decl.name = mangled.clone();
                decl.generic_params.clear();
                substitute_func(&mut decl, &substitution);
                // Specializations are always globals, even when the first
                // reference sits inside a nested scope.
                let proto_idx = self.compile_function_parts(
                    decl.name.clone(),
                    &decl.params,
                    &decl.body,
                    FunctionType::Function,
                    line,
                )?;
                self.emit_closure(proto_idx, line);
                self.emit_string_op(OpCode::DefineGlobal, &decl.name, line);
            }
        }

        Ok(mangled)
    }

    /// Check that a concrete type declares conformance to a protocol.
    fn check_conformance(
        &self,
        concrete: &str,
        protocol: &str,
        line: u32,
    ) -> CompileResult<()> {
        let base = concrete.split('<').next().unwrap_or(concrete);
        let conforms = self
            .class_meta
            .get(base)
            .map(|m| m.conformances.contains(protocol))
            .or_else(|| {
                self.struct_meta
                    .get(base)
                    .map(|m| m.conformances.contains(protocol))
            })
            .unwrap_or(false);
        if conforms {
            Ok(())
        } else {
            Err(CompileError::new(
                format!("Type '{}' does not conform to '{}'", concrete, protocol),
                line,
            ))
        }
    }
}

// --- AST substitution ---

fn substitute_name(name: &mut String, map: &HashMap<String, String>) {
    if let Some(replacement) = map.get(name.as_str()) {
        *name = replacement.clone();
    }
}

fn substitute_type(ty: &mut TypeAnnotation, map: &HashMap<String, String>) {
    match &mut ty.kind {
        TypeKind::Named(name) => substitute_name(name, map),
        TypeKind::Generic { base, args } => {
            substitute_name(base, map);
            for arg in args {
                substitute_type(arg, map);
            }
        }
        TypeKind::Optional(inner) | TypeKind::Array(inner) => substitute_type(inner, map),
        TypeKind::Dictionary { key, value } => {
            substitute_type(key, map);
            substitute_type(value, map);
        }
        TypeKind::Function {
            params,
            return_type,
        } => {
            for param in params {
                substitute_type(param, map);
            }
            substitute_type(return_type, map);
        }
        TypeKind::Tuple(elements) => {
            for (_, element) in elements {
                substitute_type(element, map);
            }
        }
    }
}

fn substitute_param(param: &mut Parameter, map: &HashMap<String, String>) {
    if let Some(ty) = &mut param.type_annotation {
        substitute_type(ty, map);
    }
    if let Some(default) = &mut param.default_value {
        substitute_expr(default, map);
    }
}

fn substitute_func(decl: &mut FuncDecl, map: &HashMap<String, String>) {
    for param in &mut decl.params {
        substitute_param(param, map);
    }
    if let Some(ret) = &mut decl.return_type {
        substitute_type(ret, map);
    }
    for stmt in &mut decl.body {
        substitute_stmt(stmt, map);
    }
}

fn substitute_var(decl: &mut VarDecl, map: &HashMap<String, String>) {
    if let Some(ty) = &mut decl.type_annotation {
        substitute_type(ty, map);
    }
    if let Some(init) = &mut decl.initializer {
        substitute_expr(init, map);
    }
    if let Some(accessors) = &mut decl.accessors {
        for stmt in &mut accessors.getter {
            substitute_stmt(stmt, map);
        }
        if let Some((_, body)) = &mut accessors.setter {
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
    }
    if let Some(observers) = &mut decl.observers {
        if let Some((_, body)) = &mut observers.will_set {
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
        if let Some((_, body)) = &mut observers.did_set {
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
    }
}

fn substitute_class(decl: &mut ClassDecl, map: &HashMap<String, String>) {
    for property in &mut decl.properties {
        substitute_var(property, map);
    }
    for method in &mut decl.methods {
        substitute_func(method, map);
    }
    for initializer in &mut decl.initializers {
        substitute_func(initializer, map);
    }
    if let Some(body) = &mut decl.deinit_body {
        for stmt in body {
            substitute_stmt(stmt, map);
        }
    }
}

fn substitute_struct(decl: &mut StructDecl, map: &HashMap<String, String>) {
    for property in &mut decl.properties {
        substitute_var(property, map);
    }
    for method in &mut decl.methods {
        substitute_func(method, map);
    }
    for initializer in &mut decl.initializers {
        substitute_func(initializer, map);
    }
}

fn substitute_stmt(stmt: &mut Stmt, map: &HashMap<String, String>) {
    match &mut stmt.kind {
        StmtKind::Expression(expr) | StmtKind::Throw(expr) => substitute_expr(expr, map),
        StmtKind::Var(decl) => substitute_var(decl, map),
        StmtKind::TupleDestructure { value, .. } => substitute_expr(value, map),
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                substitute_stmt(stmt, map);
            }
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            substitute_expr(condition, map);
            for stmt in then_branch {
                substitute_stmt(stmt, map);
            }
            if let Some(else_branch) = else_branch {
                for stmt in else_branch {
                    substitute_stmt(stmt, map);
                }
            }
        }
        StmtKind::IfLet {
            value,
            then_branch,
            else_branch,
            ..
        } => {
            substitute_expr(value, map);
            for stmt in then_branch {
                substitute_stmt(stmt, map);
            }
            if let Some(else_branch) = else_branch {
                for stmt in else_branch {
                    substitute_stmt(stmt, map);
                }
            }
        }
        StmtKind::Guard { condition, body } => {
            substitute_expr(condition, map);
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
        StmtKind::GuardLet { value, body, .. } => {
            substitute_expr(value, map);
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
        StmtKind::While { condition, body } => {
            substitute_expr(condition, map);
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
        StmtKind::RepeatWhile { body, condition } => {
            for stmt in body {
                substitute_stmt(stmt, map);
            }
            substitute_expr(condition, map);
        }
        StmtKind::For {
            iterable,
            where_clause,
            body,
            ..
        } => {
            substitute_expr(iterable, map);
            if let Some(filter) = where_clause {
                substitute_expr(filter, map);
            }
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
        StmtKind::Switch {
            subject,
            cases,
            default,
        } => {
            substitute_expr(subject, map);
            for case in cases {
                for pattern in &mut case.patterns {
                    match pattern {
                        Pattern::Literal(expr) => substitute_expr(expr, map),
                        Pattern::Range { start, end, .. } => {
                            substitute_expr(start, map);
                            substitute_expr(end, map);
                        }
                        Pattern::EnumCase { enum_name, .. } => {
                            if let Some(name) = enum_name {
                                substitute_name(name, map);
                            }
                        }
                    }
                }
                if let Some(guard) = &mut case.guard {
                    substitute_expr(guard, map);
                }
                for stmt in &mut case.body {
                    substitute_stmt(stmt, map);
                }
            }
            if let Some(default) = default {
                for stmt in default {
                    substitute_stmt(stmt, map);
                }
            }
        }
        StmtKind::Return(Some(expr)) => substitute_expr(expr, map),
        StmtKind::Print(values) => {
            for value in values {
                substitute_expr(value, map);
            }
        }
        StmtKind::Function(decl) => substitute_func(decl, map),
        StmtKind::Class(decl) => substitute_class(decl, map),
        StmtKind::Struct(decl) => substitute_struct(decl, map),
        _ => {}
    }
}

fn substitute_expr(expr: &mut Expr, map: &HashMap<String, String>) {
    match &mut expr.kind {
        ExprKind::Variable(name) => substitute_name(name, map),
        ExprKind::Binary { left, right, .. }
        | ExprKind::Logical { left, right, .. }
        | ExprKind::NilCoalesce { left, right } => {
            substitute_expr(left, map);
            substitute_expr(right, map);
        }
        ExprKind::Unary { operand, .. } => substitute_expr(operand, map),
        ExprKind::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            substitute_expr(condition, map);
            substitute_expr(then_expr, map);
            substitute_expr(else_expr, map);
        }
        ExprKind::Range { start, end, .. } => {
            substitute_expr(start, map);
            substitute_expr(end, map);
        }
        ExprKind::Grouping(inner) | ExprKind::ForceUnwrap(inner) => substitute_expr(inner, map),
        ExprKind::Assign { target, value, .. } => {
            substitute_expr(target, map);
            substitute_expr(value, map);
        }
        ExprKind::Call { callee, arguments } => {
            substitute_expr(callee, map);
            for argument in arguments {
                substitute_expr(&mut argument.value, map);
            }
        }
        ExprKind::GenericInstantiation { base, type_args } => {
            substitute_name(base, map);
            for arg in type_args {
                substitute_type(arg, map);
            }
        }
        ExprKind::Member { object, .. }
        | ExprKind::OptionalMember { object, .. }
        | ExprKind::TupleIndex { object, .. } => substitute_expr(object, map),
        ExprKind::Subscript { object, index } => {
            substitute_expr(object, map);
            substitute_expr(index, map);
        }
        ExprKind::TypeCheck { value, type_name } => {
            substitute_expr(value, map);
            substitute_name(type_name, map);
        }
        ExprKind::Cast {
            value, type_name, ..
        } => {
            substitute_expr(value, map);
            substitute_name(type_name, map);
        }
        ExprKind::ArrayLiteral(elements) => {
            for element in elements {
                substitute_expr(element, map);
            }
        }
        ExprKind::DictLiteral(pairs) => {
            for (key, value) in pairs {
                substitute_expr(key, map);
                substitute_expr(value, map);
            }
        }
        ExprKind::TupleLiteral(elements) => {
            for (_, element) in elements {
                substitute_expr(element, map);
            }
        }
        ExprKind::Closure { params, body, .. } => {
            for param in params {
                substitute_param(param, map);
            }
            for stmt in body {
                substitute_stmt(stmt, map);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_simple() {
        assert_eq!(mangle_type_name("Pair<Int,String>"), "Pair_Int_String");
    }

    #[test]
    fn test_mangle_nested() {
        assert_eq!(
            mangle_type_name("Pair<Box<Int>,String>"),
            "Pair_Box_Int_String"
        );
    }

    #[test]
    fn test_split_top_level_args() {
        let (base, args) = split_generic_args("Pair<Box<Int>,String>").unwrap();
        assert_eq!(base, "Pair");
        assert_eq!(args, vec!["Box<Int>".to_string(), "String".to_string()]);
    }

    #[test]
    fn test_split_rejects_unbalanced() {
        assert!(split_generic_args("Pair<Box<Int,String>").is_none());
    }
}
