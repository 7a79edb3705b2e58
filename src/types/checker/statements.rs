//! Statement checking.

use crate::ast::*;
use crate::types::checker::TypeChecker;
use crate::types::type_repr::Type;

impl TypeChecker {
    pub(crate) fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.infer_expr(expr);
            }

            StmtKind::Var(decl) => self.check_var(decl),

            StmtKind::TupleDestructure { names, is_let, value } => {
                let value_type = self.infer_expr(value);
                for (i, name) in names.iter().enumerate() {
                    if name == "_" {
                        continue;
                    }
                    let element = match &value_type {
                        Type::Tuple(elements) => elements
                            .get(i)
                            .map(|(_, ty)| ty.clone())
                            .unwrap_or(Type::Unknown),
                        _ => Type::Unknown,
                    };
                    self.env.declare(name, element, *is_let);
                }
                if let Type::Tuple(elements) = &value_type {
                    if elements.len() != names.len() {
                        self.error(
                            format!(
                                "Cannot destructure {} elements into {} names",
                                elements.len(),
                                names.len()
                            ),
                            stmt.span,
                        );
                    }
                }
            }

            StmtKind::Block(stmts) => {
                self.env.push_scope();
                for stmt in stmts {
                    self.check_stmt(stmt);
                }
                self.env.pop_scope();
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition);
                self.check_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_block(else_branch);
                }
            }

            StmtKind::IfLet {
                name,
                value,
                then_branch,
                else_branch,
            } => {
                let value_type = self.infer_expr(value);
                self.env.push_scope();
                let bound = match value_type {
                    Type::Optional(inner) => *inner,
                    other => other,
                };
                self.env.declare(name, bound, true);
                self.check_block(then_branch);
                self.env.pop_scope();
                if let Some(else_branch) = else_branch {
                    self.check_block(else_branch);
                }
            }

            StmtKind::Guard { condition, body } => {
                self.check_condition(condition);
                self.check_block(body);
            }

            StmtKind::GuardLet { name, value, body } => {
                let value_type = self.infer_expr(value);
                self.check_block(body);
                let bound = match value_type {
                    Type::Optional(inner) => *inner,
                    other => other,
                };
                // The binding survives into the enclosing scope.
                self.env.declare(name, bound, true);
            }

            StmtKind::While { condition, body } => {
                self.check_condition(condition);
                self.check_block(body);
            }

            StmtKind::RepeatWhile { body, condition } => {
                self.check_block(body);
                self.check_condition(condition);
            }

            StmtKind::For {
                variable,
                iterable,
                where_clause,
                body,
            } => {
                let iterable_type = self.infer_expr(iterable);
                let element = match iterable_type {
                    Type::Array(inner) => *inner,
                    Type::Int => Type::Int, // range expressions infer Int
                    _ => Type::Unknown,
                };
                self.env.push_scope();
                self.env.declare(variable, element, true);
                if let Some(filter) = where_clause {
                    self.check_condition(filter);
                }
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.env.pop_scope();
            }

            StmtKind::Switch {
                subject,
                cases,
                default,
            } => {
                let subject_type = self.infer_expr(subject);
                for case in cases {
                    self.env.push_scope();
                    for pattern in &case.patterns {
                        self.check_pattern(pattern, &subject_type);
                    }
                    if let Some(guard) = &case.guard {
                        self.check_condition(guard);
                    }
                    for stmt in &case.body {
                        self.check_stmt(stmt);
                    }
                    self.env.pop_scope();
                }
                if let Some(default) = default {
                    self.check_block(default);
                }
            }

            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.infer_expr(value);
                }
            }

            StmtKind::Break | StmtKind::Continue => {}

            StmtKind::Throw(expr) => {
                self.infer_expr(expr);
            }

            StmtKind::Print(values) => {
                for value in values {
                    self.infer_expr(value);
                }
            }

            StmtKind::Function(decl) => {
                self.env.push_scope();
                self.declare_params(&decl.params);
                for stmt in &decl.body {
                    self.check_stmt(stmt);
                }
                self.env.pop_scope();
            }

            StmtKind::Class(decl) => self.check_class(decl),
            StmtKind::Struct(decl) => self.check_struct(decl),
            StmtKind::Enum(decl) => self.check_enum(decl),
            StmtKind::Protocol(_) => {}
            StmtKind::Extension(decl) => self.check_extension(decl),
            StmtKind::Import(_) => {}
        }
    }

    fn check_block(&mut self, stmts: &[Stmt]) {
        self.env.push_scope();
        for stmt in stmts {
            self.check_stmt(stmt);
        }
        self.env.pop_scope();
    }

    fn check_condition(&mut self, condition: &Expr) {
        let ty = self.infer_expr(condition);
        if !matches!(ty, Type::Bool | Type::Unknown) {
            self.warning(
                format!("Condition has type {}, expected Bool", ty),
                condition.span,
            );
        }
    }

    fn check_var(&mut self, decl: &VarDecl) {
        let declared = decl.type_annotation.as_ref().map(Type::from_annotation);
        let inferred = decl.initializer.as_ref().map(|init| self.infer_expr(init));

        if let (Some(declared), Some(inferred)) = (&declared, &inferred) {
            if !self.env.accepts(declared, inferred) {
                self.error(
                    format!(
                        "Cannot initialize '{}' of type {} with a value of type {}",
                        decl.name, declared, inferred
                    ),
                    decl.span,
                );
            }
        }

        let ty = declared.or(inferred).unwrap_or(Type::Unknown);
        self.env.declare(&decl.name, ty, decl.is_let);
    }

    fn check_pattern(&mut self, pattern: &Pattern, subject_type: &Type) {
        match pattern {
            Pattern::Literal(expr) => {
                let ty = self.infer_expr(expr);
                if !self.env.accepts(subject_type, &ty) && !self.env.accepts(&ty, subject_type) {
                    self.warning(
                        format!("Pattern of type {} never matches {}", ty, subject_type),
                        expr.span,
                    );
                }
            }
            Pattern::Range { start, end, .. } => {
                self.infer_expr(start);
                self.infer_expr(end);
            }
            Pattern::EnumCase {
                enum_name,
                case_name,
                bindings,
            } => {
                let enum_type_name = enum_name.clone().or_else(|| match subject_type {
                    Type::Named(name) => Some(name.clone()),
                    _ => None,
                });
                if let Some(enum_type_name) = enum_type_name {
                    let arity = self
                        .env
                        .types
                        .get(&enum_type_name)
                        .filter(|info| info.is_enum)
                        .and_then(|info| info.cases.get(case_name).copied());
                    match arity {
                        Some(arity) if arity != bindings.len() && !bindings.is_empty() => {
                            self.error(
                                format!(
                                    "Case '{}' has {} associated value(s), pattern binds {}",
                                    case_name,
                                    arity,
                                    bindings.len()
                                ),
                                Default::default(),
                            );
                        }
                        _ => {}
                    }
                }
                for binding in bindings {
                    self.env.declare(binding, Type::Unknown, true);
                }
            }
        }
    }
}
