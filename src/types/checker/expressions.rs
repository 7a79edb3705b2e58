//! Expression type inference and validation.

use crate::ast::*;
use crate::types::checker::TypeChecker;
use crate::types::environment::FuncSig;
use crate::types::type_repr::Type;

impl TypeChecker {
    pub(crate) fn infer_expr(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLiteral(_) => Type::Int,
            ExprKind::FloatLiteral(_) => Type::Float,
            ExprKind::StringLiteral(_) => Type::String,
            ExprKind::BoolLiteral(_) => Type::Bool,
            ExprKind::Nil => Type::Nil,

            ExprKind::Variable(name) => self.infer_variable(name, expr),

            ExprKind::SelfExpr => match &self.current_type {
                Some(scope) => Type::Named(scope.name.clone()),
                None => {
                    self.error("Cannot use 'self' outside of a type", expr.span);
                    Type::Unknown
                }
            },

            ExprKind::SuperMethod(_) => Type::Unknown,

            ExprKind::Binary {
                left,
                operator,
                right,
            } => self.infer_binary(left, *operator, right, expr),

            ExprKind::Logical { left, right, .. } => {
                self.infer_expr(left);
                self.infer_expr(right);
                Type::Bool
            }

            ExprKind::Unary { operator, operand } => {
                let ty = self.infer_expr(operand);
                match operator {
                    UnaryOp::Negate => {
                        if !ty.is_numeric() && !ty.is_unknown() {
                            self.error(format!("Cannot negate {}", ty), expr.span);
                        }
                        ty
                    }
                    UnaryOp::Not => Type::Bool,
                    UnaryOp::BitNot => Type::Int,
                }
            }

            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.infer_expr(condition);
                let then_type = self.infer_expr(then_expr);
                let else_type = self.infer_expr(else_expr);
                if self.env.accepts(&then_type, &else_type) {
                    then_type
                } else if self.env.accepts(&else_type, &then_type) {
                    else_type
                } else {
                    Type::Unknown
                }
            }

            ExprKind::Range { start, end, .. } => {
                let start_type = self.infer_expr(start);
                let end_type = self.infer_expr(end);
                if (!start_type.is_unknown() && start_type != Type::Int)
                    || (!end_type.is_unknown() && end_type != Type::Int)
                {
                    self.error("Range bounds must be Int", expr.span);
                }
                Type::Array(Box::new(Type::Int))
            }

            ExprKind::Grouping(inner) => self.infer_expr(inner),

            ExprKind::Assign {
                target,
                operator: _,
                value,
            } => self.check_assignment(target, value),

            ExprKind::Call { callee, arguments } => self.check_call(callee, arguments, expr),

            ExprKind::GenericInstantiation { .. } => Type::Unknown,

            ExprKind::Member { object, name } => self.infer_member(object, name, expr),

            ExprKind::OptionalMember { object, name } => {
                let inner = self.infer_member(object, name, expr);
                Type::Optional(Box::new(inner))
            }

            ExprKind::TupleIndex { object, index } => {
                let object_type = self.infer_expr(object);
                match object_type {
                    Type::Tuple(elements) => elements
                        .get(*index as usize)
                        .map(|(_, ty)| ty.clone())
                        .unwrap_or_else(|| {
                            self.error(
                                format!("Tuple has no element {}", index),
                                expr.span,
                            );
                            Type::Unknown
                        }),
                    _ => Type::Unknown,
                }
            }

            ExprKind::Subscript { object, index } => {
                let object_type = self.infer_expr(object);
                let index_type = self.infer_expr(index);
                match object_type {
                    Type::Array(inner) => {
                        if !matches!(index_type, Type::Int | Type::Unknown) {
                            self.error("Array index must be Int", expr.span);
                        }
                        *inner
                    }
                    Type::Dictionary(_, value) => Type::Optional(value),
                    Type::String => Type::String,
                    _ => Type::Unknown,
                }
            }

            ExprKind::ForceUnwrap(inner) => match self.infer_expr(inner) {
                Type::Optional(inner) => *inner,
                other => other,
            },

            ExprKind::NilCoalesce { left, right } => {
                let left_type = self.infer_expr(left);
                let right_type = self.infer_expr(right);
                match left_type {
                    Type::Optional(inner) => *inner,
                    Type::Nil => right_type,
                    other => other,
                }
            }

            ExprKind::TypeCheck { value, .. } => {
                self.infer_expr(value);
                Type::Bool
            }

            ExprKind::Cast {
                value,
                type_name,
                kind,
            } => {
                self.infer_expr(value);
                let target = Type::from_name(type_name);
                match kind {
                    CastKind::Optional => Type::Optional(Box::new(target)),
                    _ => target,
                }
            }

            ExprKind::ArrayLiteral(elements) => {
                let mut element_type = Type::Unknown;
                for element in elements {
                    let ty = self.infer_expr(element);
                    if element_type.is_unknown() {
                        element_type = ty;
                    } else if !self.env.accepts(&element_type, &ty) {
                        element_type = Type::Unknown;
                    }
                }
                Type::Array(Box::new(element_type))
            }

            ExprKind::DictLiteral(pairs) => {
                let mut key_type = Type::Unknown;
                let mut value_type = Type::Unknown;
                for (key, value) in pairs {
                    key_type = self.infer_expr(key);
                    value_type = self.infer_expr(value);
                }
                Type::Dictionary(Box::new(key_type), Box::new(value_type))
            }

            ExprKind::TupleLiteral(elements) => Type::Tuple(
                elements
                    .iter()
                    .map(|(label, value)| (label.clone(), self.infer_expr(value)))
                    .collect(),
            ),

            ExprKind::Closure { params, body, .. } => {
                self.env.push_scope();
                self.declare_params(params);
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.env.pop_scope();
                Type::Function {
                    params: params
                        .iter()
                        .map(|p| {
                            p.type_annotation
                                .as_ref()
                                .map(Type::from_annotation)
                                .unwrap_or(Type::Unknown)
                        })
                        .collect(),
                    return_type: Box::new(Type::Unknown),
                }
            }

            ExprKind::ReadLine => Type::Optional(Box::new(Type::String)),
        }
    }

    fn infer_variable(&mut self, name: &str, expr: &Expr) -> Type {
        if let Some(binding) = self.env.lookup(name) {
            return binding.ty.clone();
        }
        if self.env.types.contains_key(name) || self.env.protocols.contains_key(name) {
            return Type::Named(name.to_string());
        }
        if self.env.functions.contains_key(name) {
            let sig = &self.env.functions[name];
            return Type::Function {
                params: sig.params.iter().map(|p| p.ty.clone()).collect(),
                return_type: Box::new(sig.return_type.clone()),
            };
        }
        // Members resolve without `self.` inside type bodies; unknown names
        // elsewhere are a compile/runtime concern, not repeated here.
        if self.current_type.is_some() {
            return Type::Unknown;
        }
        let _ = expr;
        Type::Unknown
    }

    fn infer_binary(
        &mut self,
        left: &Expr,
        operator: BinaryOp,
        right: &Expr,
        expr: &Expr,
    ) -> Type {
        let left_type = self.infer_expr(left);
        let right_type = self.infer_expr(right);

        match operator {
            BinaryOp::Add => {
                if left_type == Type::String || right_type == Type::String {
                    return Type::String;
                }
                self.numeric_result(&left_type, &right_type, "+", expr)
            }
            BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Modulo => {
                self.numeric_result(&left_type, &right_type, "arithmetic", expr)
            }
            BinaryOp::Divide => self.numeric_result(&left_type, &right_type, "/", expr),
            BinaryOp::Equal | BinaryOp::NotEqual => Type::Bool,
            BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => {
                let comparable = left_type.is_numeric() && right_type.is_numeric()
                    || (left_type == Type::String && right_type == Type::String)
                    || left_type.is_unknown()
                    || right_type.is_unknown();
                if !comparable {
                    self.error(
                        format!("Cannot compare {} with {}", left_type, right_type),
                        expr.span,
                    );
                }
                Type::Bool
            }
            BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::Shl
            | BinaryOp::Shr => {
                for (side, ty) in [("left", &left_type), ("right", &right_type)] {
                    if !matches!(ty, Type::Int | Type::Unknown) {
                        self.error(
                            format!("Bitwise {} operand must be Int, found {}", side, ty),
                            expr.span,
                        );
                    }
                }
                Type::Int
            }
        }
    }

    /// Arithmetic result with implicit Int→Float widening. Custom operator
    /// overloads on nominal types pass through unchecked.
    fn numeric_result(
        &mut self,
        left: &Type,
        right: &Type,
        what: &str,
        expr: &Expr,
    ) -> Type {
        match (left, right) {
            (Type::Int, Type::Int) => Type::Int,
            (Type::Int, Type::Float)
            | (Type::Float, Type::Int)
            | (Type::Float, Type::Float) => Type::Float,
            (Type::Unknown, _) | (_, Type::Unknown) => Type::Unknown,
            (Type::Named(_), _) | (_, Type::Named(_)) => Type::Unknown,
            _ => {
                self.error(
                    format!("Cannot apply {} to {} and {}", what, left, right),
                    expr.span,
                );
                Type::Unknown
            }
        }
    }

    /// Assignments: reject writes to `let` bindings and `let` properties,
    /// and check declared-type agreement with widening.
    fn check_assignment(&mut self, target: &Expr, value: &Expr) -> Type {
        let value_type = self.infer_expr(value);

        match &target.kind {
            ExprKind::Variable(name) => {
                if let Some(binding) = self.env.lookup(name) {
                    let binding_ty = binding.ty.clone();
                    if binding.is_let {
                        self.error(
                            format!("Cannot assign to 'let' constant '{}'", name),
                            target.span,
                        );
                    }
                    if !self.env.accepts(&binding_ty, &value_type) {
                        self.error(
                            format!(
                                "Cannot assign value of type {} to '{}' of type {}",
                                value_type, name, binding_ty
                            ),
                            target.span,
                        );
                    }
                    return binding_ty;
                }
                value_type
            }
            ExprKind::Member { object, name } => {
                let object_type = self.infer_expr(object);
                if let Type::Named(type_name) = &object_type {
                    if let Some((declaring, sig)) =
                        self.env.find_property(type_name, name)
                    {
                        let sig = sig.clone();
                        // `let` properties may only be written during
                        // initialization; member writes elsewhere are
                        // rejected.
                        let inside_own_init = self
                            .current_type
                            .as_ref()
                            .map(|scope| scope.name == declaring)
                            .unwrap_or(false);
                        if sig.is_let && !inside_own_init {
                            self.error(
                                format!("Cannot assign to 'let' property '{}'", name),
                                target.span,
                            );
                        }
                        if !self.access_allowed(sig.access, &declaring) {
                            self.error(
                                format!("'{}' is private to {}", name, declaring),
                                target.span,
                            );
                        }
                        if !self.env.accepts(&sig.ty, &value_type) {
                            self.error(
                                format!(
                                    "Cannot assign value of type {} to '{}' of type {}",
                                    value_type, name, sig.ty
                                ),
                                target.span,
                            );
                        }
                        return sig.ty;
                    }
                }
                value_type
            }
            _ => {
                self.infer_expr(target);
                value_type
            }
        }
    }

    /// Calls: resolve the callee signature when known, then check arity,
    /// labels, and argument types (accepting protocol subtypes).
    fn check_call(&mut self, callee: &Expr, arguments: &[Argument], expr: &Expr) -> Type {
        for argument in arguments {
            self.infer_expr(&argument.value);
        }

        match &callee.kind {
            ExprKind::Variable(name) => {
                if let Some(sig) = self.env.functions.get(name).cloned() {
                    self.check_arguments(&sig, arguments, expr);
                    return sig.return_type;
                }
                // Constructor call.
                if self.env.types.contains_key(name) {
                    return Type::Named(name.clone());
                }
                self.infer_expr(callee);
                Type::Unknown
            }
            ExprKind::Member { object, name } => {
                let object_type = self.infer_expr(object);
                if let Type::Named(type_name) = &object_type {
                    if let Some((declaring, sig)) = self.env.find_method(type_name, name) {
                        let sig = sig.clone();
                        if !self.access_allowed(sig.access, &declaring) {
                            self.error(
                                format!("'{}' is private to {}", name, declaring),
                                callee.span,
                            );
                        }
                        // Calling a mutating method needs a mutable
                        // receiver: a `let`-bound value type rejects it.
                        if sig.is_mutating {
                            self.check_mutating_receiver(object, type_name);
                        }
                        self.check_arguments(&sig, arguments, expr);
                        return sig.return_type;
                    }
                    // Enum case constructor.
                    if let Some(info) = self.env.types.get(type_name) {
                        if info.is_enum && info.cases.contains_key(name) {
                            return Type::Named(type_name.clone());
                        }
                    }
                }
                Type::Unknown
            }
            _ => {
                self.infer_expr(callee);
                Type::Unknown
            }
        }
    }

    fn check_mutating_receiver(&mut self, receiver: &Expr, type_name: &str) {
        let is_value_type = self
            .env
            .types
            .get(type_name)
            .map(|info| info.is_struct)
            .unwrap_or(false);
        if !is_value_type {
            return;
        }
        match &receiver.kind {
            ExprKind::Variable(name) => {
                if let Some(binding) = self.env.lookup(name) {
                    if binding.is_let {
                        self.error(
                            format!(
                                "Cannot call a mutating method on 'let' constant '{}'",
                                name
                            ),
                            receiver.span,
                        );
                    }
                }
            }
            ExprKind::SelfExpr => {
                if !self.in_mutating_method {
                    self.error(
                        "Cannot mutate 'self' in a non-mutating method",
                        receiver.span,
                    );
                }
            }
            _ => {}
        }
    }

    fn check_arguments(&mut self, sig: &FuncSig, arguments: &[Argument], expr: &Expr) {
        let required = sig.params.iter().filter(|p| !p.has_default).count();
        if arguments.len() < required || arguments.len() > sig.params.len() {
            self.error(
                format!(
                    "Wrong number of arguments: expected {}, got {}",
                    sig.params.len(),
                    arguments.len()
                ),
                expr.span,
            );
            return;
        }

        for (param, argument) in sig.params.iter().zip(arguments) {
            // Labels must agree positionally; `_` parameters take none.
            match (&param.label, &argument.label) {
                (Some(expected), Some(given)) if expected != given => {
                    self.error(
                        format!(
                            "Incorrect argument label '{}', expected '{}'",
                            given, expected
                        ),
                        argument.value.span,
                    );
                }
                (None, Some(given)) => {
                    self.error(
                        format!("Extraneous argument label '{}'", given),
                        argument.value.span,
                    );
                }
                _ => {}
            }

            let actual = self.infer_expr(&argument.value);
            if !self.env.accepts(&param.ty, &actual) {
                self.error(
                    format!(
                        "Argument of type {} does not match parameter type {}",
                        actual, param.ty
                    ),
                    argument.value.span,
                );
            }
        }
    }

    fn infer_member(&mut self, object: &Expr, name: &str, expr: &Expr) -> Type {
        let object_type = self.infer_expr(object);
        match &object_type {
            Type::Named(type_name) => {
                if let Some((declaring, sig)) = self.env.find_property(type_name, name) {
                    let sig = sig.clone();
                    if !self.access_allowed(sig.access, &declaring) {
                        self.error(
                            format!("'{}' is private to {}", name, declaring),
                            expr.span,
                        );
                    }
                    return sig.ty;
                }
                if let Some((declaring, sig)) = self.env.find_method(type_name, name) {
                    let sig = sig.clone();
                    if !self.access_allowed(sig.access, &declaring) {
                        self.error(
                            format!("'{}' is private to {}", name, declaring),
                            expr.span,
                        );
                    }
                    return Type::Function {
                        params: sig.params.iter().map(|p| p.ty.clone()).collect(),
                        return_type: Box::new(sig.return_type),
                    };
                }
                if let Some(info) = self.env.types.get(type_name) {
                    if info.is_enum && info.cases.contains_key(name) {
                        return Type::Named(type_name.clone());
                    }
                    if info.is_enum && name == "rawValue" {
                        return Type::Unknown;
                    }
                }
                Type::Unknown
            }
            Type::Array(_) | Type::String | Type::Dictionary(..) if name == "count" => Type::Int,
            Type::Tuple(elements) => elements
                .iter()
                .find(|(label, _)| label.as_deref() == Some(name))
                .map(|(_, ty)| ty.clone())
                .unwrap_or(Type::Unknown),
            _ => Type::Unknown,
        }
    }
}
