//! The type checker: a two-pass walk collecting declarations first, then
//! validating statements and expressions. Failures aggregate into a
//! diagnostic list; the caller decides whether to continue to compilation.

mod declarations;
mod expressions;
mod statements;

use crate::ast::Program;
use crate::error::{Diagnostic, Severity, TypeError};
use crate::span::Span;
use crate::types::environment::TypeEnvironment;

/// What type body the checker is currently inside, for access control and
/// `self` typing.
#[derive(Debug, Clone)]
pub(crate) struct TypeScope {
    pub name: String,
    pub is_struct: bool,
}

pub struct TypeChecker {
    pub(crate) env: TypeEnvironment,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) current_type: Option<TypeScope>,
    /// Inside a `mutating` method body.
    pub(crate) in_mutating_method: bool,
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            env: TypeEnvironment::new(),
            diagnostics: Vec::new(),
            current_type: None,
            in_mutating_method: false,
        }
    }

    /// Type check a complete program.
    pub fn check(&mut self, program: &Program) -> Result<(), TypeError> {
        // First pass: collect type, protocol, and function declarations so
        // forward references resolve.
        for stmt in &program.statements {
            self.declare_stmt(stmt);
        }

        // Second pass: check everything.
        for stmt in &program.statements {
            self.check_stmt(stmt);
        }

        if self.diagnostics.iter().any(|d| d.severity == Severity::Error) {
            Err(TypeError {
                diagnostics: std::mem::take(&mut self.diagnostics),
            })
        } else {
            Ok(())
        }
    }

    /// Diagnostics collected so far (diagnostics mode).
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic {
            line: span.line,
            column: span.column,
            message: message.into(),
            severity: Severity::Error,
        });
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic {
            line: span.line,
            column: span.column,
            message: message.into(),
            severity: Severity::Warning,
        });
    }

    /// Access control: `private` members are visible only inside the
    /// declaring type (extensions included, since they check with
    /// `current_type` set to the extended type). `fileprivate` behaves as
    /// `internal` in the single-module model.
    pub(crate) fn access_allowed(&self, access: crate::ast::Access, declaring_type: &str) -> bool {
        match access {
            crate::ast::Access::Private => self
                .current_type
                .as_ref()
                .map(|scope| scope.name == declaring_type)
                .unwrap_or(false),
            _ => true,
        }
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn check(source: &str) -> Result<(), TypeError> {
        let tokens = Scanner::new(source).scan_tokens();
        let program = Parser::new(tokens).parse().expect("parse failed");
        TypeChecker::new().check(&program)
    }

    #[test]
    fn test_well_typed_program_passes() {
        assert!(check("var x: Int = 1\nx = x + 2").is_ok());
    }

    #[test]
    fn test_int_widens_to_float() {
        assert!(check("var x: Float = 1").is_ok());
        assert!(check("let y: Float = 1 + 2.5").is_ok());
    }

    #[test]
    fn test_declared_type_mismatch() {
        assert!(check("var x: Int = \"hello\"").is_err());
    }

    #[test]
    fn test_let_reassignment_rejected() {
        assert!(check("let x = 1\nx = 2").is_err());
    }

    #[test]
    fn test_call_arity_checked() {
        let source = "func f(_ a: Int, _ b: Int) -> Int { return a + b }\nf(1)";
        assert!(check(source).is_err());
    }

    #[test]
    fn test_argument_label_mismatch() {
        let source = "func f(x: Int) {}\nf(y: 1)";
        assert!(check(source).is_err());
    }

    #[test]
    fn test_argument_type_checked() {
        let source = "func f(_ a: Int) {}\nf(\"nope\")";
        assert!(check(source).is_err());
    }

    #[test]
    fn test_protocol_subtype_accepted() {
        let source = r#"
            protocol Animal {}
            class Dog: Animal {}
            func adopt(_ pet: Animal) {}
            adopt(Dog())
        "#;
        assert!(check(source).is_ok());
    }

    #[test]
    fn test_mutating_call_on_let_rejected() {
        let source = r#"
            struct Counter {
                var count: Int = 0
                mutating func bump() { count = count + 1 }
            }
            let c = Counter()
            c.bump()
        "#;
        assert!(check(source).is_err());
    }

    #[test]
    fn test_mutating_call_on_var_allowed() {
        let source = r#"
            struct Counter {
                var count: Int = 0
                mutating func bump() { count = count + 1 }
            }
            var c = Counter()
            c.bump()
        "#;
        assert!(check(source).is_ok());
    }

    #[test]
    fn test_private_member_rejected_outside_type() {
        let source = r#"
            class Safe {
                private var secret: Int = 0
                func reveal() -> Int { return self.secret }
            }
            var s = Safe()
            print(s.secret)
        "#;
        assert!(check(source).is_err());
    }

    #[test]
    fn test_private_member_allowed_inside_extension() {
        let source = r#"
            class Safe {
                private var secret: Int = 0
            }
            extension Safe {
                func peek() -> Int { return self.secret }
            }
        "#;
        assert!(check(source).is_ok());
    }

    #[test]
    fn test_override_discipline() {
        assert!(check("class A { func f() {} }\nclass B: A { func f() {} }").is_err());
        assert!(check("class A {}\nclass B: A { override func f() {} }").is_err());
        assert!(check("class A { func f() {} }\nclass B: A { override func f() {} }").is_ok());
        // Initializers are exempt both ways.
        assert!(check("class A { init() {} }\nclass B: A { init() {} }").is_ok());
    }

    #[test]
    fn test_fileprivate_behaves_as_internal() {
        let source = r#"
            class Box {
                fileprivate var value: Int = 1
            }
            print(Box().value)
        "#;
        assert!(check(source).is_ok());
    }
}
