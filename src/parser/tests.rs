//! Parser tests.

use crate::ast::*;
use crate::lexer::Scanner;
use crate::parser::Parser;

fn parse(source: &str) -> Program {
    let tokens = Scanner::new(source).scan_tokens();
    Parser::new(tokens).parse().expect("parse failed")
}

fn parse_err(source: &str) -> crate::error::ParseError {
    let tokens = Scanner::new(source).scan_tokens();
    Parser::new(tokens).parse().expect_err("expected parse error")
}

fn first_expr(program: &Program) -> &Expr {
    match &program.statements[0].kind {
        StmtKind::Expression(expr) => expr,
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_precedence_mul_binds_tighter() {
    let program = parse("1 + 2 * 3");
    let ExprKind::Binary { operator, right, .. } = &first_expr(&program).kind else {
        panic!("expected binary");
    };
    assert_eq!(*operator, BinaryOp::Add);
    assert!(matches!(
        right.kind,
        ExprKind::Binary {
            operator: BinaryOp::Multiply,
            ..
        }
    ));
}

#[test]
fn test_assignment_is_right_associative() {
    let program = parse("a = b = 1");
    let ExprKind::Assign { value, .. } = &first_expr(&program).kind else {
        panic!("expected assignment");
    };
    assert!(matches!(value.kind, ExprKind::Assign { .. }));
}

#[test]
fn test_compound_assignment_desugars() {
    let program = parse("a += 2");
    let ExprKind::Assign { operator, .. } = &first_expr(&program).kind else {
        panic!("expected assignment");
    };
    assert_eq!(*operator, Some(BinaryOp::Add));
}

#[test]
fn test_invalid_assignment_target() {
    let err = parse_err("1 = 2");
    assert!(matches!(
        err,
        crate::error::ParseError::InvalidAssignmentTarget(_)
    ));
}

#[test]
fn test_range_operators() {
    let program = parse("1...3");
    assert!(matches!(
        first_expr(&program).kind,
        ExprKind::Range {
            inclusive: true,
            ..
        }
    ));
    let program = parse("1..<3");
    assert!(matches!(
        first_expr(&program).kind,
        ExprKind::Range {
            inclusive: false,
            ..
        }
    ));
}

#[test]
fn test_postfix_chain() {
    let program = parse("a.b[0].c(1)");
    assert!(matches!(first_expr(&program).kind, ExprKind::Call { .. }));
}

#[test]
fn test_ternary() {
    let program = parse("a ? 1 : 2");
    assert!(matches!(first_expr(&program).kind, ExprKind::Ternary { .. }));
}

#[test]
fn test_optional_operators() {
    let program = parse("a?.b ?? c!");
    assert!(matches!(
        first_expr(&program).kind,
        ExprKind::NilCoalesce { .. }
    ));
}

#[test]
fn test_tuple_vs_grouping() {
    let program = parse("(1)");
    assert!(matches!(first_expr(&program).kind, ExprKind::Grouping(_)));

    let program = parse("(1, 2)");
    assert!(matches!(
        first_expr(&program).kind,
        ExprKind::TupleLiteral(_)
    ));

    let program = parse("(x: 1, y: 2)");
    let ExprKind::TupleLiteral(elements) = &first_expr(&program).kind else {
        panic!("expected tuple");
    };
    assert_eq!(elements[0].0.as_deref(), Some("x"));
}

#[test]
fn test_array_and_dict_literals() {
    let program = parse("[1, 2, 3]");
    assert!(matches!(
        first_expr(&program).kind,
        ExprKind::ArrayLiteral(_)
    ));

    let program = parse(r#"["a": 1]"#);
    assert!(matches!(first_expr(&program).kind, ExprKind::DictLiteral(_)));

    let program = parse("[:]");
    let ExprKind::DictLiteral(pairs) = &first_expr(&program).kind else {
        panic!("expected dict");
    };
    assert!(pairs.is_empty());
}

#[test]
fn test_func_declaration_with_labels_and_defaults() {
    let program = parse("func greet(from city: String, name: String = \"you\") -> String { return name }");
    let StmtKind::Function(decl) = &program.statements[0].kind else {
        panic!("expected function");
    };
    assert_eq!(decl.params.len(), 2);
    assert_eq!(decl.params[0].external_label.as_deref(), Some("from"));
    assert_eq!(decl.params[0].name, "city");
    assert!(decl.params[1].default_value.is_some());
}

#[test]
fn test_unlabeled_parameter() {
    let program = parse("func f(_ x: Int) {}");
    let StmtKind::Function(decl) = &program.statements[0].kind else {
        panic!("expected function");
    };
    assert_eq!(decl.params[0].external_label, None);
    assert_eq!(decl.params[0].name, "x");
}

#[test]
fn test_expected_clause() {
    let program = parse("func risky() expected IOError {}");
    let StmtKind::Function(decl) = &program.statements[0].kind else {
        panic!("expected function");
    };
    assert_eq!(decl.expected_error.as_deref(), Some("IOError"));
}

#[test]
fn test_class_declaration_members() {
    let source = r#"
        class Dog: Animal, Pet {
            var name: String = "rex"
            private let id: Int = 1
            static var count: Int = 0
            init(name: String) { self.name = name }
            override func speak() { print(name) }
            deinit { print("bye") }
        }
    "#;
    let program = parse(source);
    let StmtKind::Class(decl) = &program.statements[0].kind else {
        panic!("expected class");
    };
    assert_eq!(decl.superclass.as_deref(), Some("Animal"));
    assert_eq!(decl.conformances, vec!["Pet".to_string()]);
    assert_eq!(decl.properties.len(), 3);
    assert!(decl.properties[1].is_let);
    assert_eq!(decl.properties[1].access, Access::Private);
    assert!(decl.properties[2].is_static);
    assert_eq!(decl.initializers.len(), 1);
    assert!(decl.methods[0].is_override);
    assert!(decl.deinit_body.is_some());
}

#[test]
fn test_struct_with_mutating_method() {
    let source = "struct C { var n: Int = 0 mutating func bump() { n = n + 1 } }";
    let program = parse(source);
    let StmtKind::Struct(decl) = &program.statements[0].kind else {
        panic!("expected struct");
    };
    assert!(decl.methods[0].is_mutating);
}

#[test]
fn test_computed_property_accessors() {
    let source = "class T { var x: Int { get { return 1 } set(v) { print(v) } } }";
    let program = parse(source);
    let StmtKind::Class(decl) = &program.statements[0].kind else {
        panic!("expected class");
    };
    let accessors = decl.properties[0].accessors.as_ref().unwrap();
    assert_eq!(accessors.setter.as_ref().unwrap().0, "v");
}

#[test]
fn test_property_observers() {
    let source = "class T { var x: Int = 0 { willSet { print(newValue) } didSet { print(oldValue) } } }";
    let program = parse(source);
    let StmtKind::Class(decl) = &program.statements[0].kind else {
        panic!("expected class");
    };
    let observers = decl.properties[0].observers.as_ref().unwrap();
    assert!(observers.will_set.is_some());
    assert!(observers.did_set.is_some());
}

#[test]
fn test_enum_cases() {
    let source = r#"
        enum Response: Int {
            case ok = 200
            case success(message: String)
            case pair(Int, Int)
        }
    "#;
    let program = parse(source);
    let StmtKind::Enum(decl) = &program.statements[0].kind else {
        panic!("expected enum");
    };
    assert_eq!(decl.raw_type.as_deref(), Some("Int"));
    assert!(decl.cases[0].raw_value.is_some());
    assert_eq!(decl.cases[1].associated.len(), 1);
    assert_eq!(
        decl.cases[1].associated[0].external_label.as_deref(),
        Some("message")
    );
    assert_eq!(decl.cases[2].associated.len(), 2);
    assert_eq!(decl.cases[2].associated[0].external_label, None);
}

#[test]
fn test_protocol_requirements() {
    let source = r#"
        protocol Vehicle: Movable {
            func start()
            mutating func stop()
            var speed: Int { get set }
            var name: String { get }
        }
    "#;
    let program = parse(source);
    let StmtKind::Protocol(decl) = &program.statements[0].kind else {
        panic!("expected protocol");
    };
    assert_eq!(decl.inherited, vec!["Movable".to_string()]);
    assert!(!decl.methods[0].is_mutating);
    assert!(decl.methods[1].is_mutating);
    assert!(decl.properties[0].has_setter);
    assert!(!decl.properties[1].has_setter);
}

#[test]
fn test_switch_patterns() {
    let source = r#"
        switch value {
        case 1, 2, 3:
            print("small")
        case 10...20 where value % 2 == 0:
            print("even teen")
        case .ok(let n):
            print(n)
        case Response.success(let msg):
            print(msg)
        default:
            print("other")
        }
    "#;
    let program = parse(source);
    let StmtKind::Switch { cases, default, .. } = &program.statements[0].kind else {
        panic!("expected switch");
    };
    assert_eq!(cases.len(), 4);
    assert_eq!(cases[0].patterns.len(), 3);
    assert!(matches!(cases[1].patterns[0], Pattern::Range { .. }));
    assert!(cases[1].guard.is_some());
    assert!(matches!(
        &cases[2].patterns[0],
        Pattern::EnumCase { enum_name: None, bindings, .. } if bindings.len() == 1
    ));
    assert!(matches!(
        &cases[3].patterns[0],
        Pattern::EnumCase { enum_name: Some(name), .. } if name == "Response"
    ));
    assert!(default.is_some());
}

#[test]
fn test_for_with_where() {
    let program = parse("for i in 1...10 where i % 2 == 0 { print(i) }");
    let StmtKind::For { where_clause, .. } = &program.statements[0].kind else {
        panic!("expected for");
    };
    assert!(where_clause.is_some());
}

#[test]
fn test_guard_let_and_if_let() {
    let program = parse("guard let x = value else { return }");
    assert!(matches!(
        program.statements[0].kind,
        StmtKind::GuardLet { .. }
    ));

    let program = parse("if let x = value { print(x) } else { print(0) }");
    assert!(matches!(program.statements[0].kind, StmtKind::IfLet { .. }));
}

#[test]
fn test_tuple_destructure() {
    let program = parse("let (a, b) = pair");
    let StmtKind::TupleDestructure { names, is_let, .. } = &program.statements[0].kind else {
        panic!("expected destructure");
    };
    assert_eq!(names, &vec!["a".to_string(), "b".to_string()]);
    assert!(*is_let);
}

#[test]
fn test_generic_declarations() {
    let program = parse("struct Pair<T, U: Printable> { var a: T var b: U }");
    let StmtKind::Struct(decl) = &program.statements[0].kind else {
        panic!("expected struct");
    };
    assert_eq!(decl.generic_params.len(), 2);
    assert_eq!(decl.generic_params[1].constraint.as_deref(), Some("Printable"));
}

#[test]
fn test_generic_instantiation_vs_less_than() {
    let program = parse("Pair<Int, String>(1, \"a\")");
    let ExprKind::Call { callee, .. } = &first_expr(&program).kind else {
        panic!("expected call");
    };
    assert!(matches!(
        callee.kind,
        ExprKind::GenericInstantiation { .. }
    ));

    // A plain comparison still parses as one.
    let program = parse("a < b");
    assert!(matches!(
        first_expr(&program).kind,
        ExprKind::Binary {
            operator: BinaryOp::Less,
            ..
        }
    ));
}

#[test]
fn test_nested_generic_type_annotation() {
    let program = parse("var x: Pair<Box<Int>, String> = y");
    let StmtKind::Var(decl) = &program.statements[0].kind else {
        panic!("expected var");
    };
    assert_eq!(
        decl.type_annotation.as_ref().unwrap().canonical_name(),
        "Pair<Box<Int>,String>"
    );
}

#[test]
fn test_error_token_surfaces_in_parser() {
    let err = parse_err("var x = \"unterminated");
    assert!(err.to_string().contains("Unterminated"));
}

#[test]
fn test_diagnostics_mode_collects_multiple_errors() {
    let source = "var = 1\nfunc () {}\nvar ok = 2";
    let tokens = Scanner::new(source).scan_tokens();
    let (program, errors) = Parser::new(tokens).parse_all();
    assert!(errors.len() >= 2);
    assert!(!program.statements.is_empty());
}

#[test]
fn test_interpolated_string_lowers_to_concat() {
    let program = parse(r#""a\(x)b""#);
    // "a" + x + "b"
    let ExprKind::Binary { operator, .. } = &first_expr(&program).kind else {
        panic!("expected concat chain");
    };
    assert_eq!(*operator, BinaryOp::Add);
}
