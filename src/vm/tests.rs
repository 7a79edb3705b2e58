//! End-to-end VM tests: compile source, execute, and compare captured
//! print output.

use std::sync::Arc;

use crate::bytecode::Assembly;
use crate::debug::DebugController;
use crate::error::SwiftScriptError;
use crate::vm::{Vm, VmConfig};
use crate::BuildOptions;

fn try_run(source: &str) -> Result<String, SwiftScriptError> {
    let assembly = crate::compile_source(source, None, &BuildOptions::default())?;
    let mut vm = Vm::with_config(VmConfig {
        capture_output: true,
    });
    vm.interpret(assembly)?;
    Ok(vm.captured_output())
}

fn run(source: &str) -> String {
    match try_run(source) {
        Ok(output) => output,
        Err(err) => panic!("execution failed: {}", err),
    }
}

// --- Basics ---

#[test]
fn test_arithmetic_and_precedence() {
    assert_eq!(run("print(1 + 2 * 3)"), "7\n");
    assert_eq!(run("print((1 + 2) * 3)"), "9\n");
    assert_eq!(run("print(10 % 3)"), "1\n");
    assert_eq!(run("print(7 / 2)"), "3\n");
    assert_eq!(run("print(7.0 / 2)"), "3.5\n");
    assert_eq!(run("print(1 + 2.5)"), "3.5\n");
}

#[test]
fn test_bitwise_and_shift() {
    assert_eq!(run("print(6 & 3)"), "2\n");
    assert_eq!(run("print(6 | 3)"), "7\n");
    assert_eq!(run("print(6 ^ 3)"), "5\n");
    assert_eq!(run("print(1 << 4)"), "16\n");
    assert_eq!(run("print(16 >> 2)"), "4\n");
    assert_eq!(run("print(~0)"), "-1\n");
}

#[test]
fn test_integer_division_by_zero_errors() {
    assert!(try_run("print(1 / 0)").is_err());
}

#[test]
fn test_float_division_by_zero_is_ieee() {
    assert_eq!(run("print(1.0 / 0.0)"), "inf\n");
}

#[test]
fn test_string_interpolation() {
    assert_eq!(
        run(r#"let name = "World" print("Hello \(name)!")"#),
        "Hello World!\n"
    );
    assert_eq!(run(r#"print("2+2=\(2 + 2)")"#), "2+2=4\n");
}

#[test]
fn test_logical_short_circuit() {
    let source = r#"
        var calls = 0
        func bump() -> Bool { calls = calls + 1 return true }
        let a = false && bump()
        let b = true || bump()
        print(calls)
        print(a)
        print(b)
    "#;
    assert_eq!(run(source), "0\nfalse\ntrue\n");
}

#[test]
fn test_ternary_and_nil_coalesce() {
    assert_eq!(run("print(1 < 2 ? \"yes\" : \"no\")"), "yes\n");
    assert_eq!(run("let x = nil print(x ?? 42)"), "42\n");
    assert_eq!(run("let x = 7 print(x ?? 42)"), "7\n");
}

#[test]
fn test_undefined_variable_is_runtime_error() {
    assert!(try_run("print(missing)").is_err());
}

// --- Control flow ---

#[test]
fn test_spec_scenario_range_for() {
    // for over a closed range accumulates 1+2+3.
    let source = "var x = 0; for i in 1...3 { x = x + i } print(x)";
    assert_eq!(run(source), "6\n");
}

#[test]
fn test_range_iteration_counts() {
    assert_eq!(run("var n = 0 for i in 1...5 { n = n + 1 } print(n)"), "5\n");
    assert_eq!(run("var n = 0 for i in 1..<5 { n = n + 1 } print(n)"), "4\n");
    // Empty ranges run zero times.
    assert_eq!(run("var n = 0 for i in 3...1 { n = n + 1 } print(n)"), "0\n");
    assert_eq!(run("var n = 0 for i in 3..<3 { n = n + 1 } print(n)"), "0\n");
}

#[test]
fn test_for_where_filter_preserves_order() {
    let source = "for i in 1...6 where i % 2 == 0 { print(i) }";
    assert_eq!(run(source), "2\n4\n6\n");
}

#[test]
fn test_for_over_array() {
    assert_eq!(run("for x in [10, 20, 30] { print(x) }"), "10\n20\n30\n");
}

#[test]
fn test_while_and_repeat_while() {
    assert_eq!(
        run("var i = 0 while i < 3 { print(i) i = i + 1 }"),
        "0\n1\n2\n"
    );
    // repeat-while runs the body at least once.
    assert_eq!(
        run("var i = 10 repeat { print(i) i = i + 1 } while i < 3"),
        "10\n"
    );
}

#[test]
fn test_break_and_continue() {
    assert_eq!(
        run("for i in 1...10 { if i == 4 { break } print(i) }"),
        "1\n2\n3\n"
    );
    assert_eq!(
        run("for i in 1...5 { if i == 3 { continue } print(i) }"),
        "1\n2\n4\n5\n"
    );
}

#[test]
fn test_guard_and_if_let() {
    let source = r#"
        func check(_ n: Int) {
            guard n > 0 else {
                print("non-positive")
                return
            }
            print("positive")
        }
        check(5)
        check(-1)
    "#;
    assert_eq!(run(source), "positive\nnon-positive\n");

    let source = r#"
        func describe(_ x: Int) {
            if let v = x ?? nil {
                print(v)
            } else {
                print("none")
            }
        }
        describe(3)
    "#;
    assert_eq!(run(source), "3\n");
}

// --- Switch ---

#[test]
fn test_switch_first_match_wins() {
    let source = r#"
        let n = 5
        switch n {
        case 1...3:
            print("low")
        case 4...9 where n % 2 == 0:
            print("even mid")
        case 4...9:
            print("mid")
        default:
            print("high")
        }
    "#;
    assert_eq!(run(source), "mid\n");
}

#[test]
fn test_switch_multi_pattern() {
    let source = r#"
        for n in 1...5 {
            switch n {
            case 1, 3, 5:
                print("odd")
            case 2, 4:
                print("even")
            }
        }
    "#;
    assert_eq!(run(source), "odd\neven\nodd\neven\nodd\n");
}

#[test]
fn test_switch_half_open_range_pattern() {
    let source = r#"
        switch 5 {
        case 0..<5:
            print("under")
        case 5..<10:
            print("over")
        default:
            print("out")
        }
    "#;
    assert_eq!(run(source), "over\n");
}

#[test]
fn test_switch_string_literals() {
    let source = r#"
        let word = "two"
        switch word {
        case "one":
            print(1)
        case "two":
            print(2)
        default:
            print(0)
        }
    "#;
    assert_eq!(run(source), "2\n");
}

// --- Functions & closures ---

#[test]
fn test_function_defaults_and_labels() {
    let source = r#"
        func greet(name: String, greeting: String = "Hello") -> String {
            return greeting + ", " + name
        }
        print(greet(name: "Ada"))
        print(greet(name: "Ada", greeting: "Hi"))
    "#;
    assert_eq!(run(source), "Hello, Ada\nHi, Ada\n");
}

#[test]
fn test_named_arguments_reorder() {
    let source = r#"
        func span(from start: Int, to end: Int) -> Int { return end - start }
        print(span(from: 2, to: 10))
        print(span(to: 10, from: 2))
    "#;
    assert_eq!(run(source), "8\n8\n");
}

#[test]
fn test_unknown_label_is_runtime_error() {
    let source = r#"
        func f(x: Int) -> Int { return x }
        print(f(y: 1))
    "#;
    assert!(try_run(source).is_err());
}

#[test]
fn test_wrong_arity_is_runtime_error() {
    let source = "func f(_ a: Int, _ b: Int) -> Int { return a + b } print(f(1))";
    assert!(try_run(source).is_err());
}

#[test]
fn test_spec_scenario_counter_closure() {
    let source = r#"
        func make() -> () -> Int {
            var c = 0
            return { c = c + 1; return c }
        }
        let f = make()
        print(f())
        print(f())
        print(f())
    "#;
    assert_eq!(run(source), "1\n2\n3\n");
}

#[test]
fn test_closures_share_upvalues() {
    // Two closures capturing the same local observe each other's writes.
    let source = r#"
        func pair() -> (() -> Int, () -> Int) {
            var x = 0
            let bump = { x = x + 10; return x }
            let read = { return x }
            return (bump, read)
        }
        let fns = pair()
        let bump = fns.0
        let read = fns.1
        bump()
        print(read())
        bump()
        print(read())
    "#;
    assert_eq!(run(source), "10\n20\n");
}

#[test]
fn test_closure_with_parameters() {
    let source = r#"
        let double = { n in return n * 2 }
        print(double(21))
    "#;
    assert_eq!(run(source), "42\n");
}

#[test]
fn test_recursion() {
    let source = r#"
        func fib(_ n: Int) -> Int {
            if n < 2 { return n }
            return fib(n - 1) + fib(n - 2)
        }
        print(fib(10))
    "#;
    assert_eq!(run(source), "55\n");
}

// --- Collections ---

#[test]
fn test_arrays_and_subscripts() {
    let source = r#"
        var xs = [1, 2, 3]
        xs[1] = 20
        print(xs[0])
        print(xs[1])
        print(xs.count)
        print(xs)
    "#;
    assert_eq!(run(source), "1\n20\n3\n[1, 20, 3]\n");
}

#[test]
fn test_array_index_out_of_bounds() {
    assert!(try_run("let xs = [1] print(xs[5])").is_err());
}

#[test]
fn test_dictionaries() {
    let source = r#"
        var ages = ["ada": 36, "alan": 41]
        ages["grace"] = 45
        print(ages["ada"])
        print(ages["nobody"])
        print(ages.count)
    "#;
    assert_eq!(run(source), "36\nnil\n3\n");
}

#[test]
fn test_spec_scenario_tuples() {
    let source = "let t = (x: 1, y: 2); print(t.x); print(t.1)";
    assert_eq!(run(source), "1\n2\n");
}

#[test]
fn test_annotated_tuple_local_label_access() {
    let source = r#"
        func origin() {
            let t: (x: Int, y: Int) = (x: 3, y: 4)
            print(t.x)
            print(t.y)
        }
        origin()
    "#;
    assert_eq!(run(source), "3\n4\n");
}

#[test]
fn test_tuple_printing_and_destructuring() {
    assert_eq!(run("print((x: 5, y: 15))"), "(x: 5, y: 15)\n");
    assert_eq!(run("print((10, 20))"), "(10, 20)\n");
    assert_eq!(
        run("let (a, b) = (1, 2) print(a) print(b)"),
        "1\n2\n"
    );
    assert_eq!(
        run("func f() { let (a, b) = (3, 4) print(a + b) } f()"),
        "7\n"
    );
}

// --- Classes ---

#[test]
fn test_class_with_initializer() {
    let source = r#"
        class Point {
            var x: Int = 0
            var y: Int = 0
            init(_ x: Int, _ y: Int) {
                self.x = x
                self.y = y
            }
            func sum() -> Int { return x + y }
        }
        let p = Point(3, 4)
        print(p.sum())
    "#;
    assert_eq!(run(source), "7\n");
}

#[test]
fn test_stored_property_defaults_run_per_instance() {
    let source = r#"
        var made = 0
        func next() -> Int { made = made + 1 return made }
        class Tagged { var tag: Int = next() }
        let a = Tagged()
        let b = Tagged()
        print(a.tag)
        print(b.tag)
    "#;
    assert_eq!(run(source), "1\n2\n");
}

#[test]
fn test_spec_scenario_override_super() {
    let source = r#"
        class A { func speak() { print("a") } }
        class B: A { override func speak() { super.speak(); print("b") } }
        B().speak()
    "#;
    assert_eq!(run(source), "a\nb\n");
}

#[test]
fn test_inherited_method_and_properties() {
    let source = r#"
        class Animal {
            var legs: Int = 4
            func describe() { print(legs) }
        }
        class Bird: Animal {
            init() { legs = 2 }
        }
        Bird().describe()
    "#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_override_without_keyword_is_compile_error() {
    let source = r#"
        class A { func speak() {} }
        class B: A { func speak() {} }
    "#;
    assert!(matches!(
        try_run(source),
        Err(SwiftScriptError::Compile(_))
    ));
}

#[test]
fn test_override_without_ancestor_is_compile_error() {
    let source = r#"
        class A {}
        class B: A { override func bark() {} }
    "#;
    assert!(matches!(
        try_run(source),
        Err(SwiftScriptError::Compile(_))
    ));
}

#[test]
fn test_initializers_exempt_from_override() {
    let source = r#"
        class A { init() { print("a") } }
        class B: A { init() { print("b") } }
        let b = B()
    "#;
    assert_eq!(run(source), "b\n");
}

#[test]
fn test_reference_semantics_for_classes() {
    let source = r#"
        class Box { var value: Int = 1 }
        var a = Box()
        var b = a
        b.value = 99
        print(a.value)
    "#;
    assert_eq!(run(source), "99\n");
}

#[test]
fn test_static_members() {
    let source = r#"
        class Registry {
            static var count: Int = 0
            static func describe() -> String { return "registry" }
        }
        Registry.count = 5
        print(Registry.count)
        print(Registry.describe())
    "#;
    assert_eq!(run(source), "5\nregistry\n");
}

#[test]
fn test_deinit_runs_on_last_release() {
    let source = r#"
        class Resource {
            deinit { print("cleanup") }
        }
        func use() {
            let r = Resource()
            print("using")
        }
        use()
        print("after")
    "#;
    assert_eq!(run(source), "using\ncleanup\nafter\n");
}

#[test]
fn test_weak_reference_reads_nil_after_release() {
    let source = r#"
        class Node {}
        class Holder { weak var target: Node = nil }
        var h = Holder()
        func scoped() {
            let n = Node()
            h.target = n
            print(h.target is Node)
        }
        scoped()
        print(h.target)
    "#;
    assert_eq!(run(source), "true\nnil\n");
}

// --- Computed properties & observers ---

#[test]
fn test_computed_property_get_set() {
    let source = r#"
        class Temperature {
            var celsius: Int = 0
            var fahrenheit: Int {
                get { return celsius * 9 / 5 + 32 }
                set { celsius = (newValue - 32) * 5 / 9 }
            }
        }
        var t = Temperature()
        t.celsius = 100
        print(t.fahrenheit)
        t.fahrenheit = 32
        print(t.celsius)
    "#;
    assert_eq!(run(source), "212\n0\n");
}

#[test]
fn test_read_only_shorthand() {
    let source = r#"
        class Circle {
            var radius: Int = 10
            var area: Int { return radius * radius * 3 }
        }
        print(Circle().area)
    "#;
    assert_eq!(run(source), "300\n");
}

#[test]
fn test_property_observers_order_and_values() {
    let source = r#"
        class Score {
            var points: Int = 0 {
                willSet { print("will \(newValue)") }
                didSet { print("did \(oldValue)") }
            }
        }
        var s = Score()
        s.points = 10
        print(s.points)
    "#;
    assert_eq!(run(source), "will 10\ndid 0\n10\n");
}

#[test]
fn test_observer_reentry_does_not_recurse() {
    // The didSet clamps the value; the write from inside the observer must
    // not re-trigger it.
    let source = r#"
        class Clamped {
            var value: Int = 0 {
                didSet {
                    if value > 10 {
                        value = 10
                    }
                }
            }
        }
        var c = Clamped()
        c.value = 99
        print(c.value)
    "#;
    assert_eq!(run(source), "10\n");
}

// --- Structs ---

#[test]
fn test_spec_scenario_struct_copy() {
    let source = r#"
        struct P { var x: Int = 0; var y: Int = 0 }
        var a = P(10, 20)
        var b = a
        b.x = 99
        print(a.x)
        print(b.x)
    "#;
    assert_eq!(run(source), "10\n99\n");
}

#[test]
fn test_nested_struct_copy_is_transitive() {
    let source = r#"
        struct Inner { var n: Int = 1 }
        struct Outer { var inner: Inner = Inner() }
        var a = Outer()
        var b = a
        b.inner.n = 42
        print(a.inner.n)
        print(b.inner.n)
    "#;
    assert_eq!(run(source), "1\n42\n");
}

#[test]
fn test_struct_memberwise_and_custom_init() {
    let source = r#"
        struct Rect {
            var width: Int = 0
            var height: Int = 0
            init(size: Int) {
                width = size
                height = size
            }
        }
        let r = Rect(5)
        print(r.width)
        print(r.height)
    "#;
    assert_eq!(run(source), "5\n5\n");
}

#[test]
fn test_mutating_method_updates_caller() {
    let source = r#"
        struct Counter {
            var count: Int = 0
            mutating func increment() { count = count + 1 }
        }
        var c = Counter()
        c.increment()
        c.increment()
        print(c.count)
    "#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_non_mutating_method_sees_copy() {
    let source = r#"
        struct Circle {
            var radius: Int = 10
            func area() -> Int { return radius * radius * 3 }
        }
        print(Circle().area())
    "#;
    assert_eq!(run(source), "300\n");
}

#[test]
fn test_operator_overloading() {
    let source = r#"
        struct Vec2 {
            var x: Int = 0
            var y: Int = 0
            func +(other: Vec2) -> Vec2 {
                return Vec2(x + other.x, y + other.y)
            }
            func ==(other: Vec2) -> Bool {
                return x == other.x && y == other.y
            }
        }
        let c = Vec2(1, 2) + Vec2(3, 4)
        print(c.x)
        print(c.y)
        print(c == Vec2(4, 6))
    "#;
    assert_eq!(run(source), "4\n6\ntrue\n");
}

// --- Enums ---

#[test]
fn test_enum_interned_cases_and_printing() {
    let source = r#"
        enum Direction { case north; case south }
        var d = Direction.north
        print(d)
        print(d == Direction.north)
        print(d == Direction.south)
    "#;
    assert_eq!(run(source), "Direction.north\ntrue\nfalse\n");
}

#[test]
fn test_enum_raw_values() {
    let source = r#"
        enum Priority: Int {
            case low = 1
            case medium = 2
            case high = 3
        }
        print(Priority.high.rawValue)
    "#;
    assert_eq!(run(source), "3\n");
}

#[test]
fn test_spec_scenario_enum_switch() {
    let source = r#"
        enum R { case ok(Int); case err(String) }
        let v = R.ok(42)
        switch v {
        case .ok(let n):
            print(n)
        case .err(let s):
            print(s)
        }
    "#;
    assert_eq!(run(source), "42\n");
}

#[test]
fn test_enum_structural_equality() {
    let source = r#"
        enum R { case ok(Int); case err(String) }
        print(R.ok(1) == R.ok(1))
        print(R.ok(1) == R.ok(2))
        print(R.ok(1) == R.err("x"))
    "#;
    assert_eq!(run(source), "true\nfalse\nfalse\n");
}

#[test]
fn test_enum_associated_value_labels() {
    let source = r#"
        enum Response { case success(message: String); case failure(code: Int) }
        let r = Response.success(message: "OK")
        switch r {
        case Response.success(let msg):
            print("Success: " + msg)
        case Response.failure(let code):
            print("Error: " + String(code))
        }
    "#;
    assert_eq!(run(source), "Success: OK\n");
}

#[test]
fn test_enum_methods_and_computed_properties() {
    let source = r#"
        enum Status {
            case active
            case done
            func label() -> String {
                switch self {
                case .active:
                    return "running"
                case .done:
                    return "finished"
                }
            }
            var uppercased: String {
                return self.label() + "!"
            }
        }
        print(Status.active.label())
        print(Status.done.uppercased)
    "#;
    assert_eq!(run(source), "running\nfinished!\n");
}

// --- Protocols & extensions ---

#[test]
fn test_protocol_declaration_and_conformance_check() {
    let source = r#"
        protocol Drawable {
            func draw()
        }
        struct Circle: Drawable {
            var radius: Int = 1
            func draw() { print("circle") }
        }
        let c = Circle()
        c.draw()
        print(c is Drawable)
    "#;
    assert_eq!(run(source), "circle\ntrue\n");
}

#[test]
fn test_extension_adds_methods_and_computed_properties() {
    let source = r#"
        class Greeter {
            var name: String = "world"
            func hello() -> String { return "hi " + name }
        }
        extension Greeter {
            func loud() -> String { return hello() + "!" }
            var banner: String { return "== " + name + " ==" }
        }
        let g = Greeter()
        print(g.loud())
        print(g.banner)
    "#;
    assert_eq!(run(source), "hi world!\n== world ==\n");
}

// --- Optionals, casts, type checks ---

#[test]
fn test_optional_chain_and_unwrap() {
    let source = r#"
        class Owner { var pet: String = "cat" }
        var o = Owner()
        print(o?.pet)
        var missing = nil
        print(missing?.pet)
    "#;
    assert_eq!(run(source), "cat\nnil\n");
}

#[test]
fn test_force_unwrap_nil_errors() {
    assert!(try_run("var x = nil print(x!)").is_err());
    assert_eq!(run("var x = 3 print(x!)"), "3\n");
}

#[test]
fn test_type_checks_and_casts() {
    let source = r#"
        print(1 is Int)
        print(1 is Float)
        print("s" is String)
        print(2 as Float)
        print(2.9 as Int)
        print("s" as? Int)
    "#;
    assert_eq!(run(source), "true\nfalse\ntrue\n2\n2\nnil\n");
}

#[test]
fn test_forced_cast_failure_errors() {
    assert!(try_run("print(\"s\" as! Int)").is_err());
}

#[test]
fn test_class_chain_type_check() {
    let source = r#"
        class Animal {}
        class Dog: Animal {}
        let d = Dog()
        print(d is Dog)
        print(d is Animal)
        print(Animal() is Dog)
    "#;
    assert_eq!(run(source), "true\ntrue\nfalse\n");
}

// --- Errors ---

#[test]
fn test_throw_unwinds_to_embedder() {
    let result = try_run(r#"throw "boom""#);
    match result {
        Err(SwiftScriptError::Runtime(err)) => {
            assert!(err.to_string().contains("boom"));
        }
        other => panic!("expected runtime error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_let_reassignment_is_compile_error() {
    assert!(matches!(
        try_run("let x = 1 x = 2"),
        Err(SwiftScriptError::Compile(_))
    ));
    assert!(matches!(
        try_run("func f() { let x = 1 x = 2 } f()"),
        Err(SwiftScriptError::Compile(_))
    ));
}

// --- Generics ---

#[test]
fn test_generic_struct_monomorphization() {
    let source = r#"
        struct Pair<T, U> {
            var first: T
            var second: U
        }
        let p = Pair<Int, String>(1, "one")
        print(p.first)
        print(p.second)
    "#;
    assert_eq!(run(source), "1\none\n");
}

#[test]
fn test_generic_function() {
    let source = r#"
        func identity<T>(_ value: T) -> T { return value }
        print(identity<Int>(5))
        print(identity<String>("five"))
    "#;
    assert_eq!(run(source), "5\nfive\n");
}

#[test]
fn test_generic_constraint_enforced() {
    let source = r#"
        protocol Printable {}
        struct Plain {}
        func show<T: Printable>(_ value: T) { print(value) }
        show<Plain>(Plain())
    "#;
    assert!(matches!(
        try_run(source),
        Err(SwiftScriptError::Compile(_))
    ));
}

#[test]
fn test_generic_constraint_satisfied() {
    let source = r#"
        protocol Printable {}
        struct Nice: Printable { var n: Int = 7 }
        func show<T: Printable>(_ value: T) { print("shown") }
        show<Nice>(Nice())
    "#;
    assert_eq!(run(source), "shown\n");
}

// --- Lazy ---

#[test]
fn test_lazy_property_initializes_on_first_read() {
    let source = r#"
        var computed = 0
        func expensive() -> Int {
            computed = computed + 1
            return 42
        }
        class Config { lazy var value: Int = expensive() }
        var c = Config()
        print(computed)
        print(c.value)
        print(computed)
        print(c.value)
        print(computed)
    "#;
    assert_eq!(run(source), "0\n42\n1\n42\n1\n");
}

// --- Serialization ---

#[test]
fn test_serialized_assembly_runs_identically() {
    let source = r#"
        struct P { var x: Int = 0; var y: Int = 0 }
        enum R { case ok(Int); case err(String) }
        func fib(_ n: Int) -> Int {
            if n < 2 { return n }
            return fib(n - 1) + fib(n - 2)
        }
        var a = P(10, 20)
        var b = a
        b.x = 99
        print(a.x)
        print(fib(12))
        let v = R.ok(7)
        switch v {
        case .ok(let n):
            print(n)
        case .err(let s):
            print(s)
        }
        print("done \(1...0)")
    "#;

    let assembly =
        crate::compile_source(source, None, &BuildOptions::default()).expect("compile");

    let mut direct = Vm::with_config(VmConfig {
        capture_output: true,
    });
    direct.interpret(assembly.clone()).expect("direct run");

    let bytes = assembly.serialize();
    let restored = Assembly::deserialize(&bytes).expect("deserialize");
    let mut roundtrip = Vm::with_config(VmConfig {
        capture_output: true,
    });
    roundtrip.interpret(restored).expect("roundtrip run");

    assert_eq!(direct.captured_output(), roundtrip.captured_output());
}

// --- Imports ---

#[test]
fn test_import_resolves_and_dedups() {
    let dir = std::env::temp_dir().join(format!("ss_import_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("Util.ss"),
        "func helper() -> Int { return 99 }\nprint(\"loaded\")\n",
    )
    .unwrap();
    let main = dir.join("main.ss");
    std::fs::write(
        &main,
        "import Util\nimport Util\nprint(helper())\n",
    )
    .unwrap();

    let source = std::fs::read_to_string(&main).unwrap();
    let assembly =
        crate::compile_source(&source, Some(&main), &BuildOptions::default()).expect("compile");
    let mut vm = Vm::with_config(VmConfig {
        capture_output: true,
    });
    vm.interpret(assembly).expect("run");
    // The module body executes once despite the duplicate import.
    assert_eq!(vm.captured_output(), "loaded\n99\n");

    let _ = std::fs::remove_dir_all(&dir);
}

// --- Embedding ---

#[test]
fn test_registered_native_callable_from_script() {
    fn double(_vm: &mut Vm, args: &[crate::vm::Value]) -> Result<crate::vm::Value, crate::error::RuntimeError> {
        match args.first() {
            Some(crate::vm::Value::Int(n)) => Ok(crate::vm::Value::Int(n * 2)),
            _ => Ok(crate::vm::Value::Nil),
        }
    }

    let assembly =
        crate::compile_source("print(double(21))", None, &BuildOptions::default())
            .expect("compile");
    let mut vm = Vm::with_config(VmConfig {
        capture_output: true,
    });
    vm.register_native("double", double);
    vm.interpret(assembly).expect("run");
    assert_eq!(vm.captured_output(), "42\n");
}

#[test]
fn test_builtin_conversion_natives() {
    assert_eq!(run("print(String(42) + \"!\")"), "42!\n");
    assert_eq!(run("print(Int(\"17\") + 1)"), "18\n");
    assert_eq!(run("print(Float(3))"), "3\n");
    assert_eq!(run("print(Int(\"nope\"))"), "nil\n");
}

// --- Debugging ---

#[test]
fn test_breakpoint_captures_frame_at_line() {
    let source = "var a = 1\nvar b = 2\nprint(a + b)\n";
    let assembly = crate::compile_source(
        source,
        None,
        &BuildOptions {
            type_check: false,
            emit_debug: true,
        },
    )
    .expect("compile");

    let controller = Arc::new(DebugController::new());
    controller.add_breakpoint("", 2);

    let mut vm = Vm::with_config(VmConfig {
        capture_output: true,
    });
    vm.attach_debugger(controller.clone());
    vm.interpret(assembly).expect("run");

    assert_eq!(vm.captured_output(), "3\n");
    let trace = controller.stack_trace();
    assert!(!trace.is_empty());
    assert_eq!(trace[0].line, 2);
    assert_eq!(trace[0].function_name, "<script>");
}
