//! Dispatch-loop benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use swiftscript::vm::{Vm, VmConfig};
use swiftscript::BuildOptions;

fn run(source: &str) {
    let assembly =
        swiftscript::compile_source(source, None, &BuildOptions::default()).expect("compile");
    let mut vm = Vm::with_config(VmConfig {
        capture_output: true,
    });
    vm.interpret(assembly).expect("run");
}

fn bench_arithmetic_loop(c: &mut Criterion) {
    let source = r#"
        var total = 0
        for i in 1...10000 {
            total = total + i * 2 - 1
        }
        print(total)
    "#;
    c.bench_function("arithmetic_loop", |b| b.iter(|| run(black_box(source))));
}

fn bench_fib(c: &mut Criterion) {
    let source = r#"
        func fib(_ n: Int) -> Int {
            if n < 2 { return n }
            return fib(n - 1) + fib(n - 2)
        }
        print(fib(18))
    "#;
    c.bench_function("fib_18", |b| b.iter(|| run(black_box(source))));
}

fn bench_method_dispatch(c: &mut Criterion) {
    let source = r#"
        class Accumulator {
            var total: Int = 0
            func add(_ n: Int) { total = total + n }
        }
        var acc = Accumulator()
        for i in 1...2000 {
            acc.add(i)
        }
        print(acc.total)
    "#;
    c.bench_function("method_dispatch", |b| b.iter(|| run(black_box(source))));
}

criterion_group!(benches, bench_arithmetic_loop, bench_fib, bench_method_dispatch);
criterion_main!(benches);
