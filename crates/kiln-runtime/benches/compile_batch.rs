use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiln_runtime::InMemoryCompiler;

fn unit_source(i: usize) -> String {
    format!(
        "class Unit{i} {{
            fn step(x) = if x % 2 == 0 then x / 2 else 3 * x + 1;
            fn run(x, n) = if n == 0 then x else run(step(x), n - 1);
            fn clamp(x) = Math.clamp(x, 0, 1000);
            class Inner {{ fn id(x) = x; }}
        }}"
    )
}

fn bench_compile_and_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_and_load");

    for count in [1usize, 10, 50] {
        let sources: Vec<(String, String)> = (0..count)
            .map(|i| (format!("bench.Unit{}", i), unit_source(i)))
            .collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("units", count), &sources, |b, sources| {
            b.iter(|| {
                let mut compiler = InMemoryCompiler::new();
                for (name, text) in sources {
                    compiler.add_source(name, text);
                }
                let handle = compiler.get_class(black_box("bench.Unit0")).unwrap();
                black_box(handle)
            });
        });
    }

    group.finish();
}

fn bench_invoke(c: &mut Criterion) {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("bench.Unit0", &unit_source(0));
    let unit = compiler.get_class("bench.Unit0").unwrap();

    c.bench_function("invoke_run_100", |b| {
        b.iter(|| unit.invoke("run", &[black_box(27), 100]).unwrap());
    });
}

criterion_group!(benches, bench_compile_and_load, bench_invoke);

criterion_main!(benches);
