//! Benchmarks the front-end over a synthetic module: lex+parse alone, and
//! the full parse → semantic pass → check pipeline.

use criterion::{criterion_group, criterion_main, Criterion};
use hlb::{Context, ParseOptions};

fn synthetic_module(funcs: usize) -> String {
    let mut src = String::new();
    for i in 0..funcs {
        src.push_str(&format!(
            "fs build{i}(string ref) {{\n\timage ref\n\trun \"make\" with option::run {{\n\t\tdir \"/src\"\n\t\tenv \"STAGE\" \"{i}\"\n\t}}\n}}\n\n"
        ));
    }
    src
}

fn parse_benchmark(c: &mut Criterion) {
    let src = synthetic_module(100);

    c.bench_function("parse_100_funcs", |b| {
        b.iter(|| {
            let ctx = Context::default();
            hlb::parse_str(&ctx, &src, ParseOptions::with_filename("bench.hlb")).unwrap()
        })
    });

    c.bench_function("parse_and_check_100_funcs", |b| {
        b.iter(|| {
            let ctx = Context::default();
            let module =
                hlb::parse_str(&ctx, &src, ParseOptions::with_filename("bench.hlb")).unwrap();
            hlb::semantic_pass(&module).unwrap();
            hlb::check(&module).unwrap();
        })
    });
}

criterion_group!(benches, parse_benchmark);
criterion_main!(benches);
