//! Benchmarks for identifier assignment and dependency scheduling.
//!
//! Tests:
//! - Wide specs: many independent tables, one level
//! - Deep specs: a single self-referencing chain, one level per record

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sql_fixtures::generator::plan;
use sql_fixtures::spec_id::SpecIdGenerator;
use sql_fixtures::value::record;
use sql_fixtures::{Spec, Value};
use std::hint::black_box;

/// Tables of users, each with items pointing at their users
fn wide_spec(tables: usize, rows: usize) -> Spec {
    let mut spec = Spec::new();
    for t in 0..tables {
        let users = format!("users_{}", t);
        let items = format!("items_{}", t);
        for r in 0..rows {
            spec = spec
                .with_record(&users, record([("name", Value::from(format!("user {}", r)))]))
                .with_record(
                    &items,
                    record([
                        ("userId", Value::from(format!("{}:{}", users, r))),
                        ("label", Value::from(format!("item of {{{}:{}:name}}", users, r))),
                    ]),
                );
        }
    }
    spec
}

/// One table where every row points at the next
fn deep_spec(depth: usize) -> Spec {
    let mut spec = Spec::new();
    for r in 0..depth {
        let mut fields = record([("name", Value::from(format!("node {}", r)))]);
        if r + 1 < depth {
            fields.insert("parentId".to_string(), Value::from(format!("nodes:{}", r + 1)));
        }
        spec = spec.with_record("nodes", fields);
    }
    spec
}

fn bench_wide(c: &mut Criterion) {
    let mut group = c.benchmark_group("prioritize_wide");

    for (tables, rows) in [(10, 10), (50, 20), (100, 50)] {
        let spec = wide_spec(tables, rows);
        group.throughput(Throughput::Elements(spec.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", tables, rows)),
            &spec,
            |b, spec| {
                let ids = SpecIdGenerator::new();
                b.iter(|| plan(black_box(spec), &ids))
            },
        );
    }

    group.finish();
}

fn bench_deep(c: &mut Criterion) {
    let mut group = c.benchmark_group("prioritize_deep");
    group.sample_size(20);

    for depth in [10, 50, 200] {
        let spec = deep_spec(depth);
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &spec, |b, spec| {
            let ids = SpecIdGenerator::new();
            b.iter(|| plan(black_box(spec), &ids))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_wide, bench_deep);
criterion_main!(benches);
