//! Bridge Overhead Benchmarks
//!
//! Value conversion, function dispatch through a module, and in-place
//! array mutation.

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serpent_bridge::{ArrayView, BridgeConfig, DynamicValue, FromDynamic, ToDynamic};
use serpent_testmodule::{basic_module, numpy_module};

// ============================================================================
// Value Conversion
// ============================================================================

fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion");

    for size in [16usize, 256, 4096] {
        let items: Vec<i64> = (0..size as i64).collect();
        let dynamic = items.to_dynamic();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("to_dynamic", size), &items, |b, items| {
            b.iter(|| black_box(items.to_dynamic()))
        });
        group.bench_with_input(BenchmarkId::new("from_dynamic", size), &dynamic, |b, value| {
            b.iter(|| black_box(Vec::<i64>::from_dynamic(value)))
        });
    }

    let map: HashMap<String, i64> = (0..64).map(|i| (format!("key{}", i), i)).collect();
    let dynamic = map.to_dynamic();
    group.bench_function("mapping_from_dynamic", |b| {
        b.iter(|| black_box(HashMap::<String, i64>::from_dynamic(&dynamic)))
    });

    group.finish();
}

// ============================================================================
// Dispatch
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let module = match basic_module(BridgeConfig::default()) {
        Ok(module) => module,
        Err(e) => panic!("failed to build module: {}", e),
    };

    group.bench_function("FunctionReturnInt", |b| {
        b.iter(|| black_box(module.call("FunctionReturnInt", vec![DynamicValue::int(42)])))
    });
    group.bench_function("FunctionReturnError", |b| {
        b.iter(|| black_box(module.call("FunctionReturnError", vec![DynamicValue::int(42)])))
    });

    let list = (0..100i64).collect::<Vec<_>>().to_dynamic();
    group.bench_function("FunctionListArgument", |b| {
        b.iter(|| black_box(module.call("FunctionListArgument", vec![list.clone()])))
    });

    group.bench_function("ExportedType_Add", |b| {
        let object = module
            .call("NewExportedType", vec![DynamicValue::int(0)])
            .ok()
            .and_then(|value| value.as_object().cloned());
        let Some(object) = object else {
            panic!("NewExportedType did not return an object");
        };
        b.iter(|| black_box(object.invoke("Add", vec![DynamicValue::int(1)], Default::default())))
    });

    group.finish();
}

// ============================================================================
// Arrays
// ============================================================================

fn bench_add_int_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_int_value");
    let module = match numpy_module(BridgeConfig::default()) {
        Ok(module) => module,
        Err(e) => panic!("failed to build module: {}", e),
    };

    for size in [64usize, 4096, 262_144] {
        group.throughput(Throughput::Elements(size as u64));

        let Ok(contiguous) = ArrayView::from_vec(vec![0i32; size], vec![size]) else {
            panic!("invalid array");
        };
        group.bench_with_input(BenchmarkId::new("int32", size), &contiguous, |b, array| {
            b.iter(|| {
                black_box(module.call(
                    "AddIntValue",
                    vec![DynamicValue::Array(array.clone()), DynamicValue::int(1)],
                ))
            })
        });

        let Ok(square) = ArrayView::from_vec(vec![0.0f64; size], vec![size / 8, 8]) else {
            panic!("invalid array");
        };
        let transposed = square.transpose();
        group.bench_with_input(
            BenchmarkId::new("float64_transposed", size),
            &transposed,
            |b, array| {
                b.iter(|| {
                    black_box(module.call(
                        "AddIntValue",
                        vec![DynamicValue::Array(array.clone()), DynamicValue::int(1)],
                    ))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_conversion, bench_dispatch, bench_add_int_value);
criterion_main!(benches);
