//! 布料构建和 CPU 阶段模拟的性能基准测试

use cloth_sim::cloth::{build_constraint_graph, initial_particles, triangle_indices, GridDims, StageEmulator};
use cloth_sim::config::{ClothConfig, SolverConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

fn bench_constraint_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_graph");

    for size in [16u32, 64, 256].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dims = GridDims::new(size, size).unwrap();
            let particles = initial_particles(dims).unwrap();
            b.iter(|| black_box(build_constraint_graph(dims, &particles).unwrap()));
        });
    }

    group.finish();
}

fn bench_graph_validation(c: &mut Criterion) {
    let dims = GridDims::new(128, 128).unwrap();
    let graph = build_constraint_graph(dims, &initial_particles(dims).unwrap()).unwrap();

    c.bench_function("graph_validate_128", |b| {
        b.iter(|| black_box(graph.validate().is_ok()));
    });
}

fn bench_triangle_indices(c: &mut Criterion) {
    let dims = GridDims::new(256, 256).unwrap();
    c.bench_function("triangle_indices_256", |b| {
        b.iter(|| black_box(triangle_indices(dims)));
    });
}

fn bench_emulator_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("emulator_step");

    for size in [16u32, 32, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut sim =
                StageEmulator::new(&ClothConfig::with_grid(size, size), &SolverConfig::default())
                    .unwrap();
            b.iter(|| sim.step().unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_constraint_graph,
    bench_graph_validation,
    bench_triangle_indices,
    bench_emulator_step
);
criterion_main!(benches);
