// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use st_tensor::backend::cpu_dense;
use st_tensor::Tensor;

#[track_caller]
fn unwrap_ok<T, E: core::fmt::Debug>(context: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{context}: {error:?}"),
    }
}

fn operands(rows: usize, inner: usize, cols: usize) -> (Tensor, Tensor) {
    let lhs = unwrap_ok(
        "lhs initialiser failed",
        Tensor::random_uniform(rows, inner, -1.0, 1.0, Some(3)),
    );
    let rhs = unwrap_ok(
        "rhs initialiser failed",
        Tensor::random_uniform(inner, cols, -1.0, 1.0, Some(5)),
    );
    (lhs, rhs)
}

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_dense_matmul");
    // Session-sized products (T x 2d against 2d x 3d) and the scoring product.
    for &(rows, inner, cols) in &[(16, 200, 300), (100, 100, 512), (256, 256, 256)] {
        let (lhs, rhs) = operands(rows, inner, cols);
        let label = format!("{rows}x{inner}x{cols}");
        group.bench_with_input(BenchmarkId::new("sequential", &label), &(), |b, _| {
            b.iter_batched(
                || vec![0.0f32; rows * cols],
                |mut dst| {
                    cpu_dense::matmul_sequential(
                        &mut dst,
                        lhs.data(),
                        rhs.data(),
                        rows,
                        inner,
                        cols,
                    );
                    black_box(dst)
                },
                BatchSize::SmallInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("parallel", &label), &(), |b, _| {
            b.iter_batched(
                || vec![0.0f32; rows * cols],
                |mut dst| {
                    cpu_dense::matmul_parallel(
                        &mut dst,
                        lhs.data(),
                        rhs.data(),
                        rows,
                        inner,
                        cols,
                    );
                    black_box(dst)
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_tensor_matmul(c: &mut Criterion) {
    let (lhs, rhs) = operands(100, 100, 1024);
    c.bench_function("tensor_matmul_active_backend", |b| {
        b.iter(|| black_box(unwrap_ok("matmul failed", lhs.matmul(&rhs))));
    });
}

criterion_group!(benches, bench_kernels, bench_tensor_matmul);
criterion_main!(benches);
