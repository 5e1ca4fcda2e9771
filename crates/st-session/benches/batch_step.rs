// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use st_session::{BatchSource, SessionData, SessionGraph, SessionGraphConfig, SessionTrainer};

#[track_caller]
fn unwrap_ok<T, E: core::fmt::Debug>(context: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{context}: {error:?}"),
    }
}

const N_NODE: usize = 1_000;

fn synthetic_sessions(count: usize, seed: u64) -> SessionData {
    let mut rng = StdRng::seed_from_u64(seed);
    let sequences = (0..count)
        .map(|_| {
            let len = rng.gen_range(1..=12);
            (0..len).map(|_| rng.gen_range(1..N_NODE)).collect()
        })
        .collect();
    let targets = (0..count).map(|_| rng.gen_range(1..N_NODE)).collect();
    unwrap_ok("synthetic data", SessionData::new(sequences, targets, false))
}

fn config() -> SessionGraphConfig {
    SessionGraphConfig::new(N_NODE)
        .with_hidden_size(64)
        .with_batch_size(32)
        .with_seed(1)
}

fn bench_forward(c: &mut Criterion) {
    let data = synthetic_sessions(32, 3);
    let batch = unwrap_ok("batch", data.get_slice(&(0..32).collect::<Vec<_>>()));
    let model = unwrap_ok("model", SessionGraph::new(&config()));
    c.bench_function("session_graph_forward_b32_h64", |b| {
        b.iter(|| black_box(unwrap_ok("forward", model.scores(&batch))));
    });
}

fn bench_train_step(c: &mut Criterion) {
    let data = synthetic_sessions(32, 4);
    let batch = unwrap_ok("batch", data.get_slice(&(0..32).collect::<Vec<_>>()));
    c.bench_function("session_graph_train_step_b32_h64", |b| {
        b.iter_batched(
            || unwrap_ok("trainer", SessionTrainer::new(config())),
            |mut trainer| black_box(unwrap_ok("train", trainer.train_batch(&batch))),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_forward, bench_train_step);
criterion_main!(benches);
