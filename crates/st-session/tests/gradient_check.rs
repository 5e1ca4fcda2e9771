// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Central finite differences against the hand-written backward passes.

use std::collections::HashMap;

use st_nn::{Parameterised, SoftmaxCrossEntropy};
use st_session::{BatchSource, SessionBatch, SessionData, SessionGraph, SessionGraphConfig};
use st_tensor::Tensor;

const EPS: f32 = 1e-2;

fn loss_of(model: &SessionGraph, batch: &SessionBatch) -> f32 {
    let (scores, _) = model.forward_batch(batch).unwrap();
    let classes: Vec<usize> = batch.targets().iter().map(|t| t - 1).collect();
    SoftmaxCrossEntropy::new()
        .forward_classes(&scores, &classes)
        .unwrap()
}

fn analytic_gradients(model: &mut SessionGraph, batch: &SessionBatch) -> HashMap<String, Tensor> {
    model.zero_accumulators().unwrap();
    let (scores, trace) = model.forward_batch(batch).unwrap();
    let classes: Vec<usize> = batch.targets().iter().map(|t| t - 1).collect();
    let grad = SoftmaxCrossEntropy::new()
        .backward_classes(&scores, &classes)
        .unwrap();
    model.backward_batch(&trace, &grad).unwrap();
    let mut grads = HashMap::new();
    model
        .visit_parameters(&mut |param| {
            // Gate weights are untouched when propagation is skipped.
            let grad = match param.gradient() {
                Some(grad) => grad.clone(),
                None => {
                    let (rows, cols) = param.value().shape();
                    Tensor::zeros(rows, cols)?
                }
            };
            grads.insert(param.name().to_string(), grad);
            Ok(())
        })
        .unwrap();
    grads
}

fn nudge(model: &mut SessionGraph, name: &str, index: usize, delta: f32) {
    model
        .visit_parameters_mut(&mut |param| {
            if param.name() == name {
                param.value_mut().data_mut()[index] += delta;
            }
            Ok(())
        })
        .unwrap();
}

fn check(step: usize) {
    let config = SessionGraphConfig::new(6)
        .with_hidden_size(3)
        .with_step(step)
        .with_seed(7);
    let mut model = SessionGraph::new(&config).unwrap();
    let data = SessionData::new(vec![vec![1, 2, 1, 3], vec![4, 5]], vec![2, 3], false).unwrap();
    let batch = data.get_slice(&[0, 1]).unwrap();

    let grads = analytic_gradients(&mut model, &batch);
    assert_eq!(grads.len(), 18);
    for (name, grad) in &grads {
        let len = grad.len();
        for index in [0, len / 2, len - 1] {
            nudge(&mut model, name, index, EPS);
            let up = loss_of(&model, &batch);
            nudge(&mut model, name, index, -2.0 * EPS);
            let down = loss_of(&model, &batch);
            nudge(&mut model, name, index, EPS);
            let numeric = (up - down) / (2.0 * EPS);
            let analytic = grad.data()[index];
            let tolerance = 2e-3 + 5e-2 * numeric.abs();
            assert!(
                (analytic - numeric).abs() <= tolerance,
                "{name}[{index}] (step {step}): analytic {analytic} vs numeric {numeric}"
            );
        }
    }
}

#[test]
fn gradients_match_finite_differences_single_step() {
    check(1);
}

#[test]
fn gradients_match_finite_differences_multi_step() {
    check(2);
}

#[test]
fn gradients_match_finite_differences_without_propagation() {
    check(0);
}
