// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Ranking quality: Hit@K and MRR@K.

use std::cmp::Ordering;

use st_tensor::{PureResult, Tensor, TensorError};

fn rank_key(value: f32) -> f32 {
    if value.is_nan() {
        f32::NEG_INFINITY
    } else {
        value
    }
}

fn by_score_desc(row: &[f32], a: usize, b: usize) -> Ordering {
    rank_key(row[b])
        .total_cmp(&rank_key(row[a]))
        .then(a.cmp(&b))
}

/// Indices of the `k` largest entries, best first. Ties keep the lower index
/// first and NaN ranks below every number.
pub fn top_k_indices(row: &[f32], k: usize) -> Vec<usize> {
    let k = k.min(row.len());
    if k == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..row.len()).collect();
    if k < order.len() {
        order.select_nth_unstable_by(k - 1, |&a, &b| by_score_desc(row, a, b));
        order.truncate(k);
    }
    order.sort_unstable_by(|&a, &b| by_score_desc(row, a, b));
    order
}

/// Running Hit@K / MRR@K accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingMetrics {
    k: usize,
    sessions: usize,
    hits: usize,
    reciprocal_rank_sum: f64,
}

impl RankingMetrics {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            sessions: 0,
            hits: 0,
            reciprocal_rank_sum: 0.0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Records one ranked list against a 0-indexed target column.
    pub fn observe(&mut self, ranked: &[usize], target: usize) {
        self.sessions += 1;
        if let Some(rank) = ranked.iter().take(self.k).position(|&idx| idx == target) {
            self.hits += 1;
            self.reciprocal_rank_sum += 1.0 / (rank as f64 + 1.0);
        }
    }

    /// Ranks every row of `scores` and records it against 1-indexed `targets`.
    pub fn observe_scores(&mut self, scores: &Tensor, targets: &[usize]) -> PureResult<()> {
        if targets.len() != scores.rows() {
            return Err(TensorError::DataLength {
                expected: scores.rows(),
                got: targets.len(),
            });
        }
        for (row, &target) in scores.data().chunks(scores.cols()).zip(targets.iter()) {
            let ranked = top_k_indices(row, self.k);
            match target.checked_sub(1) {
                Some(column) => self.observe(&ranked, column),
                None => {
                    return Err(TensorError::IndexOutOfBounds {
                        label: "ranking_target",
                        index: target,
                        len: scores.cols() + 1,
                    })
                }
            }
        }
        Ok(())
    }

    /// Folds another accumulator with the same `k` into this one.
    pub fn merge(&mut self, other: &RankingMetrics) {
        self.sessions += other.sessions;
        self.hits += other.hits;
        self.reciprocal_rank_sum += other.reciprocal_rank_sum;
    }

    pub fn sessions(&self) -> usize {
        self.sessions
    }

    /// Hit@K as a percentage.
    pub fn hit_rate(&self) -> f32 {
        if self.sessions == 0 {
            return 0.0;
        }
        (self.hits as f64 / self.sessions as f64 * 100.0) as f32
    }

    /// MRR@K as a percentage.
    pub fn mrr(&self) -> f32 {
        if self.sessions == 0 {
            return 0.0;
        }
        (self.reciprocal_rank_sum / self.sessions as f64 * 100.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn top_k_orders_best_first_with_stable_ties() {
        let row = [0.1, 0.9, 0.5, 0.9, f32::NAN, -1.0];
        assert_eq!(top_k_indices(&row, 3), vec![1, 3, 2]);
        assert_eq!(top_k_indices(&row, 10), vec![1, 3, 2, 0, 5, 4]);
        assert!(top_k_indices(&row, 0).is_empty());
    }

    #[test]
    fn reciprocal_rank_uses_position_in_list() {
        let mut metrics = RankingMetrics::new(3);
        metrics.observe(&[4, 2, 7], 4);
        metrics.observe(&[4, 2, 7], 7);
        metrics.observe(&[4, 2, 7], 1);
        metrics.observe(&[4, 2, 7, 1], 1);
        assert_eq!(metrics.sessions(), 4);
        assert_abs_diff_eq!(metrics.hit_rate(), 50.0, epsilon = 1e-4);
        let expected = (1.0 + 1.0 / 3.0) / 4.0 * 100.0;
        assert_abs_diff_eq!(metrics.mrr(), expected as f32, epsilon = 1e-4);
    }

    #[test]
    fn forced_top_scores_give_full_marks() {
        let scores = Tensor::from_vec(2, 4, vec![0.0, 5.0, 1.0, 2.0, 9.0, 0.0, 0.0, 0.0]).unwrap();
        let mut metrics = RankingMetrics::new(20);
        metrics.observe_scores(&scores, &[2, 1]).unwrap();
        assert_abs_diff_eq!(metrics.hit_rate(), 100.0);
        assert_abs_diff_eq!(metrics.mrr(), 100.0);
        assert!(metrics.observe_scores(&scores, &[0, 1]).is_err());
    }

    #[test]
    fn merge_combines_counts() {
        let mut a = RankingMetrics::new(2);
        a.observe(&[0, 1], 0);
        let mut b = RankingMetrics::new(2);
        b.observe(&[0, 1], 3);
        a.merge(&b);
        assert_eq!(a.sessions(), 2);
        assert_abs_diff_eq!(a.hit_rate(), 50.0);
        assert_eq!(RankingMetrics::new(5).mrr(), 0.0);
    }
}
