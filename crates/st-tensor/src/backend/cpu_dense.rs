// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rayon::prelude::*;

/// Below this many multiply-adds the rayon split costs more than it saves.
const PARALLEL_MIN_WORK: usize = 1 << 15;

#[inline]
fn accumulate_row(dst_row: &mut [f32], lhs_row: &[f32], rhs: &[f32], cols: usize) {
    for (k, &a) in lhs_row.iter().enumerate() {
        let rhs_row = &rhs[k * cols..(k + 1) * cols];
        for (out, &b) in dst_row.iter_mut().zip(rhs_row.iter()) {
            *out += a * b;
        }
    }
}

/// `dst += lhs @ rhs` on a single thread. `dst` is `rows x cols`.
pub fn matmul_sequential(
    dst: &mut [f32],
    lhs: &[f32],
    rhs: &[f32],
    rows: usize,
    inner: usize,
    cols: usize,
) {
    debug_assert_eq!(lhs.len(), rows * inner);
    debug_assert_eq!(rhs.len(), inner * cols);
    debug_assert_eq!(dst.len(), rows * cols);
    for (dst_row, lhs_row) in dst.chunks_mut(cols).zip(lhs.chunks(inner)) {
        accumulate_row(dst_row, lhs_row, rhs, cols);
    }
}

/// `dst += lhs @ rhs` with output rows spread over the rayon pool.
///
/// Every output row is reduced in the same order as the sequential kernel so
/// both paths produce bit-identical results.
pub fn matmul_parallel(
    dst: &mut [f32],
    lhs: &[f32],
    rhs: &[f32],
    rows: usize,
    inner: usize,
    cols: usize,
) {
    if rows < 2 || rows * inner * cols < PARALLEL_MIN_WORK {
        matmul_sequential(dst, lhs, rhs, rows, inner, cols);
        return;
    }
    dst.par_chunks_mut(cols)
        .zip(lhs.par_chunks(inner))
        .for_each(|(dst_row, lhs_row)| accumulate_row(dst_row, lhs_row, rhs, cols));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_matches_manual_product() {
        let lhs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rhs = [1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut dst = [0.0f32; 4];
        matmul_sequential(&mut dst, &lhs, &rhs, 2, 3, 2);
        assert_eq!(dst, [4.0, 5.0, 10.0, 11.0]);
    }

    #[test]
    fn parallel_is_bit_identical_to_sequential() {
        let rows = 64;
        let inner = 48;
        let cols = 40;
        let lhs: Vec<f32> = (0..rows * inner).map(|i| ((i % 13) as f32 - 6.0) * 0.17).collect();
        let rhs: Vec<f32> = (0..inner * cols).map(|i| ((i % 7) as f32 - 3.0) * 0.31).collect();
        let mut seq = vec![0.0f32; rows * cols];
        let mut par = vec![0.0f32; rows * cols];
        matmul_sequential(&mut seq, &lhs, &rhs, rows, inner, cols);
        matmul_parallel(&mut par, &lhs, &rhs, rows, inner, cols);
        assert_eq!(seq, par);
    }
}
