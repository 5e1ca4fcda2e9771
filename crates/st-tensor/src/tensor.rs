// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::backend;
use crate::error::{PureResult, TensorError};

/// Dense row-major `f32` matrix.
///
/// Every constructor rejects zero-sized axes so downstream kernels never have
/// to special-case empty buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Tensor {
    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        Self::from_vec(rows, cols, vec![0.0; rows * cols])
    }

    /// Create a tensor from raw row-major data. The vector must hold
    /// `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let expected = rows * cols;
        if data.len() != expected {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Construct a tensor by applying a generator function to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::from_vec(rows, cols, data)
    }

    /// Construct a tensor by sampling `[min, max)` uniformly.
    ///
    /// When `seed` is provided the stream is reproducible; otherwise it comes
    /// from the deterministic runtime configuration.
    pub fn random_uniform(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let mut rng = spiral_config::rng_for(seed, "st-tensor/tensor/uniform");
        Self::random_uniform_with(rows, cols, min, max, &mut rng)
    }

    /// Uniform sampling from a caller-owned RNG so several tensors can share
    /// one stream.
    pub fn random_uniform_with<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        rng: &mut R,
    ) -> PureResult<Self> {
        if !(min < max) {
            return Err(TensorError::InvalidValue {
                label: "random_uniform_bounds",
            });
        }
        let distribution = Uniform::new(min, max);
        let data = (0..rows * cols).map(|_| distribution.sample(rng)).collect();
        Self::from_vec(rows, cols, data)
    }

    /// Returns the `(rows, cols)` pair of the tensor.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major view over the elements.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor and returns its row-major buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Borrows a single row.
    pub fn row(&self, row: usize) -> PureResult<&[f32]> {
        if row >= self.rows {
            return Err(TensorError::IndexOutOfBounds {
                label: "row",
                index: row,
                len: self.rows,
            });
        }
        Ok(&self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Mutably borrows a single row.
    pub fn row_mut(&mut self, row: usize) -> PureResult<&mut [f32]> {
        if row >= self.rows {
            return Err(TensorError::IndexOutOfBounds {
                label: "row",
                index: row,
                len: self.rows,
            });
        }
        Ok(&mut self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Matrix multiply (`self @ other`) on the active compute backend.
    pub fn matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut out = Tensor::zeros(self.rows, other.cols)?;
        backend::active().matmul_accumulate(
            &mut out.data,
            &self.data,
            &other.data,
            self.rows,
            self.cols,
            other.cols,
        );
        Ok(out)
    }

    /// `self @ other^T`, the layout used by `x W^T` style projections.
    pub fn matmul_transposed(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.cols {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        self.matmul(&other.transpose())
    }

    /// `self^T @ other`, the layout produced by weight gradients.
    pub fn transpose_matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.rows != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        self.transpose().matmul(other)
    }

    fn guard_same_shape(&self, other: &Tensor) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_map(other, |a, b| a + b)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Element-wise product (Hadamard) between two tensors of identical shape.
    pub fn hadamard(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_map(other, |a, b| a * b)
    }

    /// Returns a new tensor where every element is scaled by `value`.
    pub fn scale(&self, value: f32) -> Tensor {
        self.map(|a| a * value)
    }

    /// Applies `f` to every element.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            data: self.data.iter().map(|&a| f(a)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Combines two equally shaped tensors element by element.
    pub fn zip_map<F>(&self, other: &Tensor, f: F) -> PureResult<Tensor>
    where
        F: Fn(f32, f32) -> f32,
    {
        self.guard_same_shape(other)?;
        Ok(Tensor {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            rows: self.rows,
            cols: self.cols,
        })
    }

    /// Add a scaled tensor to this tensor (`self += scale * other`).
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> PureResult<()> {
        self.guard_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += scale * b;
        }
        Ok(())
    }

    /// Add the provided row vector to every row (`self[row] += bias`).
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> PureResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        for row in self.data.chunks_mut(self.cols) {
            for (value, b) in row.iter_mut().zip(bias.iter()) {
                *value += b;
            }
        }
        Ok(())
    }

    /// Returns the transpose of the tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0; self.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            data,
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Returns the sum over rows for each column.
    pub fn sum_axis0(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for row in self.data.chunks(self.cols) {
            for (sum, value) in sums.iter_mut().zip(row.iter()) {
                *sum += value;
            }
        }
        sums
    }

    /// Returns the sum over columns for each row.
    pub fn sum_axis1(&self) -> Vec<f32> {
        self.data
            .chunks(self.cols)
            .map(|row| row.iter().sum())
            .collect()
    }

    /// Copies `width` columns starting at `start`.
    pub fn narrow_cols(&self, start: usize, width: usize) -> PureResult<Tensor> {
        if width == 0 || start + width > self.cols {
            return Err(TensorError::IndexOutOfBounds {
                label: "narrow_cols",
                index: start + width,
                len: self.cols,
            });
        }
        let mut data = Vec::with_capacity(self.rows * width);
        for row in self.data.chunks(self.cols) {
            data.extend_from_slice(&row[start..start + width]);
        }
        Tensor::from_vec(self.rows, width, data)
    }

    /// Copies rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> PureResult<Tensor> {
        if start >= end || end > self.rows {
            return Err(TensorError::IndexOutOfBounds {
                label: "slice_rows",
                index: end,
                len: self.rows,
            });
        }
        Tensor::from_vec(
            end - start,
            self.cols,
            self.data[start * self.cols..end * self.cols].to_vec(),
        )
    }

    /// Concatenates tensors column-wise; every input must share the row count.
    pub fn cat_cols(tensors: &[&Tensor]) -> PureResult<Tensor> {
        let first = tensors.first().ok_or(TensorError::EmptyInput("Tensor::cat_cols"))?;
        let rows = first.rows;
        let mut cols = 0usize;
        for tensor in tensors {
            if tensor.rows != rows {
                return Err(TensorError::ShapeMismatch {
                    left: first.shape(),
                    right: tensor.shape(),
                });
            }
            cols += tensor.cols;
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for tensor in tensors {
                data.extend_from_slice(&tensor.data[r * tensor.cols..(r + 1) * tensor.cols]);
            }
        }
        Tensor::from_vec(rows, cols, data)
    }

    /// Concatenates tensors row-wise; every input must share the column count.
    pub fn cat_rows(tensors: &[Tensor]) -> PureResult<Tensor> {
        let first = tensors.first().ok_or(TensorError::EmptyInput("Tensor::cat_rows"))?;
        let cols = first.cols;
        let mut rows = 0usize;
        for tensor in tensors {
            if tensor.cols != cols {
                return Err(TensorError::ShapeMismatch {
                    left: first.shape(),
                    right: tensor.shape(),
                });
            }
            rows += tensor.rows;
        }
        let mut data = Vec::with_capacity(rows * cols);
        for tensor in tensors {
            data.extend_from_slice(&tensor.data);
        }
        Tensor::from_vec(rows, cols, data)
    }

    /// Builds a tensor whose `i`-th row is `self[indices[i]]`.
    pub fn gather_rows(&self, indices: &[usize]) -> PureResult<Tensor> {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &index in indices {
            data.extend_from_slice(self.row(index)?);
        }
        Tensor::from_vec(indices.len(), self.cols, data)
    }

    /// Adds `source[i]` into `self[indices[i]]`; repeated indices accumulate.
    pub fn scatter_add_rows(&mut self, indices: &[usize], source: &Tensor) -> PureResult<()> {
        if source.cols != self.cols || source.rows != indices.len() {
            return Err(TensorError::ShapeMismatch {
                left: source.shape(),
                right: (indices.len(), self.cols),
            });
        }
        for (i, &index) in indices.iter().enumerate() {
            let src = &source.data[i * source.cols..(i + 1) * source.cols];
            for (dst, value) in self.row_mut(index)?.iter_mut().zip(src.iter()) {
                *dst += value;
            }
        }
        Ok(())
    }

    /// Computes the squared L2 norm of the tensor.
    pub fn squared_l2_norm(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Returns `true` when every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}
