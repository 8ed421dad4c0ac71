use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Serialize, Deserialize};
use std::ops::Mul;

/// Row-major dense `f32` matrix.
///
/// Activations are stored one column per batch element, so an image batch of
/// shape (N, C, H, W) is a `C*H*W x N` matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f32) -> Matrix {
        Matrix { rows, cols, data: vec![value; rows * cols] }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Matrix {
        assert_eq!(data.len(), rows * cols, "data length does not match {rows}x{cols}");
        Matrix { rows, cols, data }
    }

    /// Column vector from a slice.
    pub fn column(values: &[f32]) -> Matrix {
        Matrix::from_vec(values.len(), 1, values.to_vec())
    }

    /// Samples every entry from N(0, 1) and multiplies it by `scale`.
    pub fn randn<R: Rng + ?Sized>(rows: usize, cols: usize, scale: f32, rng: &mut R) -> Matrix {
        let data = (0..rows * cols)
            .map(|_| rng.sample::<f32, _>(StandardNormal) * scale)
            .collect();
        Matrix { rows, cols, data }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Reinterprets the same row-major storage under a new shape.
    pub fn reshape(mut self, rows: usize, cols: usize) -> Matrix {
        assert_eq!(rows * cols, self.data.len(), "cannot reshape {}x{} into {rows}x{cols}", self.rows, self.cols);
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn copy_from(&mut self, other: &Matrix) {
        assert_eq!(self.data.len(), other.data.len(), "copy between buffers of different size");
        self.data.copy_from_slice(&other.data);
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                res.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        res
    }

    /// `self = alpha * self + beta * other`
    pub fn add_scaled(&mut self, other: &Matrix, alpha: f32, beta: f32) {
        assert_eq!(self.shape(), other.shape(), "matrices are of incorrect sizes");
        for (x, y) in self.data.iter_mut().zip(other.data.iter()) {
            *x = alpha * *x + beta * y;
        }
    }

    /// Adds `vec[i]` to every entry of row `i`. `vec` is a column vector.
    pub fn add_vec_to_rows(&mut self, vec: &Matrix) {
        assert_eq!(vec.data.len(), self.rows, "vector length must equal row count");
        for (row, &v) in self.data.chunks_mut(self.cols).zip(vec.data.iter()) {
            row.iter_mut().for_each(|x| *x += v);
        }
    }

    /// Adds `alpha * vec[j]` to every entry of column `j`. `vec` is a row vector.
    pub fn add_vec_to_cols(&mut self, vec: &Matrix, alpha: f32) {
        assert_eq!(vec.data.len(), self.cols, "vector length must equal column count");
        for row in self.data.chunks_mut(self.cols) {
            for (x, &v) in row.iter_mut().zip(vec.data.iter()) {
                *x += alpha * v;
            }
        }
    }

    /// Divides every entry of column `j` by `vec[j]`.
    pub fn div_vec_to_cols(&mut self, vec: &Matrix) {
        assert_eq!(vec.data.len(), self.cols, "vector length must equal column count");
        for row in self.data.chunks_mut(self.cols) {
            for (x, &v) in row.iter_mut().zip(vec.data.iter()) {
                *x /= v;
            }
        }
    }

    /// `target = alpha * target + rowsum(self)`; `target` is a column vector.
    pub fn add_row_sum_to(&self, target: &mut Matrix, alpha: f32) {
        assert_eq!(target.data.len(), self.rows, "target length must equal row count");
        for (t, row) in target.data.iter_mut().zip(self.data.chunks(self.cols)) {
            *t = alpha * *t + row.iter().sum::<f32>();
        }
    }

    /// `target = alpha * target + colsum(self)`; `target` is a row vector.
    pub fn add_col_sum_to(&self, target: &mut Matrix, alpha: f32) {
        assert_eq!(target.data.len(), self.cols, "target length must equal column count");
        target.data.iter_mut().for_each(|t| *t *= alpha);
        for row in self.data.chunks(self.cols) {
            for (t, &x) in target.data.iter_mut().zip(row.iter()) {
                *t += x;
            }
        }
    }

    /// Writes the maximum of every column into the row vector `target`.
    pub fn col_max_into(&self, target: &mut Matrix) {
        assert_eq!(target.data.len(), self.cols, "target length must equal column count");
        target.fill(f32::NEG_INFINITY);
        for row in self.data.chunks(self.cols) {
            for (t, &x) in target.data.iter_mut().zip(row.iter()) {
                if x > *t {
                    *t = x;
                }
            }
        }
    }

    /// Row index of the maximum of column `col`. Ties resolve to the lowest index.
    pub fn col_argmax(&self, col: usize) -> usize {
        let mut best = 0;
        for row in 1..self.rows {
            if self.get(row, col) > self.get(best, col) {
                best = row;
            }
        }
        best
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f32) -> f32,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn map_inplace<F>(&mut self, functor: F)
    where
        F: Fn(f32) -> f32,
    {
        self.data.iter_mut().for_each(|x| *x = functor(*x));
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Matrix product `self * rhs`.
    pub fn dot(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.cols, rhs.rows, "matrices are of incorrect sizes");
        let mut res = Matrix::zeros(self.rows, rhs.cols);
        for i in 0..self.rows {
            let out = &mut res.data[i * rhs.cols..(i + 1) * rhs.cols];
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs.data[k * rhs.cols..(k + 1) * rhs.cols];
                for (o, &b) in out.iter_mut().zip(rhs_row.iter()) {
                    *o += a * b;
                }
            }
        }
        res
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix { rows: 0, cols: 0, data: vec![] }
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Self) -> Self::Output {
        self.dot(rhs)
    }
}
