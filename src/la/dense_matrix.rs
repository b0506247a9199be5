//! Small row-major dense matrix.
//!
//! Rank-local scratch for the solvers (Hessenberg systems, least-squares
//! corrections). Not distributed and not meant for large data.

use crate::error::{MeshLaError, check_index, check_sizes};

#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix {
    n_rows: usize,
    n_cols: usize,
    values: Vec<f64>,
}

impl DenseMatrix {
    /// A zero matrix of the given shape.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            values: vec![0.0; n_rows * n_cols],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn at(&self, row: usize, col: usize) -> Result<f64, MeshLaError> {
        check_index(row, self.n_rows)?;
        check_index(col, self.n_cols)?;
        Ok(self.values[row * self.n_cols + col])
    }

    pub fn at_mut(&mut self, row: usize, col: usize) -> Result<&mut f64, MeshLaError> {
        check_index(row, self.n_rows)?;
        check_index(col, self.n_cols)?;
        Ok(&mut self.values[row * self.n_cols + col])
    }

    pub fn set_all(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// The leading `n_rows` x `n_cols` block as a new matrix.
    pub fn submatrix(&self, n_rows: usize, n_cols: usize) -> Result<DenseMatrix, MeshLaError> {
        if n_rows > self.n_rows || n_cols > self.n_cols {
            return Err(MeshLaError::SizeMismatch {
                expected: self.n_rows * self.n_cols,
                found: n_rows * n_cols,
            });
        }
        let mut sub = DenseMatrix::new(n_rows, n_cols);
        for i in 0..n_rows {
            sub.values[i * n_cols..(i + 1) * n_cols]
                .copy_from_slice(&self.values[i * self.n_cols..i * self.n_cols + n_cols]);
        }
        Ok(sub)
    }

    pub fn transpose(&self) -> DenseMatrix {
        let mut t = DenseMatrix::new(self.n_cols, self.n_rows);
        for i in 0..self.n_rows {
            for j in 0..self.n_cols {
                t.values[j * self.n_rows + i] = self.values[i * self.n_cols + j];
            }
        }
        t
    }

    pub fn matmul(&self, other: &DenseMatrix) -> Result<DenseMatrix, MeshLaError> {
        check_sizes(self.n_cols, other.n_rows)?;
        let mut out = DenseMatrix::new(self.n_rows, other.n_cols);
        for i in 0..self.n_rows {
            for k in 0..self.n_cols {
                let aik = self.values[i * self.n_cols + k];
                for j in 0..other.n_cols {
                    out.values[i * other.n_cols + j] += aik * other.values[k * other.n_cols + j];
                }
            }
        }
        Ok(out)
    }

    /// Matrix-vector product.
    pub fn matvec(&self, x: &[f64]) -> Result<Vec<f64>, MeshLaError> {
        check_sizes(self.n_cols, x.len())?;
        let mut y = vec![0.0; self.n_rows];
        for i in 0..self.n_rows {
            y[i] = self.values[i * self.n_cols..(i + 1) * self.n_cols]
                .iter()
                .zip(x)
                .map(|(a, b)| a * b)
                .sum();
        }
        Ok(y)
    }

    /// Least-squares solve `min ||A x - rhs||_2` by Householder QR.
    ///
    /// Requires `n_rows >= n_cols`. A rank-deficient column surfaces as
    /// [`MeshLaError::SingularMatrix`] with the offending column index.
    pub fn lstsq(&self, rhs: &[f64]) -> Result<Vec<f64>, MeshLaError> {
        check_sizes(self.n_rows, rhs.len())?;
        let (m, n) = (self.n_rows, self.n_cols);
        if m < n {
            return Err(MeshLaError::SizeMismatch {
                expected: n,
                found: m,
            });
        }

        let mut a = self.values.clone();
        let mut b = rhs.to_vec();

        for k in 0..n {
            let col_norm: f64 = (k..m).map(|i| a[i * n + k] * a[i * n + k]).sum::<f64>().sqrt();
            if col_norm == 0.0 {
                return Err(MeshLaError::SingularMatrix(k));
            }
            let alpha = if a[k * n + k] > 0.0 {
                -col_norm
            } else {
                col_norm
            };

            // Householder reflector for column k, stored densely.
            let mut v = vec![0.0; m - k];
            v[0] = a[k * n + k] - alpha;
            for i in k + 1..m {
                v[i - k] = a[i * n + k];
            }
            let vtv: f64 = v.iter().map(|x| x * x).sum();

            for j in k..n {
                let proj: f64 = (k..m).map(|i| v[i - k] * a[i * n + j]).sum();
                let factor = 2.0 * proj / vtv;
                for i in k..m {
                    a[i * n + j] -= factor * v[i - k];
                }
            }
            let proj: f64 = (k..m).map(|i| v[i - k] * b[i]).sum();
            let factor = 2.0 * proj / vtv;
            for i in k..m {
                b[i] -= factor * v[i - k];
            }
        }

        // Back substitution on the triangular factor.
        let mut x = vec![0.0; n];
        for k in (0..n).rev() {
            let mut s = b[k];
            for j in k + 1..n {
                s -= a[k * n + j] * x[j];
            }
            let pivot = a[k * n + k];
            if pivot.abs() < f64::EPSILON {
                return Err(MeshLaError::SingularMatrix(k));
            }
            x[k] = s / pivot;
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_rows(rows: &[&[f64]]) -> DenseMatrix {
        let mut m = DenseMatrix::new(rows.len(), rows[0].len());
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                *m.at_mut(i, j).unwrap() = v;
            }
        }
        m
    }

    #[test]
    fn indexing_and_transpose() {
        let m = from_rows(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        assert_eq!(m.at(2, 1).unwrap(), 6.0);
        let t = m.transpose();
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.at(1, 2).unwrap(), 6.0);
        assert!(m.at(3, 0).is_err());
    }

    #[test]
    fn matmul_and_matvec() {
        let a = from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = from_rows(&[&[0.0, 1.0], &[1.0, 0.0]]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c, from_rows(&[&[2.0, 1.0], &[4.0, 3.0]]));
        assert_eq!(a.matvec(&[1.0, 1.0]).unwrap(), vec![3.0, 7.0]);
    }

    #[test]
    fn lstsq_solves_square_system() {
        let a = from_rows(&[&[2.0, 1.0], &[1.0, 3.0]]);
        let x = a.lstsq(&[5.0, 10.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn lstsq_overdetermined_minimizes_residual() {
        // Fit y = 2t + 1 through exact samples; recovers the coefficients.
        let a = from_rows(&[&[0.0, 1.0], &[1.0, 1.0], &[2.0, 1.0]]);
        let x = a.lstsq(&[1.0, 3.0, 5.0]).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lstsq_reports_singular_column() {
        let a = from_rows(&[&[1.0, 0.0], &[2.0, 0.0]]);
        assert!(matches!(
            a.lstsq(&[1.0, 2.0]),
            Err(MeshLaError::SingularMatrix(1))
        ));
    }
}
