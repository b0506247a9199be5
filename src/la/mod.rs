//! Distributed linear algebra: vectors, block-CSR matrices, dense scratch
//! matrices and the assemble-then-solve [`LinearSystem`] contract.

pub mod dense_matrix;
pub mod sparse_matrix;
pub mod system;
pub mod vector;

pub use dense_matrix::DenseMatrix;
pub use sparse_matrix::{SparseMatrix, norm_frobenius, spmv};
pub use system::{KrylovMethod, LinearSystem, NativeLinearSystem};
pub use vector::{NormType, SetMode, Vector, axpbypc, axpy, copy, dot, norm, scale};
