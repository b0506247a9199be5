//! Conjugate gradient.

use crate::comm::Communicator;
use crate::error::MeshLaError;
use crate::la::{SparseMatrix, Vector, axpy, copy, dot, scale, spmv};
use crate::solver::{IterativeSolver, SolverOptions};

/// Conjugate gradient for symmetric positive-definite systems.
///
/// Classic three-term recurrence. Symmetry and positive-definiteness are the
/// caller's contract; on an indefinite operator the recurrence simply
/// diverges and the driver reports `Ok(false)`.
pub struct Cg<'a> {
    matrix: &'a SparseMatrix,
    options: SolverOptions,
    workspace: Option<Workspace>,
    history: Vec<f64>,
}

struct Workspace {
    r: Vector,
    p: Vector,
    ap: Vector,
    /// Squared residual norm of the current iterate.
    res_sq: f64,
}

impl<'a> Cg<'a> {
    pub fn new(matrix: &'a SparseMatrix, options: SolverOptions) -> Self {
        Self {
            matrix,
            options,
            workspace: None,
            history: Vec::new(),
        }
    }
}

impl IterativeSolver for Cg<'_> {
    fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn init<C: Communicator>(
        &mut self,
        comm: &C,
        b: &Vector,
        x: &mut Vector,
    ) -> Result<f64, MeshLaError> {
        let mut r = Vector::new(x.index_map().clone(), x.block_size());
        let mut p = Vector::new(x.index_map().clone(), x.block_size());
        let mut ap = Vector::new(x.index_map().clone(), x.block_size());

        // r = b - A x
        x.update_ghosts(comm)?;
        spmv(self.matrix, x, &mut ap)?;
        copy(b, &mut r)?;
        axpy(-1.0, &ap, &mut r)?;
        copy(&r, &mut p)?;

        let res_sq = dot(comm, &r, &r)?;
        let residual = res_sq.sqrt();
        self.workspace = Some(Workspace { r, p, ap, res_sq });
        self.history.clear();
        self.history.push(residual);
        Ok(residual)
    }

    fn single_iteration<C: Communicator>(
        &mut self,
        comm: &C,
        _b: &Vector,
        x: &mut Vector,
    ) -> Result<f64, MeshLaError> {
        let ws = self
            .workspace
            .as_mut()
            .ok_or(MeshLaError::SolverNotInitialized)?;

        ws.p.update_ghosts(comm)?;
        spmv(self.matrix, &ws.p, &mut ws.ap)?;

        let alpha = ws.res_sq / dot(comm, &ws.p, &ws.ap)?;
        axpy(alpha, &ws.p, x)?;
        axpy(-alpha, &ws.ap, &mut ws.r)?;

        let res_sq_new = dot(comm, &ws.r, &ws.r)?;
        let beta = res_sq_new / ws.res_sq;
        scale(beta, &mut ws.p);
        axpy(1.0, &ws.r, &mut ws.p)?;
        ws.res_sq = res_sq_new;

        let residual = res_sq_new.sqrt();
        self.history.push(residual);
        Ok(residual)
    }

    fn residual_history(&self) -> &[f64] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::comm::SerialComm;
    use crate::graph::Connectivity;
    use crate::parallel::IndexMap;

    #[test]
    fn solves_spd_tridiagonal_exactly() {
        let comm = SerialComm;
        let im = Arc::new(IndexMap::serial(3));
        let conn =
            Arc::new(Connectivity::new(vec![0, 2, 5, 7], vec![0, 1, 0, 1, 2, 1, 2]).unwrap());
        let mut a = SparseMatrix::new(conn, im.clone(), im.clone(), 1).unwrap();
        a.set_values(&[0], &[0, 1], &[4.0, -1.0]).unwrap();
        a.set_values(&[1], &[0, 1, 2], &[-1.0, 4.0, -1.0]).unwrap();
        a.set_values(&[2], &[1, 2], &[-1.0, 4.0]).unwrap();

        // b = A * [1, 2, 3]
        let mut b = Vector::new(im.clone(), 1);
        b.values_mut().copy_from_slice(&[2.0, 4.0, 10.0]);
        let mut x = Vector::new(im, 1);

        let mut cg = Cg::new(&a, SolverOptions::default());
        let converged = cg.run(&comm, &b, &mut x).unwrap();

        assert!(converged);
        // Exact in at most n iterations for an SPD system.
        assert!(cg.residual_history().len() <= 4);
        for (computed, expected) in x.values().iter().zip(&[1.0, 2.0, 3.0]) {
            assert!((computed - expected).abs() < 1e-8);
        }
    }

    #[test]
    fn stepping_before_init_is_an_error() {
        let comm = SerialComm;
        let im = Arc::new(IndexMap::serial(1));
        let conn = Arc::new(Connectivity::new(vec![0, 1], vec![0]).unwrap());
        let a = SparseMatrix::new(conn, im.clone(), im.clone(), 1).unwrap();
        let b = Vector::new(im.clone(), 1);
        let mut x = Vector::new(im, 1);

        let mut cg = Cg::new(&a, SolverOptions::default());
        assert!(matches!(
            cg.single_iteration(&comm, &b, &mut x),
            Err(MeshLaError::SolverNotInitialized)
        ));
    }
}
