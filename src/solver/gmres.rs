//! Restarted GMRES.

use crate::comm::Communicator;
use crate::error::MeshLaError;
use crate::la::{DenseMatrix, NormType, SparseMatrix, Vector, axpy, copy, dot, norm, scale, spmv};
use crate::solver::{IterativeSolver, SolverOptions};

/// GMRES(m): modified Gram-Schmidt Arnoldi with a full restart every
/// `n_restart` iterations.
///
/// Between restarts the residual norm is the one of the small Hessenberg
/// least-squares problem, which equals the true residual in exact
/// arithmetic; each restart recomputes it from the operator. A breakdown of
/// the least-squares solve (a numerically rank-deficient Hessenberg column)
/// surfaces as [`MeshLaError::SingularMatrix`].
pub struct Gmres<'a> {
    matrix: &'a SparseMatrix,
    options: SolverOptions,
    n_restart: usize,
    workspace: Option<Workspace>,
    history: Vec<f64>,
}

struct Workspace {
    /// Iterate at the last restart; the current iterate is `x0` plus a
    /// combination of the basis.
    x0: Vector,
    /// Orthonormal Krylov basis, one more vector than completed iterations.
    basis: Vec<Vector>,
    /// Upper-Hessenberg projection of the operator.
    h: DenseMatrix,
    /// Least-squares right-hand side: `r0` in the first slot, zeros below.
    e1: Vec<f64>,
    /// Iterations completed since the last restart.
    riter: usize,
}

impl<'a> Gmres<'a> {
    pub fn new(matrix: &'a SparseMatrix, options: SolverOptions, n_restart: usize) -> Self {
        Self {
            matrix,
            options,
            n_restart: n_restart.max(1),
            workspace: None,
            history: Vec::new(),
        }
    }

    /// Rebuild the workspace around the current iterate; returns the true
    /// residual norm.
    fn restart<C: Communicator>(
        &mut self,
        comm: &C,
        b: &Vector,
        x: &mut Vector,
    ) -> Result<f64, MeshLaError> {
        // q0 = (b - A x) / ||b - A x||
        let mut q0 = Vector::new(x.index_map().clone(), x.block_size());
        x.update_ghosts(comm)?;
        spmv(self.matrix, x, &mut q0)?;
        axpy(-1.0, b, &mut q0)?;
        scale(-1.0, &mut q0);

        let r0 = norm(comm, &q0, NormType::L2)?;
        if r0 > 0.0 {
            scale(1.0 / r0, &mut q0);
        }

        let mut e1 = vec![0.0; self.n_restart + 1];
        e1[0] = r0;

        let mut basis = Vec::with_capacity(self.n_restart + 1);
        basis.push(q0);

        self.workspace = Some(Workspace {
            x0: x.clone(),
            basis,
            h: DenseMatrix::new(self.n_restart + 1, self.n_restart),
            e1,
            riter: 0,
        });
        Ok(r0)
    }
}

impl IterativeSolver for Gmres<'_> {
    fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn init<C: Communicator>(
        &mut self,
        comm: &C,
        b: &Vector,
        x: &mut Vector,
    ) -> Result<f64, MeshLaError> {
        let r0 = self.restart(comm, b, x)?;
        self.history.clear();
        self.history.push(r0);
        Ok(r0)
    }

    fn single_iteration<C: Communicator>(
        &mut self,
        comm: &C,
        b: &Vector,
        x: &mut Vector,
    ) -> Result<f64, MeshLaError> {
        let matrix = self.matrix;
        let ws = self
            .workspace
            .as_mut()
            .ok_or(MeshLaError::SolverNotInitialized)?;
        let k = ws.riter;

        // Arnoldi step: w = A q_k, orthogonalized against the basis by
        // modified Gram-Schmidt.
        ws.basis[k].update_ghosts(comm)?;
        let mut w = Vector::new(x.index_map().clone(), x.block_size());
        spmv(matrix, &ws.basis[k], &mut w)?;

        for j in 0..=k {
            let hjk = dot(comm, &ws.basis[j], &w)?;
            *ws.h.at_mut(j, k)? = hjk;
            axpy(-hjk, &ws.basis[j], &mut w)?;
        }
        let hk1 = norm(comm, &w, NormType::L2)?;
        *ws.h.at_mut(k + 1, k)? = hk1;
        if hk1 > 0.0 {
            scale(1.0 / hk1, &mut w);
        }
        ws.basis.push(w);
        ws.riter += 1;

        // Correction from the small least-squares problem, applied from the
        // restart iterate.
        let n_basis = ws.riter;
        let hk = ws.h.submatrix(n_basis + 1, n_basis)?;
        let y = hk.lstsq(&ws.e1[..n_basis + 1])?;

        copy(&ws.x0, x)?;
        for (j, &yj) in y.iter().enumerate() {
            axpy(yj, &ws.basis[j], x)?;
        }

        let hy = hk.matvec(&y)?;
        let residual = hy
            .iter()
            .zip(&ws.e1[..n_basis + 1])
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();

        if ws.riter == self.n_restart {
            // Full restart: drop the basis and recompute the true residual.
            let r = self.restart(comm, b, x)?;
            self.history.push(r);
            return Ok(r);
        }

        self.history.push(residual);
        Ok(residual)
    }

    fn residual_history(&self) -> &[f64] {
        &self.history
    }
}
