//! Assemble-then-solve contract for linear systems.

use crate::comm::Communicator;
use crate::error::{MeshLaError, check_index, check_sizes};
use crate::la::{SetMode, SparseMatrix, Vector, axpy};
use crate::solver::{Cg, Gmres, IterativeSolver, SolverOptions};

/// Which Krylov method a [`NativeLinearSystem`] solves with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KrylovMethod {
    Cg,
    Gmres { n_restart: usize },
}

/// The assemble-then-solve seam between discretizations and backends.
///
/// A discretization stages local contributions through `add_lhs`/`add_rhs`
/// (ghost rows included), makes them globally consistent with `assemble`,
/// optionally applies boundary conditions, and calls `solve`. Backends other
/// than [`NativeLinearSystem`] can implement the same contract over external
/// solver stacks.
pub trait LinearSystem {
    /// Zero the operator and right-hand side for a new assembly cycle.
    fn reset(&mut self);

    /// Add a dense element matrix at the given local rows and columns.
    fn add_lhs(&mut self, rows: &[usize], cols: &[usize], values: &[f64])
    -> Result<(), MeshLaError>;

    /// Add blocked right-hand side contributions at the given local indices.
    fn add_rhs(&mut self, idxs: &[usize], values: &[f64]) -> Result<(), MeshLaError>;

    /// Move staged ghost contributions to their owners (collective).
    fn assemble<C: Communicator>(&mut self, comm: &C) -> Result<(), MeshLaError>;

    /// Extract the operator diagonal of the owned rows.
    fn diagonal(&self, diag: &mut Vector) -> Result<(), MeshLaError>;

    /// Scale the operator diagonal of the owned rows.
    fn scale_diagonal(&mut self, factor: f64) -> Result<(), MeshLaError>;

    /// `rhs = rhs + alpha * x` on owned entries.
    fn rhs_axpy(&mut self, alpha: f64, x: &Vector) -> Result<(), MeshLaError>;

    /// Pin owned degrees of freedom to prescribed values (essential boundary
    /// conditions): zero the rows, set unit diagonals, write the values into
    /// the right-hand side. `values` holds one block per index.
    fn eliminate_dofs(&mut self, idxs: &[usize], values: &[f64]) -> Result<(), MeshLaError>;

    /// Solve for `x` (collective). `Ok(false)` means the solver did not
    /// converge; numerical breakdowns are errors.
    fn solve<C: Communicator>(&mut self, comm: &C, x: &mut Vector) -> Result<bool, MeshLaError>;

    /// Residual history of the last `solve` call.
    fn residual_history(&self) -> &[f64];
}

/// [`LinearSystem`] over the crate's own matrix, vector and Krylov stack.
pub struct NativeLinearSystem {
    matrix: SparseMatrix,
    rhs: Vector,
    method: KrylovMethod,
    options: SolverOptions,
    history: Vec<f64>,
}

impl NativeLinearSystem {
    pub fn new(
        matrix: SparseMatrix,
        method: KrylovMethod,
        options: SolverOptions,
    ) -> Result<Self, MeshLaError> {
        let rhs = Vector::new(matrix.row_map().clone(), matrix.block_size());
        Ok(Self {
            matrix,
            rhs,
            method,
            options,
            history: Vec::new(),
        })
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn rhs(&self) -> &Vector {
        &self.rhs
    }
}

impl LinearSystem for NativeLinearSystem {
    fn reset(&mut self) {
        self.matrix.set_all(0.0);
        self.rhs.set_all(0.0);
    }

    fn add_lhs(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
    ) -> Result<(), MeshLaError> {
        self.matrix.set_values(rows, cols, values)
    }

    fn add_rhs(&mut self, idxs: &[usize], values: &[f64]) -> Result<(), MeshLaError> {
        self.rhs.set_values(idxs, values, SetMode::Add)
    }

    fn assemble<C: Communicator>(&mut self, comm: &C) -> Result<(), MeshLaError> {
        self.matrix.assemble(comm)?;
        self.rhs.assemble(comm)
    }

    fn diagonal(&self, diag: &mut Vector) -> Result<(), MeshLaError> {
        self.matrix.diagonal(diag)
    }

    fn scale_diagonal(&mut self, factor: f64) -> Result<(), MeshLaError> {
        self.matrix.scale_diagonal(factor)
    }

    fn rhs_axpy(&mut self, alpha: f64, x: &Vector) -> Result<(), MeshLaError> {
        axpy(alpha, x, &mut self.rhs)
    }

    fn eliminate_dofs(&mut self, idxs: &[usize], values: &[f64]) -> Result<(), MeshLaError> {
        let bs = self.matrix.block_size();
        check_sizes(idxs.len() * bs, values.len())?;
        let n_owned = self.matrix.row_map().n_owned();

        for (i, &idx) in idxs.iter().enumerate() {
            check_index(idx, n_owned)?;

            // Zero the whole block row, then restore unit diagonals.
            let (cols, row_values) = self.matrix.row_data_mut(idx)?;
            let diag_rel = cols
                .iter()
                .position(|&c| c == idx)
                .ok_or(MeshLaError::MissingDiagonal(idx))?;
            row_values.fill(0.0);
            for k in 0..bs {
                row_values[diag_rel * bs * bs + k * bs + k] = 1.0;
            }

            self.rhs
                .set_values(&[idx], &values[i * bs..(i + 1) * bs], SetMode::Insert)?;
        }
        Ok(())
    }

    fn solve<C: Communicator>(&mut self, comm: &C, x: &mut Vector) -> Result<bool, MeshLaError> {
        let converged = match self.method {
            KrylovMethod::Cg => {
                let mut solver = Cg::new(&self.matrix, self.options.clone());
                let converged = solver.run(comm, &self.rhs, x)?;
                self.history = solver.residual_history().to_vec();
                converged
            }
            KrylovMethod::Gmres { n_restart } => {
                let mut solver = Gmres::new(&self.matrix, self.options.clone(), n_restart);
                let converged = solver.run(comm, &self.rhs, x)?;
                self.history = solver.residual_history().to_vec();
                converged
            }
        };
        Ok(converged)
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

    fn tridiag_system(method: KrylovMethod) -> NativeLinearSystem {
        let im = Arc::new(IndexMap::serial(3));
        let conn =
            Arc::new(Connectivity::new(vec![0, 2, 5, 7], vec![0, 1, 0, 1, 2, 1, 2]).unwrap());
        let matrix = SparseMatrix::new(conn, im.clone(), im, 1).unwrap();
        NativeLinearSystem::new(matrix, method, SolverOptions::default()).unwrap()
    }

    #[test]
    fn assemble_and_solve_poisson_chain() {
        let comm = SerialComm;
        let mut system = tridiag_system(KrylovMethod::Cg);

        // 1D Laplacian stencils, one element at a time.
        system
            .add_lhs(&[0, 1], &[0, 1], &[2.0, -1.0, -1.0, 2.0])
            .unwrap();
        system
            .add_lhs(&[1, 2], &[1, 2], &[2.0, -1.0, -1.0, 2.0])
            .unwrap();
        system.add_rhs(&[0, 1, 2], &[1.0, 0.0, 1.0]).unwrap();
        system.assemble(&comm).unwrap();

        let mut x = Vector::new(system.rhs().index_map().clone(), 1);
        let converged = system.solve(&comm, &mut x).unwrap();
        assert!(converged);
        assert!(!system.residual_history().is_empty());

        // A = [[2,-1,0],[-1,4,-1],[0,-1,2]], b = [1,0,1]: x = [2/3, 1/3, 2/3].
        for (computed, expected) in x.values().iter().zip(&[2.0 / 3.0, 1.0 / 3.0, 2.0 / 3.0]) {
            assert!((computed - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn eliminate_dofs_pins_values() {
        let comm = SerialComm;
        // Row elimination leaves the operator non-symmetric.
        let mut system = tridiag_system(KrylovMethod::Gmres { n_restart: 3 });
        system
            .add_lhs(&[0, 1], &[0, 1], &[2.0, -1.0, -1.0, 2.0])
            .unwrap();
        system
            .add_lhs(&[1, 2], &[1, 2], &[2.0, -1.0, -1.0, 2.0])
            .unwrap();
        system.eliminate_dofs(&[0], &[5.0]).unwrap();

        let (cols, row) = system.matrix.row_data(0).unwrap();
        assert_eq!(cols, &[0, 1]);
        assert_eq!(row, &[1.0, 0.0]);
        assert_eq!(system.rhs().get(0, 0).unwrap(), 5.0);

        let mut x = Vector::new(system.rhs().index_map().clone(), 1);
        let converged = system.solve(&comm, &mut x).unwrap();
        assert!(converged);
        assert!((x.get(0, 0).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn reset_clears_state() {
        let mut system = tridiag_system(KrylovMethod::Cg);
        system.add_rhs(&[1], &[3.0]).unwrap();
        system.reset();
        assert_eq!(system.rhs().get(1, 0).unwrap(), 0.0);
        assert!(system.matrix().values().iter().all(|&v| v == 0.0));
    }
}
