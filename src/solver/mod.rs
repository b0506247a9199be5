//! Krylov solvers.
//!
//! The solver set is closed: call sites pick [`Cg`] or [`Gmres`] directly and
//! drive them through [`IterativeSolver`]. Both borrow the system matrix for
//! the duration of the solve and never synchronize beyond the collective
//! reductions and ghost updates of their kernels.

pub mod cg;
pub mod gmres;

pub use cg::Cg;
pub use gmres::Gmres;

use serde::{Deserialize, Serialize};

use crate::comm::Communicator;
use crate::error::MeshLaError;
use crate::la::Vector;

/// Convergence and reporting controls shared by all solvers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Absolute residual tolerance.
    pub atol: f64,
    /// Residual tolerance relative to the initial residual.
    pub rtol: f64,
    /// Divergence threshold relative to the initial residual.
    pub dtol: f64,
    /// Iteration cap.
    pub n_iter_max: usize,
    /// Log a summary line on convergence.
    pub print_conv: bool,
    /// Log the residual of every iteration.
    pub print_iter: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            atol: 1e-10,
            rtol: 1e-6,
            dtol: 1e3,
            n_iter_max: 500,
            print_conv: true,
            print_iter: false,
        }
    }
}

/// A restartable iterative solver for `A x = b`.
///
/// `init` prepares the workspace from the current iterate and returns the
/// initial residual norm; `single_iteration` advances the iterate once and
/// returns the new residual norm. The provided [`IterativeSolver::run`]
/// driver handles tolerances, iteration caps and reporting uniformly. All
/// three residual-producing methods are collective.
pub trait IterativeSolver {
    fn options(&self) -> &SolverOptions;

    fn init<C: Communicator>(
        &mut self,
        comm: &C,
        b: &Vector,
        x: &mut Vector,
    ) -> Result<f64, MeshLaError>;

    fn single_iteration<C: Communicator>(
        &mut self,
        comm: &C,
        b: &Vector,
        x: &mut Vector,
    ) -> Result<f64, MeshLaError>;

    /// Residual norms recorded so far, starting with the initial residual.
    fn residual_history(&self) -> &[f64];

    /// Iterate until convergence, divergence or the iteration cap.
    ///
    /// Returns `Ok(true)` when the residual drops below
    /// `max(atol, rtol * r0)`. Non-convergence is not an error: divergence
    /// (`residual >= dtol * r0`) and hitting the cap both return
    /// `Ok(false)`.
    fn run<C: Communicator>(
        &mut self,
        comm: &C,
        b: &Vector,
        x: &mut Vector,
    ) -> Result<bool, MeshLaError> {
        let opts = self.options().clone();
        let r0 = self.init(comm, b, x)?;
        let target = opts.atol.max(opts.rtol * r0);

        if r0 < target {
            if opts.print_conv {
                log::info!("converged before iterating, residual {r0:.3e}");
            }
            return Ok(true);
        }

        for iter in 1..=opts.n_iter_max {
            let residual = self.single_iteration(comm, b, x)?;
            if opts.print_iter {
                log::debug!("iteration {iter}: residual {residual:.3e}");
            }
            if residual < target {
                if opts.print_conv {
                    log::info!("converged in {iter} iterations, residual {residual:.3e}");
                }
                return Ok(true);
            }
            if residual >= opts.dtol * r0 {
                log::warn!("diverged at iteration {iter}, residual {residual:.3e}");
                return Ok(false);
            }
        }

        log::warn!(
            "no convergence within {} iterations, residual {:.3e}",
            opts.n_iter_max,
            self.residual_history().last().copied().unwrap_or(r0),
        );
        Ok(false)
    }
}
