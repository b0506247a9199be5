//! Unified error type for mesh-la public APIs.
//!
//! Every fatal condition in this crate is a [`MeshLaError`] value propagated
//! with `?` up to the caller. In an SPMD program a partial process set cannot
//! safely continue, so the intended top-level handling is to log the error and
//! call [`crate::comm::Communicator::abort`]; nothing in this crate recovers
//! from one locally. Solver non-convergence is deliberately *not* an error:
//! the Krylov drivers report it through their `Ok(bool)` return value.

use thiserror::Error;

/// Unified error type for mesh-la operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshLaError {
    /// Two containers that must agree in size do not.
    #[error("size mismatch: expected {expected}, got {found}")]
    SizeMismatch { expected: usize, found: usize },
    /// A local index fell outside its valid range.
    #[error("index {index} is out of range [0, {size})")]
    IndexOutOfRange { index: usize, size: usize },
    /// A connectivity failed construction-time validation.
    #[error("invalid connectivity: {0}")]
    InvalidConnectivity(String),
    /// `secondary` is not a link of `primary` in this connectivity.
    #[error("{secondary} is not a link of {primary}")]
    NotALink { primary: usize, secondary: usize },
    /// A global index was expected to be present on this rank but is not.
    #[error("global index {0} is not local to this rank")]
    UnknownGlobalIndex(u64),
    /// An owned row has no stored diagonal block.
    #[error("row {0} has no diagonal entry")]
    MissingDiagonal(usize),
    /// The dense least-squares factorization hit a (numerically) zero pivot.
    #[error("singular dense system: zero pivot at column {0}")]
    SingularMatrix(usize),
    /// The partitioner oracle failed to produce an assignment.
    #[error("partitioner error: {0}")]
    Partitioner(String),
    /// An iterative solver was stepped before `init`.
    #[error("solver used before init")]
    SolverNotInitialized,
}

/// Check that two sizes agree, in the style the whole crate uses for its
/// size/index contract violations.
pub(crate) fn check_sizes(expected: usize, found: usize) -> Result<(), MeshLaError> {
    if expected != found {
        Err(MeshLaError::SizeMismatch { expected, found })
    } else {
        Ok(())
    }
}

/// Check that `index` lies in `[0, size)`.
pub(crate) fn check_index(index: usize, size: usize) -> Result<(), MeshLaError> {
    if index >= size {
        Err(MeshLaError::IndexOutOfRange { index, size })
    } else {
        Ok(())
    }
}
