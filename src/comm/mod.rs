//! Transport layer: the collective message-passing seam of the crate.
//!
//! Everything distributed in this crate (index renumbering, ghost exchange,
//! vector/matrix assembly, solver reductions) goes through the small set of
//! collectives on [`Communicator`]. There is no other networking surface.
//!
//! Backends:
//! - [`SerialComm`]: single-rank identity transport for serial runs and
//!   most unit tests.
//! - [`LocalComm`]: an in-process universe of thread-ranks, so distributed
//!   protocols run under `cargo test` without an MPI launcher.
//! - `MpiComm` (feature `mpi-support`): real inter-process MPI.
//!
//! Every method on [`Communicator`] is a synchronization barrier: a rank
//! blocks until its contribution has been sent and its share of the result
//! received. All ranks must therefore call the same collectives in the same
//! order with matching element types, or the program deadlocks. That is an
//! SPMD protocol contract, not something this layer can check.

pub mod local;
pub mod serial;

#[cfg(feature = "mpi-support")]
pub mod mpi;

pub use local::{LocalComm, run_local};
pub use serial::SerialComm;

#[cfg(feature = "mpi-support")]
pub use self::mpi::MpiComm;

/// Scalar types that can travel through a [`Communicator`].
///
/// The arithmetic bound covers the reduction operators; the rest is what any
/// backend needs to move values between ranks.
#[cfg(not(feature = "mpi-support"))]
pub trait CommScalar:
    Copy + Default + Send + Sync + PartialOrd + num_traits::NumAssign + 'static
{
}

/// Scalar types that can travel through a [`Communicator`].
///
/// With `mpi-support` enabled, wire scalars must additionally map onto an
/// MPI datatype.
#[cfg(feature = "mpi-support")]
pub trait CommScalar:
    Copy
    + Default
    + Send
    + Sync
    + PartialOrd
    + num_traits::NumAssign
    + ::mpi::traits::Equivalence
    + 'static
{
}

impl CommScalar for usize {}
impl CommScalar for u64 {}
impl CommScalar for i64 {}
impl CommScalar for f64 {}

/// Reduction operator for [`Communicator::reduce`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    pub(crate) fn combine<T: CommScalar>(self, acc: T, value: T) -> T {
        match self {
            ReduceOp::Sum => acc + value,
            ReduceOp::Max => {
                if value > acc {
                    value
                } else {
                    acc
                }
            }
            ReduceOp::Min => {
                if value < acc {
                    value
                } else {
                    acc
                }
            }
        }
    }
}

/// Result of an all-to-all personalized exchange.
///
/// `data` holds the received blocks grouped by source rank; `counts[r]` and
/// `displs[r]` give the number of blocks received from rank `r` and the block
/// offset of its segment. Within a segment, blocks arrive in the order the
/// source rank staged them.
#[derive(Clone, Debug)]
pub struct Exchanged<T> {
    pub data: Vec<T>,
    pub counts: Vec<usize>,
    pub displs: Vec<usize>,
}

/// Collective transport primitives consumed by the rest of the crate.
pub trait Communicator: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn n_procs(&self) -> usize;

    /// All-reduce a scalar; every rank receives the reduced value.
    fn reduce<T: CommScalar>(&self, value: T, op: ReduceOp) -> T;

    /// All-to-all personalized exchange.
    ///
    /// `dest[i]` is the destination rank for block `i` of `data`, where a
    /// block is `block_size` consecutive elements; `data.len()` must equal
    /// `dest.len() * block_size`.
    fn send_to_dest<T: CommScalar>(
        &self,
        data: &[T],
        dest: &[usize],
        block_size: usize,
    ) -> Exchanged<T>;

    /// Root-to-all scatter. `data` and `dest` are read on rank 0 only; every
    /// rank receives the elements addressed to it, in root order.
    fn distribute<T: CommScalar>(&self, data: &[T], dest: &[usize]) -> Vec<T>;

    /// Abort the whole job. Used by top-level handlers for globally-fatal
    /// errors, since a partial process set cannot continue.
    fn abort(&self, code: i32) -> !;
}

/// Group `data` by destination rank: returns the packed send buffer plus
/// per-rank block counts and block displacements. Blocks keep their relative
/// order within each destination segment, which the exchange protocols in
/// this crate rely on.
pub(crate) fn pack_by_dest<T: Copy + Default>(
    data: &[T],
    dest: &[usize],
    block_size: usize,
    n_procs: usize,
) -> (Vec<T>, Vec<usize>, Vec<usize>) {
    debug_assert_eq!(data.len(), dest.len() * block_size);

    let mut counts = vec![0usize; n_procs];
    for &d in dest {
        counts[d] += 1;
    }
    let mut displs = vec![0usize; n_procs];
    for r in 1..n_procs {
        displs[r] = displs[r - 1] + counts[r - 1];
    }

    let mut buffer = vec![T::default(); data.len()];
    let mut cursor = displs.clone();
    for (i, &d) in dest.iter().enumerate() {
        let pos = cursor[d];
        cursor[d] += 1;
        buffer[pos * block_size..(pos + 1) * block_size]
            .copy_from_slice(&data[i * block_size..(i + 1) * block_size]);
    }

    (buffer, counts, displs)
}

/// Exclusive prefix sum of `counts`, in blocks.
pub(crate) fn displacements(counts: &[usize]) -> Vec<usize> {
    let mut displs = vec![0usize; counts.len()];
    for r in 1..counts.len() {
        displs[r] = displs[r - 1] + counts[r - 1];
    }
    displs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_groups_by_destination() {
        let data = [10u64, 11, 12, 13];
        let dest = [1usize, 0, 1, 0];
        let (buf, counts, displs) = pack_by_dest(&data, &dest, 1, 2);
        assert_eq!(buf, vec![11, 13, 10, 12]);
        assert_eq!(counts, vec![2, 2]);
        assert_eq!(displs, vec![0, 2]);
    }

    #[test]
    fn pack_respects_block_size() {
        let data = [1.0f64, 2.0, 3.0, 4.0];
        let dest = [1usize, 0];
        let (buf, counts, _) = pack_by_dest(&data, &dest, 2, 2);
        assert_eq!(buf, vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(counts, vec![1, 1]);
    }
}
