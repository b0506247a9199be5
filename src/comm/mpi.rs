//! MPI transport backend (feature `mpi-support`).
//!
//! Maps the [`Communicator`] collectives onto their MPI counterparts:
//! `reduce` onto `MPI_Allreduce`, `send_to_dest` onto an `MPI_Alltoall`
//! count exchange followed by `MPI_Alltoallv`, and `distribute` onto a
//! count scatter followed by `MPI_Scatterv`.

use mpi::Count;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::{CommScalar, Communicator, Exchanged, ReduceOp, displacements, pack_by_dest};

/// Inter-process transport over `MPI_COMM_WORLD`.
///
/// Holds the MPI universe, so constructing a second `MpiComm` in the same
/// process is an error; MPI is finalized when the value is dropped.
pub struct MpiComm {
    _universe: Universe,
    world: SimpleCommunicator,
}

impl MpiComm {
    /// Initialize MPI and attach to the world communicator.
    ///
    /// Returns `None` if MPI was already initialized.
    pub fn new() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        Some(Self {
            _universe: universe,
            world,
        })
    }
}

fn to_counts(counts: &[usize], block_size: usize) -> Vec<Count> {
    counts.iter().map(|&c| (c * block_size) as Count).collect()
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn n_procs(&self) -> usize {
        self.world.size() as usize
    }

    fn reduce<T: CommScalar>(&self, value: T, op: ReduceOp) -> T {
        let mut out = value;
        match op {
            ReduceOp::Sum => self
                .world
                .all_reduce_into(&value, &mut out, SystemOperation::sum()),
            ReduceOp::Max => self
                .world
                .all_reduce_into(&value, &mut out, SystemOperation::max()),
            ReduceOp::Min => self
                .world
                .all_reduce_into(&value, &mut out, SystemOperation::min()),
        }
        out
    }

    fn send_to_dest<T: CommScalar>(
        &self,
        data: &[T],
        dest: &[usize],
        block_size: usize,
    ) -> Exchanged<T> {
        let n = self.n_procs();
        let (send_buffer, send_counts, send_displs) = pack_by_dest(data, dest, block_size, n);

        // Exchange block counts, then the data itself.
        let send_counts_wire: Vec<u64> = send_counts.iter().map(|&c| c as u64).collect();
        let mut recv_counts_wire = vec![0u64; n];
        self.world
            .all_to_all_into(&send_counts_wire[..], &mut recv_counts_wire[..]);

        let recv_counts: Vec<usize> = recv_counts_wire.iter().map(|&c| c as usize).collect();
        let recv_displs = displacements(&recv_counts);
        let total: usize = recv_counts.iter().sum();

        let send_counts_c = to_counts(&send_counts, block_size);
        let send_displs_c = to_counts(&send_displs, block_size);
        let recv_counts_c = to_counts(&recv_counts, block_size);
        let recv_displs_c = to_counts(&recv_displs, block_size);

        let mut recv_buffer = vec![T::default(); total * block_size];
        {
            let send_partition = Partition::new(&send_buffer[..], send_counts_c, send_displs_c);
            let mut recv_partition =
                PartitionMut::new(&mut recv_buffer[..], recv_counts_c, recv_displs_c);
            self.world
                .all_to_all_varcount_into(&send_partition, &mut recv_partition);
        }

        Exchanged {
            data: recv_buffer,
            counts: recv_counts,
            displs: recv_displs,
        }
    }

    fn distribute<T: CommScalar>(&self, data: &[T], dest: &[usize]) -> Vec<T> {
        let n = self.n_procs();
        let root = self.world.process_at_rank(0);

        // Root packs by destination and scatters the counts first.
        let mut my_count = 0u64;
        if self.rank() == 0 {
            let (send_buffer, send_counts, send_displs) = pack_by_dest(data, dest, 1, n);
            let counts_wire: Vec<u64> = send_counts.iter().map(|&c| c as u64).collect();
            root.scatter_into_root(&counts_wire[..], &mut my_count);

            let send_counts_c = to_counts(&send_counts, 1);
            let send_displs_c = to_counts(&send_displs, 1);
            let mut recv = vec![T::default(); my_count as usize];
            let partition = Partition::new(&send_buffer[..], send_counts_c, send_displs_c);
            root.scatter_varcount_into_root(&partition, &mut recv[..]);
            recv
        } else {
            root.scatter_into(&mut my_count);
            let mut recv = vec![T::default(); my_count as usize];
            root.scatter_varcount_into(&mut recv[..]);
            recv
        }
    }

    fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}
