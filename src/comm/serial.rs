//! Single-rank transport for serial runs and unit tests.

use super::{CommScalar, Communicator, Exchanged, ReduceOp};

/// Identity transport: one rank, every collective is local.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn n_procs(&self) -> usize {
        1
    }

    fn reduce<T: CommScalar>(&self, value: T, _op: ReduceOp) -> T {
        value
    }

    fn send_to_dest<T: CommScalar>(
        &self,
        data: &[T],
        dest: &[usize],
        block_size: usize,
    ) -> Exchanged<T> {
        debug_assert_eq!(data.len(), dest.len() * block_size);
        debug_assert!(dest.iter().all(|&d| d == 0));
        Exchanged {
            data: data.to_vec(),
            counts: vec![dest.len()],
            displs: vec![0],
        }
    }

    fn distribute<T: CommScalar>(&self, data: &[T], dest: &[usize]) -> Vec<T> {
        debug_assert_eq!(data.len(), dest.len());
        data.to_vec()
    }

    fn abort(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_collectives_are_identities() {
        let comm = SerialComm;
        assert_eq!(comm.n_procs(), 1);
        assert_eq!(comm.reduce(5u64, ReduceOp::Sum), 5);

        let out = comm.send_to_dest(&[1.0f64, 2.0], &[0, 0], 1);
        assert_eq!(out.data, vec![1.0, 2.0]);
        assert_eq!(out.counts, vec![2]);

        assert_eq!(comm.distribute(&[7u64, 8], &[0, 0]), vec![7, 8]);
    }
}
