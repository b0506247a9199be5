//! In-process multi-rank transport.
//!
//! `LocalComm` runs one "rank" per thread inside a single process, with all
//! collectives rendezvousing through a shared exchange board. It exists so
//! that every distributed protocol in this crate (renumbering, ghost
//! exchange, entity partitioning, assembly) can be exercised by ordinary
//! `cargo test` runs with two or more ranks, no MPI launcher required.
//!
//! The board is a two-stage barrier: every rank deposits its contribution,
//! the last arrival publishes the gathered round, and the round is cleared
//! once every rank has taken its share. Since the SPMD contract already
//! requires all ranks to issue the same collectives in the same order, a
//! single board slot per universe suffices.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::{CommScalar, Communicator, Exchanged, ReduceOp, displacements, pack_by_dest};

enum Stage {
    Depositing,
    Draining,
}

struct Round {
    stage: Stage,
    deposits: Vec<Option<Box<dyn Any + Send>>>,
    arrived: usize,
    gathered: Option<Box<dyn Any + Send>>,
    taken: usize,
}

struct Board {
    n_procs: usize,
    round: Mutex<Round>,
    cv: Condvar,
}

impl Board {
    fn new(n_procs: usize) -> Self {
        Self {
            n_procs,
            round: Mutex::new(Round {
                stage: Stage::Depositing,
                deposits: (0..n_procs).map(|_| None).collect(),
                arrived: 0,
                gathered: None,
                taken: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Deposit `contribution` for `rank` and block until the round is
    /// complete; returns the contributions of all ranks, indexed by rank.
    ///
    /// Every collective is built on this gather. `V` must be the same type
    /// on all ranks for a given round; that is the SPMD contract.
    fn gather_round<V: Send + Sync + 'static>(&self, rank: usize, contribution: V) -> Arc<Vec<V>> {
        let mut round = self.round.lock();

        // A fast rank may re-enter while the previous round drains.
        while matches!(round.stage, Stage::Draining) {
            self.cv.wait(&mut round);
        }

        round.deposits[rank] = Some(Box::new(contribution));
        round.arrived += 1;

        if round.arrived == self.n_procs {
            let gathered: Vec<V> = round
                .deposits
                .iter_mut()
                .map(|slot| {
                    *slot
                        .take()
                        .and_then(|b| b.downcast::<V>().ok())
                        .unwrap_or_else(|| panic!("mismatched collective element type"))
                })
                .collect();
            round.gathered = Some(Box::new(Arc::new(gathered)));
            round.stage = Stage::Draining;
            round.taken = 0;
            self.cv.notify_all();
        } else {
            while matches!(round.stage, Stage::Depositing) {
                self.cv.wait(&mut round);
            }
        }

        let out = round
            .gathered
            .as_ref()
            .and_then(|b| b.downcast_ref::<Arc<Vec<V>>>())
            .cloned()
            .unwrap_or_else(|| panic!("mismatched collective element type"));

        round.taken += 1;
        if round.taken == self.n_procs {
            round.gathered = None;
            round.arrived = 0;
            round.stage = Stage::Depositing;
            self.cv.notify_all();
        }

        out
    }
}

/// One rank of an in-process universe.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    board: Arc<Board>,
}

impl LocalComm {
    /// Create an `n_procs`-rank universe; element `r` is rank `r`'s handle.
    pub fn universe(n_procs: usize) -> Vec<LocalComm> {
        assert!(n_procs > 0, "universe needs at least one rank");
        let board = Arc::new(Board::new(n_procs));
        (0..n_procs)
            .map(|rank| LocalComm {
                rank,
                board: Arc::clone(&board),
            })
            .collect()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn n_procs(&self) -> usize {
        self.board.n_procs
    }

    fn reduce<T: CommScalar>(&self, value: T, op: ReduceOp) -> T {
        let all = self.board.gather_round(self.rank, value);
        let mut acc = all[0];
        for &v in &all[1..] {
            acc = op.combine(acc, v);
        }
        acc
    }

    fn send_to_dest<T: CommScalar>(
        &self,
        data: &[T],
        dest: &[usize],
        block_size: usize,
    ) -> Exchanged<T> {
        let n = self.n_procs();
        let (buffer, counts, displs) = pack_by_dest(data, dest, block_size, n);
        let all = self
            .board
            .gather_round(self.rank, (buffer, counts, displs));

        // Collect, in source-rank order, every segment addressed to us.
        let mut recv_counts = vec![0usize; n];
        for (src, (_, counts, _)) in all.iter().enumerate() {
            recv_counts[src] = counts[self.rank];
        }
        let recv_displs = displacements(&recv_counts);

        let total: usize = recv_counts.iter().sum();
        let mut recv = Vec::with_capacity(total * block_size);
        for (buffer, counts, displs) in all.iter() {
            let start = displs[self.rank] * block_size;
            let len = counts[self.rank] * block_size;
            recv.extend_from_slice(&buffer[start..start + len]);
        }

        Exchanged {
            data: recv,
            counts: recv_counts,
            displs: recv_displs,
        }
    }

    fn distribute<T: CommScalar>(&self, data: &[T], dest: &[usize]) -> Vec<T> {
        let contribution = if self.rank == 0 {
            debug_assert_eq!(data.len(), dest.len());
            Some((data.to_vec(), dest.to_vec()))
        } else {
            None
        };
        let all = self.board.gather_round(self.rank, contribution);
        let (data, dest) = all[0].as_ref().expect("rank 0 must provide the data");
        data.iter()
            .zip(dest)
            .filter(|&(_, &d)| d == self.rank)
            .map(|(&v, _)| v)
            .collect()
    }

    fn abort(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Run `f` once per rank on an `n_procs`-rank in-process universe, one
/// thread per rank. Panics in any rank propagate.
pub fn run_local<F>(n_procs: usize, f: F)
where
    F: Fn(LocalComm) + Send + Sync,
{
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = LocalComm::universe(n_procs)
            .into_iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();
        for handle in handles {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
    });
}
