//! Ghost-value exchange for an [`IndexMap`].

use crate::comm::{CommScalar, Communicator};
use crate::error::{MeshLaError, check_sizes};
use crate::parallel::IndexMap;

/// Moves values between owners and ghost holders for one index map.
///
/// A *forward* scatter sends values of locally owned indices to every rank
/// that ghosts them; a *reverse* scatter sends stored ghost values back to
/// their owners. The participating indices are discovered once, at
/// construction, with a single ghost-id exchange: more than one rank may
/// ghost the same owned index, so a forward index can have several
/// destinations and appears once per destination.
///
/// Construction and both scatter directions are collective.
pub struct Scatterer {
    /// Owned local indices ghosted elsewhere, one entry per destination.
    fwd_idxs: Vec<usize>,
    /// Destination rank of each forward index.
    fwd_dest: Vec<usize>,
    /// Local ghost indices in wire order (grouped by owner rank).
    rev_idxs: Vec<usize>,
    /// Owner rank of each local ghost, in ghost order.
    ghost_owners: Vec<usize>,
    n_owned: usize,
    n_local: usize,
}

impl Scatterer {
    pub fn new<C: Communicator>(comm: &C, index_map: &IndexMap) -> Result<Self, MeshLaError> {
        // Every rank announces its ghosts to their owners.
        let requests = comm.send_to_dest(index_map.ghost_global(), index_map.ghost_owners(), 1);
        let fwd_idxs = index_map.globals_to_locals(&requests.data)?;

        let mut fwd_dest = vec![0usize; fwd_idxs.len()];
        for (src, &count) in requests.counts.iter().enumerate() {
            for j in 0..count {
                fwd_dest[requests.displs[src] + j] = src;
            }
        }

        // Echo the announced ids back so each rank learns the wire order in
        // which its ghosts will arrive during forward scatters.
        let echoes = comm.send_to_dest(&requests.data, &fwd_dest, 1);
        let rev_idxs = index_map.globals_to_locals(&echoes.data)?;

        Ok(Self {
            fwd_idxs,
            fwd_dest,
            rev_idxs,
            ghost_owners: index_map.ghost_owners().to_vec(),
            n_owned: index_map.n_owned(),
            n_local: index_map.n_local(),
        })
    }

    /// Owned local indices that are ghosted on other ranks.
    pub fn forward_indices(&self) -> &[usize] {
        &self.fwd_idxs
    }

    /// Local ghost indices in wire order.
    pub fn reverse_indices(&self) -> &[usize] {
        &self.rev_idxs
    }

    /// Send owned-index values to ghost holders; apply `op(ghost, received)`
    /// to each local ghost slot. With `op = assign`, this is a ghost update.
    ///
    /// `values` holds `block_size` components per local index of the map the
    /// scatterer was built for.
    pub fn forward<C, T, F>(
        &self,
        comm: &C,
        values: &mut [T],
        block_size: usize,
        op: F,
    ) -> Result<(), MeshLaError>
    where
        C: Communicator,
        T: CommScalar,
        F: Fn(&mut T, T),
    {
        check_sizes(self.n_local * block_size, values.len())?;

        let mut send = vec![T::default(); self.fwd_idxs.len() * block_size];
        for (i, &idx) in self.fwd_idxs.iter().enumerate() {
            send[i * block_size..(i + 1) * block_size]
                .copy_from_slice(&values[idx * block_size..(idx + 1) * block_size]);
        }

        let received = comm.send_to_dest(&send, &self.fwd_dest, block_size);
        for (i, &idx) in self.rev_idxs.iter().enumerate() {
            for k in 0..block_size {
                op(
                    &mut values[idx * block_size + k],
                    received.data[i * block_size + k],
                );
            }
        }
        Ok(())
    }

    /// Send ghost values to their owners; apply `op(owned, received)` to
    /// each owned slot. With `op = add`, this accumulates staged ghost
    /// contributions into the authoritative storage.
    pub fn reverse<C, T, F>(
        &self,
        comm: &C,
        values: &mut [T],
        block_size: usize,
        op: F,
    ) -> Result<(), MeshLaError>
    where
        C: Communicator,
        T: CommScalar,
        F: Fn(&mut T, T),
    {
        check_sizes(self.n_local * block_size, values.len())?;

        let ghost_values = values[self.n_owned * block_size..].to_vec();
        let received = comm.send_to_dest(&ghost_values, &self.ghost_owners, block_size);

        // Contributions arrive in forward-index order by construction.
        for (i, &idx) in self.fwd_idxs.iter().enumerate() {
            for k in 0..block_size {
                op(
                    &mut values[idx * block_size + k],
                    received.data[i * block_size + k],
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::run_local;

    // Global set {0,1,2}; rank 0 owns {0,1}, ghosts 2; rank 1 owns {2},
    // ghosts 1.
    fn fixture(rank: usize) -> IndexMap {
        if rank == 0 {
            IndexMap::new(vec![0, 1, 2], vec![1]).unwrap()
        } else {
            IndexMap::new(vec![2, 1], vec![0]).unwrap()
        }
    }

    #[test]
    fn forward_updates_ghosts_from_owner() {
        run_local(2, |comm| {
            let im = fixture(comm.rank());
            let scatter = Scatterer::new(&comm, &im).unwrap();

            // Owned values are 10*global; ghost slots start stale.
            let mut values: Vec<f64> = im
                .owned_global()
                .iter()
                .map(|&g| 10.0 * g as f64)
                .chain(im.ghost_global().iter().map(|_| -1.0))
                .collect();

            scatter
                .forward(&comm, &mut values, 1, |dest, src| *dest = src)
                .unwrap();

            for g in 0..im.n_ghost() {
                let global = im.ghost_global()[g];
                assert_eq!(values[im.n_owned() + g], 10.0 * global as f64);
            }
        });
    }

    #[test]
    fn reverse_accumulates_into_owner() {
        run_local(2, |comm| {
            let im = fixture(comm.rank());
            let scatter = Scatterer::new(&comm, &im).unwrap();

            // Every rank stages 1.0 everywhere; after the reverse-add each
            // owned slot ghosted once holds 2.0.
            let mut values = vec![1.0f64; im.n_local()];
            scatter
                .reverse(&comm, &mut values, 1, |dest, src| *dest += src)
                .unwrap();

            if comm.rank() == 0 {
                // Global 1 is ghosted by rank 1; global 0 is not.
                assert_eq!(values[0], 1.0);
                assert_eq!(values[1], 2.0);
            } else {
                // Global 2 is ghosted by rank 0.
                assert_eq!(values[0], 2.0);
            }
        });
    }
}
