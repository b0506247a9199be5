//! Local-to-global index mapping for partitioned entity sets.

use hashbrown::HashMap;

use crate::comm::{Communicator, ReduceOp};
use crate::error::{MeshLaError, check_index, check_sizes};

/// One rank's view of a globally-numbered, partitioned index set.
///
/// The local index space `[0, n_local)` is an owned prefix `[0, n_owned)`
/// followed by a ghost suffix `[n_owned, n_local)`. Each local index maps to
/// a global index that is unique across ranks; each ghost additionally
/// carries the rank that owns it. Across all ranks the owned global indices
/// partition `[0, n_global)` exactly once.
///
/// An `IndexMap` is constructed once per partitioning event and never
/// mutated; [`IndexMap::renumber`] returns a new map instead.
#[derive(Clone, Debug)]
pub struct IndexMap {
    local_to_global: Vec<u64>,
    ghost_owners: Vec<usize>,
    global_to_local: HashMap<u64, usize>,
}

impl IndexMap {
    /// An index map for a serial run: `n_owned` indices, no ghosts,
    /// global numbering equal to local numbering.
    pub fn serial(n_owned: usize) -> Self {
        let local_to_global: Vec<u64> = (0..n_owned as u64).collect();
        let global_to_local = local_to_global.iter().map(|&g| (g, g as usize)).collect();
        Self {
            local_to_global,
            ghost_owners: Vec::new(),
            global_to_local,
        }
    }

    /// Build an index map from explicit global indices and ghost owners.
    ///
    /// The first `global_indices.len() - ghost_owners.len()` entries are
    /// owned; the remainder are ghosts, owned by the corresponding rank in
    /// `ghost_owners`.
    pub fn new(global_indices: Vec<u64>, ghost_owners: Vec<usize>) -> Result<Self, MeshLaError> {
        if ghost_owners.len() > global_indices.len() {
            return Err(MeshLaError::SizeMismatch {
                expected: global_indices.len(),
                found: ghost_owners.len(),
            });
        }
        let mut global_to_local = HashMap::with_capacity(global_indices.len());
        for (local, &global) in global_indices.iter().enumerate() {
            global_to_local.insert(global, local);
        }
        check_sizes(global_indices.len(), global_to_local.len())?;
        Ok(Self {
            local_to_global: global_indices,
            ghost_owners,
            global_to_local,
        })
    }

    /// Number of indices owned by this rank.
    pub fn n_owned(&self) -> usize {
        self.local_to_global.len() - self.ghost_owners.len()
    }

    /// Number of ghost indices on this rank.
    pub fn n_ghost(&self) -> usize {
        self.ghost_owners.len()
    }

    /// Number of local indices (owned + ghost).
    pub fn n_local(&self) -> usize {
        self.local_to_global.len()
    }

    /// Global number of indices, summed over all ranks.
    pub fn n_global<C: Communicator>(&self, comm: &C) -> usize {
        if comm.n_procs() == 1 {
            self.n_owned()
        } else {
            comm.reduce(self.n_owned() as u64, ReduceOp::Sum) as usize
        }
    }

    /// Global indices of the owned entries.
    pub fn owned_global(&self) -> &[u64] {
        &self.local_to_global[..self.n_owned()]
    }

    /// Global indices of the ghost entries.
    pub fn ghost_global(&self) -> &[u64] {
        &self.local_to_global[self.n_owned()..]
    }

    /// Owning rank of each ghost entry.
    pub fn ghost_owners(&self) -> &[usize] {
        &self.ghost_owners
    }

    /// Map a local index to its global index.
    pub fn local_to_global(&self, local: usize) -> Result<u64, MeshLaError> {
        check_index(local, self.n_local())?;
        Ok(self.local_to_global[local])
    }

    /// Map a range of local indices to global indices.
    pub fn locals_to_globals(&self, locals: &[usize]) -> Result<Vec<u64>, MeshLaError> {
        locals.iter().map(|&l| self.local_to_global(l)).collect()
    }

    /// Map a global index back to its local index, if present on this rank.
    pub fn global_to_local(&self, global: u64) -> Option<usize> {
        self.global_to_local.get(&global).copied()
    }

    /// Map a range of global indices to local indices; errors on any global
    /// index not present on this rank.
    pub fn globals_to_locals(&self, globals: &[u64]) -> Result<Vec<usize>, MeshLaError> {
        globals
            .iter()
            .map(|&g| {
                self.global_to_local(g)
                    .ok_or(MeshLaError::UnknownGlobalIndex(g))
            })
            .collect()
    }

    /// Owning rank of a local index.
    pub fn owner<C: Communicator>(&self, comm: &C, local: usize) -> Result<usize, MeshLaError> {
        check_index(local, self.n_local())?;
        if local < self.n_owned() {
            Ok(comm.rank())
        } else {
            Ok(self.ghost_owners[local - self.n_owned()])
        }
    }

    /// Whether a local index is a ghost.
    pub fn is_ghost(&self, local: usize) -> bool {
        local >= self.n_owned()
    }

    /// Renumber so that the owned indices of rank `i` form the contiguous
    /// global range `[offset_i, offset_i + n_owned_i)`, where `offset_i` is
    /// the sum of the owned counts of ranks `0..i`.
    ///
    /// Two collective rounds: an all-to-all of owned counts to compute the
    /// offsets, then a ghost-id request/response so every ghost learns its
    /// new global index from its owner.
    pub fn renumber<C: Communicator>(&self, comm: &C) -> Result<IndexMap, MeshLaError> {
        let n_procs = comm.n_procs();
        if n_procs == 1 {
            return Ok(IndexMap::serial(self.n_owned()));
        }

        let n_owned = self.n_owned();
        let mut global_indices = vec![0u64; self.n_local()];

        // Owned: learn every rank's owned count, prefix-sum up to this rank.
        let counts = comm.send_to_dest(
            &vec![n_owned as u64; n_procs],
            &(0..n_procs).collect::<Vec<_>>(),
            1,
        );
        let offset: u64 = counts.data[..comm.rank()].iter().sum();
        for (i, slot) in global_indices[..n_owned].iter_mut().enumerate() {
            *slot = offset + i as u64;
        }

        // Ghosts: send each old global id to its owner, map it to the new
        // numbering there, and return it to the requester.
        let requests = comm.send_to_dest(self.ghost_global(), &self.ghost_owners, 1);
        let mut replies = vec![0u64; requests.data.len()];
        for (i, &old_global) in requests.data.iter().enumerate() {
            let local = self
                .global_to_local(old_global)
                .ok_or(MeshLaError::UnknownGlobalIndex(old_global))?;
            replies[i] = global_indices[local];
        }
        let mut reply_dest = Vec::with_capacity(replies.len());
        for (src, &count) in requests.counts.iter().enumerate() {
            reply_dest.extend(std::iter::repeat_n(src, count));
        }
        let answers = comm.send_to_dest(&replies, &reply_dest, 1);

        // Responses from each owner arrive in the order we asked.
        let mut cursor = answers.displs.clone();
        for g in 0..self.n_ghost() {
            let owner = self.ghost_owners[g];
            global_indices[n_owned + g] = answers.data[cursor[owner]];
            cursor[owner] += 1;
        }

        IndexMap::new(global_indices, self.ghost_owners.clone())
    }
}
