//! Entity ownership and partitioning.
//!
//! The partitioner itself is an oracle consumed as a black box: it maps a
//! primary-to-primary adjacency to a destination rank per primary, on the
//! root rank only. [`distribute_partition`] turns that assignment into a
//! per-rank [`IndexMap`]; [`create_entity_partition`] then derives consistent
//! distributed numberings for secondary entity sets (edges, faces, DOFs)
//! from an already-partitioned primary set.

pub mod entity;

#[cfg(feature = "metis-support")]
pub mod metis;

pub use entity::create_entity_partition;

#[cfg(feature = "metis-support")]
pub use metis::MetisPartitioner;

use crate::comm::Communicator;
use crate::error::{MeshLaError, check_sizes};
use crate::graph::Connectivity;
use crate::parallel::IndexMap;

/// Graph-partitioning oracle.
///
/// Input: a primary-to-primary adjacency and a target part count; output: a
/// destination part in `[0, n_parts)` for each primary. Called on the root
/// rank only; the core does not depend on which heuristic is used.
pub trait Partitioner {
    fn partition(&self, conn: &Connectivity, n_parts: usize) -> Result<Vec<usize>, MeshLaError>;
}

/// Trivial partitioner: contiguous index blocks of near-equal size.
///
/// Ignores adjacency entirely; deterministic baseline and test double for
/// the real graph partitioners.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockPartitioner;

impl Partitioner for BlockPartitioner {
    fn partition(&self, conn: &Connectivity, n_parts: usize) -> Result<Vec<usize>, MeshLaError> {
        if n_parts == 0 {
            return Err(MeshLaError::Partitioner("zero parts requested".into()));
        }
        let n = conn.n_primary();
        let chunk = n.div_ceil(n_parts);
        Ok((0..n).map(|i| (i / chunk.max(1)).min(n_parts - 1)).collect())
    }
}

/// Expand a root-side partition assignment into a per-rank [`IndexMap`].
///
/// For each part, the owned indices are the primaries assigned to it and the
/// ghosts are the adjacent primaries assigned elsewhere (each recorded once,
/// with its owning part). The root scatters both lists; the global numbering
/// of the resulting map is the primary numbering of `conn`.
pub fn distribute_partition<C: Communicator>(
    comm: &C,
    conn: &Connectivity,
    part: &[usize],
) -> Result<IndexMap, MeshLaError> {
    let mut owned_idxs: Vec<u64> = Vec::new();
    let mut owned_dest: Vec<usize> = Vec::new();
    let mut ghost_idxs: Vec<u64> = Vec::new();
    let mut ghost_owner: Vec<u64> = Vec::new();
    let mut ghost_dest: Vec<usize> = Vec::new();

    if comm.rank() == 0 {
        check_sizes(conn.n_primary(), part.len())?;
        let n_parts = part.iter().max().map_or(1, |&p| p + 1);

        // One ghost record per (part, neighbor) pair.
        let mut included: Vec<hashbrown::HashSet<usize>> =
            (0..n_parts).map(|_| hashbrown::HashSet::new()).collect();

        for i in 0..conn.n_primary() {
            owned_idxs.push(i as u64);
            owned_dest.push(part[i]);
            for &j in conn.links(i) {
                if part[i] != part[j] && included[part[i]].insert(j) {
                    ghost_idxs.push(j as u64);
                    ghost_owner.push(part[j] as u64);
                    ghost_dest.push(part[i]);
                }
            }
        }
    }

    let mut local_idxs = comm.distribute(&owned_idxs, &owned_dest);
    let my_ghosts = comm.distribute(&ghost_idxs, &ghost_dest);
    let my_ghost_owners = comm.distribute(&ghost_owner, &ghost_dest);

    local_idxs.extend_from_slice(&my_ghosts);
    IndexMap::new(
        local_idxs,
        my_ghost_owners.iter().map(|&o| o as usize).collect(),
    )
}
