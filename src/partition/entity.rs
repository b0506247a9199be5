//! Distributed numbering for secondary entity sets.
//!
//! Given a primary set (cells) that is already partitioned and a
//! primary→entity connectivity whose entities are still numbered per-rank
//! (the same physical edge/face/DOF appears under unrelated local indices on
//! neighboring ranks), this derives one canonical global numbering and the
//! correspondingly renumbered connectivity.
//!
//! Ownership rule: an entity belongs to the adjacent primary with the
//! highest global index, and hence to that primary's rank.

use crate::comm::Communicator;
use crate::error::{MeshLaError, check_sizes};
use crate::graph::Connectivity;
use crate::parallel::IndexMap;

/// Per-ghost bookkeeping: the global index of the entity's owner cell, the
/// entity's slot within that cell's links, and the cell's owning rank.
#[derive(Default)]
struct GhostRecords {
    owner_cell: Vec<u64>,
    slot: Vec<u64>,
    owner_proc: Vec<usize>,
}

impl GhostRecords {
    fn push(&mut self, owner_cell: u64, slot: usize, owner_proc: usize) {
        self.owner_cell.push(owner_cell);
        self.slot.push(slot as u64);
        self.owner_proc.push(owner_proc);
    }
}

/// Derive an [`IndexMap`] and renumbered connectivity for the secondary
/// entities of `cell_to_entity`.
///
/// The protocol runs in a fixed number of collective rounds:
/// 1. locally bucket every entity into owned/ghost by the
///    max-global-adjacent-cell rule;
/// 2. exchange owned counts and assign contiguous global ids to owned
///    entities;
/// 3. for every ghost, ask the believed owner rank for the assigned id,
///    identifying the entity as `(owner cell global id, slot in that cell)`;
/// 4. a rank that discovers the queried entity is a ghost on its own side
///    (its adjacency saw a higher-numbered cell the requester could not see)
///    forwards the query one more hop to the actual owner and relays the
///    answer back.
///
/// Every query therefore resolves in at most two communication rounds, and
/// requesters additionally learn the *actual* owner rank of each ghost,
/// which may differ from the one they guessed.
///
/// The primary→entity rows must list entities in the same slot order on
/// every rank that holds the cell; slot indices are meaningless otherwise.
pub fn create_entity_partition<C: Communicator>(
    comm: &C,
    cell_im: &IndexMap,
    cell_to_entity: &Connectivity,
) -> Result<(IndexMap, Connectivity), MeshLaError> {
    check_sizes(cell_im.n_local(), cell_to_entity.n_primary())?;

    let rank = comm.rank();
    let n_procs = comm.n_procs();
    let entity_to_cell = cell_to_entity.invert();
    let n_entities = entity_to_cell.n_primary();

    // Bucket entities into owned and ghost, recording for each ghost where
    // its owner believes it lives. `renumbering` maps old local entity
    // indices to the owned-prefix/ghost-suffix layout.
    let mut renumbering = vec![0usize; n_entities];
    let mut is_ghost = vec![false; n_entities];
    let mut ghosts = GhostRecords::default();
    let mut n_owned = 0usize;
    let mut n_ghost = 0usize;

    for entity in 0..n_entities {
        let linked_globals = cell_im.locals_to_globals(entity_to_cell.links(entity))?;
        let owner_cell_global = *linked_globals
            .iter()
            .max()
            .ok_or_else(|| MeshLaError::InvalidConnectivity(format!("entity {entity} has no adjacent cell")))?;
        let owner_cell_local = cell_im
            .global_to_local(owner_cell_global)
            .ok_or(MeshLaError::UnknownGlobalIndex(owner_cell_global))?;
        let slot = cell_to_entity.relative_index(owner_cell_local, entity)?;
        let owner_proc = cell_im.owner(comm, owner_cell_local)?;

        if owner_proc == rank {
            renumbering[entity] = n_owned;
            n_owned += 1;
        } else {
            renumbering[entity] = n_ghost;
            n_ghost += 1;
            is_ghost[entity] = true;
            ghosts.push(owner_cell_global, slot, owner_proc);
        }
    }
    for entity in 0..n_entities {
        if is_ghost[entity] {
            renumbering[entity] += n_owned;
        }
    }

    // Renumber the connectivity and re-derive its inverse.
    let renumbered_array: Vec<usize> = cell_to_entity
        .array()
        .iter()
        .map(|&e| renumbering[e])
        .collect();
    let cell_to_entity_re =
        Connectivity::new(cell_to_entity.offsets().to_vec(), renumbered_array)?;
    let entity_to_cell_re = cell_to_entity_re.invert();

    // Assign contiguous global ids to the owned entities: this rank's range
    // starts at the sum of the owned counts of the ranks before it.
    let counts = comm.send_to_dest(
        &vec![n_owned as u64; n_procs],
        &(0..n_procs).collect::<Vec<_>>(),
        1,
    );
    let offset: u64 = counts.data[..rank].iter().sum();

    let mut local_to_global = vec![0u64; n_owned + n_ghost];
    for (i, slot) in local_to_global[..n_owned].iter_mut().enumerate() {
        *slot = offset + i as u64;
    }

    // Round one: ask each believed owner for the ids of our ghosts.
    let queries_cell = comm.send_to_dest(&ghosts.owner_cell, &ghosts.owner_proc, 1);
    let queries_slot = comm.send_to_dest(&ghosts.slot, &ghosts.owner_proc, 1);

    // Answer what we can; queries whose entity is a ghost on our side too
    // (an indirect ghost) are forwarded to the actual owner.
    let n_queries = queries_cell.data.len();
    let mut reply_id = vec![0u64; n_queries];
    let mut reply_owner = vec![0usize; n_queries];
    let mut reply_dest = vec![0usize; n_queries];
    let mut indirect = GhostRecords::default();
    let mut indirect_pos: Vec<usize> = Vec::new();

    for src in 0..n_procs {
        for j in 0..queries_cell.counts[src] {
            let pos = queries_cell.displs[src] + j;

            // Resolve the queried entity through the cell the requester
            // named, then recompute its actual owner from our own (wider)
            // adjacency.
            let named_cell = cell_im
                .global_to_local(queries_cell.data[pos])
                .ok_or(MeshLaError::UnknownGlobalIndex(queries_cell.data[pos]))?;
            let entity = cell_to_entity_re.links(named_cell)[queries_slot.data[pos] as usize];

            let linked_globals = cell_im.locals_to_globals(entity_to_cell_re.links(entity))?;
            let owner_cell_global = *linked_globals.iter().max().ok_or_else(|| {
                MeshLaError::InvalidConnectivity(format!("entity {entity} has no adjacent cell"))
            })?;
            let owner_cell_local = cell_im
                .global_to_local(owner_cell_global)
                .ok_or(MeshLaError::UnknownGlobalIndex(owner_cell_global))?;
            let owner_proc = cell_im.owner(comm, owner_cell_local)?;

            if owner_proc == rank {
                reply_id[pos] = local_to_global[entity];
            } else {
                let slot = cell_to_entity_re.relative_index(owner_cell_local, entity)?;
                indirect.push(owner_cell_global, slot, owner_proc);
                indirect_pos.push(pos);
            }
            reply_owner[pos] = owner_proc;
            reply_dest[pos] = src;
        }
    }

    // Round two: resolve the indirect ghosts at their actual owners. Every
    // entity queried here is genuinely owned by the receiving rank, so no
    // further forwarding can occur.
    let fwd_cell = comm.send_to_dest(&indirect.owner_cell, &indirect.owner_proc, 1);
    let fwd_slot = comm.send_to_dest(&indirect.slot, &indirect.owner_proc, 1);

    let mut fwd_reply = vec![0u64; fwd_cell.data.len()];
    let mut fwd_reply_dest = vec![0usize; fwd_cell.data.len()];
    for src in 0..n_procs {
        for j in 0..fwd_cell.counts[src] {
            let pos = fwd_cell.displs[src] + j;
            let owner_cell_local = cell_im
                .global_to_local(fwd_cell.data[pos])
                .ok_or(MeshLaError::UnknownGlobalIndex(fwd_cell.data[pos]))?;
            let entity = cell_to_entity_re.links(owner_cell_local)[fwd_slot.data[pos] as usize];
            fwd_reply[pos] = local_to_global[entity];
            fwd_reply_dest[pos] = src;
        }
    }

    // Slot the relayed answers into the pending replies.
    let relayed = comm.send_to_dest(&fwd_reply, &fwd_reply_dest, 1);
    let mut relay_cursor = relayed.displs.clone();
    for (i, &pos) in indirect_pos.iter().enumerate() {
        let owner = indirect.owner_proc[i];
        reply_id[pos] = relayed.data[relay_cursor[owner]];
        relay_cursor[owner] += 1;
    }

    // Return ids and actual owners to the requesters.
    let answers = comm.send_to_dest(&reply_id, &reply_dest, 1);
    let owners = comm.send_to_dest(
        &reply_owner.iter().map(|&o| o as u64).collect::<Vec<_>>(),
        &reply_dest,
        1,
    );

    // Finish the map: answers from each believed owner arrive in the order
    // we asked about our ghosts.
    let mut ghost_owners = vec![0usize; n_ghost];
    let mut cursor = answers.displs.clone();
    for g in 0..n_ghost {
        let believed_owner = ghosts.owner_proc[g];
        let pos = cursor[believed_owner];
        cursor[believed_owner] += 1;

        let owner_cell_local = cell_im
            .global_to_local(ghosts.owner_cell[g])
            .ok_or(MeshLaError::UnknownGlobalIndex(ghosts.owner_cell[g]))?;
        let entity = cell_to_entity_re.links(owner_cell_local)[ghosts.slot[g] as usize];

        local_to_global[entity] = answers.data[pos];
        ghost_owners[entity - n_owned] = owners.data[pos] as usize;
    }

    Ok((
        IndexMap::new(local_to_global, ghost_owners)?,
        cell_to_entity_re,
    ))
}
