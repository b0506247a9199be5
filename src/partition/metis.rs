//! METIS-backed partitioner oracle (feature `metis-support`).

use metis::Graph;

use crate::error::MeshLaError;
use crate::graph::Connectivity;
use crate::partition::Partitioner;

/// k-way / recursive-bisection graph partitioner backed by METIS.
///
/// Recursive bisection is preferred for small part counts, k-way beyond
/// that, matching METIS's own guidance.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetisPartitioner;

impl Partitioner for MetisPartitioner {
    fn partition(&self, conn: &Connectivity, n_parts: usize) -> Result<Vec<usize>, MeshLaError> {
        if n_parts == 0 {
            return Err(MeshLaError::Partitioner("zero parts requested".into()));
        }
        if n_parts == 1 {
            return Ok(vec![0; conn.n_primary()]);
        }

        let xadj: Vec<metis::Idx> = conn.offsets().iter().map(|&o| o as metis::Idx).collect();
        let adjncy: Vec<metis::Idx> = conn.array().iter().map(|&a| a as metis::Idx).collect();
        let mut part = vec![0 as metis::Idx; conn.n_primary()];

        let graph = Graph::new(1, n_parts as metis::Idx, &xadj, &adjncy)
            .map_err(|e| MeshLaError::Partitioner(e.to_string()))?;

        let result = if n_parts <= 8 {
            graph.part_recursive(&mut part)
        } else {
            graph.part_kway(&mut part)
        };
        result.map_err(|e| MeshLaError::Partitioner(e.to_string()))?;

        Ok(part.into_iter().map(|p| p as usize).collect())
    }
}
