use std::sync::Arc;

use mesh_la::comm::{Communicator, run_local};
use mesh_la::graph::Connectivity;
use mesh_la::la::{NormType, SparseMatrix, Vector, dot, norm, norm_frobenius, spmv};
use mesh_la::parallel::IndexMap;

// 1D chain of 4 nodes; rank 0 owns {0, 1} and ghosts 2, rank 1 owns {2, 3}
// and ghosts 1. The sparsity is the tridiagonal stencil restricted to each
// rank's local nodes, ghost rows included.
fn node_map(rank: usize) -> Arc<IndexMap> {
    Arc::new(if rank == 0 {
        IndexMap::new(vec![0, 1, 2], vec![1]).unwrap()
    } else {
        IndexMap::new(vec![2, 3, 1], vec![0]).unwrap()
    })
}

fn stencil(rank: usize) -> Arc<Connectivity> {
    Arc::new(if rank == 0 {
        // Rows: node 0 {0,1}, node 1 {0,1,2}, ghost node 2 {1,2}.
        Connectivity::new(vec![0, 2, 5, 7], vec![0, 1, 0, 1, 2, 1, 2]).unwrap()
    } else {
        // Rows: node 2 {2,3,1} as locals {0,1,2}, node 3 {0,1},
        // ghost node 1 {0,2}.
        Connectivity::new(vec![0, 3, 5, 7], vec![0, 1, 2, 0, 1, 0, 2]).unwrap()
    })
}

#[test]
fn vector_assemble_sums_contributions_and_zeroes_ghosts() {
    run_local(2, |comm| {
        let im = node_map(comm.rank());
        let mut x = Vector::new(im.clone(), 1);
        x.set_all(1.0);
        x.assemble(&comm).unwrap();

        // Nodes 1 and 2 each have one ghost copy elsewhere.
        let expected = if comm.rank() == 0 {
            [1.0, 2.0]
        } else {
            [2.0, 1.0]
        };
        assert_eq!(x.owned(), &expected);
        assert_eq!(x.values()[im.n_owned()], 0.0);
    });
}

#[test]
fn update_ghosts_matches_owner_values() {
    run_local(2, |comm| {
        let im = node_map(comm.rank());
        let mut x = Vector::new(im.clone(), 1);
        for local in 0..im.n_owned() {
            let g = im.owned_global()[local] as f64;
            x.set(local, 0, 10.0 * g, mesh_la::la::SetMode::Insert)
                .unwrap();
        }

        x.update_ghosts(&comm).unwrap();
        for g in 0..im.n_ghost() {
            let global = im.ghost_global()[g] as f64;
            assert_eq!(x.values()[im.n_owned() + g], 10.0 * global);
        }
    });
}

#[test]
fn reductions_span_ranks() {
    run_local(2, |comm| {
        let im = node_map(comm.rank());
        let mut x = Vector::new(im.clone(), 1);
        for local in 0..im.n_owned() {
            let g = im.owned_global()[local] as f64;
            x.set(local, 0, g + 1.0, mesh_la::la::SetMode::Insert)
                .unwrap();
        }
        // Poison the ghost slots; reductions must ignore them.
        for v in x.values_mut()[im.n_owned()..].iter_mut() {
            *v = 1e9;
        }

        // x = [1, 2, 3, 4] globally.
        assert_eq!(dot(&comm, &x, &x).unwrap(), 30.0);
        assert_eq!(norm(&comm, &x, NormType::L1).unwrap(), 10.0);
        assert!((norm(&comm, &x, NormType::L2).unwrap() - 30.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(norm(&comm, &x, NormType::Linf).unwrap(), 4.0);
    });
}

/// Assemble the 1D Laplacian with natural boundary conditions, element by
/// element, staging the cross-rank element on rank 1's ghost row.
fn assembled_laplacian<C: Communicator>(comm: &C) -> SparseMatrix {
    let rank = comm.rank();
    let mut a = SparseMatrix::new(stencil(rank), node_map(rank), node_map(rank), 1).unwrap();
    let element = [1.0, -1.0, -1.0, 1.0];
    if rank == 0 {
        // Element (0, 1).
        a.set_values(&[0, 1], &[0, 1], &element).unwrap();
    } else {
        // Elements (1, 2) and (2, 3); node 1 is a ghost row here.
        a.set_values(&[2, 0], &[2, 0], &element).unwrap();
        a.set_values(&[0, 1], &[0, 1], &element).unwrap();
    }
    a.assemble(comm).unwrap();
    a
}

#[test]
fn matrix_assemble_forwards_ghost_rows() {
    run_local(2, |comm| {
        let a = assembled_laplacian(&comm);

        if comm.rank() == 0 {
            // Row of node 1 accumulated the ghost contribution from rank 1.
            let (cols, vals) = a.row_data(1).unwrap();
            assert_eq!(cols, &[0, 1, 2]);
            assert_eq!(vals, &[-1.0, 2.0, -1.0]);
        } else {
            let (cols, vals) = a.row_data(0).unwrap();
            assert_eq!(cols, &[0, 1, 2]);
            assert_eq!(vals, &[2.0, -1.0, -1.0]);
            // The staged ghost row is zeroed after assembly.
            let (_, ghost_vals) = a.row_data(2).unwrap();
            assert!(ghost_vals.iter().all(|&v| v == 0.0));
        }

        // Global matrix is [[1,-1,..],[-1,2,-1,.],[.,-1,2,-1],[..,-1,1]].
        let nf = norm_frobenius(&comm, &a);
        assert!((nf - 16.0f64.sqrt()).abs() < 1e-12);
    });
}

#[test]
fn spmv_with_current_ghosts_matches_dense_product() {
    run_local(2, |comm| {
        let a = assembled_laplacian(&comm);
        let im = a.row_map().clone();

        let mut x = Vector::new(im.clone(), 1);
        for local in 0..im.n_owned() {
            let g = im.owned_global()[local] as f64;
            x.set(local, 0, g + 1.0, mesh_la::la::SetMode::Insert)
                .unwrap();
        }
        x.update_ghosts(&comm).unwrap();

        let mut y = Vector::new(im, 1);
        spmv(&a, &x, &mut y).unwrap();

        // A * [1, 2, 3, 4] = [-1, 0, 0, 1].
        let expected = if comm.rank() == 0 {
            [-1.0, 0.0]
        } else {
            [0.0, 1.0]
        };
        assert_eq!(y.owned(), &expected);
    });
}
