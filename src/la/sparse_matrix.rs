//! Distributed block-CSR sparse matrix.

use std::sync::Arc;

use crate::comm::{Communicator, ReduceOp};
use crate::error::{MeshLaError, check_index, check_sizes};
use crate::graph::Connectivity;
use crate::la::Vector;
use crate::parallel::IndexMap;

/// Block-CSR matrix over a fixed row→column sparsity pattern.
///
/// The pattern is an immutable [`Connectivity`] (rows as primaries, columns
/// as secondaries) shared by reference; the matrix stores one dense
/// `block_size` x `block_size` block per link, in link order. Rows follow the
/// row map's owned-prefix/ghost-suffix layout, so element contributions can
/// be staged on ghost rows and moved to their owners with
/// [`SparseMatrix::assemble`].
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    connectivity: Arc<Connectivity>,
    row_map: Arc<IndexMap>,
    col_map: Arc<IndexMap>,
    block_size: usize,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// A zero matrix over the given sparsity pattern.
    pub fn new(
        connectivity: Arc<Connectivity>,
        row_map: Arc<IndexMap>,
        col_map: Arc<IndexMap>,
        block_size: usize,
    ) -> Result<Self, MeshLaError> {
        check_sizes(connectivity.n_primary(), row_map.n_local())?;
        check_sizes(connectivity.n_secondary(), col_map.n_local())?;
        let values = vec![0.0; connectivity.n_links() * block_size * block_size];
        Ok(Self {
            connectivity,
            row_map,
            col_map,
            block_size,
            values,
        })
    }

    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    pub fn row_map(&self) -> &Arc<IndexMap> {
        &self.row_map
    }

    pub fn col_map(&self) -> &Arc<IndexMap> {
        &self.col_map
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Set every stored block entry, ghost rows included.
    pub fn set_all(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// Add a dense element contribution.
    ///
    /// `values` is the row-major `rows.len() * block_size` by
    /// `cols.len() * block_size` element matrix. Every `(row, col)` pair must
    /// be a link of the sparsity pattern. Contributions accumulate; nothing
    /// is ever overwritten.
    pub fn set_values(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
    ) -> Result<(), MeshLaError> {
        let bs = self.block_size;
        check_sizes(rows.len() * bs * cols.len() * bs, values.len())?;
        let width = cols.len() * bs;

        for (i, &row) in rows.iter().enumerate() {
            check_index(row, self.connectivity.n_primary())?;
            for (j, &col) in cols.iter().enumerate() {
                let pos = self.connectivity.offset(row)
                    + self.connectivity.relative_index(row, col)?;
                let block = &mut self.values[pos * bs * bs..(pos + 1) * bs * bs];
                for k1 in 0..bs {
                    for k2 in 0..bs {
                        block[k1 * bs + k2] += values[(i * bs + k1) * width + j * bs + k2];
                    }
                }
            }
        }
        Ok(())
    }

    /// Column indices and block values of one row, in link order.
    pub fn row_data(&self, row: usize) -> Result<(&[usize], &[f64]), MeshLaError> {
        check_index(row, self.connectivity.n_primary())?;
        let bs2 = self.block_size * self.block_size;
        let start = self.connectivity.offset(row);
        let end = start + self.connectivity.link_count(row);
        Ok((
            self.connectivity.links(row),
            &self.values[start * bs2..end * bs2],
        ))
    }

    /// Mutable variant of [`SparseMatrix::row_data`].
    pub fn row_data_mut(&mut self, row: usize) -> Result<(&[usize], &mut [f64]), MeshLaError> {
        check_index(row, self.connectivity.n_primary())?;
        let bs2 = self.block_size * self.block_size;
        let start = self.connectivity.offset(row);
        let end = start + self.connectivity.link_count(row);
        Ok((
            self.connectivity.links(row),
            &mut self.values[start * bs2..end * bs2],
        ))
    }

    /// Move staged ghost-row contributions to their owning ranks
    /// (collective).
    ///
    /// Each ghost row travels as block COO records addressed to the row's
    /// owner, local ghost-row storage is zeroed, and received records are
    /// accumulated into owned rows. Every column referenced by a ghost row
    /// is adjacent to that row's entities, so the owner holds it locally.
    pub fn assemble<C: Communicator>(&mut self, comm: &C) -> Result<(), MeshLaError> {
        let bs2 = self.block_size * self.block_size;
        let n_owned = self.row_map.n_owned();

        let mut send_rows: Vec<u64> = Vec::new();
        let mut send_cols: Vec<u64> = Vec::new();
        let mut send_vals: Vec<f64> = Vec::new();
        let mut dest: Vec<usize> = Vec::new();

        for row in n_owned..self.row_map.n_local() {
            let owner = self.row_map.ghost_owners()[row - n_owned];
            let row_global = self.row_map.local_to_global(row)?;
            let start = self.connectivity.offset(row);
            for (k, &col) in self.connectivity.links(row).iter().enumerate() {
                send_rows.push(row_global);
                send_cols.push(self.col_map.local_to_global(col)?);
                send_vals.extend_from_slice(&self.values[(start + k) * bs2..(start + k + 1) * bs2]);
                dest.push(owner);
            }
        }

        let rows = comm.send_to_dest(&send_rows, &dest, 1);
        let cols = comm.send_to_dest(&send_cols, &dest, 1);
        let vals = comm.send_to_dest(&send_vals, &dest, bs2);

        // Ghost rows are the CSR suffix; reset them for the next assembly
        // cycle.
        let ghost_start = self.connectivity.offset(n_owned) * bs2;
        self.values[ghost_start..].fill(0.0);

        for i in 0..rows.data.len() {
            let row = self
                .row_map
                .global_to_local(rows.data[i])
                .ok_or(MeshLaError::UnknownGlobalIndex(rows.data[i]))?;
            let col = self
                .col_map
                .global_to_local(cols.data[i])
                .ok_or(MeshLaError::UnknownGlobalIndex(cols.data[i]))?;
            let pos =
                self.connectivity.offset(row) + self.connectivity.relative_index(row, col)?;
            for (slot, &v) in self.values[pos * bs2..(pos + 1) * bs2]
                .iter_mut()
                .zip(&vals.data[i * bs2..(i + 1) * bs2])
            {
                *slot += v;
            }
        }
        Ok(())
    }

    /// Extract the diagonal entries of the owned rows into `diag`.
    pub fn diagonal(&self, diag: &mut Vector) -> Result<(), MeshLaError> {
        check_sizes(self.block_size, diag.block_size())?;
        check_sizes(self.row_map.n_local(), diag.n_local())?;
        let bs = self.block_size;
        for row in 0..self.row_map.n_owned() {
            let pos = self.diagonal_position(row)?;
            for k in 0..bs {
                let v = self.values[pos * bs * bs + k * bs + k];
                diag.set(row, k, v, crate::la::SetMode::Insert)?;
            }
        }
        Ok(())
    }

    /// Extract one diagonal component of the owned rows into a scalar
    /// (`block_size` 1) vector.
    pub fn diagonal_component(
        &self,
        component: usize,
        diag: &mut Vector,
    ) -> Result<(), MeshLaError> {
        check_index(component, self.block_size)?;
        check_sizes(1, diag.block_size())?;
        check_sizes(self.row_map.n_local(), diag.n_local())?;
        let bs = self.block_size;
        for row in 0..self.row_map.n_owned() {
            let pos = self.diagonal_position(row)?;
            let v = self.values[pos * bs * bs + component * bs + component];
            diag.set(row, 0, v, crate::la::SetMode::Insert)?;
        }
        Ok(())
    }

    /// Scale the diagonal entries of the owned rows.
    pub fn scale_diagonal(&mut self, factor: f64) -> Result<(), MeshLaError> {
        let bs = self.block_size;
        for row in 0..self.row_map.n_owned() {
            let pos = self.diagonal_position(row)?;
            for k in 0..bs {
                self.values[pos * bs * bs + k * bs + k] *= factor;
            }
        }
        Ok(())
    }

    fn diagonal_position(&self, row: usize) -> Result<usize, MeshLaError> {
        let rel = self
            .connectivity
            .relative_index(row, row)
            .map_err(|_| MeshLaError::MissingDiagonal(row))?;
        Ok(self.connectivity.offset(row) + rel)
    }
}

/// `y = A x` on owned rows.
///
/// Reads the full local range of `x`, ghosts included: the caller must have
/// called [`Vector::update_ghosts`] on `x` since it last changed. No
/// synchronization happens here.
pub fn spmv(a: &SparseMatrix, x: &Vector, y: &mut Vector) -> Result<(), MeshLaError> {
    check_sizes(a.block_size, x.block_size())?;
    check_sizes(a.block_size, y.block_size())?;
    check_sizes(a.col_map.n_local(), x.n_local())?;
    check_sizes(a.row_map.n_local(), y.n_local())?;

    let bs = a.block_size;
    let xv = x.values();
    y.set_all(0.0);
    let yv = y.values_mut();

    for row in 0..a.row_map.n_owned() {
        let start = a.connectivity.offset(row);
        for (k, &col) in a.connectivity.links(row).iter().enumerate() {
            let block = &a.values[(start + k) * bs * bs..(start + k + 1) * bs * bs];
            for k1 in 0..bs {
                let mut s = 0.0;
                for k2 in 0..bs {
                    s += block[k1 * bs + k2] * xv[col * bs + k2];
                }
                yv[row * bs + k1] += s;
            }
        }
    }
    Ok(())
}

/// Global Frobenius norm over owned rows (collective).
pub fn norm_frobenius<C: Communicator>(comm: &C, a: &SparseMatrix) -> f64 {
    let bs2 = a.block_size * a.block_size;
    let owned_end = a.connectivity.offset(a.row_map.n_owned()) * bs2;
    let partial: f64 = a.values[..owned_end].iter().map(|v| v * v).sum();
    comm.reduce(partial, ReduceOp::Sum).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;

    // Tridiagonal pattern over 3 rows.
    fn tridiag_pattern() -> Arc<Connectivity> {
        Arc::new(Connectivity::new(vec![0, 2, 5, 7], vec![0, 1, 0, 1, 2, 1, 2]).unwrap())
    }

    fn serial_matrix(block_size: usize) -> SparseMatrix {
        let im = Arc::new(IndexMap::serial(3));
        SparseMatrix::new(tridiag_pattern(), im.clone(), im, block_size).unwrap()
    }

    #[test]
    fn set_values_accumulates() {
        let mut a = serial_matrix(1);
        a.set_values(&[0, 1], &[0, 1], &[2.0, -1.0, -1.0, 2.0])
            .unwrap();
        a.set_values(&[1, 2], &[1, 2], &[2.0, -1.0, -1.0, 2.0])
            .unwrap();

        let (cols, vals) = a.row_data(1).unwrap();
        assert_eq!(cols, &[0, 1, 2]);
        assert_eq!(vals, &[-1.0, 4.0, -1.0]);
    }

    #[test]
    fn set_values_rejects_non_links() {
        let mut a = serial_matrix(1);
        assert!(matches!(
            a.set_values(&[0], &[2], &[1.0]),
            Err(MeshLaError::NotALink {
                primary: 0,
                secondary: 2
            })
        ));
    }

    #[test]
    fn diagonal_and_scaling() {
        let comm = SerialComm;
        let mut a = serial_matrix(2);
        // Identity block on each diagonal link.
        for row in 0..3 {
            a.set_values(&[row], &[row], &[1.0, 0.0, 0.0, 2.0]).unwrap();
        }

        let mut diag = Vector::new(a.row_map().clone(), 2);
        a.diagonal(&mut diag).unwrap();
        assert_eq!(diag.get(1, 0).unwrap(), 1.0);
        assert_eq!(diag.get(1, 1).unwrap(), 2.0);

        let mut comp = Vector::new(a.row_map().clone(), 1);
        a.diagonal_component(1, &mut comp).unwrap();
        assert_eq!(comp.get(2, 0).unwrap(), 2.0);

        a.scale_diagonal(3.0).unwrap();
        a.diagonal(&mut diag).unwrap();
        assert_eq!(diag.get(0, 0).unwrap(), 3.0);
        assert_eq!(diag.get(0, 1).unwrap(), 6.0);

        let nf = norm_frobenius(&comm, &a);
        // Three diagonal blocks [3, 0; 0, 6].
        assert!((nf - (3.0_f64 * (9.0 + 36.0)).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn spmv_matches_dense() {
        let mut a = serial_matrix(1);
        a.set_values(&[0], &[0, 1], &[2.0, -1.0]).unwrap();
        a.set_values(&[1], &[0, 1, 2], &[-1.0, 2.0, -1.0]).unwrap();
        a.set_values(&[2], &[1, 2], &[-1.0, 2.0]).unwrap();

        let im = a.row_map().clone();
        let mut x = Vector::new(im.clone(), 1);
        x.values_mut().copy_from_slice(&[1.0, 2.0, 3.0]);
        let mut y = Vector::new(im, 1);
        spmv(&a, &x, &mut y).unwrap();
        assert_eq!(y.values(), &[0.0, 0.0, 4.0]);
    }
}
