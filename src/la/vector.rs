//! Distributed block vector and its owned-entry kernels.

use std::sync::Arc;

use itertools::izip;
use serde::{Deserialize, Serialize};

use crate::comm::{Communicator, ReduceOp};
use crate::error::{MeshLaError, check_index, check_sizes};
use crate::parallel::{IndexMap, Scatterer};

/// How `set_values` combines new entries with stored ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetMode {
    Insert,
    Add,
}

/// Vector norm selector for [`norm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormType {
    L1,
    L2,
    Linf,
}

/// Distributed vector with `block_size` components per local index.
///
/// Storage covers the full local index space of its map, owned prefix then
/// ghost suffix, so element contributions can be staged on ghost slots and
/// later moved to their owners with [`Vector::assemble`]. All arithmetic
/// kernels and reductions read owned entries only; ghost slots are scratch
/// space whose content is meaningful only right after
/// [`Vector::update_ghosts`].
#[derive(Clone, Debug)]
pub struct Vector {
    index_map: Arc<IndexMap>,
    block_size: usize,
    values: Vec<f64>,
}

impl Vector {
    /// A zero vector over `index_map` with `block_size` components per index.
    pub fn new(index_map: Arc<IndexMap>, block_size: usize) -> Self {
        let values = vec![0.0; index_map.n_local() * block_size];
        Self {
            index_map,
            block_size,
            values,
        }
    }

    pub fn index_map(&self) -> &Arc<IndexMap> {
        &self.index_map
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of local (owned + ghost) indices.
    pub fn n_local(&self) -> usize {
        self.index_map.n_local()
    }

    /// Number of owned indices.
    pub fn n_owned(&self) -> usize {
        self.index_map.n_owned()
    }

    /// All local values, owned prefix then ghost suffix.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// The owned entries.
    pub fn owned(&self) -> &[f64] {
        &self.values[..self.n_owned() * self.block_size]
    }

    pub fn owned_mut(&mut self) -> &mut [f64] {
        let n = self.n_owned() * self.block_size;
        &mut self.values[..n]
    }

    /// Set every local entry, ghosts included.
    pub fn set_all(&mut self, value: f64) {
        self.values.fill(value);
    }

    pub fn get(&self, index: usize, component: usize) -> Result<f64, MeshLaError> {
        check_index(index, self.n_local())?;
        check_index(component, self.block_size)?;
        Ok(self.values[index * self.block_size + component])
    }

    pub fn set(
        &mut self,
        index: usize,
        component: usize,
        value: f64,
        mode: SetMode,
    ) -> Result<(), MeshLaError> {
        check_index(index, self.n_local())?;
        check_index(component, self.block_size)?;
        let slot = &mut self.values[index * self.block_size + component];
        match mode {
            SetMode::Insert => *slot = value,
            SetMode::Add => *slot += value,
        }
        Ok(())
    }

    /// Set one block of values per local index in `idxs`; `values` holds
    /// `block_size` entries per index.
    pub fn set_values(
        &mut self,
        idxs: &[usize],
        values: &[f64],
        mode: SetMode,
    ) -> Result<(), MeshLaError> {
        check_sizes(idxs.len() * self.block_size, values.len())?;
        for (i, &idx) in idxs.iter().enumerate() {
            check_index(idx, self.n_local())?;
            let block = &mut self.values[idx * self.block_size..(idx + 1) * self.block_size];
            let new = &values[i * self.block_size..(i + 1) * self.block_size];
            match mode {
                SetMode::Insert => block.copy_from_slice(new),
                SetMode::Add => {
                    for (slot, &v) in block.iter_mut().zip(new) {
                        *slot += v;
                    }
                }
            }
        }
        Ok(())
    }

    /// Move staged ghost contributions to their owners (collective).
    ///
    /// Every ghost slot is added into the owner's entry and then zeroed
    /// locally, so after assembly owned entries hold the global sum of all
    /// contributions and every ghost slot is zero.
    pub fn assemble<C: Communicator>(&mut self, comm: &C) -> Result<(), MeshLaError> {
        let scatter = Scatterer::new(comm, &self.index_map)?;
        scatter.reverse(comm, &mut self.values, self.block_size, |dest, src| {
            *dest += src
        })?;
        let ghost_start = self.index_map.n_owned() * self.block_size;
        self.values[ghost_start..].fill(0.0);
        Ok(())
    }

    /// Overwrite every ghost slot with the owner's current value (collective).
    pub fn update_ghosts<C: Communicator>(&mut self, comm: &C) -> Result<(), MeshLaError> {
        let scatter = Scatterer::new(comm, &self.index_map)?;
        scatter.forward(comm, &mut self.values, self.block_size, |dest, src| {
            *dest = src
        })
    }
}

/// `y = x` on owned entries.
pub fn copy(x: &Vector, y: &mut Vector) -> Result<(), MeshLaError> {
    check_sizes(x.owned().len(), y.owned().len())?;
    y.owned_mut().copy_from_slice(x.owned());
    Ok(())
}

/// `x = alpha * x` on owned entries.
pub fn scale(alpha: f64, x: &mut Vector) {
    for v in x.owned_mut() {
        *v *= alpha;
    }
}

/// `y = alpha * x + y` on owned entries.
pub fn axpy(alpha: f64, x: &Vector, y: &mut Vector) -> Result<(), MeshLaError> {
    check_sizes(x.owned().len(), y.owned().len())?;
    for (yi, &xi) in izip!(y.owned_mut(), x.owned()) {
        *yi += alpha * xi;
    }
    Ok(())
}

/// `z = a * x + b * y + c` on owned entries.
pub fn axpbypc(
    a: f64,
    x: &Vector,
    b: f64,
    y: &Vector,
    c: f64,
    z: &mut Vector,
) -> Result<(), MeshLaError> {
    check_sizes(x.owned().len(), y.owned().len())?;
    check_sizes(x.owned().len(), z.owned().len())?;
    for (zi, &xi, &yi) in izip!(z.owned_mut(), x.owned(), y.owned()) {
        *zi = a * xi + b * yi + c;
    }
    Ok(())
}

/// Global dot product over owned entries (collective).
pub fn dot<C: Communicator>(comm: &C, x: &Vector, y: &Vector) -> Result<f64, MeshLaError> {
    check_sizes(x.owned().len(), y.owned().len())?;
    let partial: f64 = izip!(x.owned(), y.owned()).map(|(a, b)| a * b).sum();
    Ok(comm.reduce(partial, ReduceOp::Sum))
}

/// Global vector norm over owned entries (collective).
pub fn norm<C: Communicator>(
    comm: &C,
    x: &Vector,
    norm_type: NormType,
) -> Result<f64, MeshLaError> {
    let value = match norm_type {
        NormType::L1 => {
            let partial: f64 = x.owned().iter().map(|v| v.abs()).sum();
            comm.reduce(partial, ReduceOp::Sum)
        }
        NormType::L2 => {
            let partial: f64 = x.owned().iter().map(|v| v * v).sum();
            comm.reduce(partial, ReduceOp::Sum).sqrt()
        }
        NormType::Linf => {
            let partial = x.owned().iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            comm.reduce(partial, ReduceOp::Max)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;

    fn serial_vector(values: &[f64]) -> Vector {
        let mut x = Vector::new(Arc::new(IndexMap::serial(values.len())), 1);
        x.values_mut().copy_from_slice(values);
        x
    }

    #[test]
    fn set_and_get_by_index_and_component() {
        let mut x = Vector::new(Arc::new(IndexMap::serial(3)), 2);
        x.set(1, 0, 2.5, SetMode::Insert).unwrap();
        x.set(1, 0, 0.5, SetMode::Add).unwrap();
        assert_eq!(x.get(1, 0).unwrap(), 3.0);
        assert_eq!(x.get(1, 1).unwrap(), 0.0);
        assert!(x.get(3, 0).is_err());
        assert!(x.get(0, 2).is_err());
    }

    #[test]
    fn set_values_blocked() {
        let mut x = Vector::new(Arc::new(IndexMap::serial(3)), 2);
        x.set_values(&[2, 0], &[1.0, 2.0, 3.0, 4.0], SetMode::Insert)
            .unwrap();
        assert_eq!(x.values(), &[3.0, 4.0, 0.0, 0.0, 1.0, 2.0]);
        x.set_values(&[0], &[1.0, 1.0], SetMode::Add).unwrap();
        assert_eq!(x.get(0, 0).unwrap(), 4.0);
    }

    #[test]
    fn kernels_operate_on_owned_entries() {
        let x = serial_vector(&[1.0, 2.0, 3.0]);
        let y = serial_vector(&[1.0, 1.0, 1.0]);
        let mut z = serial_vector(&[0.0, 0.0, 0.0]);

        axpbypc(2.0, &x, -1.0, &y, 0.5, &mut z).unwrap();
        assert_eq!(z.values(), &[1.5, 3.5, 5.5]);

        let mut w = serial_vector(&[0.0; 3]);
        copy(&x, &mut w).unwrap();
        axpy(-1.0, &y, &mut w).unwrap();
        assert_eq!(w.values(), &[0.0, 1.0, 2.0]);

        scale(2.0, &mut w);
        assert_eq!(w.values(), &[0.0, 2.0, 4.0]);
    }

    #[test]
    fn reductions() {
        let comm = SerialComm;
        let x = serial_vector(&[3.0, -4.0]);
        let y = serial_vector(&[1.0, 2.0]);
        assert_eq!(dot(&comm, &x, &y).unwrap(), -5.0);
        assert_eq!(norm(&comm, &x, NormType::L1).unwrap(), 7.0);
        assert_eq!(norm(&comm, &x, NormType::L2).unwrap(), 5.0);
        assert_eq!(norm(&comm, &x, NormType::Linf).unwrap(), 4.0);
    }

    #[test]
    fn mismatched_kernel_sizes_rejected() {
        let x = serial_vector(&[1.0, 2.0]);
        let mut y = serial_vector(&[1.0]);
        assert!(axpy(1.0, &x, &mut y).is_err());
    }
}
