//! # mesh-la
//!
//! mesh-la is a distributed substrate for mesh-based numerical codes: index
//! maps and ghost exchange over partitioned entity sets, CSR connectivity
//! algebra, entity-ownership partitioning, and a block-CSR linear algebra
//! stack with Krylov solvers. It supports serial, in-process multi-rank and
//! MPI-based distributed workflows behind one [`comm::Communicator`] seam.
//!
//! ## Features
//! - [`graph::Connectivity`]: immutable bipartite CSR relations with
//!   inversion and primary-to-primary derivation
//! - [`parallel::IndexMap`] and [`parallel::Scatterer`]: local/global index
//!   translation, contiguous renumbering, forward and reverse ghost exchange
//! - [`partition`]: partitioner oracles, partition distribution, and
//!   consistent distributed numbering of derived entity sets
//! - [`la`]: distributed vectors, block-CSR matrices and the
//!   assemble-then-solve [`la::LinearSystem`] contract
//! - [`solver`]: CG and restarted GMRES over any communicator backend
//!
//! ## Execution model
//!
//! The crate is SPMD: every rank runs the same program, and every collective
//! operation (assembly, ghost update, reductions, solves) must be entered by
//! all ranks in the same order. Transport backends are pluggable; see
//! [`comm`] for the serial, threaded and MPI implementations.
//!
//! ## Usage
//! Add `mesh-la` as a dependency in your `Cargo.toml` and enable features as
//! needed:
//!
//! ```toml
//! [dependencies]
//! mesh-la = "0.1.0"
//! # Optional features:
//! # features = ["mpi-support","metis-support"]
//! ```

pub mod comm;
pub mod error;
pub mod graph;
pub mod la;
pub mod parallel;
pub mod partition;
pub mod solver;

pub use error::MeshLaError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::{Communicator, LocalComm, ReduceOp, SerialComm, run_local};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::error::MeshLaError;
    pub use crate::graph::Connectivity;
    pub use crate::la::{
        DenseMatrix, KrylovMethod, LinearSystem, NativeLinearSystem, NormType, SetMode,
        SparseMatrix, Vector,
    };
    pub use crate::parallel::{IndexMap, Scatterer};
    #[cfg(feature = "metis-support")]
    pub use crate::partition::MetisPartitioner;
    pub use crate::partition::{
        BlockPartitioner, Partitioner, create_entity_partition, distribute_partition,
    };
    pub use crate::solver::{Cg, Gmres, IterativeSolver, SolverOptions};
}
