//! Bipartite graph connectivity.
//!
//! [`Connectivity`] is the CSR-style adjacency every other subsystem is keyed
//! by: cell→node, cell→edge, row→column. It is a pure, distribution-unaware
//! data structure; everything parallel lives in [`crate::parallel`] and
//! [`crate::partition`].

pub mod connectivity;

pub use connectivity::Connectivity;
